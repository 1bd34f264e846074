//! OSC control plane for shadepulse.
//!
//! Receives OSC over UDP without blocking and turns messages into [`ControlMessage`]s:
//!
//! - `/uniform/<name> f [f f f]`: set a declared preset uniform (1 to 4 components)
//! - `/beat/threshold f`, `/beat/variance f`, `/beat/interval f` (milliseconds): beat tunables
//!
//! rosc 0.10 note: `rosc::decoder::decode_udp` is nom-style and returns
//! `(unconsumed remainder, packet)`.
#![deny(missing_debug_implementations)]

use std::io;
use std::net::{SocketAddr, UdpSocket};

use rosc::{OscPacket, OscType};
use shadepulse_preset::UniformValue;

/// A decoded control request. Applying it is up to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Declared uniform name, without the `u_` prefix.
    Uniform { name: String, value: UniformValue },
    BeatThreshold(f32),
    BeatVariance(f32),
    BeatInterval(f32),
}

/// Non-blocking UDP receiver.
#[derive(Debug)]
pub struct OscControlReceiver {
    sock: UdpSocket,
    buf: [u8; 4096],
}

impl OscControlReceiver {
    /// Binds to an address like "127.0.0.1:9000" in non-blocking mode.
    pub fn bind(addr: &str) -> io::Result<Self> {
        let sock = UdpSocket::bind(addr)?;
        sock.set_nonblocking(true)?;
        tracing::info!(%addr, "osc control listening");
        Ok(Self {
            sock,
            buf: [0u8; 4096],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Drains every datagram available right now. Never blocks.
    pub fn poll(&mut self) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        loop {
            match self.sock.recv_from(&mut self.buf) {
                Ok((n, from)) => match rosc::decoder::decode_udp(&self.buf[..n]) {
                    Ok((_rest, pkt)) => extract_from_packet(pkt, &mut out),
                    Err(e) => tracing::debug!(%from, error = ?e, "undecodable osc datagram"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(error = %e, "osc socket error");
                    break;
                }
            }
        }
        out
    }
}

fn extract_from_packet(pkt: OscPacket, out: &mut Vec<ControlMessage>) {
    match pkt {
        OscPacket::Message(m) => match parse_message(&m.addr, &m.args) {
            Some(msg) => out.push(msg),
            None => tracing::debug!(addr = %m.addr, "ignored osc message"),
        },
        OscPacket::Bundle(b) => {
            for p in b.content {
                extract_from_packet(p, out);
            }
        }
    }
}

fn as_f32(arg: &OscType) -> Option<f32> {
    match *arg {
        OscType::Float(x) => Some(x),
        OscType::Double(x) => Some(x as f32),
        OscType::Int(x) => Some(x as f32),
        OscType::Long(x) => Some(x as f32),
        OscType::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Parses one message address and argument list.
pub fn parse_message(addr: &str, args: &[OscType]) -> Option<ControlMessage> {
    if let Some(name) = addr.strip_prefix("/uniform/") {
        if name.is_empty() || name.contains('/') {
            return None;
        }
        let components = args.iter().map(as_f32).collect::<Option<Vec<f32>>>()?;
        if !(1..=4).contains(&components.len()) || !components.iter().all(|x| x.is_finite()) {
            return None;
        }
        let value = UniformValue::from_components(&components).ok()?;
        return Some(ControlMessage::Uniform {
            name: name.to_string(),
            value,
        });
    }

    let x = as_f32(args.first()?)?;
    if !x.is_finite() {
        return None;
    }
    match addr {
        "/beat/threshold" if x > 0.0 => Some(ControlMessage::BeatThreshold(x)),
        "/beat/variance" if x >= 0.0 => Some(ControlMessage::BeatVariance(x)),
        "/beat/interval" if x >= 0.0 => Some(ControlMessage::BeatInterval(x)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscMessage, OscTime};
    use std::time::{Duration, Instant};

    #[test]
    fn uniform_arity_follows_argument_count() {
        assert_eq!(
            parse_message("/uniform/decay", &[OscType::Float(0.9)]),
            Some(ControlMessage::Uniform {
                name: "decay".into(),
                value: UniformValue::Float(0.9)
            })
        );
        assert_eq!(
            parse_message(
                "/uniform/tint",
                &[OscType::Float(1.0), OscType::Int(0), OscType::Double(0.5)]
            ),
            Some(ControlMessage::Uniform {
                name: "tint".into(),
                value: UniformValue::Vec3([1.0, 0.0, 0.5])
            })
        );
        assert_eq!(parse_message("/uniform/tint", &[]), None);
        assert_eq!(parse_message("/uniform/tint", &vec![OscType::Float(0.0); 5]), None);
        assert_eq!(
            parse_message("/uniform/x", &[OscType::String("no".into())]),
            None
        );
        assert_eq!(parse_message("/uniform/", &[OscType::Float(1.0)]), None);
    }

    #[test]
    fn non_finite_uniform_values_are_dropped() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(parse_message("/uniform/gain", &[OscType::Float(bad)]), None);
            assert_eq!(
                parse_message("/uniform/tint", &[OscType::Float(1.0), OscType::Float(bad)]),
                None
            );
        }
        assert_eq!(parse_message("/uniform/gain", &[OscType::Double(1e300)]), None);
    }

    #[test]
    fn beat_tunables_reject_nonsense() {
        assert_eq!(
            parse_message("/beat/threshold", &[OscType::Float(1.5)]),
            Some(ControlMessage::BeatThreshold(1.5))
        );
        assert_eq!(parse_message("/beat/threshold", &[OscType::Float(0.0)]), None);
        assert_eq!(
            parse_message("/beat/interval", &[OscType::Int(250)]),
            Some(ControlMessage::BeatInterval(250.0))
        );
        assert_eq!(
            parse_message("/beat/variance", &[OscType::Float(f32::NAN)]),
            None
        );
        assert_eq!(parse_message("/other", &[OscType::Float(1.0)]), None);
    }

    #[test]
    fn receives_bundles_over_loopback() {
        let mut rx = OscControlReceiver::bind("127.0.0.1:0").unwrap();
        let addr = rx.local_addr().unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();

        let bundle = OscPacket::Bundle(OscBundle {
            timetag: OscTime {
                seconds: 0,
                fractional: 1,
            },
            content: vec![
                OscPacket::Message(OscMessage {
                    addr: "/uniform/decay".into(),
                    args: vec![OscType::Float(0.5)],
                }),
                OscPacket::Message(OscMessage {
                    addr: "/beat/variance".into(),
                    args: vec![OscType::Float(0.2)],
                }),
            ],
        });
        let bytes = rosc::encoder::encode(&bundle).unwrap();
        tx.send_to(&bytes, addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut got = Vec::new();
        while got.is_empty() && Instant::now() < deadline {
            got = rx.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            got,
            vec![
                ControlMessage::Uniform {
                    name: "decay".into(),
                    value: UniformValue::Float(0.5)
                },
                ControlMessage::BeatVariance(0.2),
            ]
        );
    }
}
