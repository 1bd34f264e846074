//! Applies OSC control messages to a running visualizer.

use shadepulse_control_osc::ControlMessage;
use shadepulse_runtime_glow::{Gpu, Visualizer};

pub fn apply<G: Gpu>(visualizer: &mut Visualizer<G>, msg: ControlMessage) {
    match msg {
        ControlMessage::Uniform { name, value } => {
            visualizer.pipeline_mut().set_preset_uniform(&name, value);
        }
        ControlMessage::BeatThreshold(t) => visualizer.beat_detector_mut().set_threshold(t),
        ControlMessage::BeatVariance(v) => visualizer.beat_detector_mut().set_variance_threshold(v),
        ControlMessage::BeatInterval(ms) => {
            visualizer.beat_detector_mut().set_minimum_interval_ms(f64::from(ms))
        }
    }
}
