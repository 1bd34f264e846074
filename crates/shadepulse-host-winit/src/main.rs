//! Runnable shadepulse host: one window, live audio input, optional OSC control.
//!
//! Usage: `shadepulse [config.json]`. Log verbosity follows `RUST_LOG` (default `info`).
//!
//! Keys: Space pauses/resumes, Escape quits.

mod context;
mod control;
mod demo;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

use shadepulse_audio::CaptureSource;
use shadepulse_control_osc::OscControlReceiver;
use shadepulse_core::{load_engine_config_from, EngineConfig};
use shadepulse_preset::Preset;
use shadepulse_runtime_glow::{GlowGpu, Gpu, PresetPipeline, Visualizer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => load_engine_config_from(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn startup_preset(path: Option<&Path>) -> Preset {
    if let Some(path) = path {
        match Preset::from_json_path(path) {
            Ok(p) => return p,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "preset document unusable, falling back to the built-in demo"
            ),
        }
    }
    demo::preset()
}

fn load_startup_preset<G: Gpu>(pipeline: &mut PresetPipeline<G>, path: Option<&Path>) {
    // Failures are logged by the pipeline; it keeps clearing the display until a preset loads.
    let _ = pipeline.load_preset(startup_preset(path));
}

fn run() -> anyhow::Result<()> {
    let config = load_config()?;

    let event_loop = EventLoop::new();
    let (gl_window, gl) = context::create(&event_loop, &config.render)?;

    // SAFETY: the context was just made current on this thread and `gl_window` keeps it alive
    // inside the event loop closure, which also owns the visualizer.
    let gpu = unsafe { GlowGpu::new(gl) };
    let mut visualizer = Visualizer::from_config(gpu, &config)?;

    match CaptureSource::open(&config.audio) {
        Ok(source) => visualizer.features_mut().connect(source),
        Err(e) => tracing::warn!(error = %e, "no audio input, rendering silence"),
    }

    let mut osc = match config.osc.as_deref() {
        Some(addr) => match OscControlReceiver::bind(addr) {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!(%addr, error = %e, "OSC bind failed, control disabled");
                None
            }
        },
        None => None,
    };

    let size = gl_window.window.inner_size();
    visualizer
        .pipeline_mut()
        .resize(size.width as i32, size.height as i32);
    load_startup_preset(visualizer.pipeline_mut(), config.preset.as_deref());
    visualizer.start();

    let start = Instant::now();
    let mut visualizer = Some(visualizer);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,

                WindowEvent::Resized(physical_size) => {
                    let w = physical_size.width.max(1);
                    let h = physical_size.height.max(1);
                    gl_window.resize(w, h);
                    if let Some(v) = visualizer.as_mut() {
                        v.pipeline_mut().resize(w as i32, h as i32);
                    }
                    gl_window.window.request_redraw();
                }

                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(key),
                            ..
                        },
                    ..
                } => match key {
                    VirtualKeyCode::Escape => *control_flow = ControlFlow::Exit,
                    VirtualKeyCode::Space => {
                        if let Some(v) = visualizer.as_mut() {
                            if !v.stop() {
                                v.start();
                            }
                        }
                    }
                    _ => {}
                },

                _ => {}
            },

            Event::MainEventsCleared => gl_window.window.request_redraw(),

            Event::RedrawRequested(_) => {
                let Some(v) = visualizer.as_mut() else {
                    return;
                };

                // Apply OSC updates (non-blocking) before the frame reads them.
                if let Some(rx) = osc.as_mut() {
                    for msg in rx.poll() {
                        control::apply(v, msg);
                    }
                }

                if v.tick(start.elapsed().as_secs_f64()) {
                    gl_window.present();
                }
            }

            Event::LoopDestroyed => {
                if let Some(v) = visualizer.take() {
                    // GL objects go first, while the context is still current.
                    let _gl = v.destroy().into_inner();
                    tracing::info!("shutdown complete");
                }
            }

            _ => {}
        }
    })
}
