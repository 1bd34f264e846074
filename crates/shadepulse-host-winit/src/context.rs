//! Window + GLES 3.0 context creation.

use std::ffi::CString;
use std::num::NonZeroU32;

use anyhow::{anyhow, Context as _};
use glow::HasContext;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::HasRawWindowHandle;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

use shadepulse_core::RenderSettings;

/// A window with a current GL context and the surface presenting it.
pub struct GlWindow {
    pub window: Window,
    pub surface: Surface<WindowSurface>,
    pub context: PossiblyCurrentContext,
}

impl GlWindow {
    pub fn resize(&self, width: u32, height: u32) {
        self.surface
            .resize(&self.context, non_zero(width), non_zero(height));
    }

    pub fn present(&self) {
        if let Err(e) = self.surface.swap_buffers(&self.context) {
            tracing::warn!(error = %e, "swap_buffers failed");
        }
    }
}

pub fn non_zero(v: u32) -> NonZeroU32 {
    NonZeroU32::new(v).unwrap_or(NonZeroU32::MIN)
}

/// Opens the window and makes a GLES 3.0 context current on this thread.
///
/// The shaders are GLSL ES 3.00, so desktop GL is not requested.
pub fn create(
    event_loop: &EventLoop<()>,
    render: &RenderSettings,
) -> anyhow::Result<(GlWindow, glow::Context)> {
    let window_builder = WindowBuilder::new()
        .with_title("shadepulse")
        .with_inner_size(winit::dpi::LogicalSize::new(
            render.width as f64,
            render.height as f64,
        ));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let display_builder =
        glutin_winit::DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(event_loop, template, |configs| {
            // Prefer the config with the fewest samples; the feedback targets do the drawing.
            configs
                .min_by_key(|c| c.num_samples())
                .expect("display offered no GL configs")
        })
        .map_err(|e| anyhow!("DisplayBuilder.build: {e}"))?;

    let window = window.context("DisplayBuilder did not create a window")?;
    let gl_display = gl_config.display();
    let raw_window_handle = window.raw_window_handle();

    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(3, 0))))
        .build(Some(raw_window_handle));

    let not_current = unsafe {
        gl_display
            .create_context(&gl_config, &context_attributes)
            .map_err(|e| anyhow!("create_context (GLES 3.0): {e}"))?
    };

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        non_zero(size.width),
        non_zero(size.height),
    );

    let surface = unsafe {
        gl_display
            .create_window_surface(&gl_config, &attrs)
            .map_err(|e| anyhow!("create_window_surface: {e}"))?
    };

    let context = not_current
        .make_current(&surface)
        .map_err(|e| anyhow!("make_current: {e}"))?;

    if let Err(e) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
        tracing::warn!(error = %e, "vsync unavailable");
    }

    let gl = unsafe {
        glow::Context::from_loader_function(|s| match CString::new(s) {
            Ok(name) => gl_display.get_proc_address(name.as_c_str()) as *const _,
            Err(_) => std::ptr::null(),
        })
    };

    // Presets draw opaque fullscreen quads into the feedback targets.
    unsafe {
        gl.disable(glow::DEPTH_TEST);
        gl.disable(glow::BLEND);
        gl.disable(glow::CULL_FACE);
    }

    tracing::info!(
        width = size.width,
        height = size.height,
        "GL context ready"
    );

    Ok((
        GlWindow {
            window,
            surface,
            context,
        },
        gl,
    ))
}
