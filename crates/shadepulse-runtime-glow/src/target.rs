//! Offscreen color targets.

use shadepulse_core::EngineError;

use crate::gpu::{Gpu, TextureFilter, TextureFormat};

/// Framebuffer with one RGBA8 color texture.
#[derive(Debug)]
pub struct RenderTarget<G: Gpu> {
    pub fbo: G::Framebuffer,
    pub tex: G::Texture,
    pub w: i32,
    pub h: i32,
}

impl<G: Gpu> RenderTarget<G> {
    /// Creates a complete target. Nothing is left allocated on error.
    pub fn create(gpu: &G, w: i32, h: i32) -> Result<Self, EngineError> {
        let (w, h) = (w.max(1), h.max(1));
        let tex = gpu
            .create_texture()
            .map_err(|e| EngineError::GlCreate(format!("create_texture failed: {e}")))?;
        gpu.allocate_texture(tex, TextureFormat::Rgba8, TextureFilter::Linear, w, h);

        let fbo = match gpu.create_framebuffer() {
            Ok(fbo) => fbo,
            Err(e) => {
                gpu.delete_texture(tex);
                return Err(EngineError::GlCreate(format!("create_framebuffer failed: {e}")));
            }
        };
        if let Err(e) = gpu.attach_color_texture(fbo, tex) {
            gpu.delete_framebuffer(fbo);
            gpu.delete_texture(tex);
            return Err(EngineError::GlCreate(e));
        }

        Ok(Self { fbo, tex, w, h })
    }

    /// Reallocates texture storage. Keeps the same framebuffer and texture ids; contents are lost.
    pub fn resize(&mut self, gpu: &G, w: i32, h: i32) {
        self.w = w.max(1);
        self.h = h.max(1);
        gpu.allocate_texture(
            self.tex,
            TextureFormat::Rgba8,
            TextureFilter::Linear,
            self.w,
            self.h,
        );
    }

    /// Binds for writing and covers the whole target with the viewport.
    pub fn bind(&self, gpu: &G) {
        gpu.bind_framebuffer(Some(self.fbo));
        gpu.viewport(0, 0, self.w, self.h);
    }

    pub fn destroy(self, gpu: &G) {
        gpu.delete_framebuffer(self.fbo);
        gpu.delete_texture(self.tex);
    }
}
