//! Ping-pong feedback surface.

use shadepulse_core::EngineError;

use crate::gpu::Gpu;
use crate::target::RenderTarget;

/// Two equally sized targets; one is written this frame, the other holds last frame.
///
/// `swap` must run exactly once per completed frame.
#[derive(Debug)]
pub struct FeedbackSurface<G: Gpu> {
    targets: [RenderTarget<G>; 2],
    current: usize,
    width: i32,
    height: i32,
}

impl<G: Gpu> FeedbackSurface<G> {
    /// Creates both targets cleared to transparent black.
    pub fn new(gpu: &G, width: i32, height: i32) -> Result<Self, EngineError> {
        let a = RenderTarget::create(gpu, width, height)?;
        let b = match RenderTarget::create(gpu, width, height) {
            Ok(b) => b,
            Err(e) => {
                a.destroy(gpu);
                return Err(e);
            }
        };
        let surface = Self {
            width: a.w,
            height: a.h,
            targets: [a, b],
            current: 0,
        };
        surface.clear(gpu, [0.0, 0.0, 0.0, 0.0]);
        Ok(surface)
    }

    /// Binds the current target for writing and sets the viewport to its size.
    pub fn bind(&self, gpu: &G) {
        self.current_target().bind(gpu);
    }

    pub fn current_target(&self) -> &RenderTarget<G> {
        &self.targets[self.current]
    }

    pub fn previous_target(&self) -> &RenderTarget<G> {
        &self.targets[1 - self.current]
    }

    pub fn current_texture(&self) -> G::Texture {
        self.current_target().tex
    }

    /// Last frame's output, read-only while the current target is bound.
    pub fn previous_texture(&self) -> G::Texture {
        self.previous_target().tex
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Reallocates both targets when the size changes. Returns whether anything happened.
    ///
    /// Prior contents are not preserved; the new storage is cleared.
    pub fn resize(&mut self, gpu: &G, width: i32, height: i32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return false;
        }
        for t in &mut self.targets {
            t.resize(gpu, width, height);
        }
        self.width = width;
        self.height = height;
        self.clear(gpu, [0.0, 0.0, 0.0, 0.0]);
        true
    }

    /// Clears both targets and leaves the display bound.
    pub fn clear(&self, gpu: &G, rgba: [f32; 4]) {
        for t in &self.targets {
            t.bind(gpu);
            gpu.clear(rgba);
        }
        gpu.bind_framebuffer(None);
    }

    /// Releases both targets. Consuming `self` rules out a second release.
    pub fn destroy(self, gpu: &G) {
        let [a, b] = self.targets;
        a.destroy(gpu);
        b.destroy(gpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;

    #[test]
    fn swap_is_an_involution() {
        let gpu = HeadlessGpu::new(8, 8);
        let mut fb = FeedbackSurface::new(&gpu, 8, 8).unwrap();
        let (cur, prev) = (fb.current_texture(), fb.previous_texture());
        assert_ne!(cur, prev);
        fb.swap();
        assert_eq!(fb.current_texture(), prev);
        assert_eq!(fb.previous_texture(), cur);
        fb.swap();
        assert_eq!(fb.current_texture(), cur);
        fb.destroy(&gpu);
    }

    #[test]
    fn resize_to_same_size_is_a_noop() {
        let gpu = HeadlessGpu::new(8, 8);
        let mut fb = FeedbackSurface::new(&gpu, 8, 8).unwrap();
        let allocations = gpu.texture_allocations();
        let handles = (fb.current_target().fbo, fb.current_texture(), fb.previous_texture());

        assert!(!fb.resize(&gpu, 8, 8));
        assert_eq!(gpu.texture_allocations(), allocations);
        assert_eq!(
            handles,
            (fb.current_target().fbo, fb.current_texture(), fb.previous_texture())
        );

        assert!(fb.resize(&gpu, 4, 2));
        assert_eq!(gpu.texture_allocations(), allocations + 2);
        assert_eq!(fb.size(), (4, 2));
        assert_eq!(gpu.texture_size(fb.previous_texture()), Some((4, 2)));
        fb.destroy(&gpu);
    }

    #[test]
    fn bind_sets_viewport_to_target() {
        let gpu = HeadlessGpu::new(100, 100);
        let fb = FeedbackSurface::new(&gpu, 32, 16).unwrap();
        fb.bind(&gpu);
        assert_eq!(gpu.bound_framebuffer(), Some(fb.current_target().fbo));
        assert_eq!(gpu.current_viewport(), [0, 0, 32, 16]);
        fb.destroy(&gpu);
    }

    #[test]
    fn clear_fills_both_targets() {
        let gpu = HeadlessGpu::new(2, 2);
        let fb = FeedbackSurface::new(&gpu, 2, 2).unwrap();
        fb.clear(&gpu, [1.0, 0.0, 0.0, 1.0]);
        for tex in [fb.current_texture(), fb.previous_texture()] {
            let data = gpu.texture_data(tex).unwrap();
            assert!(data.chunks(4).all(|px| px == [255, 0, 0, 255]));
        }
        assert_eq!(gpu.bound_framebuffer(), None);
        fb.destroy(&gpu);
    }

    #[test]
    fn destroy_releases_all() {
        let gpu = HeadlessGpu::new(2, 2);
        let fb = FeedbackSurface::new(&gpu, 2, 2).unwrap();
        fb.destroy(&gpu);
        assert_eq!(gpu.live_textures(), 0);
        assert_eq!(gpu.live_framebuffers(), 0);
        assert!(gpu.errors().is_empty());
    }
}
