//! Single-row R8 textures carrying this frame's spectrum and waveform.

use shadepulse_core::EngineError;

use crate::gpu::{Gpu, TextureFilter, TextureFormat};

#[derive(Debug)]
struct Row<G: Gpu> {
    tex: G::Texture,
    len: usize,
}

impl<G: Gpu> Row<G> {
    fn create(gpu: &G, len: usize) -> Result<Self, EngineError> {
        let tex = gpu
            .create_texture()
            .map_err(|e| EngineError::GlCreate(format!("create_texture failed: {e}")))?;
        gpu.allocate_texture(tex, TextureFormat::R8, TextureFilter::Nearest, len.max(1) as i32, 1);
        Ok(Self { tex, len: len.max(1) })
    }

    /// Re-uploads into the same texture; storage is only reallocated when the length changes.
    fn upload(&mut self, gpu: &G, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if data.len() != self.len {
            gpu.allocate_texture(
                self.tex,
                TextureFormat::R8,
                TextureFilter::Nearest,
                data.len() as i32,
                1,
            );
            self.len = data.len();
        }
        gpu.upload_texture(self.tex, TextureFormat::R8, data.len() as i32, 1, data);
    }
}

/// Spectrum and waveform rows, created once and refreshed every frame.
#[derive(Debug)]
pub struct AudioTextures<G: Gpu> {
    spectrum: Row<G>,
    waveform: Row<G>,
}

impl<G: Gpu> AudioTextures<G> {
    pub fn new(gpu: &G, spectrum_len: usize, waveform_len: usize) -> Result<Self, EngineError> {
        let spectrum = Row::create(gpu, spectrum_len)?;
        let waveform = match Row::create(gpu, waveform_len) {
            Ok(w) => w,
            Err(e) => {
                gpu.delete_texture(spectrum.tex);
                return Err(e);
            }
        };
        Ok(Self { spectrum, waveform })
    }

    /// Uploads both rows. Empty buffers leave the previous contents in place.
    pub fn upload(&mut self, gpu: &G, spectrum: &[u8], waveform: &[u8]) {
        self.spectrum.upload(gpu, spectrum);
        self.waveform.upload(gpu, waveform);
    }

    pub fn spectrum_texture(&self) -> G::Texture {
        self.spectrum.tex
    }

    pub fn waveform_texture(&self) -> G::Texture {
        self.waveform.tex
    }

    pub fn destroy(self, gpu: &G) {
        gpu.delete_texture(self.spectrum.tex);
        gpu.delete_texture(self.waveform.tex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;

    #[test]
    fn uploads_reuse_textures() {
        let gpu = HeadlessGpu::new(1, 1);
        let mut at = AudioTextures::new(&gpu, 4, 8).unwrap();
        let allocations = gpu.texture_allocations();
        let spectrum = at.spectrum_texture();

        at.upload(&gpu, &[1, 2, 3, 4], &[128; 8]);
        at.upload(&gpu, &[9, 9, 9, 9], &[128; 8]);
        assert_eq!(gpu.texture_allocations(), allocations);
        assert_eq!(at.spectrum_texture(), spectrum);
        assert_eq!(gpu.texture_data(spectrum).unwrap(), vec![9, 9, 9, 9]);
        assert_eq!(gpu.texture_filter(spectrum), Some(TextureFilter::Nearest));
        assert!(gpu.errors().is_empty());
        at.destroy(&gpu);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn length_change_reallocates_and_empty_is_skipped() {
        let gpu = HeadlessGpu::new(1, 1);
        let mut at = AudioTextures::new(&gpu, 4, 4).unwrap();
        at.upload(&gpu, &[7; 6], &[]);
        assert_eq!(gpu.texture_size(at.spectrum_texture()), Some((6, 1)));
        assert_eq!(gpu.texture_size(at.waveform_texture()), Some((4, 1)));
        assert!(gpu.errors().is_empty());
        at.destroy(&gpu);
    }
}
