//! Live input from the platform's default capture device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use shadepulse_core::{AudioSettings, EngineError};

use crate::source::{AudioSource, SampleRing, StreamSource};

/// Default input device feeding a [`StreamSource`].
///
/// The cpal stream is kept alive for as long as this value; dropping it stops capture.
pub struct CaptureSource {
    _stream: cpal::Stream,
    inner: StreamSource,
    device_name: String,
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("device", &self.device_name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl CaptureSource {
    /// Opens and starts the default input device.
    ///
    /// Missing devices and unsupported formats are reported as [`EngineError::AudioUnavailable`].
    pub fn open(settings: &AudioSettings) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::AudioUnavailable("no default input device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| EngineError::AudioUnavailable(format!("default_input_config: {e}")))?;
        let sample_rate = supported.sample_rate().0 as f32;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.config();

        // A few transforms of slack so the render thread never reads a half-written window.
        let ring = SampleRing::new(settings.fft_size * 4);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, ring.clone()),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, ring.clone()),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, ring.clone()),
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, channels, ring.clone()),
            other => {
                return Err(EngineError::AudioUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }
        .map_err(|e| EngineError::AudioUnavailable(format!("build_input_stream: {e}")))?;

        stream
            .play()
            .map_err(|e| EngineError::AudioUnavailable(format!("stream play: {e}")))?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            "audio capture started"
        );

        Ok(Self {
            _stream: stream,
            inner: StreamSource::new(ring, sample_rate, settings),
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    ring: SampleRing,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            ring.push_interleaved(data, channels, <f32 as cpal::FromSample<T>>::from_sample_);
        },
        |err| tracing::warn!("audio input stream error: {err}"),
        None,
    )
}

impl AudioSource for CaptureSource {
    fn sample_rate(&self) -> f32 {
        self.inner.sample_rate()
    }

    fn fill_spectrum(&mut self, out: &mut [u8]) {
        self.inner.fill_spectrum(out)
    }

    fn fill_waveform(&mut self, out: &mut [u8]) {
        self.inner.fill_waveform(out)
    }
}
