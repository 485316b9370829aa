//! Playback of the mixed ring through the system's default audio device.

use crate::{
    constants::OUTPUT_CHANNELS,
    error::{Error, Result},
    ring::AudioCallback,
};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize,
    SampleRate,
    Stream,
    StreamConfig,
};
use tracing::{error, info};

/// A running output stream. Playback stops when this is dropped.
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
}

impl AudioOutput {
    /// Opens the default output device as stereo `f32` at `sample_rate`,
    /// feeding it from `callback`.
    pub fn open_default(callback: AudioCallback, sample_rate: u32) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Sink("no default output device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = StreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| callback.fill(data),
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Sink(e.to_string()))?;

        stream.play().map_err(|e| Error::Sink(e.to_string()))?;

        info!("Playing on {} at {}Hz.", device_name, sample_rate);

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl std::fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutput")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
