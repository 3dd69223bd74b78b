//! Audio device handling and stream processing

use crate::error::{AppError, AppResult};
use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::{Arc, Mutex};

/// Audio configuration and device information
pub struct AudioConfig {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Find and configure an audio input device
pub fn setup_audio_device(device_name: Option<String>) -> AppResult<(cpal::Device, AudioConfig)> {
    let host = cpal::default_host();

    // Get input device
    let device = if let Some(name) = device_name {
        host.input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AppError::AudioDevice("Specified device not found".to_string()))?
    } else {
        host.default_input_device()
            .ok_or_else(|| AppError::AudioDevice("No default input device available".to_string()))?
    };

    let device_name = device.name()?;

    // Get supported input configs and determine sample rate from device
    let mut supported_configs = device.supported_input_configs()?;
    let config_range = supported_configs
        .next()
        .ok_or_else(|| AppError::AudioDevice("No supported input configs found".to_string()))?;

    // Use the minimum sample rate as default, or a common rate if available
    let sample_rate = if config_range.min_sample_rate().0 <= 44100
        && config_range.max_sample_rate().0 >= 44100
    {
        44100 // Prefer 44.1kHz if supported
    } else {
        config_range.min_sample_rate().0 // Otherwise use minimum supported
    };

    let audio_config = AudioConfig {
        device_name,
        sample_rate,
        channels: config_range.channels(),
    };

    Ok((device, audio_config))
}

/// Build an audio input stream with the given callbacks
pub fn build_audio_stream<F, E>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    data_callback: F,
    error_callback: E,
) -> AppResult<cpal::Stream>
where
    F: FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let stream = device.build_input_stream(config, data_callback, error_callback, None)?;

    Ok(stream)
}

/// Peak capture callback: stores each buffer's absolute peak into the slot
pub fn create_peak_callback(
    peak: Arc<Mutex<f32>>,
) -> impl FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static {
    move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let max_sample = data.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        *peak.lock().unwrap() = max_sample;
    }
}

/// Stream error callback: losing the sample source ends the run
pub fn create_error_callback(
    stream_failed: Arc<Mutex<bool>>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err: cpal::StreamError| {
        eprintln!("Audio stream error: {}", err);
        *stream_failed.lock().unwrap() = true;
    }
}
