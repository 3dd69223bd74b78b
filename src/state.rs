//! Application state management

use std::sync::{Arc, Mutex};

/// Type alias for audio callback shared state references
pub type AudioStateRefs = (Arc<Mutex<f32>>, Arc<Mutex<bool>>);

/// Internal application state
pub struct AppState {
    pub device_name: String,
    pub raw_percentage: u8,
    pub windowed_percentage: u8,
    pub status: String,
    pub led_status: String,
}

impl AppState {
    /// Create a new application state with default values
    pub fn new(device_name: String, led_status: String) -> Self {
        Self {
            device_name: device_name.clone(),
            raw_percentage: 0,
            windowed_percentage: 0,
            status: format!("Metering {}... Press Ctrl+C or Escape to quit.", device_name),
            led_status,
        }
    }
}

/// Thread-safe shared state between the audio callback and the drive loop
pub struct SharedState {
    /// Latest instantaneous peak amplitude from the capture callback
    pub peak: Arc<Mutex<f32>>,
    /// Raised by the stream error callback; the drive loop treats it as fatal
    pub stream_failed: Arc<Mutex<bool>>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self {
            peak: Arc::new(Mutex::new(0.0)),
            stream_failed: Arc::new(Mutex::new(false)),
        }
    }

    /// Get clones of the shared state references for the audio callbacks
    pub fn audio_refs(&self) -> AudioStateRefs {
        (Arc::clone(&self.peak), Arc::clone(&self.stream_failed))
    }
}
