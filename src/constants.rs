//! Application constants and configuration values

/// Audio processing constants
pub mod audio {
    /// Buffer size for audio streams
    pub const BUFFER_SIZE: cpal::BufferSize = cpal::BufferSize::Default;
    /// Default number of recent samples in the LED normalizer window
    pub const DEFAULT_WINDOW_SAMPLES: usize = 32;
}

/// UI display constants
pub mod ui {
    /// Default drive loop tick interval in milliseconds
    pub const DEFAULT_TICK_MS: u64 = 40;
}

/// Meter frame geometry (fixed 32-column layout)
pub mod meter {
    /// Cells in the linear level bar
    pub const BAR_CELLS: usize = 26;
    /// Histogram rows, top row is the loudest band
    pub const HIST_ROWS: usize = 16;
    /// Histogram columns, one new column per tick, scrolling left
    pub const HIST_COLS: usize = 32;
    /// Width of the numeric volume readout field
    pub const VOLUME_DIGITS: usize = 3;
    /// Total frame width in cells
    pub const FRAME_COLS: usize = 32;
}

/// Loudness band breakpoints for the LED mapping
pub mod bands {
    /// Below this percentage no LEDs are lit
    pub const ONE_LED: u8 = 25;
    /// Below this percentage one LED is lit
    pub const TWO_LEDS: u8 = 50;
    /// Below this percentage two LEDs are lit; at or above, all three
    pub const THREE_LEDS: u8 = 75;
}
