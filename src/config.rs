//! Configuration parsing and validation

use clap::{Parser, Subcommand};

/// Command line arguments for the vusync application
#[derive(Parser)]
#[command(name = "vusync")]
#[command(about = "Terminal VU meter with keyboard LED loudness indicators")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render the meter and mirror loudness onto the lock LEDs
    Run(RunArgs),
    /// List available audio input devices
    List(ListArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Audio input device name (optional, uses default if not specified)
    #[arg(long)]
    pub device: Option<String>,

    /// Drive loop tick interval in milliseconds
    #[arg(long, default_value_t = crate::constants::ui::DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Number of recent samples in the LED normalizer window
    #[arg(long, default_value_t = crate::constants::audio::DEFAULT_WINDOW_SAMPLES)]
    pub window: usize,

    /// Disable keyboard LED synchronization (meter only)
    #[arg(long)]
    pub no_leds: bool,
}

#[derive(Parser)]
pub struct ListArgs {}

/// Application configuration derived from command line arguments
pub struct Config {
    pub device_name: Option<String>,
    pub tick_ms: u64,
    pub window_samples: usize,
    pub leds_enabled: bool,
}

impl Config {
    /// Create configuration from run arguments
    pub fn from_run_args(run_args: RunArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Validate tick interval range
        if run_args.tick_ms == 0 || run_args.tick_ms > 1000 {
            return Err(format!(
                "Tick interval must be between 1 and 1000 ms, got {}",
                run_args.tick_ms
            )
            .into());
        }

        // Validate window size range
        if run_args.window < 2 || run_args.window > 4096 {
            return Err(format!(
                "Window size must be between 2 and 4096 samples, got {}",
                run_args.window
            )
            .into());
        }

        Ok(Config {
            device_name: run_args.device,
            tick_ms: run_args.tick_ms,
            window_samples: run_args.window,
            leds_enabled: !run_args.no_leds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_valid_args() {
        let config = Config::from_run_args(RunArgs {
            device: Some("test_device".to_string()),
            tick_ms: 40,
            window: 32,
            no_leds: false,
        })
        .unwrap();

        assert_eq!(config.device_name, Some("test_device".to_string()));
        assert_eq!(config.tick_ms, 40);
        assert_eq!(config.window_samples, 32);
        assert!(config.leds_enabled);
    }

    #[test]
    fn test_no_leds_disables_sync() {
        let config = Config::from_run_args(RunArgs {
            device: None,
            tick_ms: 40,
            window: 32,
            no_leds: true,
        })
        .unwrap();

        assert!(!config.leds_enabled);
    }

    #[test]
    fn test_out_of_range_args_are_rejected() {
        assert!(
            Config::from_run_args(RunArgs {
                device: None,
                tick_ms: 0,
                window: 32,
                no_leds: false,
            })
            .is_err()
        );

        assert!(
            Config::from_run_args(RunArgs {
                device: None,
                tick_ms: 40,
                window: 1,
                no_leds: false,
            })
            .is_err()
        );
    }
}
