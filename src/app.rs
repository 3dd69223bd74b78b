//! Main application logic and orchestration

use crate::audio;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::hardware::{self, UinputLeds};
use crate::leds::{LedSync, band_targets};
use crate::meter::MeterFrame;
use crate::normalizer::LevelWindow;
use crate::state::{AppState, SharedState};
use crate::ui;
use cpal::traits::StreamTrait;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::time::Duration;

/// Main application struct
pub struct App {
    config: Config,
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

/// Exit codes for the application
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    UserExit = 1, // User pressed Escape or Ctrl+C
    Error = 2,    // Actual application error
}

/// Result type that includes user exit information
pub type AppRunResult = Result<(), AppError>;

/// Extended result that tracks exit reason
pub struct RunResult {
    pub result: AppRunResult,
    pub exit_code: ExitCode,
}

impl App {
    /// Initialize the application with configuration
    pub fn new_with_config(config: Config) -> AppResult<Self> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(App { config, terminal })
    }

    /// Start the LED subsystem. A failure here disables LED output for the
    /// run but leaves the meter untouched.
    fn start_led_sync(&self) -> (Option<LedSync<UinputLeds>>, String) {
        if !self.config.leds_enabled {
            return (None, "LED sync disabled.".to_string());
        }

        let stack = hardware::open_stack()
            .and_then(|(controller, source)| LedSync::start(controller, source));
        match stack {
            Ok(sync) => (Some(sync), "LED sync active.".to_string()),
            Err(e) => (None, format!("LED sync unavailable: {}", e)),
        }
    }

    /// Run the main drive loop
    pub async fn run(mut self) -> RunResult {
        // Setup audio
        let (device, audio_config) =
            match audio::setup_audio_device(self.config.device_name.clone()) {
                Ok(result) => result,
                Err(e) => {
                    return RunResult {
                        result: Err(e),
                        exit_code: ExitCode::Error,
                    };
                }
            };
        let device_name = audio_config.device_name;

        // Create shared state
        let shared_state = SharedState::new();
        let (peak, stream_failed) = shared_state.audio_refs();

        let config = cpal::StreamConfig {
            channels: audio_config.channels,
            sample_rate: cpal::SampleRate(audio_config.sample_rate),
            buffer_size: crate::constants::audio::BUFFER_SIZE,
        };

        let stream = match audio::build_audio_stream(
            &device,
            &config,
            audio::create_peak_callback(peak),
            audio::create_error_callback(stream_failed),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                return RunResult {
                    result: Err(e),
                    exit_code: ExitCode::Error,
                };
            }
        };

        if let Err(e) = stream.play() {
            return RunResult {
                result: Err(e.into()),
                exit_code: ExitCode::Error,
            };
        }

        // LED subsystem, isolated from the meter
        let (mut led_sync, led_status) = self.start_led_sync();

        let mut app_state = AppState::new(device_name, led_status);
        let mut frame = MeterFrame::new();
        let mut window = LevelWindow::new(self.config.window_samples);

        // Main drive loop, fixed cadence
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        let mut exit_reason = ExitCode::Success;
        let mut fatal: Option<AppError> = None;

        loop {
            // Losing the sample source is fatal; everything downstream is not
            if *shared_state.stream_failed.lock().unwrap() {
                fatal = Some(AppError::AudioStream(
                    "capture stream reported an error".to_string(),
                ));
                exit_reason = ExitCode::Error;
                break;
            }

            // Display path: raw instantaneous percentage, no smoothing
            let peak_value = *shared_state.peak.lock().unwrap();
            let percentage = (peak_value.clamp(0.0, 1.0) * 100.0) as u8;
            app_state.raw_percentage = percentage;
            frame.update(percentage);

            // Best-effort flush; a failed draw is simply overwritten next tick
            let _ = self.terminal.draw(|f| {
                let ui_state = ui::UiState {
                    device_name: app_state.device_name.clone(),
                    raw_percentage: app_state.raw_percentage,
                    windowed_percentage: app_state.windowed_percentage,
                    status: app_state.status.clone(),
                    led_status: app_state.led_status.clone(),
                };
                ui::render_ui(f, &ui_state, &frame);
            });

            // LED path: windowed relative percentage
            let windowed = window.add_sample(percentage as u32);
            app_state.windowed_percentage = windowed;

            if let Some(sync) = led_sync.as_mut() {
                let (num_lock, caps_lock, scroll_lock) = band_targets(windowed);
                // No retry; belief keeps the correction pending for later ticks
                let _ = sync.set_desired(num_lock, caps_lock, scroll_lock);
            }

            // Check for keyboard events and signals
            let mut should_exit = false;

            // Check for Ctrl+C signal
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    should_exit = true;
                    exit_reason = ExitCode::UserExit;
                }
                _ = tokio::time::sleep(Duration::from_millis(1)) => {
                    // Timeout - check for keyboard events
                }
            }

            // Check for keyboard events (Escape to quit)
            if !should_exit
                && crossterm::event::poll(Duration::from_millis(0)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = crossterm::event::read()
            {
                match key_event.code {
                    KeyCode::Esc => {
                        should_exit = true;
                        exit_reason = ExitCode::UserExit;
                    }
                    KeyCode::Char('c')
                        if key_event
                            .modifiers
                            .contains(crossterm::event::KeyModifiers::CONTROL) =>
                    {
                        should_exit = true;
                        exit_reason = ExitCode::UserExit;
                    }
                    _ => {}
                }
            }

            if should_exit {
                break;
            }

            // Wait for next interval
            interval.tick().await;
        }

        // Cleanup - ensure graceful exit
        drop(stream);
        let _ = self.cleanup(); // Ignore cleanup errors

        RunResult {
            result: match fatal {
                Some(e) => Err(e),
                None => Ok(()),
            },
            exit_code: exit_reason,
        }
    }

    /// Clean up terminal state
    fn cleanup(mut self) -> AppResult<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}
