use crate::error::Result;
use crate::events::{BoothEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard control surface for kiosks without a touch shell.
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input.
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard controls: SPACE/r record, s stop, e export, q quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        // raw mode needs its own blocking thread
        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled, keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            match key_event.code {
                                KeyCode::Char(' ') | KeyCode::Char('r') => {
                                    info!("Record key pressed");
                                    event_bus.publish_lossy(BoothEvent::RecordRequested {
                                        timestamp: SystemTime::now(),
                                    });
                                }
                                KeyCode::Char('s') => {
                                    info!("Stop key pressed");
                                    event_bus.publish_lossy(BoothEvent::StopRequested {
                                        timestamp: SystemTime::now(),
                                    });
                                }
                                KeyCode::Char('e') => {
                                    info!("Export key pressed");
                                    event_bus.publish_lossy(BoothEvent::ExportRequested {
                                        timestamp: SystemTime::now(),
                                    });
                                }
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    info!("Quit key pressed, requesting shutdown");
                                    event_bus.publish_lossy(BoothEvent::ShutdownRequested {
                                        timestamp: SystemTime::now(),
                                        reason: "User requested via keyboard".to_string(),
                                    });
                                    break;
                                }
                                _ => {
                                    debug!("Key pressed: {:?}", key_event.code);
                                }
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(())
    }

    /// Stop the keyboard input handler.
    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        // give the task a moment to exit and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
