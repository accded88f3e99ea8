//! Kiosk session flow: screen transitions, the record sequence, and the
//! hidden admin entry.
//!
//! The controller is deliberately linear. A record request walks the
//! machine through permission check, countdown, recording, persistence
//! and confirmation, and every deviation drops back to the main screen.

use crate::capture::CaptureEngine;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::{BoothEvent, EventBus, Screen};
use crate::settings::SettingsStore;
use crate::store::BlobStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Recognizes the N-taps-in-a-window gesture that opens the admin entry.
///
/// Taps older than the window roll off; triggering resets the detector so
/// the next entry needs a fresh burst.
pub struct TapDetector {
    taps: Vec<Instant>,
    required: usize,
    window: Duration,
}

impl TapDetector {
    pub fn new(required: usize, window: Duration) -> Self {
        Self {
            taps: Vec::new(),
            required: required.max(1),
            window,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.secret_taps as usize,
            Duration::from_millis(config.secret_tap_window_ms),
        )
    }

    /// Register a tap; returns true when the gesture completes.
    pub fn register_tap(&mut self, at: Instant) -> bool {
        self.taps
            .retain(|t| at.saturating_duration_since(*t) <= self.window);
        self.taps.push(at);

        if self.taps.len() >= self.required {
            self.taps.clear();
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

pub struct SessionController {
    settings: SettingsStore,
    store: BlobStore,
    engine: Arc<CaptureEngine>,
    event_bus: Arc<EventBus>,
    config: SessionConfig,
    current_screen: Mutex<Screen>,
    flow_active: AtomicBool,
}

impl SessionController {
    pub fn new(
        settings: SettingsStore,
        store: BlobStore,
        engine: Arc<CaptureEngine>,
        event_bus: Arc<EventBus>,
        config: SessionConfig,
    ) -> Self {
        Self {
            settings,
            store,
            engine,
            event_bus,
            config,
            current_screen: Mutex::new(Screen::Main),
            flow_active: AtomicBool::new(false),
        }
    }

    pub fn current_screen(&self) -> Screen {
        *self.current_screen.lock()
    }

    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.engine
    }

    fn show_screen(&self, screen: Screen) {
        *self.current_screen.lock() = screen;
        debug!("Screen changed to {:?}", screen);
        self.event_bus.publish_lossy(BoothEvent::ScreenChanged {
            screen,
            timestamp: SystemTime::now(),
        });
    }

    /// Check an admin PIN attempt against the stored settings.
    pub async fn verify_pin(&self, input: &str) -> bool {
        let settings = self.settings.load().await;
        input == settings.pin
    }

    /// Open the admin surface when the PIN matches; stays on the current
    /// screen otherwise.
    pub async fn enter_setup(&self, pin: &str) -> bool {
        if self.verify_pin(pin).await {
            info!("Admin PIN accepted, entering setup");
            self.show_screen(Screen::Setup);
            true
        } else {
            warn!("Admin PIN rejected");
            false
        }
    }

    pub fn leave_setup(&self) {
        self.show_screen(Screen::Main);
    }

    /// Run one full record sequence: permission check, countdown,
    /// recording, persistence, confirmation, back to main.
    ///
    /// Capture failures reset to the main screen without surfacing an
    /// error to the caller; the failure is reported on the event bus.
    pub async fn start_record_flow(&self) -> Result<()> {
        // covers the whole sequence, countdown included; the engine's own
        // guard only latches once recording starts
        if self.flow_active.swap(true, Ordering::SeqCst) {
            warn!("Record request ignored, a session is already active");
            return Ok(());
        }

        let result = self.run_record_flow().await;
        self.flow_active.store(false, Ordering::SeqCst);
        result
    }

    async fn run_record_flow(&self) -> Result<()> {
        let settings = self.settings.load().await;

        // settle the permission prompt before the countdown commits
        if let Err(e) = self.engine.permission_probe().await {
            warn!("Camera unavailable: {}", e);
            self.event_bus.publish_lossy(BoothEvent::CaptureFailed {
                reason: e.to_string(),
            });
            self.show_screen(Screen::Main);
            return Ok(());
        }

        self.show_screen(Screen::Countdown);
        for remaining in (1..=settings.countdown_duration).rev() {
            self.event_bus
                .publish_lossy(BoothEvent::CountdownTick { remaining });
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        self.show_screen(Screen::Recording);
        match self.engine.record(settings.max_recording).await {
            Ok(blob) => match self.persist_recording(blob.data).await {
                Ok((id, filename)) => {
                    info!("Recording {} saved as {}", id, filename);
                    self.event_bus
                        .publish_lossy(BoothEvent::RecordingSaved { id, filename });

                    self.show_screen(Screen::Confirmation);
                    tokio::time::sleep(Duration::from_secs(
                        self.config.confirmation_seconds as u64,
                    ))
                    .await;
                    self.show_screen(Screen::Main);
                }
                Err(e) => {
                    warn!("Failed to persist recording: {}", e);
                    self.event_bus.publish_lossy(BoothEvent::CaptureFailed {
                        reason: e.to_string(),
                    });
                    self.show_screen(Screen::Main);
                }
            },
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.event_bus.publish_lossy(BoothEvent::CaptureFailed {
                    reason: e.to_string(),
                });
                self.show_screen(Screen::Main);
            }
        }

        Ok(())
    }

    async fn persist_recording(&self, data: Vec<u8>) -> Result<(i64, String)> {
        let id = self.store.save_video(data).await?;
        let filename = self
            .store
            .video(id)
            .await?
            .map(|v| v.filename)
            .unwrap_or_default();
        Ok((id, filename))
    }

    /// Stop the running recording, if any.
    pub fn stop_recording(&self) {
        self.engine.request_stop();
    }
}
