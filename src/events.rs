use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Screens the presentation layer can show. The core only announces the
/// transition; rendering is the presenter's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Screen {
    Main,
    Countdown,
    Recording,
    Confirmation,
    Setup,
}

/// Events that can occur in the booth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BoothEvent {
    /// The session controller switched screens
    ScreenChanged {
        screen: Screen,
        timestamp: SystemTime,
    },
    /// Pre-recording countdown tick
    CountdownTick { remaining: u32 },
    /// One-second recording tick; `countdown_visible` flips on when the
    /// remaining time crosses the visibility threshold
    RecordingTick {
        elapsed: u32,
        remaining: u32,
        countdown_visible: bool,
    },
    /// Fires exactly once, at the urgent-warning threshold; the presenter
    /// plays the audible cue if the beep setting allows it
    RecordingUrgent { remaining: u32 },
    /// A finished recording was persisted
    RecordingSaved { id: i64, filename: String },
    /// A capture attempt failed; the capture screen should reset
    CaptureFailed { reason: String },
    /// Export started; reported before any packaging begins
    ExportStarted { video_count: usize, total_bytes: u64 },
    /// One archive part was written
    ExportPartReady {
        part: usize,
        total_parts: usize,
        path: PathBuf,
    },
    ExportCompleted { parts: usize },
    ExportFailed { error: String },
    /// Control-surface intents (keyboard, touch shell)
    RecordRequested { timestamp: SystemTime },
    StopRequested { timestamp: SystemTime },
    ExportRequested { timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl BoothEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            BoothEvent::ScreenChanged { screen, .. } => {
                format!("Screen changed to {:?}", screen)
            }
            BoothEvent::CountdownTick { remaining } => {
                format!("Countdown: {}", remaining)
            }
            BoothEvent::RecordingTick {
                elapsed, remaining, ..
            } => {
                format!("Recording {}s elapsed, {}s remaining", elapsed, remaining)
            }
            BoothEvent::RecordingUrgent { remaining } => {
                format!("Recording ends in {}s", remaining)
            }
            BoothEvent::RecordingSaved { id, filename } => {
                format!("Recording saved: {} (id {})", filename, id)
            }
            BoothEvent::CaptureFailed { reason } => {
                format!("Capture failed: {}", reason)
            }
            BoothEvent::ExportStarted {
                video_count,
                total_bytes,
            } => {
                format!(
                    "Export started: {} videos, {:.1} MiB total",
                    video_count,
                    *total_bytes as f64 / (1024.0 * 1024.0)
                )
            }
            BoothEvent::ExportPartReady {
                part,
                total_parts,
                path,
            } => {
                format!("Archive part {}/{} ready: {}", part, total_parts, path.display())
            }
            BoothEvent::ExportCompleted { parts } => {
                format!("Export completed: {} part(s)", parts)
            }
            BoothEvent::ExportFailed { error } => {
                format!("Export failed: {}", error)
            }
            BoothEvent::RecordRequested { .. } => "Record requested".to_string(),
            BoothEvent::StopRequested { .. } => "Stop requested".to_string(),
            BoothEvent::ExportRequested { .. } => "Export requested".to_string(),
            BoothEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            BoothEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BoothEvent::ScreenChanged { .. } => "screen_changed",
            BoothEvent::CountdownTick { .. } => "countdown_tick",
            BoothEvent::RecordingTick { .. } => "recording_tick",
            BoothEvent::RecordingUrgent { .. } => "recording_urgent",
            BoothEvent::RecordingSaved { .. } => "recording_saved",
            BoothEvent::CaptureFailed { .. } => "capture_failed",
            BoothEvent::ExportStarted { .. } => "export_started",
            BoothEvent::ExportPartReady { .. } => "export_part_ready",
            BoothEvent::ExportCompleted { .. } => "export_completed",
            BoothEvent::ExportFailed { .. } => "export_failed",
            BoothEvent::RecordRequested { .. } => "record_requested",
            BoothEvent::StopRequested { .. } => "stop_requested",
            BoothEvent::ExportRequested { .. } => "export_requested",
            BoothEvent::SystemError { .. } => "system_error",
            BoothEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Wall-clock time the event carries, for variants that record one.
    pub fn timestamp(&self) -> Option<SystemTime> {
        match self {
            BoothEvent::ScreenChanged { timestamp, .. }
            | BoothEvent::RecordRequested { timestamp }
            | BoothEvent::StopRequested { timestamp }
            | BoothEvent::ExportRequested { timestamp }
            | BoothEvent::ShutdownRequested { timestamp, .. } => Some(*timestamp),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("failed to publish event: {details}")]
    PublishFailed { details: String },
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<BoothEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BoothEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BoothEvent) -> Result<usize, EventBusError> {
        match &event {
            BoothEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            BoothEvent::CaptureFailed { reason } => {
                warn!("Capture failed: {}", reason);
            }
            BoothEvent::RecordingSaved { id, filename } => {
                info!("Recording saved: {} (id {})", filename, id);
            }
            BoothEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, ignoring the no-subscriber case. Components that emit
    /// progress ticks use this so a headless run does not error.
    pub fn publish_lossy(&self, event: BoothEvent) {
        let _ = self.publish(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(BoothEvent::CountdownTick { remaining: 3 })
            .unwrap();

        match rx.recv().await.unwrap() {
            BoothEvent::CountdownTick { remaining } => assert_eq!(remaining, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_lossy_safe() {
        let bus = EventBus::new(4);
        assert!(bus
            .publish(BoothEvent::CountdownTick { remaining: 1 })
            .is_err());
        // lossy variant swallows the error
        bus.publish_lossy(BoothEvent::CountdownTick { remaining: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_type_names() {
        let e = BoothEvent::RecordingUrgent { remaining: 10 };
        assert_eq!(e.event_type(), "recording_urgent");
        assert!(e.description().contains("10"));
        assert!(e.timestamp().is_none());

        let e = BoothEvent::RecordRequested {
            timestamp: SystemTime::now(),
        };
        assert!(e.timestamp().is_some());
    }
}
