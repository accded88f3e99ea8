//! Application orchestrator: builds every component, wires the event bus
//! dispatch loop, and owns startup, signal handling and graceful
//! shutdown.

use crate::admin::AdminSurface;
use crate::capture::{CameraHost, CaptureEngine};
use crate::config::BoothConfig;
use crate::error::{BoothError, Result};
use crate::events::{BoothEvent, EventBus};
use crate::export::ExportEngine;
use crate::i18n::I18n;
use crate::keyboard::KeyboardInputHandler;
use crate::session::SessionController;
use crate::settings::SettingsStore;
use crate::store::BlobStore;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_BUS_CAPACITY: usize = 256;

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

#[cfg(all(target_os = "linux", feature = "camera"))]
fn build_camera_host() -> Result<Arc<dyn CameraHost>> {
    Ok(Arc::new(crate::capture::GstCameraHost::new()?))
}

#[cfg(not(all(target_os = "linux", feature = "camera")))]
fn build_camera_host() -> Result<Arc<dyn CameraHost>> {
    warn!("No hardware camera backend compiled in, using the mock camera");
    Ok(Arc::new(crate::capture::MockCameraHost::single_front()))
}

/// Main application coordinator that manages all booth components.
pub struct BoothOrchestrator {
    config: BoothConfig,
    event_bus: Arc<EventBus>,
    controller: Arc<SessionController>,
    admin: Arc<AdminSurface>,
    export: Arc<ExportEngine>,
    i18n: Arc<I18n>,
    settings: SettingsStore,
    keyboard: KeyboardInputHandler,
    keyboard_enabled: bool,

    shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    cancellation_token: CancellationToken,
}

impl BoothOrchestrator {
    /// Create a new orchestrator with the given configuration.
    pub async fn new(config: BoothConfig) -> Result<Self> {
        let event_bus = Arc::new(EventBus::with_debug_logging(EVENT_BUS_CAPACITY));

        let store = BlobStore::open(&config.storage.data_dir).await?;
        let settings = SettingsStore::new(&config.storage.data_dir);

        let host = build_camera_host()?;
        let engine = Arc::new(CaptureEngine::new(
            host,
            config.capture.clone(),
            Arc::clone(&event_bus),
        ));

        let export = Arc::new(ExportEngine::new(
            store.clone(),
            &config.storage.export_dir,
            &config.storage.export_base_name,
            Arc::clone(&event_bus),
        ));

        let controller = Arc::new(SessionController::new(
            SettingsStore::new(&config.storage.data_dir),
            store.clone(),
            engine,
            Arc::clone(&event_bus),
            config.session.clone(),
        ));

        let admin = Arc::new(AdminSurface::new(
            SettingsStore::new(&config.storage.data_dir),
            store,
            Arc::clone(&export),
        ));

        let i18n = Arc::new(I18n::new(&config.storage.locales_dir));
        let keyboard = KeyboardInputHandler::new(Arc::clone(&event_bus));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            controller,
            admin,
            export,
            i18n,
            settings,
            keyboard,
            keyboard_enabled: true,
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn admin(&self) -> &Arc<AdminSurface> {
        &self.admin
    }

    pub fn i18n(&self) -> &Arc<I18n> {
        &self.i18n
    }

    /// Headless and test runs have no terminal to put in raw mode.
    pub fn disable_keyboard(&mut self) {
        self.keyboard_enabled = false;
    }

    /// Start all components and the event dispatch loop.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            "Starting photobooth (data: {}, exports: {})",
            self.config.storage.data_dir, self.config.storage.export_dir
        );

        let settings = self.settings.load().await;
        self.i18n.switch_to(&settings.language).await;

        if self.keyboard_enabled {
            self.keyboard.start().await?;
        }

        self.spawn_dispatch_loop();

        info!("Photobooth ready");
        Ok(())
    }

    /// Route control-surface intents to the components that serve them.
    fn spawn_dispatch_loop(&self) {
        let mut rx = self.event_bus.subscribe();
        let controller = Arc::clone(&self.controller);
        let export = Arc::clone(&self.export);
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Dispatch loop stopping");
                        break;
                    }
                    event = rx.recv() => match event {
                        Ok(BoothEvent::RecordRequested { .. }) => {
                            let controller = Arc::clone(&controller);
                            tokio::spawn(async move {
                                if let Err(e) = controller.start_record_flow().await {
                                    error!("Record flow failed: {}", e);
                                }
                            });
                        }
                        Ok(BoothEvent::StopRequested { .. }) => {
                            controller.stop_recording();
                        }
                        Ok(BoothEvent::ExportRequested { .. }) => {
                            let export = Arc::clone(&export);
                            tokio::spawn(async move {
                                // failures are already reported on the bus
                                if let Err(e) = export.export_all().await {
                                    warn!("Export did not complete: {}", e);
                                }
                            });
                        }
                        Ok(BoothEvent::ShutdownRequested { reason, .. }) => {
                            info!("Shutdown requested: {}", reason);
                            if let Some(sender) = shutdown_sender.lock().await.take() {
                                let _ = sender.send(ShutdownReason::UserRequest);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Dispatch loop lagged, skipped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    /// Run until a shutdown signal arrives, then shut down gracefully.
    pub async fn run(&mut self) -> Result<i32> {
        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| BoothError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers().await;

        let reason = shutdown_receiver.await.map_err(|_| BoothError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;
        info!("Shutdown initiated: {:?}", reason);

        let exit_code = self.shutdown().await?;
        info!("Photobooth shutdown complete");
        Ok(exit_code)
    }

    async fn setup_signal_handlers(&self) {
        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            let sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            if let Some(sender) = sender.lock().await.take() {
                                let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                            }
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        // SIGINT (Ctrl+C)
        let sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }

    /// Stop components in reverse dependency order.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Err(e) = self.keyboard.stop().await {
                error!("Error stopping keyboard handler: {}", e);
                exit_code = 1;
            }
        }

        // releases the camera if a recording was interrupted mid-session
        self.controller.engine().cleanup().await;

        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Screen;
    use std::time::SystemTime;

    fn test_config(dir: &std::path::Path) -> BoothConfig {
        let mut config = BoothConfig::default();
        config.storage.data_dir = dir.join("data").to_string_lossy().to_string();
        config.storage.export_dir = dir.join("exports").to_string_lossy().to_string();
        config.storage.locales_dir = dir.join("locales").to_string_lossy().to_string();
        config
    }

    async fn started_orchestrator(dir: &std::path::Path) -> BoothOrchestrator {
        let mut orchestrator = BoothOrchestrator::new(test_config(dir)).await.unwrap();
        orchestrator.disable_keyboard();
        orchestrator.start().await.unwrap();
        orchestrator
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_request_produces_a_stored_video() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = started_orchestrator(dir.path()).await;

        orchestrator
            .event_bus()
            .publish_lossy(BoothEvent::RecordRequested {
                timestamp: SystemTime::now(),
            });

        // let the flow start, then cut the recording short
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        orchestrator.controller().stop_recording();
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        let store = BlobStore::open(dir.path().join("data")).await.unwrap();
        assert_eq!(store.count_videos().await.unwrap(), 1);
        assert_eq!(orchestrator.controller().current_screen(), Screen::Main);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_event_ends_run_with_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = started_orchestrator(dir.path()).await;
        let bus = Arc::clone(orchestrator.event_bus());

        let runner = tokio::spawn(async move { orchestrator.run().await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        bus.publish_lossy(BoothEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "test".to_string(),
        });

        let exit_code = runner.await.unwrap().unwrap();
        assert_eq!(exit_code, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_request_writes_archives() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = started_orchestrator(dir.path()).await;

        let store = BlobStore::open(dir.path().join("data")).await.unwrap();
        store.save_video(vec![7u8; 64]).await.unwrap();

        let mut rx = orchestrator.event_bus().subscribe();
        orchestrator
            .event_bus()
            .publish_lossy(BoothEvent::ExportRequested {
                timestamp: SystemTime::now(),
            });

        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BoothEvent::ExportCompleted { .. }) {
                completed = true;
            }
        }
        assert!(completed);
        assert!(dir.path().join("exports").exists());
    }
}
