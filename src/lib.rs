pub mod admin;
pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod i18n;
pub mod keyboard;
pub mod palette;
pub mod session;
pub mod settings;
pub mod store;

pub use admin::{AdminSurface, EventSettings, VideoSummary, EVENT_PHOTO_KEY};
pub use app::{BoothOrchestrator, ShutdownReason};
pub use capture::{
    CameraHost, CaptureEngine, CaptureState, ContainerFormat, CropRect, DeviceSelector, MediaBlob,
    MediaStream, MockCameraHost, PreviewInfo, Recorder, StreamRequest, VideoDeviceInfo,
};
pub use config::BoothConfig;
pub use error::{BoothError, CaptureError, ExportError, Result, StorageError};
pub use events::{BoothEvent, EventBus, Screen};
pub use export::{ExportEngine, MAX_ARCHIVE_BYTES};
pub use i18n::I18n;
pub use keyboard::KeyboardInputHandler;
pub use palette::extract_palette;
pub use session::{SessionController, TapDetector};
pub use settings::{Beep, BoothSettings, ButtonPosition, CustomColors, SettingsStore};
pub use store::{BlobStore, VideoRecord};

#[cfg(all(target_os = "linux", feature = "camera"))]
pub use capture::GstCameraHost;
