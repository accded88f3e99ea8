use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BoothError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the capture engine.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Camera or microphone access was refused. No hardware handle is held
    /// at this point, so the caller resets the capture screen and nothing
    /// needs to be undone.
    #[error("camera/microphone permission denied")]
    PermissionDenied,

    /// Stream acquisition failed at the requested resolution and the single
    /// reduced-resolution fallback also failed.
    #[error("failed to acquire camera stream: {details}")]
    Acquisition { details: String },

    /// A start request arrived while a session was already active.
    #[error("a capture session is already active")]
    SessionActive,

    #[error("device enumeration failed: {details}")]
    Enumeration { details: String },

    #[error("recorder error: {details}")]
    Recorder { details: String },
}

/// Errors raised by the blob store. Every operation runs in its own
/// transaction; failures carry the underlying database cause.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },

    #[error("storage transaction failed in {operation}: {source}")]
    Transaction {
        operation: &'static str,
        source: rusqlite::Error,
    },

    #[error("storage task cancelled in {operation}")]
    TaskCancelled { operation: &'static str },
}

/// Errors raised by the export engine.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("archive generation failed for {part_name}: {details}")]
    Archive { part_name: String, details: String },
}

pub type Result<T> = std::result::Result<T, BoothError>;
