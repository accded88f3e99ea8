use crate::error::Result;
use async_trait::async_trait;

/// One enumerated video input device. The label is whatever the hardware
/// reports; it is empty when permission has not been granted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDeviceInfo {
    pub id: String,
    pub label: String,
}

impl VideoDeviceInfo {
    pub fn new<I: Into<String>, L: Into<String>>(id: I, label: L) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// How the stream should pick its device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// A specific device id resolved by the selection heuristic
    Exact(String),
    /// Generic front-facing hint; the platform picks
    FrontFacing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub device: DeviceSelector,
    pub resolution: (u32, u32),
    pub fps: u32,
}

/// Output container negotiated by capability probing. The recorder decides
/// this opaquely; callers only tag the finished blob with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    WebM,
}

impl ContainerFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::WebM => "video/webm;codecs=vp8,opus",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }
}

/// Center-crop region, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A finished recording: concatenated data tagged with the negotiated
/// media type.
#[derive(Debug, Clone)]
pub struct MediaBlob {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// Platform seam for camera/microphone hardware. The engine never touches
/// devices directly, so the whole state machine runs against a mock in
/// tests and against GStreamer on a real kiosk.
#[async_trait]
pub trait CameraHost: Send + Sync {
    /// Enumerate video input devices. Failures are treated by the engine
    /// as "labels unavailable" and are never surfaced to the end user.
    async fn enumerate_devices(&self) -> Result<Vec<VideoDeviceInfo>>;

    /// Open a live audio/video stream. Permission refusal maps to
    /// [`crate::error::CaptureError::PermissionDenied`].
    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn MediaStream>>;
}

/// An open hardware stream, exclusively owned by one capture session.
#[async_trait]
pub trait MediaStream: Send {
    fn device_id(&self) -> &str;

    /// Container the recorder will produce for this stream.
    fn supported_container(&self) -> ContainerFormat;

    /// Best-effort field-of-view correction; returns whether the backend
    /// honored the request.
    async fn apply_crop(&mut self, rect: CropRect) -> bool;

    async fn start_recorder(&mut self) -> Result<Box<dyn Recorder>>;

    /// Release all hardware tracks. Must be idempotent.
    async fn stop(&mut self);
}

/// An active recorder bound to one stream.
#[async_trait]
pub trait Recorder: Send {
    /// Finalize and return the finished blob.
    async fn stop(&mut self) -> Result<MediaBlob>;
}
