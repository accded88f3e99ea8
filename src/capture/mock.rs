use super::host::{
    CameraHost, ContainerFormat, CropRect, DeviceSelector, MediaBlob, MediaStream, Recorder,
    StreamRequest, VideoDeviceInfo,
};
use crate::error::{CaptureError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// In-memory camera backend for tests and headless development.
///
/// Mirrors the quirks the engine has to handle: permission refusal,
/// per-resolution acquisition failures, and labels that only become
/// available after a first stream has been opened.
pub struct MockCameraHost {
    devices: Vec<VideoDeviceInfo>,
    deny_permission: bool,
    fail_enumeration: bool,
    hide_labels_until_open: bool,
    failing_resolutions: Vec<(u32, u32)>,
    failing_recorder: bool,
    container: ContainerFormat,
    shared: Arc<MockHostState>,
}

#[derive(Default)]
pub struct MockHostState {
    /// Every stream request the host has seen, in order
    pub requests: Mutex<Vec<StreamRequest>>,
    /// Streams opened and not yet stopped
    pub active_streams: AtomicUsize,
    pub streams_opened: AtomicUsize,
    /// Explicit `stop` calls only; release via `Drop` does not count
    pub streams_stopped: AtomicUsize,
    has_opened: AtomicBool,
}

impl MockCameraHost {
    pub fn new(devices: Vec<VideoDeviceInfo>) -> Self {
        Self {
            devices,
            deny_permission: false,
            fail_enumeration: false,
            hide_labels_until_open: false,
            failing_resolutions: Vec::new(),
            failing_recorder: false,
            container: ContainerFormat::Mp4,
            shared: Arc::new(MockHostState::default()),
        }
    }

    /// Single well-behaved front camera.
    pub fn single_front() -> Self {
        Self::new(vec![VideoDeviceInfo::new("cam0", "Front Camera")])
    }

    pub fn with_denied_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    pub fn with_failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Labels read as empty until the first stream has been opened,
    /// modelling enumeration before permission is granted.
    pub fn with_hidden_labels_until_open(mut self) -> Self {
        self.hide_labels_until_open = true;
        self
    }

    pub fn with_failing_resolution(mut self, resolution: (u32, u32)) -> Self {
        self.failing_resolutions.push(resolution);
        self
    }

    /// Recorders deliver data but fail at finalize.
    pub fn with_failing_recorder(mut self) -> Self {
        self.failing_recorder = true;
        self
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    pub fn state(&self) -> Arc<MockHostState> {
        Arc::clone(&self.shared)
    }
}

#[async_trait]
impl CameraHost for MockCameraHost {
    async fn enumerate_devices(&self) -> Result<Vec<VideoDeviceInfo>> {
        if self.fail_enumeration {
            return Err(CaptureError::Enumeration {
                details: "mock enumeration failure".to_string(),
            }
            .into());
        }

        let labels_hidden =
            self.hide_labels_until_open && !self.shared.has_opened.load(Ordering::SeqCst);

        Ok(self
            .devices
            .iter()
            .map(|d| {
                if labels_hidden {
                    VideoDeviceInfo::new(d.id.clone(), "")
                } else {
                    d.clone()
                }
            })
            .collect())
    }

    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn MediaStream>> {
        self.shared.requests.lock().push(request.clone());

        if self.deny_permission {
            return Err(CaptureError::PermissionDenied.into());
        }

        if self.failing_resolutions.contains(&request.resolution) {
            return Err(CaptureError::Acquisition {
                details: format!(
                    "mock cannot deliver {}x{}",
                    request.resolution.0, request.resolution.1
                ),
            }
            .into());
        }

        let device_id = match &request.device {
            DeviceSelector::Exact(id) => {
                if !self.devices.iter().any(|d| &d.id == id) {
                    return Err(CaptureError::Acquisition {
                        details: format!("no such device: {}", id),
                    }
                    .into());
                }
                id.clone()
            }
            // the platform default: whatever enumerates first
            DeviceSelector::FrontFacing => self
                .devices
                .first()
                .map(|d| d.id.clone())
                .ok_or(CaptureError::Acquisition {
                    details: "no video devices".to_string(),
                })?,
        };

        self.shared.has_opened.store(true, Ordering::SeqCst);
        self.shared.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.shared.active_streams.fetch_add(1, Ordering::SeqCst);

        debug!("Mock stream opened on {}", device_id);

        Ok(Box::new(MockMediaStream {
            device_id,
            resolution: request.resolution,
            container: self.container,
            failing_recorder: self.failing_recorder,
            crop: None,
            stopped: false,
            shared: Arc::clone(&self.shared),
        }))
    }
}

pub struct MockMediaStream {
    device_id: String,
    resolution: (u32, u32),
    container: ContainerFormat,
    failing_recorder: bool,
    crop: Option<CropRect>,
    stopped: bool,
    shared: Arc<MockHostState>,
}

impl MockMediaStream {
    pub fn applied_crop(&self) -> Option<CropRect> {
        self.crop
    }
}

#[async_trait]
impl MediaStream for MockMediaStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn supported_container(&self) -> ContainerFormat {
        self.container
    }

    async fn apply_crop(&mut self, rect: CropRect) -> bool {
        self.crop = Some(rect);
        true
    }

    async fn start_recorder(&mut self) -> Result<Box<dyn Recorder>> {
        Ok(Box::new(MockRecorder {
            container: self.container,
            resolution: self.resolution,
            fail: self.failing_recorder,
        }))
    }

    async fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.shared.active_streams.fetch_sub(1, Ordering::SeqCst);
            self.shared.streams_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockMediaStream {
    fn drop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.shared.active_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MockRecorder {
    container: ContainerFormat,
    resolution: (u32, u32),
    fail: bool,
}

#[async_trait]
impl Recorder for MockRecorder {
    async fn stop(&mut self) -> Result<MediaBlob> {
        if self.fail {
            return Err(CaptureError::Recorder {
                details: "mock recorder finalize failure".to_string(),
            }
            .into());
        }

        let data = format!(
            "mock-recording:{}x{}",
            self.resolution.0, self.resolution.1
        )
        .into_bytes();

        Ok(MediaBlob {
            data,
            media_type: self.container.mime().to_string(),
        })
    }
}
