use super::host::{
    CameraHost, CropRect, DeviceSelector, MediaBlob, MediaStream, Recorder, StreamRequest,
};
use super::selection::select_front_device;
use crate::config::CaptureConfig;
use crate::error::{BoothError, CaptureError, Result};
use crate::events::{BoothEvent, EventBus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Acquiring,
    Previewing,
    Recording,
    Stopping,
}

/// What the presenter needs to render the live preview. Front sensor, so
/// the preview must be horizontally mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewInfo {
    pub device_id: String,
    pub resolution: (u32, u32),
    pub mirrored: bool,
}

struct ActiveSession {
    id: Uuid,
    stream: Box<dyn MediaStream>,
    recorder: Option<Box<dyn Recorder>>,
}

struct Acquired {
    stream: Box<dyn MediaStream>,
    used_hint: bool,
    resolution: (u32, u32),
}

/// Camera capture engine: resolves the front device, acquires a stream
/// with one reduced-resolution fallback, records into a single finished
/// blob, and guarantees termination within the configured ceiling.
///
/// Exactly one session may be active at a time; teardown is idempotent
/// and runs on every exit path.
pub struct CaptureEngine {
    host: Arc<dyn CameraHost>,
    config: CaptureConfig,
    event_bus: Arc<EventBus>,
    /// Device id resolved by the selection heuristic, cached for the
    /// process lifetime to avoid re-enumerating on every recording
    cached_device: Mutex<Option<String>>,
    state: Mutex<CaptureState>,
    active: AtomicBool,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    stop_token: Mutex<Option<CancellationToken>>,
    preview: Mutex<Option<PreviewInfo>>,
}

impl CaptureEngine {
    pub fn new(host: Arc<dyn CameraHost>, config: CaptureConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            host,
            config,
            event_bus,
            cached_device: Mutex::new(None),
            state: Mutex::new(CaptureState::Idle),
            active: AtomicBool::new(false),
            session: tokio::sync::Mutex::new(None),
            stop_token: Mutex::new(None),
            preview: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Preview surface details while a session is live.
    pub fn preview(&self) -> Option<PreviewInfo> {
        self.preview.lock().clone()
    }

    fn set_state(&self, state: CaptureState) {
        *self.state.lock() = state;
    }

    /// Open and immediately release a stream so the permission prompt is
    /// settled before the countdown starts. Refusal propagates as
    /// [`CaptureError::PermissionDenied`].
    pub async fn permission_probe(&self) -> Result<()> {
        let request = StreamRequest {
            device: DeviceSelector::FrontFacing,
            resolution: self.config.fallback_resolution,
            fps: self.config.fps,
        };
        let mut stream = self.host.open_stream(request).await?;
        stream.stop().await;
        Ok(())
    }

    /// Run one full capture session and return the finished blob.
    ///
    /// Terminates on an explicit [`request_stop`](Self::request_stop) or,
    /// as a hard backstop, when `ceiling_secs` of recording have elapsed.
    pub async fn record(&self, ceiling_secs: u32) -> Result<MediaBlob> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::SessionActive.into());
        }

        let token = CancellationToken::new();
        *self.stop_token.lock() = Some(token.clone());

        let result = self.run_session(ceiling_secs, token).await;

        // converges every exit path onto the same idempotent teardown
        self.cleanup().await;
        self.active.store(false, Ordering::SeqCst);
        self.set_state(CaptureState::Idle);

        result
    }

    /// Request an explicit stop of the running session. A no-op when no
    /// session is active.
    pub fn request_stop(&self) {
        if let Some(token) = self.stop_token.lock().as_ref() {
            token.cancel();
        }
    }

    async fn run_session(&self, ceiling_secs: u32, token: CancellationToken) -> Result<MediaBlob> {
        let session_id = Uuid::new_v4();
        info!(
            "Capture session {} starting (ceiling {}s)",
            session_id, ceiling_secs
        );

        self.set_state(CaptureState::Acquiring);
        let acquired = self.acquire().await?;
        let resolution = acquired.resolution;
        let mut stream = acquired.stream;

        // Labels become available once a stream is open; a generic-hint
        // choice can now be corrected without the user restarting.
        if acquired.used_hint {
            stream = self.upgrade_device(stream, resolution).await?;
        }

        if self.config.crop_enabled && self.config.zoom_factor > 1.0 {
            let rect = center_crop_rect(resolution.0, resolution.1, self.config.zoom_factor);
            if stream.apply_crop(rect).await {
                debug!(
                    "Applied {}x crop: {}x{} at ({}, {})",
                    self.config.zoom_factor, rect.width, rect.height, rect.x, rect.y
                );
            } else {
                debug!("Backend ignored crop request, recording full field of view");
            }
        }

        self.set_state(CaptureState::Previewing);
        *self.preview.lock() = Some(PreviewInfo {
            device_id: stream.device_id().to_string(),
            resolution,
            mirrored: true,
        });

        let recorder = stream.start_recorder().await?;
        {
            let mut slot = self.session.lock().await;
            *slot = Some(ActiveSession {
                id: session_id,
                stream,
                recorder: Some(recorder),
            });
        }

        self.set_state(CaptureState::Recording);
        let mut elapsed = 0u32;
        let mut interval = time::interval(Duration::from_secs(1));
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    elapsed += 1;
                    let remaining = ceiling_secs.saturating_sub(elapsed);
                    self.event_bus.publish_lossy(BoothEvent::RecordingTick {
                        elapsed,
                        remaining,
                        countdown_visible: remaining <= self.config.countdown_visible_seconds,
                    });
                    if remaining == self.config.urgent_warning_seconds {
                        self.event_bus.publish_lossy(BoothEvent::RecordingUrgent { remaining });
                    }
                    if remaining == 0 {
                        info!("Recording ceiling reached at {}s, forcing stop", elapsed);
                        break;
                    }
                }
                _ = token.cancelled() => {
                    debug!("Recording stop requested at {}s", elapsed);
                    break;
                }
            }
        }

        self.set_state(CaptureState::Stopping);
        self.finish().await
    }

    /// Finalize the recorder into the finished blob and release the stream.
    async fn finish(&self) -> Result<MediaBlob> {
        let session = {
            let mut slot = self.session.lock().await;
            slot.take()
        };

        let Some(mut session) = session else {
            return Err(CaptureError::Recorder {
                details: "session was torn down before finalize".to_string(),
            }
            .into());
        };

        let Some(mut recorder) = session.recorder.take() else {
            session.stream.stop().await;
            *self.preview.lock() = None;
            return Err(CaptureError::Recorder {
                details: "recorder already finalized".to_string(),
            }
            .into());
        };

        // the stream is released on both outcomes; the session already left
        // the slot, so cleanup() cannot reach it
        let blob = match recorder.stop().await {
            Ok(blob) => blob,
            Err(e) => {
                session.stream.stop().await;
                *self.preview.lock() = None;
                return Err(e);
            }
        };
        session.stream.stop().await;
        *self.preview.lock() = None;

        info!(
            "Capture session {} produced {} bytes ({})",
            session.id,
            blob.data.len(),
            blob.media_type
        );
        Ok(blob)
    }

    /// Release everything a session may still hold: hardware tracks,
    /// recorder, duration timer, preview surface. Safe to invoke twice.
    pub async fn cleanup(&self) {
        let token = self.stop_token.lock().clone();
        if let Some(token) = token {
            token.cancel();
        }

        let session = {
            let mut slot = self.session.lock().await;
            slot.take()
        };

        if let Some(mut session) = session {
            if let Some(mut recorder) = session.recorder.take() {
                let _ = recorder.stop().await;
            }
            session.stream.stop().await;
            debug!("Capture session {} torn down", session.id);
        }

        *self.preview.lock() = None;
    }

    /// Resolve the device to record with via the label heuristic; `None`
    /// means labels gave nothing to go on and the generic hint is used.
    async fn resolve_device(&self) -> Option<String> {
        if let Some(id) = self.cached_device.lock().clone() {
            return Some(id);
        }

        let devices = match self.host.enumerate_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                // non-fatal: fall back to the generic front-facing hint
                warn!("Device enumeration failed ({}), using front-facing hint", e);
                return None;
            }
        };

        let selected = select_front_device(&devices);
        if let Some(id) = &selected {
            *self.cached_device.lock() = Some(id.clone());
        }
        selected
    }

    /// Acquire a stream at the ideal resolution, retrying once at the
    /// fallback resolution with the device constraint relaxed back to the
    /// generic hint. Only fallback failure is fatal.
    async fn acquire(&self) -> Result<Acquired> {
        let selector = match self.resolve_device().await {
            Some(id) => DeviceSelector::Exact(id),
            None => DeviceSelector::FrontFacing,
        };
        let used_hint = selector == DeviceSelector::FrontFacing;

        let ideal = StreamRequest {
            device: selector,
            resolution: self.config.ideal_resolution,
            fps: self.config.fps,
        };

        match self.host.open_stream(ideal).await {
            Ok(stream) => Ok(Acquired {
                stream,
                used_hint,
                resolution: self.config.ideal_resolution,
            }),
            Err(BoothError::Capture(CaptureError::PermissionDenied)) => {
                Err(CaptureError::PermissionDenied.into())
            }
            Err(e) => {
                warn!(
                    "Acquisition failed at {}x{} ({}), retrying at {}x{}",
                    self.config.ideal_resolution.0,
                    self.config.ideal_resolution.1,
                    e,
                    self.config.fallback_resolution.0,
                    self.config.fallback_resolution.1
                );

                let fallback = StreamRequest {
                    device: DeviceSelector::FrontFacing,
                    resolution: self.config.fallback_resolution,
                    fps: self.config.fps,
                };

                match self.host.open_stream(fallback).await {
                    Ok(stream) => Ok(Acquired {
                        stream,
                        used_hint: true,
                        resolution: self.config.fallback_resolution,
                    }),
                    Err(BoothError::Capture(CaptureError::PermissionDenied)) => {
                        Err(CaptureError::PermissionDenied.into())
                    }
                    Err(e) => Err(CaptureError::Acquisition {
                        details: e.to_string(),
                    }
                    .into()),
                }
            }
        }
    }

    /// After a generic-hint open, reopen on the heuristically better
    /// device when one can now be identified and differs from the one in
    /// use.
    async fn upgrade_device(
        &self,
        mut stream: Box<dyn MediaStream>,
        resolution: (u32, u32),
    ) -> Result<Box<dyn MediaStream>> {
        let Some(better) = self.resolve_device().await else {
            return Ok(stream);
        };
        if better == stream.device_id() {
            return Ok(stream);
        }

        info!(
            "Front device '{}' identified after open, replacing '{}'",
            better,
            stream.device_id()
        );
        stream.stop().await;

        let request = StreamRequest {
            device: DeviceSelector::Exact(better),
            resolution,
            fps: self.config.fps,
        };
        match self.host.open_stream(request).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                warn!(
                    "Reopen on selected device failed ({}), reverting to hint",
                    e
                );
                let hint = StreamRequest {
                    device: DeviceSelector::FrontFacing,
                    resolution,
                    fps: self.config.fps,
                };
                self.host.open_stream(hint).await.map_err(|e| {
                    BoothError::from(CaptureError::Acquisition {
                        details: e.to_string(),
                    })
                })
            }
        }
    }
}

/// Centered crop region for a zoom factor, countering wide-angle
/// distortion by trading edge pixels for natural framing.
pub fn center_crop_rect(width: u32, height: u32, zoom: f64) -> CropRect {
    let crop_w = ((width as f64 / zoom).round() as u32).clamp(1, width);
    let crop_h = ((height as f64 / zoom).round() as u32).clamp(1, height);
    CropRect {
        x: (width - crop_w) / 2,
        y: (height - crop_h) / 2,
        width: crop_w,
        height: crop_h,
    }
}

#[cfg(test)]
mod crop_tests {
    use super::*;

    #[test]
    fn test_center_crop_at_1_5x() {
        let rect = center_crop_rect(1920, 1080, 1.5);
        assert_eq!(rect.width, 1280);
        assert_eq!(rect.height, 720);
        assert_eq!(rect.x, 320);
        assert_eq!(rect.y, 180);
    }

    #[test]
    fn test_center_crop_identity_at_1x() {
        let rect = center_crop_rect(1280, 720, 1.0);
        assert_eq!((rect.x, rect.y), (0, 0));
        assert_eq!((rect.width, rect.height), (1280, 720));
    }
}
