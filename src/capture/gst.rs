//! GStreamer camera backend for kiosk deployments.
//!
//! Builds a v4l2 capture pipeline with an audio branch and muxes into the
//! best container encoders available on the box. The appsink accumulates
//! the muxed byte stream so the recorder can hand back one finished blob.

use super::host::{
    CameraHost, ContainerFormat, CropRect, DeviceSelector, MediaBlob, MediaStream, Recorder,
    StreamRequest, VideoDeviceInfo,
};
use crate::error::{CaptureError, Result};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct GstCameraHost {
    container: ContainerFormat,
}

impl GstCameraHost {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| CaptureError::Acquisition {
            details: format!("failed to initialize GStreamer: {}", e),
        })?;

        // mux into mp4 when the encoders for it exist, webm otherwise
        let have_mp4 = gstreamer::ElementFactory::find("mp4mux").is_some()
            && gstreamer::ElementFactory::find("x264enc").is_some();
        let container = if have_mp4 {
            ContainerFormat::Mp4
        } else {
            ContainerFormat::WebM
        };
        info!("GStreamer camera host ready, recording {}", container.mime());

        Ok(Self { container })
    }

    fn pipeline_description(&self, device: &str, request: &StreamRequest) -> String {
        let (width, height) = request.resolution;
        let fps = request.fps;

        let (video_enc, mux) = match self.container {
            ContainerFormat::Mp4 => (
                "x264enc tune=zerolatency",
                "mp4mux name=mux fragment-duration=1000",
            ),
            ContainerFormat::WebM => ("vp8enc deadline=1", "webmmux name=mux streamable=true"),
        };
        let audio_enc = match self.container {
            ContainerFormat::Mp4 => "voaacenc",
            ContainerFormat::WebM => "opusenc",
        };

        format!(
            "v4l2src device={} do-timestamp=true ! \
             video/x-raw,width={},height={},framerate={}/1 ! \
             videoconvert ! {} ! queue ! mux. \
             autoaudiosrc ! audioconvert ! {} ! queue ! mux. \
             {} ! appsink name=sink sync=false",
            device, width, height, fps, video_enc, audio_enc, mux
        )
    }
}

fn acquisition_error(details: String) -> CaptureError {
    // v4l2 reports refusal as EACCES on the device node
    if details.contains("Permission denied") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Acquisition { details }
    }
}

#[async_trait]
impl CameraHost for GstCameraHost {
    async fn enumerate_devices(&self) -> Result<Vec<VideoDeviceInfo>> {
        let mut entries = tokio::fs::read_dir("/sys/class/video4linux")
            .await
            .map_err(|e| CaptureError::Enumeration {
                details: format!("cannot list video4linux devices: {}", e),
            })?;

        let mut devices = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CaptureError::Enumeration {
                details: e.to_string(),
            })?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("video") {
                continue;
            }
            let label = tokio::fs::read_to_string(entry.path().join("name"))
                .await
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            devices.push(VideoDeviceInfo::new(format!("/dev/{}", name), label));
        }

        devices.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Enumerated {} video devices", devices.len());
        Ok(devices)
    }

    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn MediaStream>> {
        let device = match &request.device {
            DeviceSelector::Exact(id) => id.clone(),
            DeviceSelector::FrontFacing => self
                .enumerate_devices()
                .await?
                .first()
                .map(|d| d.id.clone())
                .ok_or(CaptureError::Acquisition {
                    details: "no video devices present".to_string(),
                })?,
        };

        let description = self.pipeline_description(&device, &request);
        debug!("Creating capture pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| acquisition_error(e.to_string()))?
            .downcast::<Pipeline>()
            .map_err(|_| CaptureError::Acquisition {
                details: "failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.downcast::<AppSink>().ok())
            .ok_or(CaptureError::Acquisition {
                details: "appsink missing from pipeline".to_string(),
            })?;

        let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_buffer = Arc::clone(&buffer);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    if let Some(gst_buffer) = sample.buffer() {
                        if let Ok(map) = gst_buffer.map_readable() {
                            sink_buffer.lock().extend_from_slice(map.as_slice());
                        }
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        // Paused opens the device so acquisition failures surface here,
        // before the session treats the stream as live.
        pipeline
            .set_state(gstreamer::State::Paused)
            .map_err(|e| acquisition_error(e.to_string()))?;

        Ok(Box::new(GstMediaStream {
            device_id: device,
            container: self.container,
            pipeline: Some(pipeline),
            buffer,
        }))
    }
}

pub struct GstMediaStream {
    device_id: String,
    container: ContainerFormat,
    pipeline: Option<Pipeline>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl MediaStream for GstMediaStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn supported_container(&self) -> ContainerFormat {
        self.container
    }

    async fn apply_crop(&mut self, _rect: CropRect) -> bool {
        // the v4l2 path records the full field of view
        debug!("Crop not supported by the GStreamer backend");
        false
    }

    async fn start_recorder(&mut self) -> Result<Box<dyn Recorder>> {
        let pipeline = self
            .pipeline
            .clone()
            .ok_or(CaptureError::Recorder {
                details: "stream already stopped".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CaptureError::Recorder {
                details: format!("failed to start pipeline: {}", e),
            })?;
        info!("Recording pipeline playing on {}", self.device_id);

        Ok(Box::new(GstRecorder {
            pipeline,
            container: self.container,
            buffer: Arc::clone(&self.buffer),
        }))
    }

    async fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
            debug!("Pipeline on {} released", self.device_id);
        }
    }
}

impl Drop for GstMediaStream {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
    }
}

pub struct GstRecorder {
    pipeline: Pipeline,
    container: ContainerFormat,
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl Recorder for GstRecorder {
    async fn stop(&mut self) -> Result<MediaBlob> {
        // EOS lets the muxer finalize the container before teardown
        self.pipeline.send_event(gstreamer::event::Eos::new());

        let pipeline = self.pipeline.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(bus) = pipeline.bus() {
                let _ = bus.timed_pop_filtered(
                    gstreamer::ClockTime::from_seconds(5),
                    &[
                        gstreamer::MessageType::Eos,
                        gstreamer::MessageType::Error,
                    ],
                );
            }
        })
        .await;

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Pipeline did not reach Null cleanly: {}", e);
        }

        let data = std::mem::take(&mut *self.buffer.lock());
        if data.is_empty() {
            return Err(CaptureError::Recorder {
                details: "recorder produced no data".to_string(),
            }
            .into());
        }

        debug!("Recorder finalized {} bytes", data.len());
        Ok(MediaBlob {
            data,
            media_type: self.container.mime().to_string(),
        })
    }
}
