mod engine;
mod host;
mod mock;
mod selection;

#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;

pub use engine::{center_crop_rect, CaptureEngine, CaptureState, PreviewInfo};
pub use host::{
    CameraHost, ContainerFormat, CropRect, DeviceSelector, MediaBlob, MediaStream, Recorder,
    StreamRequest, VideoDeviceInfo,
};
pub use mock::{MockCameraHost, MockHostState};
pub use selection::select_front_device;

#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstCameraHost;

#[cfg(test)]
mod tests;
