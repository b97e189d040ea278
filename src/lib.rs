//! Cam-Controller: camera lifecycle management for photo and video capture
//!
//! This library drives one camera at a time through a backend abstraction:
//! it resolves the physical camera, negotiates stream formats against what
//! the hardware reports, keeps output upright as the device rotates, and
//! writes photos and recordings to uniquely named files. A V4L2 backend is
//! provided for Linux.

pub mod backend;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod imaging;
#[cfg(feature = "ffmpeg")]
pub mod mp4;
pub mod negotiation;
pub mod orientation;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use backend::{
    CameraFacing, CaptureBackend, CaptureFailure, CaptureSession, DeviceInfo, DevicePanel,
    ImageEncoding, PrimaryUse, StreamKind, StreamProperties, VideoProfile, VideoQuality,
};
pub use config::ControllerConfig;
pub use controller::CameraController;
pub use device::{V4L2Backend, V4L2Device};
pub use error::{CameraError, Result};
pub use imaging::PixelBitmap;
pub use negotiation::EncodingSelection;
pub use orientation::{DeviceOrientation, Rotation};
pub use recorder::{FrameSink, SinkFactory};
pub use traits::{CameraDevice, CaptureStream, Format, FourCC};
