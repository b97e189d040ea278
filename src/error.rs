//! Error type shared by the controller and its backends.

use crate::backend::CameraFacing;

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// No camera device exists at all.
    #[error("no camera device found (requested {0} panel)")]
    DeviceNotFound(CameraFacing),
    /// Opening or configuring a capture session failed.
    #[error("failed to initialize capture session: {0}")]
    SessionInit(String),
    /// The operation needs an open session and there is none.
    #[error("no capture session is open")]
    NoSession,
    /// Requested format is not supported by the device.
    #[error("format not supported: {0}")]
    FormatNotSupported(String),
    /// Error during a streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// A photo or recording could not be produced.
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    /// The backend cannot perform this operation.
    #[error("not supported by this backend: {0}")]
    NotSupported(String),
    /// The video encoder or muxer rejected the stream.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Rotation is not one of 0, 90, 180 or 270 degrees.
    #[error("unsupported rotation: {0} degrees")]
    InvalidRotation(u32),
    /// Pixel buffer does not match its declared dimensions.
    #[error("invalid bitmap: {0}")]
    InvalidBitmap(String),
    /// Image encoding or decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
