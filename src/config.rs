//! Controller configuration.

use std::path::PathBuf;

use crate::imaging::DEFAULT_JPEG_QUALITY;
use crate::orientation::DeviceOrientation;

/// Default number of mmap buffers for V4L2 capture streams.
pub const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Settings for a [`CameraController`](crate::CameraController).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Directory photos, recordings and edited images are written to.
    pub output_dir: PathBuf,
    /// Capture buffers requested from the driver.
    pub buffer_count: u32,
    /// JPEG quality for photos and saved bitmaps.
    pub jpeg_quality: u8,
    /// Orientation assumed until the first orientation notification.
    pub initial_orientation: DeviceOrientation,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            buffer_count: DEFAULT_BUFFER_COUNT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            initial_orientation: DeviceOrientation::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the output directory.
    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Set the capture buffer count.
    #[must_use]
    pub const fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    /// Set the JPEG quality, clamped to 1-100.
    #[must_use]
    pub fn with_jpeg_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality.clamp(1, 100);
        self
    }

    /// Set the orientation assumed at startup.
    #[must_use]
    pub const fn with_initial_orientation(mut self, orientation: DeviceOrientation) -> Self {
        self.initial_orientation = orientation;
        self
    }
}
