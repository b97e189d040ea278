//! Platform capture backend abstraction.
//!
//! A backend enumerates camera devices and opens capture sessions on them.
//! The controller only ever talks to these traits, so the V4L2 backend and
//! the test mocks are interchangeable.

use std::fmt;
use std::path::Path;
use std::sync::mpsc::Sender;

use crate::error::Result;
use crate::orientation::Rotation;
use crate::traits::FourCC;

/// Which physical camera the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraFacing {
    /// Rear camera.
    #[default]
    Back,
    /// User-facing camera.
    Front,
}

impl CameraFacing {
    /// The opposite facing.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Back => Self::Front,
            Self::Front => Self::Back,
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Back => f.write_str("back"),
            Self::Front => f.write_str("front"),
        }
    }
}

/// Panel a device reports itself mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevicePanel {
    /// Mounted on the front of the device.
    Front,
    /// Mounted on the back of the device.
    Back,
    /// No panel information (typical for external webcams).
    Unknown,
}

impl DevicePanel {
    /// Whether this panel matches the requested facing.
    #[must_use]
    pub const fn matches(self, facing: CameraFacing) -> bool {
        matches!(
            (self, facing),
            (Self::Front, CameraFacing::Front) | (Self::Back, CameraFacing::Back)
        )
    }
}

/// A video-capture device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Backend-specific device identity.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Mounting panel.
    pub panel: DevicePanel,
}

/// What the session is primarily opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryUse {
    /// Still photos.
    Photo,
    /// Video recording.
    Video,
}

/// Streams a session exposes for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Still-photo stream.
    Photo,
    /// Live preview stream in video mode.
    VideoPreview,
    /// Recording stream.
    VideoRecord,
}

/// Dimensions and subtype of a still-image-capable stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillFormat {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoded or pixel subtype.
    pub subtype: FourCC,
}

/// Dimensions, subtype and rate of a video-capable stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel subtype.
    pub subtype: FourCC,
    /// Frames per second, zero when unknown.
    pub frame_rate: u32,
}

/// One hardware-reported stream capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProperties {
    /// Format usable for still capture.
    Still(StillFormat),
    /// Format usable for video.
    Video(VideoFormat),
}

impl StreamProperties {
    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        match self {
            Self::Still(f) => f.width,
            Self::Video(f) => f.width,
        }
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        match self {
            Self::Still(f) => f.height,
            Self::Video(f) => f.height,
        }
    }

    /// Pixel or encoding subtype.
    #[must_use]
    pub const fn subtype(&self) -> FourCC {
        match self {
            Self::Still(f) => f.subtype,
            Self::Video(f) => f.subtype,
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Width divided by height; zero for a degenerate height.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.height() == 0 {
            return 0.0;
        }
        f64::from(self.width()) / f64::from(self.height())
    }

    /// Same format with width and height exchanged.
    #[must_use]
    pub const fn transposed(self) -> Self {
        match self {
            Self::Still(f) => Self::Still(StillFormat {
                width: f.height,
                height: f.width,
                ..f
            }),
            Self::Video(f) => Self::Video(VideoFormat {
                width: f.height,
                height: f.width,
                ..f
            }),
        }
    }
}

/// Still-image encoding produced by a photo capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEncoding {
    /// Output width, zero to let the device decide.
    pub width: u32,
    /// Output height, zero to let the device decide.
    pub height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl ImageEncoding {
    /// JPEG encoding with device-chosen dimensions.
    #[must_use]
    pub const fn jpeg(quality: u8) -> Self {
        Self {
            width: 0,
            height: 0,
            quality,
        }
    }
}

/// Requested recording quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoQuality {
    /// 1920x1080.
    Hd1080p,
    /// 1280x720.
    #[default]
    Hd720p,
    /// 800x480.
    Wvga,
    /// 720x480.
    Ntsc,
    /// 720x576.
    Pal,
    /// 640x480.
    Vga,
    /// 320x240.
    Qvga,
}

impl VideoQuality {
    /// Target frame width and height for this tier.
    #[must_use]
    pub const fn target_size(self) -> (u32, u32) {
        match self {
            Self::Hd1080p => (1920, 1080),
            Self::Hd720p => (1280, 720),
            Self::Wvga => (800, 480),
            Self::Ntsc => (720, 480),
            Self::Pal => (720, 576),
            Self::Vga => (640, 480),
            Self::Qvga => (320, 240),
        }
    }

    const fn frame_rate(self) -> u32 {
        match self {
            Self::Pal => 25,
            _ => 30,
        }
    }

    const fn bitrate(self) -> u32 {
        match self {
            Self::Hd1080p => 15_000_000,
            Self::Hd720p => 7_500_000,
            Self::Wvga | Self::Ntsc | Self::Pal => 3_000_000,
            Self::Vga => 2_000_000,
            Self::Qvga => 500_000,
        }
    }
}

/// MP4/H.264 recording profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    /// Encoded width.
    pub width: u32,
    /// Encoded height.
    pub height: u32,
    /// Frames per second.
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

impl VideoProfile {
    /// Baseline profile for a quality tier.
    #[must_use]
    pub const fn for_quality(quality: VideoQuality) -> Self {
        let (width, height) = quality.target_size();
        Self {
            width,
            height,
            frame_rate: quality.frame_rate(),
            bitrate: quality.bitrate(),
        }
    }
}

/// Asynchronous failure reported by a backend while a session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    /// Backend-provided description.
    pub message: String,
}

/// Enumerates camera devices and opens sessions on them.
pub trait CaptureBackend {
    /// Session type produced by `open_session`.
    type Session: CaptureSession;

    /// All video-capture devices, possibly empty and in no particular order.
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Open a capture session on the given device.
    fn open_session(&mut self, device: &DeviceInfo) -> Result<Self::Session>;
}

/// One open connection to a physical camera.
pub trait CaptureSession {
    /// Capabilities the hardware reports for a stream.
    fn available_properties(&self, stream: StreamKind) -> Result<Vec<StreamProperties>>;

    /// Bind a format to a stream.
    fn set_stream_properties(
        &mut self,
        stream: StreamKind,
        properties: &StreamProperties,
    ) -> Result<()>;

    /// Rotation applied to preview and photo output.
    fn set_preview_rotation(&mut self, rotation: Rotation) -> Result<()>;

    /// Rotation applied to recorded video.
    fn set_record_rotation(&mut self, rotation: Rotation) -> Result<()>;

    /// Whether the device has a controllable flash.
    fn flash_supported(&self) -> bool;

    /// Whether the device has a controllable torch.
    fn torch_supported(&self) -> bool;

    /// Start the live preview.
    fn start_preview(&mut self) -> Result<()>;

    /// Stop the live preview.
    fn stop_preview(&mut self) -> Result<()>;

    /// Capture one photo into `path`.
    fn capture_photo(&mut self, encoding: &ImageEncoding, path: &Path) -> Result<()>;

    /// Start recording into `path`.
    fn start_recording(&mut self, profile: &VideoProfile, path: &Path) -> Result<()>;

    /// Stop recording and flush the output file.
    fn stop_recording(&mut self) -> Result<()>;

    /// Install or detach the channel asynchronous failures are reported on.
    fn set_failure_notifier(&mut self, notifier: Option<Sender<CaptureFailure>>);

    /// Release the native session.
    fn close(self) -> Result<()>;
}
