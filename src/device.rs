//! V4L2 device and backend implementation using the v4l crate.

use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::backend::{CaptureBackend, DeviceInfo, DevicePanel};
use crate::error::{CameraError, Result};
use crate::session::DeviceSession;
use crate::traits::{
    CameraDevice, CaptureStream, DeviceCapabilities, Format, FourCC, Frame, FrameMetadata,
};
use std::time::Duration;

/// Sizes probed inside a stepwise frame-size range.
const STEPWISE_PROBE_SIZES: [(u32, u32); 5] =
    [(640, 480), (1280, 720), (1920, 1080), (2592, 1944), (3840, 2160)];

/// Whether `value` is a size a stepwise range actually offers: inside
/// `min..=max` and a whole number of steps above `min`. A zero step is
/// treated as continuous.
const fn on_step(value: u32, min: u32, max: u32, step: u32) -> bool {
    if value < min || value > max {
        return false;
    }
    step == 0 || (value - min) % step == 0
}

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|err| CameraError::SessionInit(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::SessionInit(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        Ok(Self {
            device,
            capabilities,
        })
    }
}

fn to_format(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    }
}

impl CameraDevice for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn supported_formats(&self) -> Result<Vec<Format>> {
        let descriptions = self
            .device
            .enum_formats()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        let mut formats = Vec::new();
        for description in descriptions {
            let fourcc = FourCC::from(description.fourcc);
            let sizes = self
                .device
                .enum_framesizes(description.fourcc)
                .map_err(|err| CameraError::StreamError(err.to_string()))?;

            for size in sizes {
                match size.size {
                    FrameSizeEnum::Discrete(discrete) => {
                        formats.push(Format::new(discrete.width, discrete.height, fourcc));
                    }
                    FrameSizeEnum::Stepwise(stepwise) => {
                        formats.extend(
                            STEPWISE_PROBE_SIZES
                                .iter()
                                .filter(|&&(width, height)| {
                                    on_step(
                                        width,
                                        stepwise.min_width,
                                        stepwise.max_width,
                                        stepwise.step_width,
                                    ) && on_step(
                                        height,
                                        stepwise.min_height,
                                        stepwise.max_height,
                                        stepwise.step_height,
                                    )
                                })
                                .map(|&(width, height)| Format::new(width, height, fourcc)),
                        );
                    }
                }
            }
        }
        Ok(formats)
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(to_format(&fmt))
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        if fmt.fourcc != v4l::FourCC::from(format.fourcc) {
            return Err(CameraError::FormatNotSupported(format!(
                "{} {}x{}",
                format.fourcc, format.width, format.height
            )));
        }

        Ok(to_format(&fmt))
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(V4L2Stream { stream })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let used = (meta.bytesused as usize).min(buf.len());
        Ok(Frame {
            data: buf.get(..used).unwrap_or(buf).to_vec(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }
}

/// Guess the mounting panel from a device name.
fn panel_from_name(name: &str) -> DevicePanel {
    let name = name.to_lowercase();
    if name.contains("front") || name.contains("user") {
        DevicePanel::Front
    } else if name.contains("back") || name.contains("rear") || name.contains("world") {
        DevicePanel::Back
    } else {
        DevicePanel::Unknown
    }
}

/// Capture backend over `/dev/video*` nodes.
#[derive(Debug, Clone)]
pub struct V4L2Backend {
    buffer_count: u32,
}

impl V4L2Backend {
    /// Backend whose sessions stream with `buffer_count` mmap buffers.
    #[must_use]
    pub const fn new(buffer_count: u32) -> Self {
        Self { buffer_count }
    }
}

impl CaptureBackend for V4L2Backend {
    type Session = DeviceSession<V4L2Device>;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(v4l::context::enum_devices()
            .into_iter()
            .map(|node| {
                let name = node
                    .name()
                    .unwrap_or_else(|| format!("video{}", node.index()));
                DeviceInfo {
                    id: node.index().to_string(),
                    panel: panel_from_name(&name),
                    name,
                }
            })
            .collect())
    }

    fn open_session(&mut self, device: &DeviceInfo) -> Result<Self::Session> {
        let index = device
            .id
            .parse::<u32>()
            .map_err(|_| CameraError::SessionInit(format!("bad device id {:?}", device.id)))?;
        let device = V4L2Device::open(index)?;
        if !device.capabilities().can_capture {
            return Err(CameraError::SessionInit(format!(
                "{} cannot capture video",
                device.capabilities().card
            )));
        }
        Ok(DeviceSession::new(device, self.buffer_count))
    }
}
