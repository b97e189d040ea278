//! Mock devices and backends for testing without hardware.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    CaptureBackend, CaptureFailure, CaptureSession, DeviceInfo, DevicePanel, ImageEncoding,
    StreamKind, StreamProperties, VideoProfile,
};
use crate::error::{CameraError, Result};
use crate::orientation::Rotation;
use crate::traits::{
    CameraDevice, CaptureStream, DeviceCapabilities, Format, FourCC, Frame, FrameMetadata,
};

/// Mock frame-level device producing YUYV color bars.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    supported: Vec<Format>,
    frame_count: u32,
    stream_failure: bool,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        let format = Format::new(640, 480, FourCC::YUYV);
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            supported: vec![format.clone()],
            format,
            frame_count: 0,
            stream_failure: false,
        }
    }

    /// Set the formats this mock device advertises.
    #[must_use]
    pub fn with_supported_formats(mut self, supported: Vec<Format>) -> Self {
        self.supported = supported;
        self
    }

    /// Make every frame request fail, as an unplugged camera would.
    #[must_use]
    pub const fn with_stream_failure(mut self) -> Self {
        self.stream_failure = true;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn supported_formats(&self) -> Result<Vec<Format>> {
        Ok(self.supported.clone())
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.format = format.clone();
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream { device: self })
    }
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        if self.device.stream_failure {
            return Err(CameraError::StreamError("device disconnected".to_owned()));
        }

        let format = &self.device.format;
        let data = generate_color_bars(format.width, format.height);

        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used: format.size,
            },
        })
    }
}

/// Generate a YUYV color bars frame.
fn generate_color_bars(width: u32, height: u32) -> Vec<u8> {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];

    let bar_width = (width / 8).max(1);
    let mut data = Vec::with_capacity((width * height * 2) as usize);
    for _ in 0..height {
        for x in (0..width).step_by(2) {
            let (y, u, v) = bars[(x / bar_width).min(7) as usize];
            data.extend_from_slice(&[y, u, y, v]);
        }
    }
    data
}

/// Shared record of what a [`MockBackend`] has done.
#[derive(Debug, Default)]
pub struct MockLedger {
    open_sessions: AtomicUsize,
    total_opened: AtomicUsize,
}

impl MockLedger {
    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened over the backend's lifetime.
    pub fn total_opened(&self) -> usize {
        self.total_opened.load(Ordering::SeqCst)
    }
}

/// Scriptable capture backend.
#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Vec<DeviceInfo>,
    photo_caps: Vec<StreamProperties>,
    video_caps: Vec<StreamProperties>,
    flash: bool,
    torch: bool,
    fail_open: bool,
    open_budget: Option<usize>,
    fail_photo: bool,
    fail_record: bool,
    fail_stop_preview: bool,
    opened: Vec<String>,
    ledger: Arc<MockLedger>,
}

impl MockBackend {
    /// Backend with no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device mounted on `panel`.
    #[must_use]
    pub fn with_device(mut self, id: &str, panel: DevicePanel) -> Self {
        self.devices.push(DeviceInfo {
            id: id.to_owned(),
            name: format!("Mock {id}"),
            panel,
        });
        self
    }

    /// Capabilities reported for the photo stream.
    #[must_use]
    pub fn with_photo_caps(mut self, caps: Vec<StreamProperties>) -> Self {
        self.photo_caps = caps;
        self
    }

    /// Capabilities reported for the video streams.
    #[must_use]
    pub fn with_video_caps(mut self, caps: Vec<StreamProperties>) -> Self {
        self.video_caps = caps;
        self
    }

    /// Report flash and torch hardware.
    #[must_use]
    pub const fn with_flash_and_torch(mut self) -> Self {
        self.flash = true;
        self.torch = true;
        self
    }

    /// Fail every `open_session`.
    #[must_use]
    pub const fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Open `sessions` sessions successfully, then fail every later open.
    #[must_use]
    pub const fn failing_open_after(mut self, sessions: usize) -> Self {
        self.open_budget = Some(sessions);
        self
    }

    /// Fail every `start_recording`.
    #[must_use]
    pub const fn failing_record(mut self) -> Self {
        self.fail_record = true;
        self
    }

    /// Fail every photo capture after the file has been allocated.
    #[must_use]
    pub const fn failing_photo(mut self) -> Self {
        self.fail_photo = true;
        self
    }

    /// Fail every `stop_preview`.
    #[must_use]
    pub const fn failing_stop_preview(mut self) -> Self {
        self.fail_stop_preview = true;
        self
    }

    /// Ids of the devices sessions were opened on, oldest first.
    pub fn opened(&self) -> &[String] {
        &self.opened
    }

    /// Session accounting shared with every session this backend opened.
    pub fn ledger(&self) -> Arc<MockLedger> {
        Arc::clone(&self.ledger)
    }
}

impl CaptureBackend for MockBackend {
    type Session = MockSession;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open_session(&mut self, device: &DeviceInfo) -> Result<Self::Session> {
        if self.fail_open || self.open_budget.is_some_and(|budget| self.opened.len() >= budget) {
            return Err(CameraError::SessionInit(format!("{} is busy", device.id)));
        }
        self.opened.push(device.id.clone());
        self.ledger.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.ledger.total_opened.fetch_add(1, Ordering::SeqCst);

        Ok(MockSession {
            device_id: device.id.clone(),
            photo_caps: self.photo_caps.clone(),
            video_caps: self.video_caps.clone(),
            flash: self.flash,
            torch: self.torch,
            fail_photo: self.fail_photo,
            fail_record: self.fail_record,
            fail_stop_preview: self.fail_stop_preview,
            bound: HashMap::new(),
            preview_rotation: Rotation::None,
            record_rotation: Rotation::None,
            previewing: false,
            recording: None,
            notifier: None,
            ledger: Arc::clone(&self.ledger),
        })
    }
}

/// Session produced by [`MockBackend`].
#[derive(Debug)]
pub struct MockSession {
    device_id: String,
    photo_caps: Vec<StreamProperties>,
    video_caps: Vec<StreamProperties>,
    flash: bool,
    torch: bool,
    fail_photo: bool,
    fail_record: bool,
    fail_stop_preview: bool,
    bound: HashMap<StreamKind, StreamProperties>,
    preview_rotation: Rotation,
    record_rotation: Rotation,
    previewing: bool,
    recording: Option<VideoProfile>,
    notifier: Option<Sender<CaptureFailure>>,
    ledger: Arc<MockLedger>,
}

impl MockSession {
    /// Device this session was opened on.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Format bound to a stream.
    pub fn bound(&self, stream: StreamKind) -> Option<&StreamProperties> {
        self.bound.get(&stream)
    }

    /// Rotation applied to preview and photos.
    pub const fn preview_rotation(&self) -> Rotation {
        self.preview_rotation
    }

    /// Rotation applied to recordings.
    pub const fn record_rotation(&self) -> Rotation {
        self.record_rotation
    }

    /// Whether the preview is running.
    pub const fn is_previewing(&self) -> bool {
        self.previewing
    }

    /// Profile of the active recording.
    pub const fn recording(&self) -> Option<&VideoProfile> {
        self.recording.as_ref()
    }

    /// Whether a failure listener is attached.
    pub const fn has_failure_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Report an asynchronous failure, as a disconnecting camera would.
    pub fn raise_failure(&self, message: &str) -> bool {
        self.notifier.as_ref().is_some_and(|notifier| {
            notifier
                .send(CaptureFailure {
                    message: message.to_owned(),
                })
                .is_ok()
        })
    }
}

impl CaptureSession for MockSession {
    fn available_properties(&self, stream: StreamKind) -> Result<Vec<StreamProperties>> {
        Ok(match stream {
            StreamKind::Photo => self.photo_caps.clone(),
            StreamKind::VideoPreview | StreamKind::VideoRecord => self.video_caps.clone(),
        })
    }

    fn set_stream_properties(
        &mut self,
        stream: StreamKind,
        properties: &StreamProperties,
    ) -> Result<()> {
        self.bound.insert(stream, *properties);
        Ok(())
    }

    fn set_preview_rotation(&mut self, rotation: Rotation) -> Result<()> {
        self.preview_rotation = rotation;
        Ok(())
    }

    fn set_record_rotation(&mut self, rotation: Rotation) -> Result<()> {
        self.record_rotation = rotation;
        Ok(())
    }

    fn flash_supported(&self) -> bool {
        self.flash
    }

    fn torch_supported(&self) -> bool {
        self.torch
    }

    fn start_preview(&mut self) -> Result<()> {
        self.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        if self.fail_stop_preview {
            return Err(CameraError::StreamError("preview stuck".to_owned()));
        }
        self.previewing = false;
        Ok(())
    }

    fn capture_photo(&mut self, _encoding: &ImageEncoding, path: &Path) -> Result<()> {
        if self.fail_photo {
            return Err(CameraError::CaptureFailed("shutter jammed".to_owned()));
        }
        std::fs::write(path, [0xFF, 0xD8, 0xFF, 0xD9])?;
        Ok(())
    }

    fn start_recording(&mut self, profile: &VideoProfile, path: &Path) -> Result<()> {
        if self.fail_record {
            return Err(CameraError::Encoding("no encoder".to_owned()));
        }
        std::fs::write(path, b"mock-mp4")?;
        self.recording = Some(*profile);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.recording = None;
        Ok(())
    }

    fn set_failure_notifier(&mut self, notifier: Option<Sender<CaptureFailure>>) {
        self.notifier = notifier;
    }

    fn close(self) -> Result<()> {
        self.ledger.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data.len(), 640 * 480 * 2);
        // First bar should be white (Y=235)
        assert_eq!(frame1.data[0], 235);

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_mock_backend_tracks_sessions() {
        let mut backend = MockBackend::new().with_device("0", DevicePanel::Back);
        let ledger = backend.ledger();
        let devices = backend.enumerate_devices().expect("enumerate");

        let session = backend.open_session(&devices[0]).expect("open");
        assert_eq!(ledger.open_sessions(), 1);
        assert_eq!(session.device_id(), "0");

        session.close().expect("close");
        assert_eq!(ledger.open_sessions(), 0);
        assert_eq!(ledger.total_opened(), 1);
    }
}
