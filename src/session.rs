//! Capture session over a frame-level [`CameraDevice`].
//!
//! Photos are taken by streaming a single frame in the photo format and
//! encoding it to JPEG in-process. Recordings hand the device to a
//! [`Recording`] worker until they are stopped. A plain V4L2 node has no
//! flash or torch, so neither is ever reported.

use std::path::Path;
use std::sync::mpsc::Sender;

use tracing::{debug, warn};

use crate::backend::{
    CaptureFailure, CaptureSession, ImageEncoding, StillFormat, StreamKind, StreamProperties,
    VideoFormat, VideoProfile,
};
use crate::error::{CameraError, Result};
use crate::imaging::{decode_frame, rotate, write_jpeg};
use crate::orientation::Rotation;
use crate::recorder::{self, RecordJob, Recording, SinkFactory};
use crate::traits::{CameraDevice, CaptureStream, Format, FourCC, Frame};

fn device_busy() -> CameraError {
    CameraError::StreamError("device is busy recording".to_owned())
}

/// Session state layered on top of a frame-level device.
pub struct DeviceSession<D> {
    device: Option<D>,
    recording: Option<Recording<D>>,
    sink: SinkFactory,
    buffer_count: u32,
    photo: Option<StreamProperties>,
    preview: Option<StreamProperties>,
    record: Option<StreamProperties>,
    preview_rotation: Rotation,
    record_rotation: Rotation,
    previewing: bool,
    notifier: Option<Sender<CaptureFailure>>,
}

impl<D: CameraDevice + Send + 'static> DeviceSession<D> {
    /// Wrap an opened device. Recordings are written as H.264 MP4.
    pub fn new(device: D, buffer_count: u32) -> Self {
        Self {
            device: Some(device),
            recording: None,
            sink: recorder::mp4_sink,
            buffer_count,
            photo: None,
            preview: None,
            record: None,
            preview_rotation: Rotation::None,
            record_rotation: Rotation::None,
            previewing: false,
            notifier: None,
        }
    }

    /// Write recordings through `sink` instead of the MP4 encoder.
    #[must_use]
    pub fn with_sink(mut self, sink: SinkFactory) -> Self {
        self.sink = sink;
        self
    }

    /// The wrapped device, `None` while a recording holds it.
    pub const fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Whether a recording is running.
    pub const fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Format currently bound to a stream.
    pub const fn stream_properties(&self, stream: StreamKind) -> Option<&StreamProperties> {
        match stream {
            StreamKind::Photo => self.photo.as_ref(),
            StreamKind::VideoPreview => self.preview.as_ref(),
            StreamKind::VideoRecord => self.record.as_ref(),
        }
    }

    /// Rotation applied to preview and photos.
    pub const fn preview_rotation(&self) -> Rotation {
        self.preview_rotation
    }

    /// Rotation applied to recordings.
    pub const fn record_rotation(&self) -> Rotation {
        self.record_rotation
    }

    fn apply(&mut self, properties: &StreamProperties) -> Result<Format> {
        let requested = Format::new(properties.width(), properties.height(), properties.subtype());
        self.device.as_mut().ok_or_else(device_busy)?.set_format(&requested)
    }

    fn grab_frame(&mut self) -> Result<(Format, Frame)> {
        let format = match self.photo {
            Some(properties) => self.apply(&properties)?,
            None => self.device.as_ref().ok_or_else(device_busy)?.format()?,
        };
        let device = self.device.as_mut().ok_or_else(device_busy)?;
        let mut stream = device.create_stream(self.buffer_count)?;
        let frame = stream.next_frame()?;
        Ok((format, frame))
    }

    fn report_failure(&self, err: &CameraError) {
        if let Some(notifier) = &self.notifier {
            let failure = CaptureFailure {
                message: err.to_string(),
            };
            if notifier.send(failure).is_err() {
                debug!("failure listener already detached");
            }
        }
    }
}

impl<D: CameraDevice + Send + 'static> CaptureSession for DeviceSession<D> {
    fn available_properties(&self, stream: StreamKind) -> Result<Vec<StreamProperties>> {
        let formats = self
            .device
            .as_ref()
            .ok_or_else(device_busy)?
            .supported_formats()?;
        Ok(formats
            .into_iter()
            .filter_map(|format| {
                let video = StreamProperties::Video(VideoFormat {
                    width: format.width,
                    height: format.height,
                    subtype: format.fourcc,
                    frame_rate: 0,
                });
                // Only formats `decode_frame` understands
                match (stream, format.fourcc) {
                    (StreamKind::Photo, FourCC::MJPG) => {
                        Some(StreamProperties::Still(StillFormat {
                            width: format.width,
                            height: format.height,
                            subtype: format.fourcc,
                        }))
                    }
                    (_, FourCC::YUYV) => Some(video),
                    _ => None,
                }
            })
            .collect())
    }

    fn set_stream_properties(
        &mut self,
        stream: StreamKind,
        properties: &StreamProperties,
    ) -> Result<()> {
        match stream {
            StreamKind::Photo => self.photo = Some(*properties),
            StreamKind::VideoPreview => {
                let actual = self.apply(properties)?;
                debug!(
                    "preview format {}x{} {}",
                    actual.width, actual.height, actual.fourcc
                );
                self.preview = Some(*properties);
            }
            StreamKind::VideoRecord => self.record = Some(*properties),
        }
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
        false
    }

    fn torch_supported(&self) -> bool {
        false
    }

    fn start_preview(&mut self) -> Result<()> {
        if let Some(properties) = self.preview.or(self.photo) {
            self.apply(&properties)?;
        }
        self.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<()> {
        self.previewing = false;
        Ok(())
    }

    fn capture_photo(&mut self, encoding: &ImageEncoding, path: &Path) -> Result<()> {
        let (format, frame) = match self.grab_frame() {
            Ok(grabbed) => grabbed,
            Err(err) => {
                self.report_failure(&err);
                return Err(err);
            }
        };

        let image = rotate(&decode_frame(&format, &frame)?, self.preview_rotation);
        write_jpeg(&image, encoding.quality, path)
    }

    fn start_recording(&mut self, profile: &VideoProfile, path: &Path) -> Result<()> {
        if self.recording.is_some() {
            return Err(device_busy());
        }
        let device = self.device.take().ok_or_else(device_busy)?;
        // The record stream carries the rotated shape; frames are captured
        // in the sensor's orientation and turned by the worker.
        let job = RecordJob {
            capture: self.preview.or(self.photo),
            rotation: self.record_rotation,
            profile: *profile,
            path: path.to_path_buf(),
            buffer_count: self.buffer_count,
            sink: self.sink,
        };

        match Recording::start(device, job, self.notifier.clone()) {
            Ok(recording) => {
                self.recording = Some(recording);
                Ok(())
            }
            Err(failure) => {
                self.device = failure.device;
                Err(failure.error)
            }
        }
    }

    fn stop_recording(&mut self) -> Result<()> {
        let Some(recording) = self.recording.take() else {
            return Ok(());
        };
        let (device, outcome) = recording.stop();
        self.device = device;
        let frames = outcome?;
        debug!("recording stopped after {frames} frames");
        Ok(())
    }

    fn set_failure_notifier(&mut self, notifier: Option<Sender<CaptureFailure>>) {
        self.notifier = notifier;
    }

    fn close(mut self) -> Result<()> {
        if self.previewing {
            warn!("closing device session while preview is running");
        }
        self.stop_recording()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VideoQuality;
    use crate::mock::MockDevice;
    use crate::recorder::tests::line_sink;
    use crate::recorder::FrameSink;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn yuyv_session(width: u32, height: u32) -> DeviceSession<MockDevice> {
        let device = MockDevice::new().with_supported_formats(vec![
            Format::new(width, height, FourCC::YUYV),
            Format::new(1920, 1080, FourCC::MJPG),
            Format::new(1280, 720, FourCC::NV12),
        ]);
        DeviceSession::new(device, 2)
    }

    #[test]
    fn test_available_properties_by_stream() {
        let session = yuyv_session(640, 480);

        let photo = session
            .available_properties(StreamKind::Photo)
            .expect("available_properties");
        assert_eq!(photo.len(), 2, "NV12 cannot be decoded into a photo");
        assert!(matches!(photo[0], StreamProperties::Video(_)));
        assert!(matches!(photo[1], StreamProperties::Still(_)));

        let video = session
            .available_properties(StreamKind::VideoPreview)
            .expect("available_properties");
        assert_eq!(video.len(), 1, "only YUYV can be recorded");
        assert_eq!(video[0].subtype(), FourCC::YUYV);
    }

    #[test]
    fn test_capture_photo_writes_rotated_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo.jpg");
        let mut session = yuyv_session(64, 32);

        let props = StreamProperties::Video(VideoFormat {
            width: 64,
            height: 32,
            subtype: FourCC::YUYV,
            frame_rate: 0,
        });
        session
            .set_stream_properties(StreamKind::Photo, &props)
            .expect("set_stream_properties");
        session
            .set_preview_rotation(Rotation::Clockwise90)
            .expect("set_preview_rotation");

        session
            .capture_photo(&ImageEncoding::jpeg(80), &path)
            .expect("capture_photo");

        let decoded = image::open(&path).expect("decode photo");
        assert_eq!((decoded.width(), decoded.height()), (32, 64));
    }

    #[test]
    fn test_stream_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = MockDevice::new().with_stream_failure();
        let mut session = DeviceSession::new(device, 2);
        let (tx, rx) = mpsc::channel();
        session.set_failure_notifier(Some(tx));

        let result = session.capture_photo(&ImageEncoding::jpeg(80), &dir.path().join("x.jpg"));

        assert!(result.is_err());
        assert!(rx.try_recv().is_ok());
    }

    fn yuyv_props(width: u32, height: u32) -> StreamProperties {
        StreamProperties::Video(VideoFormat {
            width,
            height,
            subtype: FourCC::YUYV,
            frame_rate: 0,
        })
    }

    fn refusing_sink(_profile: &VideoProfile, _path: &Path) -> Result<Box<dyn FrameSink>> {
        Err(CameraError::Encoding("encoder unavailable".to_owned()))
    }

    #[test]
    fn test_recording_rotates_frames_and_returns_device() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mp4");
        let mut session = yuyv_session(64, 32).with_sink(line_sink);
        session
            .set_stream_properties(StreamKind::VideoPreview, &yuyv_props(64, 32))
            .expect("bind preview");
        session
            .set_stream_properties(StreamKind::VideoRecord, &yuyv_props(32, 64))
            .expect("bind record");
        session
            .set_record_rotation(Rotation::Clockwise90)
            .expect("set_record_rotation");

        let profile = VideoProfile::for_quality(VideoQuality::Qvga);
        session.start_recording(&profile, &path).expect("start_recording");
        assert!(session.is_recording());
        assert!(session.device().is_none(), "recorder owns the device");
        assert!(session
            .capture_photo(&ImageEncoding::jpeg(80), &dir.path().join("x.jpg"))
            .is_err());

        thread::sleep(Duration::from_millis(50));
        session.stop_recording().expect("stop_recording");

        assert!(!session.is_recording());
        assert!(session.device().is_some());
        let written = std::fs::read_to_string(&path).expect("read clip");
        assert!(written.lines().count() > 0);
        assert!(written.lines().all(|line| line == "32x64"));
        session.stop_recording().expect("stopping twice is a no-op");
    }

    #[test]
    fn test_recording_start_failure_keeps_device() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = yuyv_session(64, 32).with_sink(refusing_sink);
        let profile = VideoProfile::for_quality(VideoQuality::Qvga);

        let result = session.start_recording(&profile, &dir.path().join("clip.mp4"));

        assert!(matches!(result, Err(CameraError::Encoding(_))));
        assert!(!session.is_recording());
        assert!(session.device().is_some());
        assert!(!session.flash_supported());
        assert!(!session.torch_supported());
    }

    #[test]
    fn test_close_stops_running_recording() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mp4");
        let mut session = yuyv_session(64, 32).with_sink(line_sink);
        let profile = VideoProfile::for_quality(VideoQuality::Qvga);
        session.start_recording(&profile, &path).expect("start_recording");

        session.close().expect("close");

        assert!(path.exists());
    }

    #[test]
    fn test_preview_applies_bound_format() {
        let mut session = yuyv_session(320, 240);
        let props = StreamProperties::Video(VideoFormat {
            width: 320,
            height: 240,
            subtype: FourCC::YUYV,
            frame_rate: 0,
        });
        session
            .set_stream_properties(StreamKind::VideoPreview, &props)
            .expect("set_stream_properties");
        session.start_preview().expect("start_preview");

        let format = session.device().expect("device").format().expect("format");
        assert_eq!((format.width, format.height), (320, 240));
        assert_eq!(session.stream_properties(StreamKind::VideoPreview), Some(&props));
    }
}
