//! Background recording from a frame-level device.
//!
//! A recording owns the device for its whole duration. Frames are pulled on
//! a worker thread, rotated for the record orientation and handed to a
//! [`FrameSink`], which turns them into a file. Stopping joins the worker and
//! hands the device back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::backend::{CaptureFailure, StreamProperties, VideoProfile};
use crate::error::{CameraError, Result};
use crate::imaging::{decode_frame, rotate};
use crate::orientation::Rotation;
use crate::traits::{CameraDevice, CaptureStream, Format};

/// Consumer of the rotated frames of one recording.
pub trait FrameSink {
    /// Append one frame.
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;

    /// Flush everything and close the output.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Opens the sink a recording writes into.
///
/// The profile's width and height already match the rotated frames.
pub type SinkFactory = fn(&VideoProfile, &Path) -> Result<Box<dyn FrameSink>>;

/// Default sink: H.264 in MP4.
#[cfg(feature = "ffmpeg")]
pub fn mp4_sink(profile: &VideoProfile, path: &Path) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(crate::mp4::Mp4Sink::create(profile, path)?))
}

/// Default sink when built without FFmpeg.
#[cfg(not(feature = "ffmpeg"))]
pub fn mp4_sink(_profile: &VideoProfile, _path: &Path) -> Result<Box<dyn FrameSink>> {
    Err(CameraError::NotSupported(
        "MP4 recording (built without the `ffmpeg` feature)".to_owned(),
    ))
}

/// Everything the worker needs to run one recording.
#[derive(Debug, Clone)]
pub struct RecordJob {
    /// Capture format; `None` keeps the device's current one.
    pub capture: Option<StreamProperties>,
    /// Clockwise rotation applied to every frame.
    pub rotation: Rotation,
    /// Requested encoding profile.
    pub profile: VideoProfile,
    /// Output file.
    pub path: PathBuf,
    /// Driver buffers to queue.
    pub buffer_count: u32,
    /// Sink constructor.
    pub sink: SinkFactory,
}

/// Recording that could not be started, with the device handed back.
#[derive(Debug)]
pub struct StartFailure<D> {
    /// The device, unless the worker died holding it.
    pub device: Option<D>,
    /// Why the recording did not start.
    pub error: CameraError,
}

type Outcome<D> = (D, Result<u64>);

/// A running recording.
#[derive(Debug)]
pub struct Recording<D> {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Outcome<D>>>,
}

impl<D> Recording<D>
where
    D: CameraDevice + Send + 'static,
{
    /// Spawn the worker and wait until the stream and sink are open.
    ///
    /// # Arguments
    ///
    /// * `device` - Device to record from, owned by the worker until stopped
    /// * `job` - Format, rotation and output of the recording
    /// * `notifier` - Channel for failures that happen after the start
    ///
    /// # Returns
    ///
    /// The running recording, or the start error together with the device.
    pub fn start(
        device: D,
        job: RecordJob,
        notifier: Option<Sender<CaptureFailure>>,
    ) -> std::result::Result<Self, StartFailure<D>> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let worker_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("cam-recorder".to_owned())
            .spawn(move || {
                let mut device = device;
                let notifier = notifier.as_ref();
                let outcome = record(&mut device, &job, &worker_stop, &ready_tx, notifier);
                (device, outcome)
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                return Err(StartFailure {
                    device: None,
                    error: CameraError::Io(err),
                });
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop,
                handle: Some(handle),
            }),
            Ok(Err(error)) => Err(StartFailure {
                device: handle.join().ok().map(|(device, _)| device),
                error,
            }),
            Err(_) => Err(StartFailure {
                device: handle.join().ok().map(|(device, _)| device),
                error: CameraError::CaptureFailed("recorder exited before starting".to_owned()),
            }),
        }
    }

    /// Signal the worker, wait for it to flush the file and take the device
    /// back.
    ///
    /// # Returns
    ///
    /// The device (unless the worker panicked) and the recording result.
    pub fn stop(mut self) -> (Option<D>, Result<u64>) {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            let err = CameraError::CaptureFailed("recorder already joined".to_owned());
            return (None, Err(err));
        };
        match handle.join() {
            Ok((device, outcome)) => (Some(device), outcome),
            Err(_) => (
                None,
                Err(CameraError::CaptureFailed("recorder thread panicked".to_owned())),
            ),
        }
    }
}

impl<D> Drop for Recording<D> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Capture format and the profile matching the rotated frames.
fn open_capture<D: CameraDevice>(
    device: &mut D,
    job: &RecordJob,
) -> Result<(Format, VideoProfile)> {
    let format = match job.capture {
        Some(properties) => device.set_format(&Format::new(
            properties.width(),
            properties.height(),
            properties.subtype(),
        ))?,
        None => device.format()?,
    };

    let (width, height) = if job.rotation.is_quarter_turn() {
        (format.height, format.width)
    } else {
        (format.width, format.height)
    };
    if (width, height) != (job.profile.width, job.profile.height) {
        debug!(
            "encoding {width}x{height} instead of requested {}x{}",
            job.profile.width, job.profile.height
        );
    }
    let profile = VideoProfile {
        width,
        height,
        ..job.profile
    };
    Ok((format, profile))
}

fn open_pipeline<'d, D: CameraDevice>(
    device: &'d mut D,
    job: &RecordJob,
) -> Result<(Format, D::Stream<'d>, Box<dyn FrameSink>)> {
    let (format, profile) = open_capture(device, job)?;
    let stream = device.create_stream(job.buffer_count)?;
    let sink = (job.sink)(&profile, &job.path)?;
    Ok((format, stream, sink))
}

fn report(notifier: Option<&Sender<CaptureFailure>>, err: &CameraError) {
    if let Some(notifier) = notifier {
        let failure = CaptureFailure {
            message: err.to_string(),
        };
        if notifier.send(failure).is_err() {
            debug!("failure listener already detached");
        }
    }
}

fn record<D: CameraDevice>(
    device: &mut D,
    job: &RecordJob,
    stop: &AtomicBool,
    ready: &SyncSender<Result<()>>,
    notifier: Option<&Sender<CaptureFailure>>,
) -> Result<u64> {
    let (format, mut stream, mut sink) = match open_pipeline(device, job) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            if ready.send(Err(err)).is_err() {
                warn!("recording start abandoned");
            }
            return Ok(0);
        }
    };
    if ready.send(Ok(())).is_err() {
        warn!("recording start abandoned");
    }
    info!(
        "recording {}x{} {} rotated {} into {}",
        format.width,
        format.height,
        format.fourcc,
        job.rotation,
        job.path.display()
    );

    let mut frames = 0u64;
    let mut pump = || -> Result<()> {
        while !stop.load(Ordering::Acquire) {
            let frame = stream.next_frame()?;
            let image = rotate(&decode_frame(&format, &frame)?, job.rotation);
            sink.write_frame(&image)?;
            frames += 1;
        }
        Ok(())
    };
    let pumped = pump();
    let finished = sink.finish();

    if let Err(err) = &pumped {
        warn!("recording stopped after {frames} frames: {err}");
        report(notifier, err);
    }
    pumped?;
    finished?;
    debug!("recorded {frames} frames into {}", job.path.display());
    Ok(frames)
}
