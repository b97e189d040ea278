//! Camera lifecycle controller.
//!
//! Owns at most one capture session. Every public operation checks the
//! session state explicitly; asynchronous backend failures arrive on a
//! channel and are drained at the start of each session-using operation (or
//! by calling [`CameraController::poll_failures`]).

use std::fs;
use std::mem;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};

use tracing::{debug, info, warn};

use crate::backend::{
    CameraFacing, CaptureBackend, CaptureFailure, CaptureSession, DeviceInfo, DevicePanel,
    ImageEncoding, PrimaryUse, StreamKind, StreamProperties, VideoProfile, VideoQuality,
};
use crate::config::ControllerConfig;
use crate::error::{CameraError, Result};
use crate::imaging::{rotate, write_jpeg, PixelBitmap};
use crate::negotiation::{negotiate, EncodingSelection};
use crate::orientation::{rotation_for, DeviceOrientation, Rotation};
use crate::storage::{OutputStore, PHOTO_EXTENSION, VIDEO_EXTENSION};

enum SessionState<S> {
    Closed,
    Open(S),
    Disposing,
}

/// Record-stream format whose long axis matches the rotation.
///
/// Upright rotations (0°, 180°) keep height ≤ width; quarter turns keep
/// width ≤ height.
///
/// # Arguments
///
/// * `properties` - Negotiated video format, in either shape
/// * `rotation` - Record rotation for the current orientation
///
/// # Returns
///
/// `properties`, transposed when its shape disagrees with `rotation`.
#[must_use]
pub fn record_properties_for(properties: StreamProperties, rotation: Rotation) -> StreamProperties {
    let (width, height) = (properties.width(), properties.height());
    let swap = if rotation.is_quarter_turn() {
        width > height
    } else {
        height > width
    };
    if swap {
        properties.transposed()
    } else {
        properties
    }
}

/// Recording profile shaped like [`record_properties_for`] shapes formats.
fn profile_for(profile: VideoProfile, rotation: Rotation) -> VideoProfile {
    let swap = if rotation.is_quarter_turn() {
        profile.width > profile.height
    } else {
        profile.height > profile.width
    };
    if swap {
        VideoProfile {
            width: profile.height,
            height: profile.width,
            ..profile
        }
    } else {
        profile
    }
}

/// Device on the requested panel, else the first device at all.
fn resolve_device(devices: &[DeviceInfo], facing: CameraFacing) -> Result<&DeviceInfo> {
    devices
        .iter()
        .find(|device| device.panel.matches(facing))
        .or_else(|| devices.first())
        .ok_or(CameraError::DeviceNotFound(facing))
}

fn session_init(err: CameraError) -> CameraError {
    match err {
        CameraError::SessionInit(_) => err,
        other => CameraError::SessionInit(other.to_string()),
    }
}

fn apply_record_orientation<S: CaptureSession>(
    session: &mut S,
    properties: Option<StreamProperties>,
    rotation: Rotation,
) -> Result<()> {
    if let Some(properties) = properties {
        let oriented = record_properties_for(properties, rotation);
        session.set_stream_properties(StreamKind::VideoRecord, &oriented)?;
    }
    session.set_record_rotation(rotation)
}

/// Drives one camera for photo and video capture.
pub struct CameraController<B: CaptureBackend> {
    backend: B,
    config: ControllerConfig,
    store: OutputStore,
    state: SessionState<B::Session>,
    failures: Option<Receiver<CaptureFailure>>,
    facing: CameraFacing,
    orientation: DeviceOrientation,
    primary_use: Option<PrimaryUse>,
    encoding: Option<EncodingSelection>,
    camera_available: bool,
    front_facing_available: bool,
    flash_available: bool,
    torch_available: bool,
    recording: bool,
    previewing: bool,
}

impl<B: CaptureBackend> CameraController<B> {
    /// Controller over `backend`; no session is opened until `initialize`.
    pub fn new(backend: B, config: ControllerConfig) -> Self {
        Self {
            backend,
            store: OutputStore::new(config.output_dir.clone()),
            orientation: config.initial_orientation,
            config,
            state: SessionState::Closed,
            failures: None,
            facing: CameraFacing::default(),
            primary_use: None,
            encoding: None,
            camera_available: false,
            front_facing_available: false,
            flash_available: false,
            torch_available: false,
            recording: false,
            previewing: false,
        }
    }

    /// Open a session on the active camera, replacing any open one.
    ///
    /// # Errors
    ///
    /// [`CameraError::DeviceNotFound`] when the system has no camera at all;
    /// [`CameraError::SessionInit`] when opening or configuring the session
    /// fails.
    pub fn initialize(&mut self, primary_use: PrimaryUse, quality: VideoQuality) -> Result<()> {
        self.dispose();
        self.flash_available = false;
        self.torch_available = false;

        let devices = self.backend.enumerate_devices().map_err(session_init)?;
        self.camera_available = !devices.is_empty();
        self.front_facing_available = devices
            .iter()
            .any(|device| device.panel == DevicePanel::Front);

        let device = resolve_device(&devices, self.facing)?.clone();
        info!(
            "opening {} camera on device {} ({})",
            self.facing, device.id, device.name
        );

        let mut session = self.backend.open_session(&device).map_err(session_init)?;
        let selection = match self.configure(&mut session, primary_use, quality) {
            Ok(selection) => selection,
            Err(err) => {
                if let Err(close_err) = session.close() {
                    warn!("failed to release half-configured session: {close_err}");
                }
                return Err(session_init(err));
            }
        };

        let (notifier, failures) = mpsc::channel();
        session.set_failure_notifier(Some(notifier));
        self.failures = Some(failures);
        self.encoding = Some(selection);
        self.primary_use = Some(primary_use);
        self.state = SessionState::Open(session);
        Ok(())
    }

    fn configure(
        &mut self,
        session: &mut B::Session,
        primary_use: PrimaryUse,
        quality: VideoQuality,
    ) -> Result<EncodingSelection> {
        let baseline = EncodingSelection::baseline(quality, self.config.jpeg_quality);
        let selection = Self::select_encoding_properties(session, primary_use, baseline, quality)?;
        debug!("negotiated encodings: {selection:?}");

        let rotation = self.rotation();
        session.set_preview_rotation(rotation)?;

        match primary_use {
            PrimaryUse::Photo => {
                if let Some(properties) = selection.photo_properties {
                    session.set_stream_properties(StreamKind::Photo, &properties)?;
                }
                self.flash_available = session.flash_supported();
            }
            PrimaryUse::Video => {
                if let Some(properties) = selection.video_properties {
                    session.set_stream_properties(StreamKind::VideoPreview, &properties)?;
                    session.set_stream_properties(StreamKind::VideoRecord, &properties)?;
                }
                apply_record_orientation(session, selection.video_properties, rotation)?;
                self.torch_available = session.torch_supported();
            }
        }
        Ok(selection)
    }

    /// Negotiate the encodings for one capture use against the session's
    /// reported capabilities. Only the streams of that use are consulted.
    ///
    /// # Arguments
    ///
    /// * `session` - Open session to query
    /// * `capture_use` - Photo consults the photo stream, video the preview stream
    /// * `baseline` - Encodings kept when nothing qualifies
    /// * `quality` - Video tier bounding the candidate size
    ///
    /// # Errors
    ///
    /// Whatever the session returns while listing capabilities.
    pub fn select_encoding_properties(
        session: &B::Session,
        capture_use: PrimaryUse,
        baseline: EncodingSelection,
        quality: VideoQuality,
    ) -> Result<EncodingSelection> {
        Ok(match capture_use {
            PrimaryUse::Photo => {
                let caps = session.available_properties(StreamKind::Photo)?;
                negotiate(baseline, &caps, &[], quality)
            }
            PrimaryUse::Video => {
                let caps = session.available_properties(StreamKind::VideoPreview)?;
                negotiate(baseline, &[], &caps, quality)
            }
        })
    }

    /// Switch between the front and back camera and reopen the session.
    ///
    /// # Errors
    ///
    /// Same as [`CameraController::initialize`].
    pub fn change_camera(&mut self, primary_use: PrimaryUse, quality: VideoQuality) -> Result<()> {
        self.facing = self.facing.toggled();
        self.initialize(primary_use, quality)
    }

    /// Reshape the record stream for `rotation` and apply the rotation to the
    /// record path.
    ///
    /// # Errors
    ///
    /// [`CameraError::NoSession`] without an open session, otherwise whatever
    /// the session returns while rebinding the record stream.
    pub fn set_record_orientation(&mut self, rotation: Rotation) -> Result<()> {
        self.poll_failures();
        let SessionState::Open(session) = &mut self.state else {
            return Err(CameraError::NoSession);
        };
        let properties = self.encoding.and_then(|e| e.video_properties);
        apply_record_orientation(session, properties, rotation)
    }

    /// Take a photo into a fresh `.jpg` file.
    ///
    /// Returns `None` when no file could be allocated. A capture failure after
    /// allocation still returns the path; its contents may be incomplete.
    pub fn capture_photo(&mut self) -> Option<PathBuf> {
        self.poll_failures();
        let SessionState::Open(session) = &mut self.state else {
            warn!("capture_photo without an open session");
            return None;
        };

        let path = match self.store.allocate(PHOTO_EXTENSION) {
            Ok(path) => path,
            Err(err) => {
                warn!("could not allocate photo file: {err}");
                return None;
            }
        };

        let encoding = self
            .encoding
            .map_or_else(|| ImageEncoding::jpeg(self.config.jpeg_quality), |e| e.image);
        if let Err(err) = session.capture_photo(&encoding, &path) {
            warn!("photo capture into {} failed: {err}", path.display());
        }
        Some(path)
    }

    /// Encode a cropped BGRA bitmap to a fresh `.jpg` file.
    ///
    /// Returns `Ok(None)` when no bitmap is given.
    pub fn save_cropped_image(&self, bitmap: Option<&PixelBitmap>) -> Result<Option<PathBuf>> {
        self.save_bitmap(bitmap, Rotation::None)
    }

    /// Rotate a cropped BGRA bitmap clockwise by `degrees` and encode it.
    ///
    /// The rotation is applied to the pixel buffer before the single encode.
    ///
    /// # Errors
    ///
    /// [`CameraError::InvalidRotation`] unless `degrees` is 0, 90, 180 or 270.
    pub fn save_and_rotate_image(
        &self,
        bitmap: Option<&PixelBitmap>,
        degrees: u32,
    ) -> Result<Option<PathBuf>> {
        if bitmap.is_none() {
            return Ok(None);
        }
        let rotation =
            Rotation::from_degrees(degrees).ok_or(CameraError::InvalidRotation(degrees))?;
        self.save_bitmap(bitmap, rotation)
    }

    fn save_bitmap(
        &self,
        bitmap: Option<&PixelBitmap>,
        rotation: Rotation,
    ) -> Result<Option<PathBuf>> {
        let Some(bitmap) = bitmap else {
            return Ok(None);
        };
        let path = self.store.allocate(PHOTO_EXTENSION)?;
        let image = rotate(&bitmap.to_rgb(), rotation);
        write_jpeg(&image, self.config.jpeg_quality, &path)?;
        debug!(
            "saved {}x{} bitmap to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(Some(path))
    }

    /// Start recording into a fresh `.mp4` file.
    ///
    /// The record orientation is recomputed first since the device may have
    /// turned since the session was opened.
    ///
    /// # Errors
    ///
    /// [`CameraError::NoSession`] without an open session; I/O errors when no
    /// output file can be allocated; whatever the session returns when the
    /// recording cannot start, in which case the allocated file is removed.
    pub fn start_video_recording(&mut self) -> Result<PathBuf> {
        self.poll_failures();
        let rotation = self.rotation();
        let SessionState::Open(session) = &mut self.state else {
            return Err(CameraError::NoSession);
        };

        let selection = self.encoding.ok_or(CameraError::NoSession)?;
        apply_record_orientation(session, selection.video_properties, rotation)?;

        let path = self.store.allocate(VIDEO_EXTENSION)?;
        let profile = profile_for(selection.video, rotation);
        if let Err(err) = session.start_recording(&profile, &path) {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!("could not remove {}: {remove_err}", path.display());
            }
            return Err(err);
        }
        self.recording = true;
        info!("recording to {}", path.display());
        Ok(path)
    }

    /// Stop the current recording, if any. The recording flag is always
    /// cleared.
    ///
    /// # Errors
    ///
    /// Whatever the session returns while finalizing the file.
    pub fn stop_video_recording(&mut self) -> Result<()> {
        let result = match (&mut self.state, self.recording) {
            (SessionState::Open(session), true) => session.stop_recording(),
            _ => Ok(()),
        };
        self.recording = false;
        result
    }

    /// Start the preview unless it is already running.
    ///
    /// # Errors
    ///
    /// [`CameraError::NoSession`] without an open session, otherwise whatever
    /// the session returns.
    pub fn start_preview(&mut self) -> Result<()> {
        self.poll_failures();
        if self.previewing {
            return Ok(());
        }
        let SessionState::Open(session) = &mut self.state else {
            return Err(CameraError::NoSession);
        };
        session.start_preview()?;
        self.previewing = true;
        Ok(())
    }

    /// Stop the preview unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Whatever the session returns; the preview flag stays set in that case.
    pub fn stop_preview(&mut self) -> Result<()> {
        if !self.previewing {
            return Ok(());
        }
        if let SessionState::Open(session) = &mut self.state {
            session.stop_preview()?;
        }
        self.previewing = false;
        Ok(())
    }

    /// Record a new device orientation and re-rotate the open session's
    /// preview and record paths. Without a session only the orientation is
    /// remembered.
    ///
    /// # Errors
    ///
    /// Whatever the session returns while applying the new rotation.
    pub fn change_orientation(&mut self, orientation: DeviceOrientation) -> Result<()> {
        self.orientation = orientation;
        self.poll_failures();
        let rotation = self.rotation();
        let SessionState::Open(session) = &mut self.state else {
            return Ok(());
        };
        debug!("orientation {orientation:?} -> rotation {rotation}");
        session.set_preview_rotation(rotation)?;
        apply_record_orientation(session, self.encoding.and_then(|e| e.video_properties), rotation)
    }

    /// Tear down the session: stop recording, stop preview, detach the
    /// failure listener and release the native session.
    ///
    /// Idempotent. A preview that refuses to stop is logged and the session is
    /// released anyway.
    pub fn dispose(&mut self) {
        match mem::replace(&mut self.state, SessionState::Disposing) {
            SessionState::Open(mut session) => {
                if self.recording {
                    if let Err(err) = session.stop_recording() {
                        warn!("stopping recording during dispose failed: {err}");
                    }
                }
                self.recording = false;

                if self.previewing {
                    if let Err(err) = session.stop_preview() {
                        warn!("preview did not stop cleanly, releasing session anyway: {err}");
                    }
                }
                self.previewing = false;

                session.set_failure_notifier(None);
                self.failures = None;
                self.encoding = None;
                self.primary_use = None;
                if let Err(err) = session.close() {
                    warn!("releasing capture session failed: {err}");
                }
                info!("capture session released");
            }
            SessionState::Closed => {}
            SessionState::Disposing => {
                debug!("dispose already in progress");
                return;
            }
        }
        self.state = SessionState::Closed;
    }

    /// Drain asynchronous failures. On the first one the session is released
    /// and the controller is left without a session.
    ///
    /// Every session-using operation and the session, recording and preview
    /// flags call this first, so a host only needs it to learn about a
    /// failure without touching the controller otherwise.
    pub fn poll_failures(&mut self) -> Option<CaptureFailure> {
        let failure = self.failures.as_ref()?.try_recv().ok()?;
        warn!("capture failed: {}; releasing session", failure.message);

        self.failures = None;
        if let SessionState::Open(mut session) = mem::replace(&mut self.state, SessionState::Closed)
        {
            session.set_failure_notifier(None);
            if let Err(err) = session.close() {
                warn!("releasing failed session: {err}");
            }
        }
        self.recording = false;
        self.previewing = false;
        self.encoding = None;
        self.primary_use = None;
        Some(failure)
    }

    /// Rotation for the current orientation and facing.
    pub const fn rotation(&self) -> Rotation {
        rotation_for(self.orientation, self.facing)
    }

    /// Camera the controller drives.
    pub const fn active_camera(&self) -> CameraFacing {
        self.facing
    }

    /// Last reported device orientation.
    pub const fn orientation(&self) -> DeviceOrientation {
        self.orientation
    }

    /// Whether a session is open. Pending failures are applied first.
    pub fn is_session_open(&mut self) -> bool {
        self.poll_failures();
        matches!(self.state, SessionState::Open(_))
    }

    /// The open session, if any.
    pub const fn session(&self) -> Option<&B::Session> {
        match &self.state {
            SessionState::Open(session) => Some(session),
            SessionState::Closed | SessionState::Disposing => None,
        }
    }

    /// The backend sessions are opened on.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Use the open session was initialized for.
    pub const fn primary_use(&self) -> Option<PrimaryUse> {
        self.primary_use
    }

    /// Encodings negotiated by the last `initialize`.
    pub const fn encoding_selection(&self) -> Option<&EncodingSelection> {
        self.encoding.as_ref()
    }

    /// Whether the last enumeration found any camera.
    pub const fn is_camera_available(&self) -> bool {
        self.camera_available
    }

    /// Whether the last enumeration found a front-facing camera.
    pub const fn is_front_facing_available(&self) -> bool {
        self.front_facing_available
    }

    /// Whether the photo session's camera has a flash.
    pub const fn is_flash_available(&self) -> bool {
        self.flash_available
    }

    /// Whether the video session's camera has a torch.
    pub const fn is_torch_available(&self) -> bool {
        self.torch_available
    }

    /// Whether a recording is in progress. Pending failures are applied
    /// first.
    pub fn is_recording(&mut self) -> bool {
        self.poll_failures();
        self.recording
    }

    /// Whether the preview is running. Pending failures are applied first.
    pub fn is_previewing(&mut self) -> bool {
        self.poll_failures();
        self.previewing
    }
}

impl<B: CaptureBackend> Drop for CameraController<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
