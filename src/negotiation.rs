//! Encoding-property negotiation against hardware-reported capabilities.
//!
//! Photo and video sessions pick their stream formats differently:
//!
//! * Photo prefers the largest still format wider than 4:3, then the largest
//!   video format wider than 4:3, then the largest video format of any shape.
//! * Video prefers an exact match of the quality tier's size among an
//!   allow-list of raw subtypes, then the largest wider-than-4:3 format no
//!   bigger than the target, then the largest format no bigger than the target.
//!
//! Ties on pixel area go to the first candidate in enumeration order.

use crate::backend::{
    ImageEncoding, StreamProperties, VideoFormat, VideoProfile, VideoQuality,
};
use crate::traits::FourCC;

/// Candidates must be strictly wider than this to count as widescreen.
pub const MIN_ASPECT_RATIO: f64 = 1.34;

/// Raw subtypes accepted for video preview and recording.
pub const VIDEO_SUBTYPES: [FourCC; 4] = [FourCC::NV12, FourCC::YUYV, FourCC::RGB3, FourCC::XR24];

/// Stream formats chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingSelection {
    /// Still-image encoding for photo capture.
    pub image: ImageEncoding,
    /// Recording profile.
    pub video: VideoProfile,
    /// Format bound to the photo stream, if any was negotiated.
    pub photo_properties: Option<StreamProperties>,
    /// Format bound to the video streams, if any was negotiated.
    pub video_properties: Option<StreamProperties>,
}

impl EncodingSelection {
    /// Baseline selection before negotiation.
    #[must_use]
    pub const fn baseline(quality: VideoQuality, jpeg_quality: u8) -> Self {
        Self {
            image: ImageEncoding::jpeg(jpeg_quality),
            video: VideoProfile::for_quality(quality),
            photo_properties: None,
            video_properties: None,
        }
    }
}

/// Largest candidate by pixel area; the first one wins ties.
fn largest<'a, I>(candidates: I) -> Option<&'a StreamProperties>
where
    I: IntoIterator<Item = &'a StreamProperties>,
{
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current) if current.pixel_area() >= candidate.pixel_area() => Some(current),
        _ => Some(candidate),
    })
}

fn is_widescreen(properties: &StreamProperties) -> bool {
    properties.aspect_ratio() > MIN_ASPECT_RATIO
}

/// Pick the photo-stream format from the photo stream's capability list.
#[must_use]
pub fn select_photo_properties(available: &[StreamProperties]) -> Option<StreamProperties> {
    let stills = available
        .iter()
        .filter(|p| matches!(p, StreamProperties::Still(_)));
    let videos = || {
        available
            .iter()
            .filter(|p| matches!(p, StreamProperties::Video(_)))
    };

    largest(stills.filter(|p| is_widescreen(p)))
        .or_else(|| largest(videos().filter(|p| is_widescreen(p))))
        .or_else(|| largest(videos()))
        .copied()
}

/// Pick the video-stream format for a quality tier from the preview stream's
/// capability list.
///
/// # Arguments
///
/// * `available` - Formats the preview stream reports, in device order
/// * `quality` - Tier whose target size bounds the candidates
///
/// # Returns
///
/// An exact match of the target size if one exists, else the largest
/// widescreen format within it, else the largest format within it. Only
/// allow-listed video subtypes are considered; ties keep the earlier entry.
#[must_use]
pub fn select_video_properties(
    available: &[StreamProperties],
    quality: VideoQuality,
) -> Option<StreamProperties> {
    let (target_width, target_height) = quality.target_size();
    let allowed: Vec<&StreamProperties> = available
        .iter()
        .filter(|p| match p {
            StreamProperties::Video(VideoFormat { subtype, .. }) => {
                VIDEO_SUBTYPES.contains(subtype)
            }
            StreamProperties::Still(_) => false,
        })
        .collect();

    if let Some(exact) = allowed
        .iter()
        .find(|p| p.width() == target_width && p.height() == target_height)
    {
        return Some(**exact);
    }

    let fitting: Vec<&StreamProperties> = allowed
        .into_iter()
        .filter(|p| p.width() <= target_width && p.height() <= target_height)
        .collect();

    largest(fitting.iter().copied().filter(|p| is_widescreen(p)))
        .or_else(|| largest(fitting.iter().copied()))
        .copied()
}

/// Refine the baseline encodings against the session's capabilities.
///
/// # Arguments
///
/// * `baseline` - Encodings used where nothing qualifies
/// * `photo_caps` - Photo stream capabilities, empty for a video session
/// * `video_caps` - Preview stream capabilities, empty for a photo session
/// * `quality` - Video tier
///
/// # Returns
///
/// The baseline with image and video dimensions replaced by the selected
/// formats, which are recorded alongside for binding.
#[must_use]
pub fn negotiate(
    baseline: EncodingSelection,
    photo_caps: &[StreamProperties],
    video_caps: &[StreamProperties],
    quality: VideoQuality,
) -> EncodingSelection {
    let mut selection = baseline;

    if let Some(photo) = select_photo_properties(photo_caps) {
        selection.image.width = photo.width();
        selection.image.height = photo.height();
        selection.photo_properties = Some(photo);
    }

    if let Some(video) = select_video_properties(video_caps, quality) {
        selection.video.width = video.width();
        selection.video.height = video.height();
        if let StreamProperties::Video(VideoFormat { frame_rate, .. }) = video {
            if frame_rate > 0 {
                selection.video.frame_rate = frame_rate;
            }
        }
        selection.video_properties = Some(video);
    }

    selection
}
