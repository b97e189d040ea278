//! H.264 in MP4 through FFmpeg.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::{codec, encoder, format, frame, Dictionary, Packet, Rational};
use image::RgbImage;
use tracing::{debug, info};

use crate::backend::VideoProfile;
use crate::error::{CameraError, Result};
use crate::recorder::FrameSink;

/// Seconds of video between keyframes.
const KEYFRAME_SECONDS: u32 = 2;

fn encoding(err: ffmpeg::Error) -> CameraError {
    CameraError::Encoding(err.to_string())
}

/// Encodes RGB frames with libx264 (or whatever H.264 encoder libavcodec
/// provides) and muxes them into an MP4 file.
pub struct Mp4Sink {
    output: format::context::Output,
    encoder: encoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl Mp4Sink {
    /// Open the encoder and write the container header.
    ///
    /// # Arguments
    ///
    /// * `profile` - Frame size, rate and bitrate; width and height must be even
    /// * `path` - Output file, replaced if it exists
    ///
    /// # Returns
    ///
    /// The sink, or [`CameraError::Encoding`] when FFmpeg has no H.264 encoder
    /// or rejects the profile.
    pub fn create(profile: &VideoProfile, path: &Path) -> Result<Self> {
        let (width, height) = (profile.width, profile.height);
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(CameraError::Encoding(format!(
                "H.264 needs even, non-zero dimensions, got {width}x{height}"
            )));
        }

        ffmpeg::init().map_err(encoding)?;
        let mut output = format::output(path).map_err(encoding)?;
        let codec = encoder::find(codec::Id::H264)
            .ok_or_else(|| CameraError::Encoding("no H.264 encoder available".to_owned()))?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let frame_rate = profile.frame_rate.max(1);
        let rate = i32::try_from(frame_rate).unwrap_or(30);
        let time_base = Rational::new(1, rate);

        let mut context = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(encoding)?;
        context.set_width(width);
        context.set_height(height);
        context.set_format(Pixel::YUV420P);
        context.set_time_base(time_base);
        context.set_frame_rate(Some(Rational::new(rate, 1)));
        context.set_bit_rate(profile.bitrate as usize);
        context.set_gop(frame_rate * KEYFRAME_SECONDS);
        context.set_max_b_frames(0);
        if global_header {
            context.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("preset", "veryfast");
        let encoder = context.open_with(options).map_err(encoding)?;

        let stream_index = {
            let mut stream = output.add_stream(codec).map_err(encoding)?;
            stream.set_time_base(time_base);
            stream.set_parameters(&encoder);
            stream.index()
        };
        output.write_header().map_err(encoding)?;
        // The muxer may pick its own time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| CameraError::Encoding("video stream vanished".to_owned()))?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(encoding)?;

        info!(
            "H.264 {width}x{height} @ {frame_rate} fps, {} bit/s into {}",
            profile.bitrate,
            path.display()
        );
        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            width,
            height,
            pts: 0,
        })
    }

    fn drain(&mut self) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(encoding)?;
        }
        Ok(())
    }
}

impl FrameSink for Mp4Sink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != (self.width, self.height) {
            return Err(CameraError::Encoding(format!(
                "frame is {}x{}, stream is {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }

        let mut rgb = frame::Video::new(Pixel::RGB24, self.width, self.height);
        let stride = rgb.stride(0);
        let row_bytes = self.width as usize * 3;
        let rows = rgb
            .data_mut(0)
            .chunks_mut(stride)
            .zip(image.as_raw().chunks_exact(row_bytes));
        for (dst, src) in rows {
            if let Some(dst) = dst.get_mut(..row_bytes) {
                dst.copy_from_slice(src);
            }
        }

        let mut yuv = frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv).map_err(encoding)?;
        yuv.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder.send_frame(&yuv).map_err(encoding)?;
        self.drain()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoder.send_eof().map_err(encoding)?;
        self.drain()?;
        self.output.write_trailer().map_err(encoding)?;
        debug!("MP4 finalized after {} frames", self.pts);
        Ok(())
    }
}
