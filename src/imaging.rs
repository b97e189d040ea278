//! Pixel conversion, rotation and JPEG output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::{imageops, ExtendedColorType, ImageFormat, RgbImage};

use crate::error::{CameraError, Result};
use crate::orientation::Rotation;
use crate::traits::{Format, FourCC, Frame};

/// Resolution written into every JPEG we produce.
pub const OUTPUT_DPI: u16 = 96;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// An in-memory BGRA8 bitmap, as handed over by a cropping UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBitmap {
    /// Wrap a BGRA8 buffer, checking it holds exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if width == 0 || height == 0 || data.len() as u64 != expected {
            return Err(CameraError::InvalidBitmap(format!(
                "{width}x{height} BGRA8 needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Drop alpha and reorder to RGB; JPEG has no alpha channel.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        let rgb: Vec<u8> = self
            .data
            .chunks_exact(4)
            .flat_map(|bgra| match *bgra {
                [b, g, r, _] => [r, g, b],
                _ => [0, 0, 0],
            })
            .collect();
        // Length was validated in `new`, so `from_raw` cannot fail here.
        RgbImage::from_raw(self.width, self.height, rgb)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

/// Rotate an image clockwise by a quarter-turn multiple.
#[must_use]
pub fn rotate(image: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Clockwise90 => imageops::rotate90(image),
        Rotation::Clockwise180 => imageops::rotate180(image),
        Rotation::Clockwise270 => imageops::rotate270(image),
    }
}

/// Encode `image` as a 96 DPI JPEG into `path` and flush it to disk.
pub fn write_jpeg(image: &RgbImage, quality: u8, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    {
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
        encoder.set_pixel_density(PixelDensity::dpi(OUTPUT_DPI));
        encoder.encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Convert a packed YUYV frame to RGB.
///
/// # Arguments
///
/// * `data` - Raw frame bytes
/// * `width` - Frame width in pixels, must be even
/// * `height` - Frame height in pixels
/// * `stride` - Bytes per row as reported by the driver, zero for unpadded rows
///
/// # Returns
///
/// The decoded image, or [`CameraError::CaptureFailed`] when the buffer is
/// shorter than the geometry requires.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> Result<RgbImage> {
    let row_bytes = width as usize * 2;
    let stride = if stride == 0 { row_bytes } else { stride as usize };
    let needed = (height as usize).saturating_sub(1) * stride + row_bytes;
    if width == 0 || width % 2 != 0 || stride < row_bytes || data.len() < needed {
        return Err(CameraError::CaptureFailed(format!(
            "YUYV frame {width}x{height} (stride {stride}) needs {needed} bytes, got {}",
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for row in data.chunks(stride).take(height as usize) {
        let Some(pixels) = row.get(..row_bytes) else {
            break;
        };
        // YUYV format: [Y0 U Y1 V] repeats, each pair of pixels shares U and V
        for chunk in pixels.chunks_exact(4) {
            if let [y0, u, y1, v] = *chunk {
                let (r0, g0, b0) = yuv_to_rgb(y0, u, v);
                let (r1, g1, b1) = yuv_to_rgb(y1, u, v);
                rgb.extend_from_slice(&[r0, g0, b0, r1, g1, b1]);
            }
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CameraError::CaptureFailed("YUYV conversion size mismatch".to_owned()))
}

/// Decode one captured frame into RGB.
///
/// MJPEG frames go through the JPEG decoder, YUYV frames are converted row by
/// row honouring the driver's stride. Any other fourcc is rejected.
pub fn decode_frame(format: &Format, frame: &Frame) -> Result<RgbImage> {
    if format.fourcc == FourCC::MJPG {
        let image = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)?;
        Ok(image.to_rgb8())
    } else if format.fourcc == FourCC::YUYV {
        yuyv_to_rgb(&frame.data, format.width, format.height, format.stride)
    } else {
        Err(CameraError::NotSupported(format!(
            "decoding {} frames",
            format.fourcc
        )))
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}
