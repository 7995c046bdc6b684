//! Raw camera frames and JPEG data-URI encoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;
use tracing::trace;

/// Prefix of every encoded `image_stream` value.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Errors that can occur while encoding a frame.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Malformed frame {width}x{height}: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("JPEG encoding failed: {0}")]
    Codec(String),
}

/// Channel order of a packed 8-bit, 3-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    /// OpenCV-style capture order
    Bgr,
}

/// A raster frame supplied by the capture loop.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    order: PixelOrder,
    data: Bytes,
}

impl Frame {
    pub fn new(width: u32, height: u32, order: PixelOrder, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            order,
            data: data.into(),
        }
    }

    pub fn rgb(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self::new(width, height, PixelOrder::Rgb, data)
    }

    pub fn bgr(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self::new(width, height, PixelOrder::Bgr, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> PixelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte length a well-formed frame of these dimensions must have.
    fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
    }

    /// Copy the pixels into an RGB image, validating the buffer size.
    fn to_rgb_image(&self) -> Result<RgbImage, EncodeError> {
        let malformed = || EncodeError::MalformedFrame {
            width: self.width,
            height: self.height,
            expected: self.expected_len().unwrap_or(usize::MAX),
            actual: self.data.len(),
        };

        if self.width == 0 || self.height == 0 {
            return Err(malformed());
        }
        if self.expected_len() != Some(self.data.len()) {
            return Err(malformed());
        }

        let pixels = match self.order {
            PixelOrder::Rgb => self.data.to_vec(),
            PixelOrder::Bgr => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };

        RgbImage::from_raw(self.width, self.height, pixels).ok_or_else(malformed)
    }
}

/// Compresses frames into transport-ready JPEG data URIs.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    quality: u8,
    resize: Option<(u32, u32)>,
}

impl FrameEncoder {
    /// Create an encoder. Quality is clamped to the codec's 1-100 range.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            resize: None,
        }
    }

    /// Scale every frame to `width`x`height` before compression.
    pub fn with_resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some((width, height));
        self
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a frame as JPEG bytes.
    pub fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let mut rgb = frame.to_rgb_image()?;

        if let Some((width, height)) = self.resize {
            if (width, height) != (frame.width, frame.height) {
                rgb = imageops::resize(&rgb, width, height, FilterType::Triangle);
            }
        }

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(&rgb)
            .map_err(|e| EncodeError::Codec(e.to_string()))?;

        trace!(
            width = rgb.width(),
            height = rgb.height(),
            quality = self.quality,
            jpeg_bytes = buffer.len(),
            "Frame encoded"
        );

        Ok(buffer)
    }

    /// Encode a frame as `data:image/jpeg;base64,<payload>`.
    pub fn encode_data_uri(&self, frame: &Frame) -> Result<String, EncodeError> {
        let jpeg = self.encode_jpeg(frame)?;
        let mut uri = String::with_capacity(JPEG_DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        uri.push_str(JPEG_DATA_URI_PREFIX);
        STANDARD.encode_string(&jpeg, &mut uri);
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        Frame::bgr(width, height, data)
    }

    fn decode_uri(uri: &str) -> image::DynamicImage {
        let b64 = uri.strip_prefix(JPEG_DATA_URI_PREFIX).unwrap();
        let jpeg = STANDARD.decode(b64).unwrap();
        image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn test_encode_data_uri_prefix_and_dimensions() {
        let encoder = FrameEncoder::new(80);
        let uri = encoder.encode_data_uri(&gradient_frame(32, 24)).unwrap();

        assert!(uri.starts_with(JPEG_DATA_URI_PREFIX));
        assert!(uri.len() > JPEG_DATA_URI_PREFIX.len());

        let decoded = decode_uri(&uri);
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = FrameEncoder::new(80);
        let frame = gradient_frame(16, 16);
        assert_eq!(
            encoder.encode_data_uri(&frame).unwrap(),
            encoder.encode_data_uri(&frame).unwrap()
        );
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let frame = gradient_frame(64, 64);
        let high = FrameEncoder::new(95).encode_jpeg(&frame).unwrap();
        let low = FrameEncoder::new(10).encode_jpeg(&frame).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameEncoder::new(0).quality(), 1);
        assert_eq!(FrameEncoder::new(200).quality(), 100);
    }

    #[test]
    fn test_bgr_frames_are_swapped_to_rgb() {
        // Solid blue in BGR order
        let frame = Frame::bgr(8, 8, [255u8, 0, 0].repeat(64));
        let uri = FrameEncoder::new(100).encode_data_uri(&frame).unwrap();
        let px = decode_uri(&uri).to_rgb8().get_pixel(4, 4).0;

        assert!(px[2] > 200, "expected blue channel, got {:?}", px);
        assert!(px[0] < 50, "expected no red, got {:?}", px);
    }

    #[test]
    fn test_resize() {
        let encoder = FrameEncoder::new(80).with_resize(16, 12);
        let uri = encoder.encode_data_uri(&gradient_frame(64, 48)).unwrap();
        let decoded = decode_uri(&uri);
        assert_eq!((decoded.width(), decoded.height()), (16, 12));
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let encoder = FrameEncoder::new(80);

        let short = Frame::rgb(10, 10, vec![0u8; 299]);
        assert!(matches!(
            encoder.encode_data_uri(&short),
            Err(EncodeError::MalformedFrame { expected: 300, actual: 299, .. })
        ));

        let empty = Frame::rgb(0, 10, Vec::<u8>::new());
        assert!(matches!(
            encoder.encode_data_uri(&empty),
            Err(EncodeError::MalformedFrame { .. })
        ));
    }
}
