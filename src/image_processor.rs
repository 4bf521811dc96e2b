//! Decoding, validation, resizing and rotation of uploaded photos.
//!
//! Every stored blob is re-encoded as JPEG; the dimensions reported for a
//! blob are read back from the encoded bytes rather than trusted from the
//! pre-encode image or the uploader.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

use crate::config::PhotoConfig;

/// Clockwise quarter turns accepted by the rotate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAngle {
    Rotate90,
    Rotate180,
    Rotate270,
}

impl RotationAngle {
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees {
            90 => Some(RotationAngle::Rotate90),
            180 => Some(RotationAngle::Rotate180),
            270 => Some(RotationAngle::Rotate270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            RotationAngle::Rotate90 => 90,
            RotationAngle::Rotate180 => 180,
            RotationAngle::Rotate270 => 270,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image: {0}")]
    Invalid(String),
    #[error("Image processing failed: {0}")]
    Processing(String),
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ProcessedPhoto {
    pub full: EncodedImage,
    pub thumbnail: EncodedImage,
}

#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_upload_bytes: usize,
    max_dimension: u32,
    thumbnail_dimension: u32,
    jpeg_quality: u8,
}

impl ImageProcessor {
    pub fn new(config: &PhotoConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            max_dimension: config.max_photo_dimension.max(1),
            thumbnail_dimension: config.thumbnail_dimension.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    /// Checks size and format, then decodes.
    pub fn validate(&self, bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Invalid("empty upload".to_string()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ImageError::Invalid(format!(
                "upload is {} bytes, limit is {}",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        let format = image::guess_format(bytes)
            .map_err(|_| ImageError::Invalid("unrecognized image format".to_string()))?;
        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) {
            return Err(ImageError::Invalid(format!(
                "unsupported format {:?}, expected JPEG, PNG or WebP",
                format
            )));
        }

        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ImageError::Invalid(format!("failed to decode image: {}", e)))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(ImageError::Invalid("image has no pixels".to_string()));
        }

        Ok(img)
    }

    /// Produces the stored full-size image and its thumbnail.
    pub fn process(&self, img: &DynamicImage) -> Result<ProcessedPhoto, ImageError> {
        let full = self.encode_jpeg(&fit_within(img, self.max_dimension))?;
        let thumbnail = self.encode_jpeg(&fit_within(img, self.thumbnail_dimension))?;
        Ok(ProcessedPhoto { full, thumbnail })
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<EncodedImage, ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality);
        // JPEG has no alpha channel.
        img.to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|e| ImageError::Processing(format!("JPEG encoding failed: {}", e)))?;
        let bytes = buffer.into_inner();

        let (width, height) = encoded_dimensions(&bytes)?;
        Ok(EncodedImage {
            bytes,
            width,
            height,
        })
    }
}

/// Downscales so neither side exceeds `max_side`, keeping the aspect ratio.
/// Smaller images are left as they are.
fn fit_within(img: &DynamicImage, max_side: u32) -> DynamicImage {
    if img.width() <= max_side && img.height() <= max_side {
        img.clone()
    } else {
        img.thumbnail(max_side, max_side)
    }
}

fn encoded_dimensions(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Processing(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ImageError::Processing(format!("encoded image unreadable: {}", e)))
}

/// Turns the image clockwise by the requested angle.
///
/// A mathematical rotation by +N degrees is counter-clockwise, so a user's
/// "rotate by N" is applied as -N. The quarter-turn helpers below already
/// turn clockwise and grow the canvas, swapping width and height for 90 and
/// 270.
pub fn rotate_clockwise(img: &DynamicImage, angle: RotationAngle) -> DynamicImage {
    match angle {
        RotationAngle::Rotate90 => img.rotate90(),
        RotationAngle::Rotate180 => img.rotate180(),
        RotationAngle::Rotate270 => img.rotate270(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn processor() -> ImageProcessor {
        ImageProcessor::new(&PhotoConfig {
            max_upload_bytes: 5 * 1024 * 1024,
            max_photo_dimension: 1024,
            thumbnail_dimension: 120,
            jpeg_quality: 80,
            default_server_id: 1,
        })
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _y| Rgb([(x % 255) as u8, 0, 0]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
    }

    #[test]
    fn test_rotation_angle_from_degrees() {
        assert_eq!(RotationAngle::from_degrees(90), Some(RotationAngle::Rotate90));
        assert_eq!(RotationAngle::from_degrees(270).unwrap().degrees(), 270);
        for invalid in [0, 45, -90, 360, 450] {
            assert_eq!(RotationAngle::from_degrees(invalid), None);
        }
    }

    #[test]
    fn test_validate_rejects_garbage_and_oversize() {
        let processor = processor();
        assert!(matches!(processor.validate(&[]), Err(ImageError::Invalid(_))));
        assert!(matches!(
            processor.validate(b"definitely not an image"),
            Err(ImageError::Invalid(_))
        ));

        // Truncated JPEG: right magic bytes, undecodable body.
        let mut truncated = jpeg(64, 64);
        truncated.truncate(40);
        assert!(matches!(processor.validate(&truncated), Err(ImageError::Invalid(_))));

        let small_limit = ImageProcessor::new(&PhotoConfig {
            max_upload_bytes: 10,
            ..PhotoConfig::default()
        });
        assert!(matches!(
            small_limit.validate(&jpeg(64, 64)),
            Err(ImageError::Invalid(_))
        ));
    }

    #[test]
    fn test_process_keeps_small_images_and_builds_thumbnail() {
        let processor = processor();
        let img = processor.validate(&jpeg(800, 600)).unwrap();
        let processed = processor.process(&img).unwrap();

        assert_eq!((processed.full.width, processed.full.height), (800, 600));
        assert_eq!(
            (processed.thumbnail.width, processed.thumbnail.height),
            (120, 90)
        );
        assert_eq!(
            image::guess_format(&processed.full.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_process_downscales_large_images() {
        let processor = processor();
        let img = processor.validate(&jpeg(2048, 1024)).unwrap();
        let processed = processor.process(&img).unwrap();
        assert_eq!((processed.full.width, processed.full.height), (1024, 512));
    }

    #[test]
    fn test_png_with_alpha_becomes_jpeg() {
        let processor = processor();
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(40, 20, |_x, _y| Rgba([0, 128, 255, 100]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let decoded = processor.validate(&bytes).unwrap();
        let processed = processor.process(&decoded).unwrap();
        assert_eq!((processed.full.width, processed.full.height), (40, 20));
        assert_eq!(
            image::guess_format(&processed.thumbnail.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_rotate_clockwise_moves_top_left_to_top_right() {
        let mut img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        let img = DynamicImage::ImageRgb8(img);

        let rotated = rotate_clockwise(&img, RotationAngle::Rotate90).to_rgb8();
        assert_eq!(rotated.dimensions(), (2, 4));
        assert_eq!(rotated.get_pixel(1, 0), &Rgb([255, 255, 255]));

        let half = rotate_clockwise(&img, RotationAngle::Rotate180);
        assert_eq!((half.width(), half.height()), (4, 2));

        let three_quarters = rotate_clockwise(&img, RotationAngle::Rotate270).to_rgb8();
        assert_eq!(three_quarters.get_pixel(0, 3), &Rgb([255, 255, 255]));
    }
}
