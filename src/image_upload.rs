use std::sync::Arc;

use image::ImageFormat;
use rocket::http::ContentType;
use rocket::serde::Serialize;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::MAX_DISPLAY_WIDTH;

#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    #[error("no image data was uploaded")]
    Empty,
    #[error("image is larger than the {0} MiB upload limit")]
    TooLarge(u64),
    #[error("unsupported image format, upload a jpg or png")]
    Unsupported,
    #[error("could not decode image: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadFormat {
    Png,
    Jpeg,
}

impl UploadFormat {
    pub fn content_type(self) -> ContentType {
        match self {
            UploadFormat::Png => ContentType::PNG,
            UploadFormat::Jpeg => ContentType::JPEG,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            UploadFormat::Png => ImageFormat::Png,
            UploadFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Size of the uploaded image and of the canvas it is drawn on.
/// Line coordinates live in the display space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: UploadFormat,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "displayWidth")]
    pub display_width: u32,
    #[serde(rename = "displayHeight")]
    pub display_height: u32,
}

/// Encoded image as uploaded. The bytes are shared, so cloning a session
/// does not copy the image.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub info: ImageInfo,
    pub bytes: Arc<Vec<u8>>,
}

impl UploadedImage {
    pub fn decode(bytes: Vec<u8>) -> Result<UploadedImage, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let format = match image::guess_format(&bytes) {
            Ok(ImageFormat::Png) => UploadFormat::Png,
            Ok(ImageFormat::Jpeg) => UploadFormat::Jpeg,
            _ => return Err(ImageError::Unsupported),
        };
        let decoded = image::load_from_memory_with_format(&bytes, format.image_format())
            .map_err(|e| ImageError::Decode(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(ImageError::Decode("image has no pixels".to_string()));
        }
        let (display_width, display_height) = display_size(width, height);
        log::debug!(
            "decoded {:?} upload {}x{}, displayed at {}x{}",
            format,
            width,
            height,
            display_width,
            display_height
        );
        Ok(UploadedImage {
            info: ImageInfo {
                format,
                width,
                height,
                display_width,
                display_height,
            },
            bytes: Arc::new(bytes),
        })
    }
}

pub fn display_size(width: u32, height: u32) -> (u32, u32) {
    let display_width = width.min(MAX_DISPLAY_WIDTH);
    let display_height = (height as u64 * display_width as u64 / width as u64) as u32;
    (display_width, display_height)
}

#[cfg(test)]
pub fn encode_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_size_caps_width() {
        assert_eq!(display_size(1400, 1000), (700, 500));
        assert_eq!(display_size(1000, 333), (700, 233));
        assert_eq!(display_size(640, 480), (640, 480));
    }

    #[test]
    fn decode_png() {
        let bytes = encode_test_image(1400, 900, ImageFormat::Png);
        let img = UploadedImage::decode(bytes.clone()).unwrap();
        assert_eq!(
            img.info,
            ImageInfo {
                format: UploadFormat::Png,
                width: 1400,
                height: 900,
                display_width: 700,
                display_height: 450,
            }
        );
        assert_eq!(*img.bytes, bytes);
        assert_eq!(img.info.format.content_type(), ContentType::PNG);
    }

    #[test]
    fn decode_jpeg() {
        let bytes = encode_test_image(320, 240, ImageFormat::Jpeg);
        let img = UploadedImage::decode(bytes).unwrap();
        assert_eq!(img.info.format, UploadFormat::Jpeg);
        assert_eq!((img.info.display_width, img.info.display_height), (320, 240));
    }

    #[test]
    fn decode_rejects_bad_uploads() {
        assert_eq!(UploadedImage::decode(vec![]).unwrap_err(), ImageError::Empty);
        assert_eq!(
            UploadedImage::decode(b"GIF89a\x01\x00\x01\x00".to_vec()).unwrap_err(),
            ImageError::Unsupported
        );
        assert_eq!(
            UploadedImage::decode(b"not an image at all".to_vec()).unwrap_err(),
            ImageError::Unsupported
        );
        let mut truncated = encode_test_image(64, 64, ImageFormat::Png);
        truncated.truncate(40);
        assert!(matches!(
            UploadedImage::decode(truncated).unwrap_err(),
            ImageError::Decode(_)
        ));
    }
}
