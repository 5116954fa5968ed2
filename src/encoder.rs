use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, RgbImage};

use crate::errors::{Result, SegError};

/// Encode as PNG and wrap the bytes in standard base64 so the image can be
/// embedded in a JSON document.
pub fn encode_png(image: &RgbImage) -> Result<String> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SegError::Encode {
            reason: format!("cannot encode an empty {width}x{height} image"),
            source: None,
        });
    }

    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| SegError::Encode {
            reason: "PNG encoding failed".to_string(),
            source: Some(e),
        })?;

    Ok(STANDARD.encode(buf.into_inner()))
}

/// Inverse of [`encode_png`].
pub fn decode_png(text: &str) -> Result<RgbImage> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|e| SegError::decode(format!("invalid base64 payload: {e}")))?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|e| {
        SegError::Decode {
            reason: "invalid PNG payload".to_string(),
            source: Some(e),
        }
    })?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_encoded_png_is_lossless() {
        let image = RgbImage::from_fn(13, 9, |x, y| Rgb([x as u8 * 19, y as u8 * 27, 200]));
        let text = encode_png(&image).unwrap();

        assert!(text.is_ascii());
        assert_eq!(decode_png(&text).unwrap(), image);
    }

    #[test]
    fn test_png_signature() {
        let text = encode_png(&RgbImage::new(1, 1)).unwrap();
        let bytes = STANDARD.decode(text).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_empty_image_is_an_encode_error() {
        let err = encode_png(&RgbImage::new(0, 4)).unwrap_err();
        assert_eq!(err.kind(), "EncodeError");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_png("***").is_err());
        assert!(decode_png(&STANDARD.encode(b"not a png")).is_err());
    }
}
