use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{codecs::jpeg::JpegDecoder, DynamicImage, ImageDecoder, ImageFormat};
use std::io::Cursor;

const CONTRAST_BOOST: f32 = 12.0;
/// 手机拍摄的化验单常超过 4000px，识别前缩到此长边
const MAX_OCR_SIDE: u32 = 2800;

/// 识别前预处理：按 EXIF 摆正、限制尺寸、灰度化并增强对比度，统一输出 PNG
pub fn preprocess_bytes(input: &[u8]) -> Option<Vec<u8>> {
    let format = image::guess_format(input).ok()?;
    let mut image = image::load_from_memory(input).ok()?;

    if let Some(orientation) = read_orientation(input, format) {
        image.apply_orientation(orientation);
    }

    if image.width().max(image.height()) > MAX_OCR_SIDE {
        image = image.resize(MAX_OCR_SIDE, MAX_OCR_SIDE, FilterType::Triangle);
    }

    let gray = image.to_luma8();
    let adjusted = imageops::contrast(&gray, CONTRAST_BOOST);
    encode_png(&DynamicImage::ImageLuma8(adjusted))
}

/// 生成预览缩略图（PNG），长边不超过 `max_side`
pub fn thumbnail_png(input: &[u8], max_side: u32) -> Option<Vec<u8>> {
    let format = image::guess_format(input).ok()?;
    let mut image = image::load_from_memory(input).ok()?;
    if let Some(orientation) = read_orientation(input, format) {
        image.apply_orientation(orientation);
    }
    encode_png(&image.thumbnail(max_side, max_side))
}

fn encode_png(image: &DynamicImage) -> Option<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png).ok()?;
    Some(cursor.into_inner())
}

fn read_orientation(bytes: &[u8], format: ImageFormat) -> Option<Orientation> {
    match format {
        ImageFormat::Jpeg => {
            let mut decoder = JpegDecoder::new(Cursor::new(bytes)).ok()?;
            decoder
                .orientation()
                .ok()
                .filter(|orientation| *orientation != Orientation::NoTransforms)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40])));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Jpeg).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn preprocess_outputs_grayscale_png() {
        let out = preprocess_bytes(&jpeg(120, 80)).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (120, 80));
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn thumbnail_keeps_aspect_ratio() {
        let out = thumbnail_png(&jpeg(800, 400), 256).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (256, 128));
    }

    #[test]
    fn garbage_input_is_not_preprocessed() {
        assert!(preprocess_bytes(b"not an image").is_none());
        assert!(thumbnail_png(b"not an image", 64).is_none());
    }
}
