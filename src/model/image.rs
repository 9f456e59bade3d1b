use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;

/// 会话中的一张化验单图片
///
/// 身份即其在图片序列中的下标；预览文件随本结构体一起释放
#[derive(Debug)]
pub struct UploadedImage {
    bytes: Arc<[u8]>,
    content_type: String,
    file_name: Option<String>,
    preview: PreviewHandle,
}

impl UploadedImage {
    /// 接收上传内容并生成预览
    pub fn ingest(
        bytes: Vec<u8>,
        content_type: impl Into<String>,
        file_name: Option<String>,
        preview_max_side: u32,
        preview_dir: Option<&Path>,
    ) -> io::Result<Self> {
        let content_type = content_type.into();
        let preview = PreviewHandle::derive(&bytes, &content_type, preview_max_side, preview_dir)?;
        Ok(Self {
            bytes: Arc::from(bytes),
            content_type,
            file_name,
            preview,
        })
    }

    pub fn payload(&self) -> ImagePayload {
        ImagePayload {
            bytes: self.bytes.clone(),
            content_type: self.content_type.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }
}

/// 交给 OCR 的只读图片数据（共享底层字节，不复制）
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

/// 预览句柄：缩略图写入临时文件，drop 时删除
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
    content_type: &'static str,
}

impl PreviewHandle {
    /// 生成 PNG 缩略图；无法解码时退回原始字节
    pub fn derive(
        bytes: &[u8],
        content_type: &str,
        max_side: u32,
        dir: Option<&Path>,
    ) -> io::Result<Self> {
        let (data, preview_type) = match ocr_conn::preprocess::thumbnail_png(bytes, max_side) {
            Some(png) => (png, "image/png"),
            None => (bytes.to_vec(), static_image_type(content_type)),
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix("lab-preview-");
        let mut file = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        file.write_all(&data)?;
        file.flush()?;

        Ok(Self {
            file,
            content_type: preview_type,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// 读取预览内容
    pub fn read(&self) -> io::Result<Vec<u8>> {
        let mut handle = self.file.reopen()?;
        handle.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        handle.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

fn static_image_type(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "image/jpeg",
        "image/png" => "image/png",
        "image/webp" => "image/webp",
        "image/gif" => "image/gif",
        "image/bmp" => "image/bmp",
        "image/tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    pub(crate) fn sample_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(600, 300));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn preview_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let image =
            UploadedImage::ingest(sample_png(), "image/png", None, 128, Some(dir.path())).unwrap();
        let preview_path = image.preview().path().to_path_buf();
        assert!(preview_path.exists());

        let preview = image.preview().read().unwrap();
        let decoded = image::load_from_memory(&preview).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 64));

        drop(image);
        assert!(!preview_path.exists());
    }

    #[test]
    fn undecodable_payload_keeps_raw_preview() {
        let dir = tempfile::tempdir().unwrap();
        let image = UploadedImage::ingest(
            b"raw camera bytes".to_vec(),
            "image/heic",
            Some("foto.heic".to_string()),
            128,
            Some(dir.path()),
        )
        .unwrap();
        assert_eq!(image.preview().content_type(), "application/octet-stream");
        assert_eq!(image.preview().read().unwrap(), b"raw camera bytes");
        assert_eq!(image.file_name(), Some("foto.heic"));
    }

    #[test]
    fn payload_shares_bytes() {
        let image = UploadedImage::ingest(sample_png(), "image/png", None, 64, None).unwrap();
        let payload = image.payload();
        assert_eq!(payload.bytes.len(), image.len());
        assert_eq!(payload.content_type, "image/png");
    }
}
