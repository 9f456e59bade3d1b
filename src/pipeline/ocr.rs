use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ocr_conn::{EngineError, ExtractorPool, ImageData, OcrEngineOptions, PoolStats};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};

use crate::model::ImagePayload;
use crate::util::config::OcrEngineConfig;
use crate::util::logging::standards::events;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR 引擎错误: {0}")]
    Engine(#[from] EngineError),
    #[error("OCR 超时 ({0:?})")]
    Timeout(Duration),
    #[error("OCR 任务中断: {0}")]
    Join(String),
}

impl OcrError {
    /// 图片本身读不了，与引擎或连接故障区分开
    pub fn is_unreadable_image(&self) -> bool {
        matches!(self, OcrError::Engine(e) if e.is_data_error())
    }
}

/// 图片 → 文本，尽力而为
#[async_trait]
pub trait OcrExtractor: Send + Sync {
    async fn recognize(&self, image: &ImagePayload) -> Result<String, OcrError>;
}

/// 各图片的识别文本，按接收顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    fragments: Vec<String>,
}

impl ExtractedText {
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// 每段前加一个换行后拼接
    pub fn concatenated(&self) -> String {
        self.fragments.iter().fold(String::new(), |mut acc, fragment| {
            acc.push('\n');
            acc.push_str(fragment);
            acc
        })
    }
}

impl FromIterator<String> for ExtractedText {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            fragments: iter.into_iter().collect(),
        }
    }
}

/// 逐张顺序识别；任一张失败即结束
pub async fn extract_all(
    extractor: &dyn OcrExtractor,
    images: &[ImagePayload],
    per_image_timeout: Duration,
) -> Result<ExtractedText, OcrError> {
    let mut fragments = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        debug!(target: "pipeline.ocr", event = events::OCR_START, index, size = image.bytes.len());
        let started = Instant::now();
        let text = match tokio::time::timeout(per_image_timeout, extractor.recognize(image)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(target: "pipeline.ocr", event = events::OCR_ERROR, index, error = %e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    target: "pipeline.ocr",
                    event = events::OCR_ERROR,
                    index,
                    timeout_secs = per_image_timeout.as_secs()
                );
                return Err(OcrError::Timeout(per_image_timeout));
            }
        };
        info!(
            target: "pipeline.ocr",
            event = events::OCR_COMPLETE,
            index,
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        fragments.push(text);
    }
    Ok(ExtractedText { fragments })
}

/// PaddleOCR-json 引擎池适配
#[derive(Clone)]
pub struct PaddleOcrExtractor {
    pool: ExtractorPool,
}

impl PaddleOcrExtractor {
    pub fn from_config(config: &OcrEngineConfig) -> Self {
        let opts = OcrEngineOptions {
            work_dir: config.work_dir.as_ref().map(PathBuf::from),
            binary: config.binary.as_ref().map(PathBuf::from),
            lib_path: config.lib_path.as_ref().map(PathBuf::from),
            timeout_secs: config.timeout_secs,
        };
        Self {
            pool: ExtractorPool::new(config.pool_size, opts),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[async_trait]
impl OcrExtractor for PaddleOcrExtractor {
    async fn recognize(&self, image: &ImagePayload) -> Result<String, OcrError> {
        let mut handle = self.pool.acquire().await?;
        let bytes = image.bytes.clone();
        // 预处理与引擎往返都是阻塞调用
        task::spawn_blocking(move || handle.recognize_text(ImageData::from_bytes(&bytes[..])))
            .await
            .map_err(|e| OcrError::Join(e.to_string()))?
            .map_err(OcrError::from)
    }
}
