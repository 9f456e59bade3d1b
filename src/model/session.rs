use serde::Serialize;
use thiserror::Error;

use super::image::{ImagePayload, UploadedImage};
use crate::pipeline::messages;
use crate::pipeline::renderer::{RenderedOutcome, ResultRenderer};
use crate::util::config::MAX_IMAGES_CAP;

/// 会话操作错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("已达到图片上限 ({max})")]
    QuotaExceeded { max: usize },
    #[error("图片下标越界: {index} (共 {len} 张)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("不支持的文件类型: {0}")]
    UnsupportedMedia(String),
    #[error("预览生成失败: {0}")]
    Preview(#[from] std::io::Error),
    #[error("没有可导出的解读结果")]
    NoResult,
}

/// 图片配额：count 恒等于存活图片数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionQuota {
    count: usize,
    max: usize,
}

impl SessionQuota {
    pub fn new(max: usize) -> Self {
        Self {
            count: 0,
            max: max.clamp(1, MAX_IMAGES_CAP),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.max
    }

    fn increment(&mut self) -> Result<(), SessionError> {
        if self.is_full() {
            return Err(SessionError::QuotaExceeded { max: self.max });
        }
        self.count += 1;
        Ok(())
    }

    fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    fn clear(&mut self) {
        self.count = 0;
    }
}

/// 按接收顺序保存图片及其预览
#[derive(Debug)]
pub struct ImageStore {
    images: Vec<UploadedImage>,
    quota: SessionQuota,
}

impl ImageStore {
    pub fn new(max_images: usize) -> Self {
        Self {
            images: Vec::new(),
            quota: SessionQuota::new(max_images),
        }
    }

    /// 追加一张图片，返回其下标
    pub fn ingest(&mut self, image: UploadedImage) -> Result<usize, SessionError> {
        self.quota.increment()?;
        self.images.push(image);
        Ok(self.images.len() - 1)
    }

    /// 移除并返回指定图片；调用方丢弃返回值即释放预览
    pub fn remove(&mut self, index: usize) -> Result<UploadedImage, SessionError> {
        if index >= self.images.len() {
            return Err(SessionError::IndexOutOfRange {
                index,
                len: self.images.len(),
            });
        }
        let removed = self.images.remove(index);
        self.quota.decrement();
        Ok(removed)
    }

    pub fn reset(&mut self) {
        self.images.clear();
        self.quota.clear();
    }

    pub fn get(&self, index: usize) -> Option<&UploadedImage> {
        self.images.get(index)
    }

    pub fn images(&self) -> &[UploadedImage] {
        &self.images
    }

    pub fn payloads(&self) -> Vec<ImagePayload> {
        self.images.iter().map(UploadedImage::payload).collect()
    }

    pub fn quota(&self) -> SessionQuota {
        self.quota
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// 单个浏览器会话的全部状态
#[derive(Debug)]
pub struct SessionState {
    store: ImageStore,
    renderer: ResultRenderer,
    busy: bool,
    /// 清空图片时递增，用来识别过期的运行结果
    epoch: u64,
}

impl SessionState {
    pub fn new(max_images: usize) -> Self {
        Self {
            store: ImageStore::new(max_images),
            renderer: ResultRenderer::default(),
            busy: false,
            epoch: 0,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn renderer(&self) -> &ResultRenderer {
        &self.renderer
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn ingest(&mut self, image: UploadedImage) -> Result<usize, SessionError> {
        let index = self.store.ingest(image)?;
        debug_assert!(self.check_invariants().is_ok());
        Ok(index)
    }

    /// 移除图片；最后一张被移除时一并清除结果
    pub fn remove(&mut self, index: usize) -> Result<(), SessionError> {
        drop(self.store.remove(index)?);
        if self.store.is_empty() {
            self.renderer.clear();
            self.epoch += 1;
        }
        debug_assert!(self.check_invariants().is_ok());
        Ok(())
    }

    /// “分析另一份报告”：清空图片、预览与结果
    pub fn reset(&mut self) {
        self.store.reset();
        self.renderer.clear();
        self.epoch += 1;
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// 写入运行结果；运行期间图片被清空则丢弃，返回是否写入
    pub fn complete_run(&mut self, started_epoch: u64, outcome: RenderedOutcome) -> bool {
        if self.store.is_empty() || self.epoch != started_epoch {
            return false;
        }
        self.renderer.show(outcome);
        debug_assert!(self.check_invariants().is_ok());
        true
    }

    /// 当前可导出的解读文本
    pub fn exportable(&self) -> Result<&str, SessionError> {
        self.renderer.interpretation().ok_or(SessionError::NoResult)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let quota = self.store.quota();
        if quota.count() != self.store.len() {
            return Err(format!(
                "quota {} != live images {}",
                quota.count(),
                self.store.len()
            ));
        }
        if quota.count() > quota.max() {
            return Err(format!("quota {} exceeds max {}", quota.count(), quota.max()));
        }
        if self.store.is_empty() && self.renderer.current().is_some() {
            return Err("outcome present without images".to_string());
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let quota = self.store.quota();
        let has_result = self.renderer.has_result();
        let outcome = self.renderer.current().cloned();
        SessionSnapshot {
            count: quota.count(),
            max: quota.max(),
            busy: self.busy,
            can_ingest: !quota.is_full(),
            can_interpret: quota.count() > 0 && !self.busy && !has_result,
            message: quota.is_full().then_some(messages::QUOTA_EXCEEDED),
            has_result,
            can_export: has_result,
            disclaimer: outcome.as_ref().and_then(RenderedOutcome::disclaimer),
            outcome,
            images: self
                .store
                .images()
                .iter()
                .enumerate()
                .map(|(index, image)| ImageSummary {
                    index,
                    content_type: image.content_type().to_string(),
                    file_name: image.file_name().map(str::to_string),
                    size: image.len(),
                })
                .collect(),
        }
    }
}

/// 会话对外快照
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub count: usize,
    pub max: usize,
    pub busy: bool,
    pub can_ingest: bool,
    pub can_interpret: bool,
    /// 达到上限时的提示
    pub message: Option<&'static str>,
    pub has_result: bool,
    pub can_export: bool,
    pub outcome: Option<RenderedOutcome>,
    pub disclaimer: Option<&'static str>,
    pub images: Vec<ImageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub index: usize,
    pub content_type: String,
    pub file_name: Option<String>,
    pub size: usize,
}
