//! 导出模块
//!
//! - HTML 生成 (html.rs)
//! - PDF 转换 (pdf.rs)
//! - CSS 样式 (styles.rs)

pub mod html;
pub mod pdf;
pub mod styles;

pub use html::HtmlReportGenerator;
pub use pdf::PdfGenerator;
pub use styles::CssStyleManager;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use thiserror::Error;
use tracing::{error, info};

use crate::util::config::ExportConfig;
use crate::util::logging::standards::events;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// 导出失败；解读结果本身不受影响
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("PDF 转换工具不可用: {0}")]
    ToolMissing(String),
    #[error("PDF 转换失败 (退出码 {code:?}): {detail}")]
    Conversion { code: Option<i32>, detail: String },
    #[error("PDF 转换超时 ({0:?})")]
    Timeout(Duration),
    #[error("导出文件读写失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 导出产物
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// 把解读结果转换为可下载文档
#[async_trait]
pub trait ExportGenerator: Send + Sync {
    async fn export(&self, interpretation: &str) -> Result<ExportArtifact, ExportError>;
}

/// HTML → 单页 A4 PDF
#[derive(Debug, Clone)]
pub struct PdfExportGenerator {
    pdf: PdfGenerator,
    temp_dir: Option<PathBuf>,
    filename: String,
}

impl PdfExportGenerator {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            pdf: PdfGenerator::new(
                config.wkhtmltopdf_binary.clone(),
                Duration::from_secs(config.timeout_secs.max(1)),
            ),
            temp_dir: config.temp_dir.as_ref().map(PathBuf::from),
            filename: config.filename.clone(),
        }
    }

    pub fn pdf_generator(&self) -> &PdfGenerator {
        &self.pdf
    }

    fn work_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("lab-export-");
        match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl ExportGenerator for PdfExportGenerator {
    async fn export(&self, interpretation: &str) -> Result<ExportArtifact, ExportError> {
        let html = HtmlReportGenerator::generate_interpretation(interpretation, Local::now());

        // 目录随 drop 删除，失败路径也不会残留文件
        let work_dir = self.work_dir()?;
        let pdf_path = work_dir.path().join("interpretation.pdf");

        if let Err(e) = self.pdf.html_to_pdf(&html, &pdf_path).await {
            error!(target: "report.pdf", event = events::EXPORT_ERROR, error = %e);
            return Err(e);
        }

        let bytes = tokio::fs::read(&pdf_path).await?;
        info!(
            target: "report.pdf",
            event = events::EXPORT_COMPLETE,
            size = bytes.len(),
            filename = %self.filename
        );

        Ok(ExportArtifact {
            filename: self.filename.clone(),
            content_type: PDF_CONTENT_TYPE,
            bytes,
        })
    }
}
