//! PDF报告生成模块
//! 负责将HTML内容转换为PDF格式

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tokio::task;
use tracing::{debug, error, info, warn};

use super::styles::PAGE_MARGIN_MM;
use super::ExportError;
use crate::util::logging::standards::events;

/// PDF生成器，调用 wkhtmltopdf 命令行
#[derive(Debug, Clone)]
pub struct PdfGenerator {
    binary: String,
    timeout: Duration,
}

impl PdfGenerator {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// 将HTML转换为PDF
    pub async fn html_to_pdf(&self, html_content: &str, output_path: &Path) -> Result<(), ExportError> {
        debug!(
            target: "report.pdf",
            event = events::EXPORT_START,
            stage = "html_to_pdf",
            path = %output_path.display()
        );

        // 先保存HTML到临时文件
        let temp_html_path = output_path.with_extension("html");
        tokio::fs::write(&temp_html_path, html_content.as_bytes()).await?;

        let result = self.convert_with_wkhtmltopdf(&temp_html_path, output_path).await;

        // 清理临时文件
        if let Err(e) = tokio::fs::remove_file(&temp_html_path).await {
            warn!("清理临时文件失败: {} - {}", temp_html_path.display(), e);
        }

        result
    }

    async fn convert_with_wkhtmltopdf(&self, html_path: &Path, output_path: &Path) -> Result<(), ExportError> {
        let binary = self.binary.clone();
        let timeout = self.timeout;
        let html: PathBuf = html_path.to_path_buf();
        let pdf: PathBuf = output_path.to_path_buf();

        task::spawn_blocking(move || run_wkhtmltopdf_blocking(&binary, &html, &pdf, timeout))
            .await
            .map_err(|e| ExportError::Conversion {
                code: None,
                detail: format!("wkhtmltopdf join error: {}", e),
            })??;

        debug!(
            target: "report.pdf",
            event = events::EXPORT_COMPLETE,
            stage = "html_to_pdf",
            path = %output_path.display()
        );
        Ok(())
    }

    /// 检查PDF转换工具是否可用
    pub fn check_pdf_tools(&self) -> Result<(), ExportError> {
        let status = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => {
                info!("[ok] wkhtmltopdf工具可用: {}", self.binary);
                Ok(())
            }
            Ok(status) => {
                warn!("[warn] wkhtmltopdf工具执行失败");
                Err(ExportError::Conversion {
                    code: status.code(),
                    detail: "--version 执行失败".to_string(),
                })
            }
            Err(e) => {
                warn!("[warn] wkhtmltopdf工具未安装: {}", e);
                Err(ExportError::ToolMissing(format!("{}: {}", self.binary, e)))
            }
        }
    }
}

/// 单页 A4 输出；关闭智能缩放，使 CSS 的 mm 与纸面一致
fn conversion_args() -> Vec<String> {
    let margin = format!("{}mm", PAGE_MARGIN_MM);
    let mut args: Vec<String> = ["--quiet", "--page-size", "A4", "--orientation", "Portrait"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for side in ["--margin-top", "--margin-bottom", "--margin-left", "--margin-right"] {
        args.push(side.to_string());
        args.push(margin.clone());
    }
    args.extend(
        [
            "--disable-smart-shrinking",
            "--encoding",
            "UTF-8",
            "--print-media-type",
            "--load-error-handling",
            "ignore",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

fn run_wkhtmltopdf_blocking(
    binary: &str,
    html_path: &Path,
    output_path: &Path,
    timeout: Duration,
) -> Result<(), ExportError> {
    let mut command = Command::new(binary);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.args(conversion_args());
    command.arg(html_path);
    command.arg(output_path);

    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            ExportError::ToolMissing(format!("{}: {}", binary, e))
        }
        _ => ExportError::Io(e),
    })?;

    loop {
        if child.try_wait()?.is_some() {
            let output = child.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                error!(
                    target: "report.pdf",
                    event = events::EXPORT_ERROR,
                    code = ?output.status.code(),
                    stderr = %stderr
                );
                return Err(ExportError::Conversion {
                    code: output.status.code(),
                    detail: stderr,
                });
            }
            return Ok(());
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExportError::Timeout(timeout));
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_single_a4_without_shrinking() {
        let args = conversion_args();
        let page = args.iter().position(|a| a == "--page-size").unwrap();
        assert_eq!(args[page + 1], "A4");
        let top = args.iter().position(|a| a == "--margin-top").unwrap();
        assert_eq!(args[top + 1], "15mm");
        assert!(args.iter().any(|a| a == "--disable-smart-shrinking"));
    }
}
