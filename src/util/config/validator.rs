//! 配置验证模块
//! 启动前检查配置，错误阻止启动，警告仅记录

use super::types::*;
use serde::Serialize;
use url::Url;

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 全面验证配置
    pub fn validate_all(config: &Config) -> ValidationReport {
        let mut report = ValidationReport::new();

        Self::validate_server_config(&config.server, &mut report);
        Self::validate_session_config(&config.session, &mut report);
        Self::validate_completion_config(&config.completion, &mut report);
        Self::validate_logging_config(&config.logging, &mut report);
        Self::validate_export_config(&config.export, &mut report);
        Self::validate_stage_budget(config, &mut report);

        report
    }

    fn validate_server_config(server: &ServerConfig, report: &mut ValidationReport) {
        if server.port == 0 {
            report.add_error("server.port", "无效的端口号: 0");
        }
        if server.request_timeout_secs == 0 {
            report.add_error("server.request_timeout_secs", "请求超时必须大于0");
        }
        if server.body_limit_mb == 0 {
            report.add_error("server.body_limit_mb", "请求体上限必须大于0");
        }
    }

    /// 请求超时须大于一次完整运行的阶段超时之和，否则运行会被 408 截断
    fn validate_stage_budget(config: &Config, report: &mut ValidationReport) {
        let budget = config.pipeline.ocr_timeout_secs * config.session.max_images as u64
            + config.completion.timeout_secs;
        if config.server.request_timeout_secs <= budget {
            report.add_warning(
                "server.request_timeout_secs",
                &format!(
                    "请求超时 {}s 不大于识别与解读的超时总和 {}s",
                    config.server.request_timeout_secs, budget
                ),
            );
        }
    }

    fn validate_session_config(session: &SessionConfig, report: &mut ValidationReport) {
        if !(1..=MAX_IMAGES_CAP).contains(&session.max_images) {
            report.add_error(
                "session.max_images",
                &format!("每个会话的图片数必须在 1..={} 之间", MAX_IMAGES_CAP),
            );
        }
        if session.idle_timeout_secs < 60 {
            report.add_warning("session.idle_timeout_secs", "会话闲置超时过短，用户可能丢失结果");
        }
    }

    fn validate_completion_config(completion: &CompletionConfig, report: &mut ValidationReport) {
        match Url::parse(&completion.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => report.add_error(
                "completion.base_url",
                &format!("不支持的协议: {}", url.scheme()),
            ),
            Err(e) => report.add_error(
                "completion.base_url",
                &format!("无效的URL {}: {}", completion.base_url, e),
            ),
        }

        if completion
            .api_key
            .as_deref()
            .map(str::trim)
            .map_or(true, str::is_empty)
        {
            report.add_warning(
                "completion.api_key",
                "未配置解读服务凭据（OPENAI_API_KEY），解读请求将失败",
            );
        }

        if !(0.0..=2.0).contains(&completion.temperature) {
            report.add_error("completion.temperature", "temperature 必须在 0.0..=2.0 之间");
        }
    }

    fn validate_logging_config(logging: &LoggingConfig, report: &mut ValidationReport) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            report.add_warning(
                "logging.level",
                &format!("未知日志级别 {}，将使用 info", logging.level),
            );
        }
        if logging.file.enabled && logging.file.directory.trim().is_empty() {
            report.add_error("logging.file.directory", "启用文件日志时必须指定目录");
        }
    }

    fn validate_export_config(export: &ExportConfig, report: &mut ValidationReport) {
        if !export.filename.ends_with(".pdf") {
            report.add_warning("export.filename", "导出文件名建议以 .pdf 结尾");
        }
        if export.timeout_secs == 0 {
            report.add_error("export.timeout_secs", "导出超时必须大于0");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// 验证报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 按级别逐条写日志
    pub fn log(&self) {
        for issue in &self.errors {
            tracing::error!(event = "config.invalid", field = %issue.field, "{}", issue.message);
        }
        for issue in &self.warnings {
            tracing::warn!(event = "config.warning", field = %issue.field, "{}", issue.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_only_warns_about_missing_key() {
        let report = ConfigValidator::validate_all(&Config::default());
        assert!(!report.has_errors());
        assert!(report.warnings.iter().any(|w| w.field == "completion.api_key"));
    }

    #[test]
    fn rejects_quota_above_cap() {
        let mut config = Config::default();
        config.session.max_images = 3;
        let report = ConfigValidator::validate_all(&config);
        assert!(report.errors.iter().any(|e| e.field == "session.max_images"));
    }

    #[test]
    fn request_timeout_must_exceed_stage_budget() {
        let mut config = Config::default();
        config.completion.api_key = Some("sk".to_string());
        assert!(ConfigValidator::validate_all(&config).warnings.is_empty());

        config.server.request_timeout_secs =
            config.pipeline.ocr_timeout_secs * 2 + config.completion.timeout_secs;
        let report = ConfigValidator::validate_all(&config);
        assert!(!report.has_errors());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.field == "server.request_timeout_secs"));
    }

    #[test]
    fn rejects_non_http_completion_url() {
        let mut config = Config::default();
        config.completion.base_url = "ftp://example.com".to_string();
        config.completion.api_key = Some("sk".to_string());
        let report = ConfigValidator::validate_all(&config);
        assert_eq!(report.error_count(), 1);
        assert!(report.warnings.is_empty());
    }
}
