//! 配置结构定义模块
//! 包含服务全部配置段，所有字段均带默认值，缺省段落不会导致加载失败

use serde::{Deserialize, Serialize};

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ocr_engine: OcrEngineConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    pub fn get_port(&self) -> u16 {
        self.server.port
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 单个请求的处理超时（秒），需覆盖 OCR + 解读的最长耗时
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 上传请求体上限（MB）
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8964
}

fn default_request_timeout() -> u64 {
    240
}

fn default_body_limit_mb() -> usize {
    25
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    #[serde(default)]
    pub structured: Option<bool>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 日志文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub directory: String,
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "logs".to_string(),
            retention_days: Some(7),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 每个会话可同时持有的图片数（上限 2）
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// 会话闲置多久后回收（秒）
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// 预览缩略图长边像素
    #[serde(default = "default_preview_side")]
    pub preview_max_side: u32,
    /// 预览临时文件目录，空则使用系统临时目录
    #[serde(default)]
    pub preview_dir: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            idle_timeout_secs: default_idle_timeout(),
            preview_max_side: default_preview_side(),
            preview_dir: None,
        }
    }
}

pub const MAX_IMAGES_CAP: usize = 2;

fn default_max_images() -> usize {
    MAX_IMAGES_CAP
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_preview_side() -> u32 {
    256
}

/// 本地 OCR 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrEngineConfig {
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub lib_path: Option<String>,
    /// 引擎单次响应超时（秒）
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for OcrEngineConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            binary: None,
            lib_path: None,
            timeout_secs: None,
            pool_size: default_pool_size(),
        }
    }
}

fn default_pool_size() -> usize {
    2
}

/// 文本补全服务配置（OpenAI 兼容接口）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 优先使用环境变量 OPENAI_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key: None,
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.6
}

fn default_completion_timeout() -> u64 {
    60
}

/// 流水线行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// true 时先调用解读服务再做关键词判定（旧版顺序，被拒绝的内容仍消耗一次调用）
    #[serde(default)]
    pub dispatch_before_classify: bool,
    /// 单张图片 OCR 超时（秒）
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dispatch_before_classify: false,
            ocr_timeout_secs: default_ocr_timeout(),
        }
    }
}

fn default_ocr_timeout() -> u64 {
    60
}

/// PDF 导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_wkhtmltopdf")]
    pub wkhtmltopdf_binary: String,
    /// 导出临时目录，空则使用系统临时目录
    #[serde(default)]
    pub temp_dir: Option<String>,
    #[serde(default = "default_export_filename")]
    pub filename: String,
    #[serde(default = "default_export_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf_binary: default_wkhtmltopdf(),
            temp_dir: None,
            filename: default_export_filename(),
            timeout_secs: default_export_timeout(),
        }
    }
}

fn default_wkhtmltopdf() -> String {
    "wkhtmltopdf".to_string()
}

pub fn default_export_filename() -> String {
    "interpretacion-analisis.pdf".to_string()
}

fn default_export_timeout() -> u64 {
    60
}
