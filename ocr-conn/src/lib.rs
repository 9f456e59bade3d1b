//! PaddleOCR-json 引擎连接器
//!
//! - ocr: 单个引擎子进程（stdin/stdout JSON 行协议）
//! - pool: 引擎池与并发许可
//! - preprocess: 识别前的图片预处理与缩略图生成

pub mod ocr;
pub mod pool;
pub mod preprocess;

pub use ocr::{ContentData, EngineError, Extractor, ImageData, OcrEngineOptions};
pub use pool::{ExtractorHandle, ExtractorPool, PoolStats};

use std::path::PathBuf;
use std::sync::LazyLock;

/// 进程工作目录（获取失败时退回 "."）
pub static CURRENT_DIR: LazyLock<PathBuf> =
    LazyLock::new(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
