use crate::{preprocess, CURRENT_DIR};
use base64::Engine;
use crossbeam::channel::{bounded, Receiver};
use image::{GenericImageView, ImageFormat};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Point = [usize; 2];

const STDERR_TAIL_LINES: usize = 50;
const DEFAULT_MAX_INPUT_BYTES: usize = 15 * 1024 * 1024;
const DEFAULT_MAX_PIXELS: u64 = 40_000_000;
const DEFAULT_MIN_DIMENSION: u32 = 16;

/// PaddleOCR-json 返回码
pub mod code {
    pub const OK_WITH_TEXT: u32 = 100;
    pub const OK_NO_TEXT: u32 = 101;

    /// 成功（包括未识别到文字）
    #[inline]
    pub fn is_success(code: u32) -> bool {
        matches!(code, OK_WITH_TEXT | OK_NO_TEXT)
    }

    /// 路径/解码/Base64 类错误：图片本身的问题，引擎无需重启
    #[inline]
    pub fn is_data_error(code: u32) -> bool {
        matches!(code, 200..=217 | 300..=301)
    }

    pub fn description(code: u32) -> &'static str {
        match code {
            100 => "识别成功",
            101 => "未识别到文字",
            200 => "图片路径不存在",
            202 => "无法打开文件",
            203 => "图片无法解码",
            300 => "Base64解析失败",
            301 => "Base64图片解码失败",
            400 => "JSON序列化失败",
            401 => "JSON反序列化失败",
            402 => "JSON键解析失败",
            403 => "未发现有效任务",
            _ => "未知错误",
        }
    }
}

/// 引擎调用失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 输入图片不合格（过大、过小、格式不支持），不计入引擎故障
    InvalidImage(String),
    /// 引擎返回数据类错误码
    Data { code: u32, detail: String },
    /// 引擎无响应、崩溃或协议错误
    Engine(String),
    /// 无法拉起引擎进程
    Spawn(String),
}

impl EngineError {
    pub fn is_data_error(&self) -> bool {
        matches!(self, EngineError::InvalidImage(_) | EngineError::Data { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidImage(msg) => write!(f, "图片不合格: {}", msg),
            EngineError::Data { code, detail } => {
                write!(f, "数据错误 (code={}): {} - {}", code, code::description(*code), detail)
            }
            EngineError::Engine(msg) => write!(f, "引擎错误: {}", msg),
            EngineError::Spawn(msg) => write!(f, "引擎启动失败: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Deserialize, Debug, Clone)]
struct Content {
    code: u32,
    #[serde(default)]
    data: serde_json::Value,
}

/// 单个文本块
#[derive(Deserialize, Debug, Clone)]
pub struct ContentData {
    #[serde(rename = "box")]
    pub rect: [Point; 4],
    pub score: f64,
    pub text: String,
}

/// 引擎请求体
#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum ImageData {
    ImagePathDict { image_path: String },
    ImageBase64Dict { image_base64: String },
}

impl ImageData {
    /// 预处理后以 Base64 形式提交，失败时退回原始字节
    pub fn from_bytes<T>(bytes: T) -> ImageData
    where
        T: AsRef<[u8]>,
    {
        let raw = bytes.as_ref();
        let processed = preprocess::preprocess_bytes(raw).unwrap_or_else(|| raw.to_vec());
        ImageData::ImageBase64Dict {
            image_base64: base64::engine::general_purpose::STANDARD.encode(processed),
        }
    }
}

/// 引擎启动选项（由上层配置传入）
#[derive(Debug, Clone, Default)]
pub struct OcrEngineOptions {
    pub work_dir: Option<PathBuf>,
    pub binary: Option<PathBuf>,
    pub lib_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// 一个 PaddleOCR-json 子进程
pub struct Extractor {
    process: Child,
    receiver: Receiver<String>,
    stderr_recent: Arc<Mutex<VecDeque<String>>>,
    opts: OcrEngineOptions,
}

impl Extractor {
    pub fn new_with_options(opts: OcrEngineOptions) -> Result<Self, EngineError> {
        let (process, receiver, stderr_recent) =
            Self::spawn_process(&opts).map_err(|e| EngineError::Spawn(e.to_string()))?;
        Ok(Self {
            process,
            receiver,
            stderr_recent,
            opts,
        })
    }

    fn spawn_process(
        opts: &OcrEngineOptions,
    ) -> io::Result<(Child, Receiver<String>, Arc<Mutex<VecDeque<String>>>)> {
        let work_dir = opts.work_dir.clone().unwrap_or_else(|| CURRENT_DIR.join("ocr"));
        let bin = opts
            .binary
            .clone()
            .unwrap_or_else(|| work_dir.join("PaddleOCR-json"));
        let lib = opts.lib_path.clone().unwrap_or_else(|| work_dir.join("lib"));

        let mut process = Command::new(bin)
            .env("LD_LIBRARY_PATH", lib)
            .current_dir(&work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "OCR进程stdout不可用"))?;
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "OCR进程stderr不可用"))?;

        // 管道读取会阻塞到子进程退出，每个引擎各占两个专用线程
        let pid = process.id();
        let (sender, receiver) = bounded::<String>(0);
        thread::Builder::new()
            .name(format!("ocr-stdout-{}", pid))
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut line = String::new();
                while matches!(reader.read_line(&mut line), Ok(n) if n > 0) {
                    if sender.send(line.clone()).is_err() {
                        break;
                    }
                    line.clear();
                }
            })?;

        let stderr_recent = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let tail = stderr_recent.clone();
        thread::Builder::new()
            .name(format!("ocr-stderr-{}", pid))
            .spawn(move || {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                while matches!(reader.read_line(&mut line), Ok(n) if n > 0) {
                    let mut buf = tail.lock();
                    if buf.len() >= STDERR_TAIL_LINES {
                        buf.pop_front();
                    }
                    buf.push_back(line.trim_end().to_string());
                    drop(buf);
                    line.clear();
                }
            })?;

        // 丢弃启动横幅
        while receiver.recv_timeout(Duration::from_millis(200)).is_ok() {}
        info!(target: "ocr.engine", event = "ocr.engine.started", pid);
        Ok((process, receiver, stderr_recent))
    }

    /// 读取下一条 JSON 响应；超时返回 None
    fn read_response(&self) -> Option<String> {
        let timeout = Duration::from_secs(self.opts.timeout_secs.unwrap_or(30));
        let deadline = Instant::now() + timeout;
        loop {
            let remain = deadline.checked_duration_since(Instant::now())?;
            let line = self.receiver.recv_timeout(remain).ok()?;
            if line.trim_start().starts_with('{') {
                return Some(line);
            }
        }
    }

    fn send(&mut self, image: &ImageData) -> Result<(), EngineError> {
        let payload =
            serde_json::to_string(image).map_err(|e| EngineError::Engine(e.to_string()))?;
        let stdin = self
            .process
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::Engine("stdin not piped".to_string()))?;
        writeln!(stdin, "{}", payload.trim())
            .and_then(|_| stdin.flush())
            .map_err(|e| EngineError::Engine(format!("写入引擎失败: {}", e)))
    }

    fn attempt(&mut self, image: &ImageData) -> Result<Vec<ContentData>, EngineError> {
        self.send(image)?;
        let raw = self
            .read_response()
            .ok_or_else(|| EngineError::Engine("引擎无响应 (超时或崩溃)".to_string()))?;
        let content: Content = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Engine(format!("响应解析失败: {}", e)))?;

        if code::is_success(content.code) {
            if content.code == code::OK_NO_TEXT {
                return Ok(Vec::new());
            }
            return Ok(serde_json::from_value(content.data).unwrap_or_default());
        }

        let detail = content.data.as_str().unwrap_or("Unknown").to_string();
        if code::is_data_error(content.code) {
            Err(EngineError::Data {
                code: content.code,
                detail,
            })
        } else {
            Err(EngineError::Engine(format!(
                "code={} {} - {}",
                content.code,
                code::description(content.code),
                detail
            )))
        }
    }

    /// 识别一张图片；引擎类错误时重启一次后重试
    pub fn ocr_and_parse(&mut self, image: ImageData) -> Result<Vec<ContentData>, EngineError> {
        if let ImageData::ImageBase64Dict { image_base64 } = &image {
            validate_base64_image(image_base64)?;
        }

        let started = Instant::now();
        match self.attempt(&image) {
            Ok(blocks) => {
                debug!(
                    target: "ocr.engine",
                    event = "ocr.engine.recognized",
                    blocks = blocks.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64
                );
                Ok(blocks)
            }
            Err(err) if err.is_data_error() => Err(err),
            Err(first) => {
                warn!(target: "ocr.engine", event = "ocr.engine.retry", error = %first);
                self.log_stderr_tail();
                self.restart()?;
                self.attempt(&image).map_err(|second| {
                    error!(
                        target: "ocr.engine",
                        event = "ocr.engine.failed",
                        first = %first,
                        second = %second
                    );
                    second
                })
            }
        }
    }

    fn log_stderr_tail(&self) {
        let buf = self.stderr_recent.lock();
        for line in buf.iter().rev().take(10).rev() {
            warn!(target: "ocr.engine", "stderr> {}", line);
        }
    }

    fn restart(&mut self) -> Result<(), EngineError> {
        let _ = self.process.kill();
        let _ = self.process.wait();
        let (process, receiver, stderr_recent) =
            Self::spawn_process(&self.opts).map_err(|e| EngineError::Spawn(e.to_string()))?;
        self.process = process;
        self.receiver = receiver;
        self.stderr_recent = stderr_recent;
        info!(target: "ocr.engine", event = "ocr.engine.restarted");
        Ok(())
    }

    /// 子进程已退出时重新拉起
    pub fn ensure_running(&mut self) -> Result<(), EngineError> {
        match self.process.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                warn!(target: "ocr.engine", ?status, "检测到OCR引擎已退出，准备重启");
                self.restart()
            }
            Err(err) => {
                warn!(target: "ocr.engine", "检查OCR引擎状态失败: {}", err);
                self.restart()
            }
        }
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

fn validate_base64_image(encoded: &str) -> Result<(), EngineError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::InvalidImage(format!("Base64 解码失败: {}", e)))?;
    validate_image_bytes(&decoded)
}

/// 提前拦截不合格输入，避免把引擎拖入异常状态
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), EngineError> {
    if bytes.len() > DEFAULT_MAX_INPUT_BYTES {
        return Err(EngineError::InvalidImage(format!(
            "输入过大: {} bytes (上限 {} bytes)",
            bytes.len(),
            DEFAULT_MAX_INPUT_BYTES
        )));
    }

    let format = image::guess_format(bytes)
        .map_err(|e| EngineError::InvalidImage(format!("无法识别格式: {}", e)))?;
    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff | ImageFormat::WebP
    ) {
        return Err(EngineError::InvalidImage(format!("不支持的图片格式: {:?}", format)));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| EngineError::InvalidImage(format!("图片解码失败: {}", e)))?;
    let (w, h) = img.dimensions();
    if w < DEFAULT_MIN_DIMENSION || h < DEFAULT_MIN_DIMENSION {
        return Err(EngineError::InvalidImage(format!("图片尺寸过小: {}x{}", w, h)));
    }
    if w as u64 * h as u64 > DEFAULT_MAX_PIXELS {
        return Err(EngineError::InvalidImage(format!("像素总数过大: {}x{}", w, h)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn rejects_tiny_images_as_data_errors() {
        let err = validate_image_bytes(&png(4, 4)).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn rejects_non_image_payloads() {
        let err = validate_image_bytes(b"Gracias por su compra").unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
    }

    #[test]
    fn accepts_regular_png() {
        assert!(validate_image_bytes(&png(64, 48)).is_ok());
    }

    #[test]
    fn classifies_return_codes() {
        assert!(code::is_success(100));
        assert!(code::is_success(101));
        assert!(code::is_data_error(203));
        assert!(!code::is_data_error(401));
    }

    #[test]
    fn parses_engine_blocks() {
        let raw = r#"{"code":100,"data":[{"box":[[0,0],[10,0],[10,5],[0,5]],"score":0.98,"text":"Glucosa 110 mg/dL"}]}"#;
        let content: Content = serde_json::from_str(raw).unwrap();
        let blocks: Vec<ContentData> = serde_json::from_value(content.data).unwrap();
        assert_eq!(blocks[0].text, "Glucosa 110 mg/dL");
    }
}
