//! 引擎池：延迟创建引擎，用信号量限制并发，连续失败时熔断一段时间

use crate::ocr::{ContentData, EngineError, Extractor, ImageData, OcrEngineOptions};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

const CIRCUIT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
const CIRCUIT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

struct PoolInner {
    idle: Mutex<Vec<Extractor>>,
    opts: OcrEngineOptions,
    circuit: Mutex<CircuitState>,
    started: AtomicU64,
    failures: AtomicU64,
    capacity: usize,
}

impl PoolInner {
    fn record_success(&self) {
        let mut circuit = self.circuit.lock();
        if circuit.open_until.take().is_some() {
            info!(target: "ocr.pool", event = "ocr.pool.circuit_closed");
        }
        circuit.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut circuit = self.circuit.lock();
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);
        if circuit.consecutive_failures >= CIRCUIT_MAX_CONSECUTIVE_FAILURES {
            circuit.open_until = Some(Instant::now() + CIRCUIT_COOLDOWN);
            circuit.consecutive_failures = 0;
            warn!(
                target: "ocr.pool",
                event = "ocr.pool.circuit_open",
                cooldown_secs = CIRCUIT_COOLDOWN.as_secs()
            );
        }
    }

    fn check_circuit(&self) -> Result<(), EngineError> {
        let mut circuit = self.circuit.lock();
        match circuit.open_until {
            Some(until) if until > Instant::now() => {
                let secs = until.saturating_duration_since(Instant::now()).as_secs().max(1);
                Err(EngineError::Engine(format!(
                    "ocr pool circuit open; retry after {}s",
                    secs
                )))
            }
            Some(_) => {
                circuit.open_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// 引擎池
#[derive(Clone)]
pub struct ExtractorPool {
    inner: Arc<PoolInner>,
    semaphore: Arc<Semaphore>,
}

/// 借出的引擎；drop 时归还
pub struct ExtractorHandle {
    pool: Arc<PoolInner>,
    engine: Option<Extractor>,
    _permit: OwnedSemaphorePermit,
}

impl ExtractorHandle {
    pub fn ocr_and_parse(&mut self, image: ImageData) -> Result<Vec<ContentData>, EngineError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| EngineError::Engine("invalid extractor handle".to_string()))?;

        match engine.ocr_and_parse(image) {
            Ok(blocks) => {
                self.pool.record_success();
                Ok(blocks)
            }
            Err(err) if err.is_data_error() => Err(err),
            Err(err) => {
                self.pool.record_failure();
                Err(err)
            }
        }
    }

    /// 识别并把文本块按行拼接
    pub fn recognize_text(&mut self, image: ImageData) -> Result<String, EngineError> {
        let blocks = self.ocr_and_parse(image)?;
        Ok(blocks
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl Drop for ExtractorHandle {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.idle.lock().push(engine);
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub idle_engines: usize,
    pub total_started: u64,
    pub total_failures: u64,
    pub circuit_open: bool,
}

impl ExtractorPool {
    pub fn new(capacity: usize, opts: OcrEngineOptions) -> Self {
        let capacity = capacity.clamp(1, 32);
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(capacity)),
                opts,
                circuit: Mutex::new(CircuitState::default()),
                started: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                capacity,
            }),
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// 等待并发许可后借出一个引擎（无空闲时新建）
    pub async fn acquire(&self) -> Result<ExtractorHandle, EngineError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Engine(format!("semaphore closed: {}", e)))?;

        self.inner.check_circuit()?;

        let reused = self.inner.idle.lock().pop();
        let engine = match reused {
            Some(mut engine) => {
                engine.ensure_running()?;
                engine
            }
            None => {
                let engine = Extractor::new_with_options(self.inner.opts.clone())?;
                self.inner.started.fetch_add(1, Ordering::Relaxed);
                engine
            }
        };

        Ok(ExtractorHandle {
            pool: self.inner.clone(),
            engine: Some(engine),
            _permit: permit,
        })
    }

    pub fn stats(&self) -> PoolStats {
        let circuit_open = self
            .inner
            .circuit
            .lock()
            .open_until
            .map(|until| until > Instant::now())
            .unwrap_or(false);
        PoolStats {
            capacity: self.inner.capacity,
            available: self.semaphore.available_permits(),
            idle_engines: self.inner.idle.lock().len(),
            total_started: self.inner.started.load(Ordering::Relaxed),
            total_failures: self.inner.failures.load(Ordering::Relaxed),
            circuit_open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_after_consecutive_failures() {
        let pool = ExtractorPool::new(1, OcrEngineOptions::default());
        for _ in 0..CIRCUIT_MAX_CONSECUTIVE_FAILURES {
            pool.inner.record_failure();
        }
        assert!(pool.stats().circuit_open);
        assert!(pool.inner.check_circuit().is_err());

        pool.inner.record_success();
        assert!(!pool.stats().circuit_open);
        assert!(pool.inner.check_circuit().is_ok());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let opts = OcrEngineOptions {
            binary: Some("/nonexistent/PaddleOCR-json".into()),
            work_dir: Some(std::env::temp_dir()),
            ..Default::default()
        };
        let pool = ExtractorPool::new(1, opts);
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, EngineError::Spawn(_)));
        // 许可已随失败归还
        assert_eq!(pool.stats().available, 1);
    }

    /// 写一个假引擎：每读到一行请求就回一条识别结果
    #[cfg(unix)]
    fn fake_engine(dir: &std::path::Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo 'engine ready' >&2\n\
             while IFS= read -r line; do\n\
             echo '{\"code\":100,\"data\":[{\"box\":[[0,0],[9,0],[9,5],[0,5]],\"score\":0.97,\"text\":\"Glucosa 110\"}]}'\n\
             done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    fn sample_png() -> Vec<u8> {
        use image::{DynamicImage, ImageFormat, RgbImage};

        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 32));
        let mut cursor = std::io::Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engines_held_together_both_answer() {
        let dir = tempfile::tempdir().unwrap();
        let opts = OcrEngineOptions {
            binary: Some(fake_engine(dir.path())),
            work_dir: Some(dir.path().to_path_buf()),
            timeout_secs: Some(3),
            ..Default::default()
        };
        let pool = ExtractorPool::new(2, opts);

        let mut first = pool.acquire().await.unwrap();
        let mut second = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().available, 0);
        assert_eq!(pool.stats().total_started, 2);

        let image = sample_png();
        assert_eq!(
            first.recognize_text(ImageData::from_bytes(&image)).unwrap(),
            "Glucosa 110"
        );
        assert_eq!(
            second.recognize_text(ImageData::from_bytes(&image)).unwrap(),
            "Glucosa 110"
        );
        // 再来一轮，读线程仍在工作
        assert_eq!(
            second.recognize_text(ImageData::from_bytes(&image)).unwrap(),
            "Glucosa 110"
        );

        drop(first);
        drop(second);
        let stats = pool.stats();
        assert_eq!(stats.idle_engines, 2);
        assert_eq!(stats.total_failures, 0);
    }
}
