#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use lab_interpreter::api::session::{ingest_parts, IncomingPart};
use lab_interpreter::model::ImagePayload;
use lab_interpreter::pipeline::{
    CompletionError, CompletionService, OcrError, OcrExtractor, SharedSession,
};
use lab_interpreter::util::config::Config;
use lab_interpreter::util::report::{ExportArtifact, ExportError, ExportGenerator};
use lab_interpreter::AppState;

/// 对每张图片返回同一段文字；设置 gate 时等待放行
pub struct ScriptedOcr {
    text: String,
    gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(text: &str, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(text)
        }
    }
}

#[async_trait]
impl OcrExtractor for ScriptedOcr {
    async fn recognize(&self, _image: &ImagePayload) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.text.clone())
    }
}

/// 记录调用次数与最后一次 prompt 的解读服务
pub struct MockCompletion {
    reply: String,
    fail: bool,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl MockCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::replying("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        if self.fail {
            return Err(CompletionError::Transport("connection refused".to_string()));
        }
        Ok(self.reply.clone())
    }
}

pub struct FakeExporter {
    fail: bool,
    pub exports: AtomicUsize,
}

impl FakeExporter {
    pub fn working() -> Self {
        Self {
            fail: false,
            exports: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            fail: true,
            exports: AtomicUsize::new(0),
        }
    }

    pub fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExportGenerator for FakeExporter {
    async fn export(&self, interpretation: &str) -> Result<ExportArtifact, ExportError> {
        if self.fail {
            return Err(ExportError::ToolMissing("wkhtmltopdf".to_string()));
        }
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportArtifact {
            filename: "interpretacion-analisis.pdf".to_string(),
            content_type: "application/pdf",
            bytes: format!("%PDF-fake {}", interpretation).into_bytes(),
        })
    }
}

pub fn app_state(
    config: Config,
    ocr: Arc<ScriptedOcr>,
    completion: Arc<MockCompletion>,
    exporter: Arc<FakeExporter>,
) -> AppState {
    AppState::with_components(config, ocr, completion, exporter)
}

pub fn jpeg_part(name: &str) -> IncomingPart {
    IncomingPart {
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4],
        content_type: Some("image/jpeg".to_string()),
        file_name: Some(name.to_string()),
    }
}

/// 新建会话并上传 count 张图片
pub async fn session_with_images(app_state: &AppState, id: &str, count: usize) -> SharedSession {
    let session = app_state.sessions.get_or_create(id);
    let parts = (0..count).map(|i| jpeg_part(&format!("hoja-{i}.jpg"))).collect();
    let snapshot = ingest_parts(app_state, &session, parts).await.unwrap();
    assert_eq!(snapshot.count, count);
    session
}

pub async fn wait_until_busy(session: &SharedSession) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !session.lock().is_busy() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run never started");
}
