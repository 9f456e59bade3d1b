use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classifier::classify;
use super::dispatcher::{InterpretError, InterpretationDispatcher};
use super::messages;
use super::ocr::{extract_all, OcrExtractor};
use super::renderer::RenderedOutcome;
use crate::model::{ImagePayload, SessionState};
use crate::util::logging::standards::events;

pub type SharedSession = Arc<Mutex<SessionState>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("会话正在处理中")]
    Busy,
    #[error("会话中没有图片")]
    NoImages,
}

/// 一次运行的结果；`applied == false` 表示运行期间图片被清空，结果已丢弃
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RenderedOutcome,
    pub applied: bool,
}

/// 运行期间持有，drop 时清除 busy 标记
struct BusyGuard {
    session: SharedSession,
}

impl BusyGuard {
    /// 已在处理中或没有图片时返回错误
    fn acquire(session: &SharedSession) -> Result<(Self, Vec<ImagePayload>, u64), PipelineError> {
        let mut state = session.lock();
        if state.is_busy() {
            return Err(PipelineError::Busy);
        }
        if state.store().is_empty() {
            return Err(PipelineError::NoImages);
        }
        state.set_busy(true);
        let guard = Self {
            session: session.clone(),
        };
        Ok((guard, state.store().payloads(), state.epoch()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.session.lock().set_busy(false);
    }
}

/// OCR → 判定 → 解读 的串联
#[derive(Clone)]
pub struct PipelineRunner {
    ocr: Arc<dyn OcrExtractor>,
    dispatcher: InterpretationDispatcher,
    ocr_timeout: Duration,
    dispatch_before_classify: bool,
}

impl PipelineRunner {
    pub fn new(
        ocr: Arc<dyn OcrExtractor>,
        dispatcher: InterpretationDispatcher,
        ocr_timeout: Duration,
        dispatch_before_classify: bool,
    ) -> Self {
        Self {
            ocr,
            dispatcher,
            ocr_timeout,
            dispatch_before_classify,
        }
    }

    pub fn dispatcher(&self) -> &InterpretationDispatcher {
        &self.dispatcher
    }

    /// 对会话执行一次完整运行
    pub async fn run(&self, session: &SharedSession) -> Result<RunReport, PipelineError> {
        let (guard, images, epoch) = match BusyGuard::acquire(session) {
            Ok(acquired) => acquired,
            Err(e) => {
                if e == PipelineError::Busy {
                    warn!(target: "pipeline", event = events::PIPELINE_BUSY);
                }
                return Err(e);
            }
        };

        let outcome = self.evaluate(&images).await;

        let applied = session.lock().complete_run(epoch, outcome.clone());
        drop(guard);

        if !applied {
            info!(target: "pipeline", event = events::PIPELINE_DISCARDED, epoch);
        }
        Ok(RunReport { outcome, applied })
    }

    /// 不依赖会话状态的运行，所有失败都转换为可显示结果
    pub async fn evaluate(&self, images: &[ImagePayload]) -> RenderedOutcome {
        let started = Instant::now();
        info!(target: "pipeline", event = events::PIPELINE_START, images = images.len());

        let outcome = match extract_all(self.ocr.as_ref(), images, self.ocr_timeout).await {
            Ok(extracted) => {
                let text = extracted.concatenated();
                if self.dispatch_before_classify {
                    self.dispatch_then_classify(&text).await
                } else {
                    self.classify_then_dispatch(&text).await
                }
            }
            Err(e) if e.is_unreadable_image() => {
                warn!(target: "pipeline", event = events::PIPELINE_ERROR, stage = "ocr", error = %e);
                RenderedOutcome::Failure(messages::UNREADABLE_IMAGE.to_string())
            }
            Err(e) => {
                warn!(target: "pipeline", event = events::PIPELINE_ERROR, stage = "ocr", error = %e);
                RenderedOutcome::Failure(messages::CONNECTION_ERROR.to_string())
            }
        };

        info!(
            target: "pipeline",
            event = events::PIPELINE_COMPLETE,
            kind = outcome_kind(&outcome),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        outcome
    }

    async fn classify_then_dispatch(&self, text: &str) -> RenderedOutcome {
        if !classify(text) {
            info!(target: "pipeline", event = events::CLASSIFY_REJECTED, chars = text.chars().count());
            return RenderedOutcome::Advisory(messages::NOT_CLINICAL.to_string());
        }
        debug!(target: "pipeline", event = events::PIPELINE_STAGE, stage = "dispatch");
        render_dispatch(self.dispatcher.interpret(text).await)
    }

    /// 先调用服务；传输失败优先于判定结果，判定不通过时丢弃服务回复
    async fn dispatch_then_classify(&self, text: &str) -> RenderedOutcome {
        debug!(target: "pipeline", event = events::PIPELINE_STAGE, stage = "dispatch");
        let dispatched = self.dispatcher.interpret(text).await;
        if let Err(InterpretError::Service(e)) = &dispatched {
            warn!(target: "pipeline", event = events::PIPELINE_ERROR, stage = "dispatch", error = %e);
            return RenderedOutcome::Failure(messages::CONNECTION_ERROR.to_string());
        }
        if !classify(text) {
            info!(target: "pipeline", event = events::CLASSIFY_REJECTED, chars = text.chars().count());
            return RenderedOutcome::Advisory(messages::NOT_CLINICAL.to_string());
        }
        render_dispatch(dispatched)
    }
}

fn render_dispatch(result: Result<String, InterpretError>) -> RenderedOutcome {
    match result {
        Ok(reply) if reply.trim().is_empty() => {
            RenderedOutcome::Failure(messages::EMPTY_INTERPRETATION.to_string())
        }
        Ok(reply) => RenderedOutcome::Interpretation(reply),
        Err(InterpretError::EmptyInput) => {
            RenderedOutcome::Failure(messages::EMPTY_INTERPRETATION.to_string())
        }
        Err(InterpretError::Service(e)) => {
            warn!(target: "pipeline", event = events::PIPELINE_ERROR, stage = "dispatch", error = %e);
            RenderedOutcome::Failure(messages::CONNECTION_ERROR.to_string())
        }
    }
}

fn outcome_kind(outcome: &RenderedOutcome) -> &'static str {
    match outcome {
        RenderedOutcome::Interpretation(_) => "interpretation",
        RenderedOutcome::Advisory(_) => "advisory",
        RenderedOutcome::Failure(_) => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadedImage;
    use crate::pipeline::completion::{CompletionError, CompletionService};
    use crate::pipeline::ocr::OcrError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOcr(&'static str);

    #[async_trait]
    impl OcrExtractor for FixedOcr {
        async fn recognize(&self, _image: &ImagePayload) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenOcr;

    #[async_trait]
    impl OcrExtractor for BrokenOcr {
        async fn recognize(&self, _image: &ImagePayload) -> Result<String, OcrError> {
            Err(OcrError::Join("engine crashed".to_string()))
        }
    }

    struct GifOcr;

    #[async_trait]
    impl OcrExtractor for GifOcr {
        async fn recognize(&self, _image: &ImagePayload) -> Result<String, OcrError> {
            Err(OcrError::Engine(ocr_conn::EngineError::InvalidImage(
                "不支持的图片格式: Gif".to_string(),
            )))
        }
    }

    #[derive(Default)]
    struct CountingService {
        calls: AtomicUsize,
        reply: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl CompletionService for CountingService {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CompletionError::Transport("refused".to_string()));
            }
            Ok(self.reply.to_string())
        }
    }

    fn runner(
        ocr: impl OcrExtractor + 'static,
        service: Arc<CountingService>,
        dispatch_before_classify: bool,
    ) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(ocr),
            InterpretationDispatcher::new(service, Duration::from_secs(5)),
            Duration::from_secs(5),
            dispatch_before_classify,
        )
    }

    fn session_with_images(count: usize) -> SharedSession {
        let mut state = SessionState::new(2);
        for i in 0..count {
            let image =
                UploadedImage::ingest(vec![i as u8; 8], "image/jpeg", None, 64, None).unwrap();
            state.ingest(image).unwrap();
        }
        Arc::new(Mutex::new(state))
    }

    #[tokio::test]
    async fn empty_session_is_rejected() {
        let service = Arc::new(CountingService::default());
        let runner = runner(FixedOcr("Glucosa"), service, false);
        let session = session_with_images(0);
        assert_eq!(runner.run(&session).await.unwrap_err(), PipelineError::NoImages);
        assert!(!session.lock().is_busy());
    }

    #[tokio::test]
    async fn busy_session_rejects_second_trigger() {
        let service = Arc::new(CountingService::default());
        let runner = runner(FixedOcr("Glucosa"), service, false);
        let session = session_with_images(1);
        session.lock().set_busy(true);
        assert_eq!(runner.run(&session).await.unwrap_err(), PipelineError::Busy);
    }

    #[tokio::test]
    async fn empty_reply_renders_fixed_message() {
        let service = Arc::new(CountingService {
            reply: "   ",
            ..Default::default()
        });
        let runner = runner(FixedOcr("Glucosa 110"), service, false);
        let report = runner.run(&session_with_images(1)).await.unwrap();
        assert_eq!(
            report.outcome,
            RenderedOutcome::Failure(messages::EMPTY_INTERPRETATION.to_string())
        );
    }

    #[tokio::test]
    async fn ocr_failure_keeps_session_usable() {
        let service = Arc::new(CountingService::default());
        let runner = runner(BrokenOcr, service.clone(), false);
        let session = session_with_images(2);

        let report = runner.run(&session).await.unwrap();
        assert_eq!(
            report.outcome,
            RenderedOutcome::Failure(messages::CONNECTION_ERROR.to_string())
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        let state = session.lock();
        assert!(!state.is_busy());
        assert_eq!(state.store().len(), 2);
        assert!(state.snapshot().can_interpret);
    }

    #[tokio::test]
    async fn unsupported_format_is_not_reported_as_connection_error() {
        let service = Arc::new(CountingService::default());
        let runner = runner(GifOcr, service.clone(), false);
        let session = session_with_images(1);

        let report = runner.run(&session).await.unwrap();
        assert_eq!(
            report.outcome,
            RenderedOutcome::Failure(messages::UNREADABLE_IMAGE.to_string())
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(session.lock().snapshot().can_interpret);
    }

    #[tokio::test]
    async fn legacy_order_reports_connection_error_before_classifying() {
        let service = Arc::new(CountingService {
            fail: true,
            ..Default::default()
        });
        let runner = runner(FixedOcr("Gracias por su compra"), service.clone(), true);
        let report = runner.run(&session_with_images(1)).await.unwrap();
        assert_eq!(
            report.outcome,
            RenderedOutcome::Failure(messages::CONNECTION_ERROR.to_string())
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }
}
