use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;

pub mod api;
pub mod build_info;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod util;

use pipeline::{
    build_completion_service, CompletionService, InterpretationDispatcher, OcrExtractor,
    PaddleOcrExtractor, PipelineRunner, SessionRegistry,
};
use util::config::Config;
use util::http_client::{HttpClient, HttpClientConfig};
use util::report::{ExportGenerator, PdfExportGenerator};

/// 应用状态结构
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub runner: PipelineRunner,
    pub exporter: Arc<dyn ExportGenerator>,
    pub started_at: Instant,
}

impl AppState {
    /// 由外部协作者组装（测试与命令行模式复用）
    pub fn with_components(
        config: Config,
        ocr: Arc<dyn OcrExtractor>,
        completion: Arc<dyn CompletionService>,
        exporter: Arc<dyn ExportGenerator>,
    ) -> Self {
        let dispatcher = InterpretationDispatcher::new(
            completion,
            Duration::from_secs(config.completion.timeout_secs.max(1)),
        );
        let runner = PipelineRunner::new(
            ocr,
            dispatcher,
            Duration::from_secs(config.pipeline.ocr_timeout_secs.max(1)),
            config.pipeline.dispatch_before_classify,
        );
        let sessions = Arc::new(SessionRegistry::new(
            config.session.max_images,
            Duration::from_secs(config.session.idle_timeout_secs),
        ));
        Self {
            config: Arc::new(config),
            sessions,
            runner,
            exporter,
            started_at: Instant::now(),
        }
    }

    /// 生产环境组装：PaddleOCR 引擎池 + OpenAI 兼容服务 + wkhtmltopdf
    pub fn from_config(config: Config) -> Result<Self> {
        let http_client = Arc::new(HttpClient::new(
            HttpClientConfig::for_completion(&config.completion).with_env_proxy(),
        )?);
        let completion = build_completion_service(&config.completion, http_client);
        let ocr = Arc::new(PaddleOcrExtractor::from_config(&config.ocr_engine));
        let exporter = Arc::new(PdfExportGenerator::from_config(&config.export));

        info!(
            event = "app_state.ready",
            model = %config.completion.model,
            pool_size = config.ocr_engine.pool_size,
            max_images = config.session.max_images,
            dispatch_before_classify = config.pipeline.dispatch_before_classify
        );
        Ok(Self::with_components(config, ocr, completion, exporter))
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
