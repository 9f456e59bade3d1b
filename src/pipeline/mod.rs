//! 化验单解读流水线：OCR → 关键词判定 → 解读服务 → 结果展示

pub mod classifier;
pub mod completion;
pub mod dispatcher;
pub mod messages;
pub mod ocr;
pub mod registry;
pub mod renderer;
pub mod runner;

pub use classifier::classify;
pub use completion::{build_completion_service, CompletionError, CompletionService};
pub use dispatcher::{InterpretError, InterpretationDispatcher};
pub use ocr::{ExtractedText, OcrError, OcrExtractor, PaddleOcrExtractor};
pub use registry::SessionRegistry;
pub use renderer::{RenderedOutcome, ResultRenderer};
pub use runner::{PipelineError, PipelineRunner, RunReport, SharedSession};
