//! Centralised logging metadata (event names, shared keys, etc.).

/// Canonical event names used across the service.
pub mod events {
    /// HTTP request lifecycle.
    pub const REQUEST_START: &str = "request.start";
    pub const REQUEST_COMPLETE: &str = "request.complete";
    pub const REQUEST_ERROR: &str = "request.error";

    /// Session / image store.
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_EXPIRED: &str = "session.expired";
    pub const SESSION_RESET: &str = "session.reset";
    pub const IMAGE_INGESTED: &str = "image.ingested";
    pub const IMAGE_REJECTED: &str = "image.rejected";
    pub const IMAGE_REMOVED: &str = "image.removed";

    /// Interpretation pipeline lifecycle.
    pub const PIPELINE_START: &str = "pipeline.start";
    pub const PIPELINE_BUSY: &str = "pipeline.busy";
    pub const PIPELINE_STAGE: &str = "pipeline.stage";
    pub const PIPELINE_COMPLETE: &str = "pipeline.complete";
    pub const PIPELINE_ERROR: &str = "pipeline.error";
    pub const PIPELINE_DISCARDED: &str = "pipeline.discarded";

    /// OCR extraction.
    pub const OCR_START: &str = "ocr.start";
    pub const OCR_COMPLETE: &str = "ocr.complete";
    pub const OCR_ERROR: &str = "ocr.error";

    /// Classification gate.
    pub const CLASSIFY_REJECTED: &str = "classify.rejected";

    /// Completion service dispatch.
    pub const DISPATCH_START: &str = "dispatch.start";
    pub const DISPATCH_COMPLETE: &str = "dispatch.complete";
    pub const DISPATCH_ERROR: &str = "dispatch.error";

    /// Report export.
    pub const EXPORT_START: &str = "export.start";
    pub const EXPORT_COMPLETE: &str = "export.complete";
    pub const EXPORT_ERROR: &str = "export.error";
}
