pub mod image;
pub mod session;

pub use image::{ImagePayload, PreviewHandle, UploadedImage};
pub use session::{
    ImageStore, ImageSummary, SessionError, SessionQuota, SessionSnapshot, SessionState,
};
