pub mod config;
pub mod error;
pub mod types;
pub mod wire;

pub use error::{AuthRejection, FlkError, FlkResult};
pub use types::{EncryptionArea, MandelbrotParameters, SegmentationParameters};
