//! Domain models shared across Vidra components.

mod job;
mod requests;
mod token;
mod variant;
mod video;

pub use job::ProcessingJob;
pub use requests::{CreateVideoRequest, UploadDestination};
pub use token::AccessToken;
pub use variant::{QualityVariant, VariantStatus};
pub use video::{
    ProcessingSettings, SecuritySettings, SourceMetadata, Video, VideoStatus, Visibility,
    WatermarkSpec,
};
