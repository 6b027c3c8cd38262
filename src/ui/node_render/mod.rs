pub mod image_preview;
pub mod layout;
pub mod preview_state;

pub use image_preview::{ImagePreviewWidget, PreviewConfig, SourceConvention};
pub use layout::PreviewRect;
pub use preview_state::{PreviewHandle, PreviewState, PreviewStatus};
