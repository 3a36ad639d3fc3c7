//! spotmeter-export: Pure serializers (sans-IO)
//!
//! Turns result tables into CSV or JSON text, overlay images into PNG
//! bytes, and contours into SVG documents. Writing the output anywhere
//! is left to `spotmeter-io`.

pub mod csv;
pub mod json;
pub mod png;
pub mod svg;

pub use csv::to_csv;
pub use json::to_json;
pub use png::{encode_image, encode_png};
pub use svg::{SvgMetadata, to_svg};

/// Errors from encoding outputs.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The image encoder failed.
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    /// The JSON encoder failed.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}
