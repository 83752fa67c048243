//! Error types for the warp engine

use thiserror::Error;

/// Reasons a single warp can fail.
///
/// Every variant is scoped to one warp call: the caller drops that layer for
/// the current frame and keeps rendering the others. Samples that land outside
/// the source image are not errors, they just leave transparent pixels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WarpError {
    /// Missing source pixels, a point list that is not exactly four points,
    /// non-finite coordinates or a working buffer above the configured limit
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The 8x8 correspondence system has no unique solution
    /// (duplicate or collinear corners)
    #[error("degenerate geometry: corner correspondences are singular")]
    DegenerateGeometry,

    /// The homography determinant is too close to zero to invert
    #[error("singular matrix: homography cannot be inverted")]
    SingularMatrix,
}

impl WarpError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        WarpError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, WarpError>;
