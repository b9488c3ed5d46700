//! Error taxonomy for the warp pipeline
//!
//! Two tiers: `ShardFault` covers per-shard construction problems that are
//! contained to that shard (it stays addressable for diagnostics and is
//! simply excluded or degraded), while `PipelineError` covers conditions
//! that make the whole pipeline unusable and are reported once at startup.

use thiserror::Error;

/// A non-fatal fault recorded on a shard during construction.
///
/// Shard math is deterministic, so none of these are retried; the fault is
/// kept on the shard so callers can tell a collapsed transform apart from a
/// legitimately-identity one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShardFault {
    /// Fewer than 4 point pairs supplied for the homography fit.
    #[error("needs at least 4 point pairs, got {source_points} source / {display_points} display")]
    InsufficientCorrespondence {
        source_points: usize,
        display_points: usize,
    },

    /// The fitted homography was singular; its inverse fell back to identity.
    #[error("homography is singular, inverse fell back to identity")]
    DegenerateHomography,
}

/// A fatal pipeline condition. One bad shard never raises this; a missing
/// or unusable resource does.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("render target {width}x{height} is not usable")]
    InvalidTarget { width: u32, height: u32 },

    #[error("source texture is not ready")]
    TextureNotReady,
}
