use thiserror::Error;

/// Failures surfaced by the perimeter engine.
///
/// Classification problems are never reported here: a missing or malformed
/// classifier response degrades to geometry-only repair instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerimeterError {
    #[error("no candidate points supplied")]
    EmptyCandidates,

    #[error("at least 3 corners are needed to form a perimeter, found {found}")]
    TooFewCorners { found: usize },

    #[error("invalid dimension '{input}': {reason}")]
    InvalidDimension { input: String, reason: String },

    #[error("no perimeter identified")]
    NoPerimeterIdentified,

    #[error("reference pixel span is zero, scale cannot be calibrated")]
    ZeroPixelSpan,

    #[error("model has no walls to measure")]
    NoWalls,

    #[error("reference dimension {0} needs a wall mask")]
    MissingWallMask(&'static str),
}

pub type Result<T> = std::result::Result<T, PerimeterError>;
