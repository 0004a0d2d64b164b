//! Foundation perimeter reconstruction.
//!
//! Turns noisy corner candidates into a closed, calibrated perimeter polygon:
//! clustering, angular ordering, validity repair against an optional external
//! classification, wall filtering, scale calibration and foundation metrics.
//! The boundary feedback loop patches contours from reviewer reports.

pub mod calibration;
pub mod classification;
pub mod clustering;
pub mod config;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod model;
pub mod ordering;
pub mod perimeter;
pub mod pipeline;
pub mod validity;
pub mod wall_filter;

pub use calibration::{calibrate, format_feet_inches, parse_feet_inches, Calibration, ReferenceDimension};
pub use classification::{
    BoundaryReviewer, ClassificationMode, GeometryClassifier, NoClassifier,
};
pub use config::PerimeterConfig;
pub use error::{PerimeterError, Result};
pub use feedback::{Contour, FeedbackHistory, FeedbackLoop};
pub use metrics::FoundationMetrics;
pub use model::{Corner, GeometryModel, GeometryPayload, Point, Wall};
pub use pipeline::{ClassificationStrategy, FoundationPipeline, PerimeterReport, PipelineInput};
