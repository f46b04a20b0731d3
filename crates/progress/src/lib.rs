//! Progress tracking
//!
//! Unit attribution, activity metrics and completion projection.

#![warn(missing_docs)]

pub mod attribution;
pub mod error;
pub mod metrics;
pub mod projector;
pub mod tracker;

pub use attribution::{
    detect_boundaries, fold_small_units, ExcludedUnit, ExclusionReason, FoldDirection, FoldRecord,
    UnitAnalysis, UnitAttributionEngine,
};
pub use error::{ProgressError, Result};
pub use metrics::{daily_stats, lessons_on, ActivityMetrics, DailyProgress, DailyStatus, DayStats};
pub use projector::{
    PaceStatus, ProgressProjector, ProgressSnapshot, Projection, ProjectionInput, UndefinedReason,
};
pub use tracker::{ProgressReport, ProgressTracker, RatioSource};
