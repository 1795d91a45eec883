//! Pure decision logic for the signal pipeline.
//!
//! Everything here is synchronous and side-effect free, so engines can be
//! shared across tasks behind an `Arc` without locking.

pub mod alerts;
pub mod features;
pub mod recommendation;
pub mod volatility;

pub use alerts::{AlertEngine, AlertInputs};
pub use features::build_features;
pub use recommendation::{Conviction, RecommendationEngine, DECISION_TABLE};
pub use volatility::{VolatilityReading, VolatilitySource, PREDICTION_HISTORY_LEN};
