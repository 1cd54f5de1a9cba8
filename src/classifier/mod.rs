//! Path classification
//!
//! Decides which zone a finding's path belongs to, and therefore whether it
//! counts toward the health score.

pub mod zone;

pub use zone::{override_for, ZoneClassifier, ZoneRule};
