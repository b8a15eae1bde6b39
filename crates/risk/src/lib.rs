pub mod arbiter;

pub use arbiter::{ArbiterConfig, DecisionArbiter};
