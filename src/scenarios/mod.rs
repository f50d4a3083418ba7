//! Scenario suites: loading, rendering, gating, execution and comparison.
//!
//! Documents describe intent only. Everything they omit is filled from the
//! defaults in `types`, so the executor and comparator never inspect raw
//! document keys.

/// File extensions recognised as scenario documents.
pub const SCENARIO_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Exit code reported for a step killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = -124;

/// Largest accepted per-step timeout, in seconds (one day).
pub const MAX_TIMEOUT_SEC: f64 = 86_400.0;

pub mod gate;
pub mod load;
pub mod normalize;
pub mod render;
pub mod run;
mod types;

pub use gate::Platform;
pub use normalize::NormalizeRule;
pub use types::{
    Case, ExitPolicy, Expectation, FileFixture, MalformedCase, OutputChecks, Side, Sided, Step,
    Suite, SuiteEntry,
};
