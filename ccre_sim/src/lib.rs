//! CCRE Deterministic Simulation Harness
//!
//! Runs the scheduler and behavior arbitration against a virtual clock so
//! that every run is reproducible from a single 64-bit seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: a `VirtualClock` that moves only when the harness advances it
//! - **Scheduling**: jobs run synchronously inside `advance`, on one thread
//! - **Randomness**: every draw comes from a ChaCha8 stream seeded per run
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   ScenarioRunner                     │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ SimContext (VirtualClock + Scheduler + RNG)    │  │
//! │  └────────────────────────────────────────────────┘  │
//! │       │ advance_millis                               │
//! │  ┌────▼─────────┐      ┌──────────────────────────┐  │
//! │  │ Scheduled    │─────►│ Cells / Arbitrators /    │  │
//! │  │ jobs         │      │ Arbitrated channels      │  │
//! │  └──────────────┘      └──────────────────────────┘  │
//! │                 Verdict (checks + first failure)     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ccre_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::DriveModes);
//! assert!(result.passed);
//! ```

mod config;
mod context;
mod error;
mod runner;
pub mod scenarios;

pub use config::SimConfig;
pub use context::SimContext;
pub use error::{SimError, EXIT_FAILED_RUN, EXIT_INVALID_CONFIG};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
