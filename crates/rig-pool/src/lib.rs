//! rig-pool — the cooperative work-pool scheduler.
//!
//! Multiple workers, each bound to one endpoint, drain a shared pool
//! of test units. Dispatch is at-most-once per unit; a shared
//! [`LivenessTracker`] lets a worker that loses its endpoint decide
//! between recover-and-continue (peers are still draining the pool)
//! and abort (it was the last worker standing).
//!
//! # Architecture
//!
//! ```text
//! WorkPool (Mutex<VecDeque<unit>>)
//!   ├── PoolWorker #1 ── endpoint A ──┐
//!   ├── PoolWorker #2 ── endpoint B ──┼── LivenessTracker (N workers)
//!   └── PoolWorker #3 ── endpoint C ──┘
//! ```

pub mod pool;
pub mod tracker;
pub mod unit;
pub mod worker;

pub use pool::WorkPool;
pub use tracker::LivenessTracker;
pub use unit::{ReportingSink, TestUnit, UnitError, UnitResult, NOT_EXECUTED_FAILURE};
pub use worker::{DiagnosticEvent, EventLog, PoolWorker, TracingEventLog};
