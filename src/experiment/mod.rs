//! Experiment lifecycle.
//!
//! An experiment runs its probes around a chaos injection phase:
//!
//! ```text
//! arm abort -> ramp -> PreChaos -> DuringChaos + inject loop -> revert
//!           -> ramp -> PostChaos -> finalize -> summary
//! ```
//!
//! The [`ExperimentLifecycle`] drives the [`ProbeScheduler`](crate::probe::ProbeScheduler)
//! at every phase boundary, consults the [`AbortController`](crate::abort::AbortController)
//! between injection iterations and reports every step to its result sinks.

pub mod injector;
pub mod lifecycle;

pub use injector::{ChaosInjector, NoopInjector, ShellInjector};
pub use lifecycle::{ChaosTiming, ExperimentLifecycle};
