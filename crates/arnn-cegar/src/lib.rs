//! Counterexample-guided abstraction refinement for feed-forward networks.
//!
//! [`Cegar::run`] shrinks a network by merging same-typed neurons, asks an
//! [`arnn_smt::Oracle`] about the shrunk network, and refines it whenever the
//! oracle's witness turns out to be spurious on the original network. The
//! loop ends on `UNSAT` (proved), on a genuine counterexample (`SAT`), or on
//! any inconclusive oracle status.

mod config;
mod driver;
mod report;

pub use config::CegarConfig;
pub use driver::Cegar;
pub use report::{CegarReport, NetworkStages, RefinementRecord};
