//! The optimizer itself: run state, candidate generation and the run loop.

mod candidates;
mod run;
mod state;

pub use run::{BestSolution, NsboSolver, NSBO_LOG};
pub use state::RunState;
