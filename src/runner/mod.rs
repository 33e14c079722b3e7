//! Task runner module.

mod runner;
mod state;
mod worker;

pub use runner::{Runner, RunnerBuilder, RunnerError};
