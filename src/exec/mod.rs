pub mod cmd;
pub mod executor;
pub mod outcome;

pub use executor::Executor;
pub use outcome::{ExecutionOutcome, StepFailure};
