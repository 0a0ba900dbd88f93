pub mod executor;
pub mod logs;
pub mod manager;
pub mod retry;
pub mod worker;

pub use executor::{ExecOutcome, Executor, ExecutorError};
pub use logs::LogWriter;
pub use manager::WorkerManager;
pub use retry::{RetryDecision, decide};
pub use worker::Worker;
