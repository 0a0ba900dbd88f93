pub mod config;
pub mod enqueue;
pub mod jobs;
pub mod worker;
