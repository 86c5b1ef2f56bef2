/// Utility types shared by engine modules

pub mod job_queue;

pub use job_queue::JobQueue;
