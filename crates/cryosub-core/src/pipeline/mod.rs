pub mod config;
mod orchestrator;
pub mod pool;
pub mod scheduler;
pub mod store;
mod types;

pub use config::{SubtractionConfig, VolumeSource};
pub use orchestrator::{
    load_volume, run_subtraction, run_subtraction_reported, run_subtraction_with_store,
};
pub use pool::{InFlightLimit, JobHandle, Permit, WorkerPool};
pub use scheduler::Scheduler;
pub use store::{MrcStackStore, StackInfo, StackSink, StackStore};
pub use types::{
    NoOpReporter, PipelineStage, ProgressReporter, RunSummary, StackReport, Subtractor,
};
