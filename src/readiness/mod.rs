pub mod evaluator;
pub mod state;

pub use evaluator::{evaluate, InFlight, WorkloadObservation};
pub use state::{WorkloadState, WorkloadStatus};
