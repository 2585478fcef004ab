pub mod event;
pub mod reconciler;
pub mod runner;

pub use event::{ReconcileEvent, WorkloadSettingsPatch};
pub use reconciler::{AppliedConfiguration, PassOutcome, Reconciler};
pub use runner::{LoopExit, LoopReport, ReconcileLoop};
