pub mod debounce;
pub mod model;
pub mod orchestrator;

pub use model::{Extraction, ExtractionResult, OrchestratorState};
pub use orchestrator::Orchestrator;
