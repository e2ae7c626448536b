mod embedder;
mod inferencer;
mod snapshot;
mod tracker;

pub use embedder::EmbeddingGenerator;
pub use inferencer::ObservationInferencer;
pub use snapshot::{ChangeSource, UiSnapshot, UiStateChange};
pub use tracker::{MonitoringOverview, ObservationTracker};
