pub mod ingestion;

pub use ingestion::{IngestionWorker, ProcessingPipeline};
