//! Service layer separating file access and progress reporting from the pipeline

pub mod io;
pub mod progress;

pub use io::{ImageIOService, SUPPORTED_EXTENSIONS};
pub use progress::{
    BatchProcessingStats, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
