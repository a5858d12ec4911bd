//! Stateless services shared by the pipeline and its frontends

pub mod cancellation;
pub mod format;
pub mod io;
pub mod progress;

pub use cancellation::CancellationToken;
pub use format::OutputFormatHandler;
pub use io::{DecodedImage, ImageIOService};
pub use progress::{
    CallbackProgressReporter, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressHandle, ProgressReporter, ProgressTracker, ProgressUpdate,
};
