//! Pipeline stages
//!
//! Discovery ([`path_filter`], [`file_scanner`]) and fan-out
//! ([`dispatcher`]) run in the parent. [`worker_pipeline`] composes
//! [`audio_loader`] and [`feature_extractor`] inside each worker. Results
//! come back through [`aggregator`] and leave through [`output_writer`].

pub mod aggregator;
pub mod audio_loader;
pub mod dispatcher;
pub mod feature_extractor;
pub mod file_scanner;
pub mod output_writer;
pub mod path_filter;
pub mod worker_pipeline;

pub use aggregator::aggregate;
pub use audio_loader::{AudioLoader, LoadError, LoaderOptions};
pub use dispatcher::{partition, DispatchOutcome, DispatchReport, Dispatcher};
pub use feature_extractor::{ExtractError, FeatureExtractor, FeatureKind};
pub use file_scanner::{Discovery, FileScanner, ScanError};
pub use output_writer::{write_results, OutputDocument};
pub use path_filter::{relative_path, PathFilter};
pub use worker_pipeline::{WorkerConfig, WorkerPipeline};
