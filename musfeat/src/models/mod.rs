//! Data models for the extraction pipeline

pub mod audio;
pub mod feature_spec;
pub mod result;
pub mod serde_path;
pub mod shard;

pub use audio::RawBuffer;
pub use feature_spec::FeatureSpec;
pub use result::{
    FailureStage, FeatureValue, FeatureVector, FileFailure, FileOutcome, ResultEntry, ResultSet,
    RunSummary,
};
pub use shard::{Shard, ShardEntry};
