//! Reassemble shard outputs into discovery order
//!
//! Each output entry is placed back at the position its file had in the
//! discovery order, using the positions recorded in the shards. Anything
//! that would leave a slot empty, fill one twice, or attach a result to the
//! wrong file is an aggregation error.

use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{FileOutcome, ResultEntry, ResultSet, Shard};

/// Merge per-shard outputs into a [`ResultSet`] aligned with `original_order`
///
/// `shard_outputs[k]` must be index-aligned with `shards[k].entries`.
pub fn aggregate(
    original_order: &[PathBuf],
    shard_outputs: Vec<Vec<FileOutcome>>,
    shards: &[Shard],
) -> PipelineResult<ResultSet> {
    if shard_outputs.len() != shards.len() {
        return Err(PipelineError::Aggregation(format!(
            "expected outputs for {} shards, got {}",
            shards.len(),
            shard_outputs.len()
        )));
    }

    let mut slots: Vec<Option<FileOutcome>> = vec![None; original_order.len()];

    for (shard, outputs) in shards.iter().zip(shard_outputs) {
        if outputs.len() != shard.len() {
            return Err(PipelineError::Aggregation(format!(
                "shard {} has {} files but {} results",
                shard.index,
                shard.len(),
                outputs.len()
            )));
        }

        for (entry, outcome) in shard.entries.iter().zip(outputs) {
            let expected = original_order.get(entry.position).ok_or_else(|| {
                PipelineError::Aggregation(format!(
                    "shard {} refers to position {} beyond {} files",
                    shard.index,
                    entry.position,
                    original_order.len()
                ))
            })?;

            if *expected != entry.path {
                return Err(PipelineError::Aggregation(format!(
                    "position {} is {} but shard {} has {}",
                    entry.position,
                    expected.display(),
                    shard.index,
                    entry.path.display()
                )));
            }

            let slot = &mut slots[entry.position];
            if slot.is_some() {
                return Err(PipelineError::Aggregation(format!(
                    "{} appears in more than one shard",
                    entry.path.display()
                )));
            }
            *slot = Some(outcome);
        }
    }

    let entries = original_order
        .iter()
        .zip(slots)
        .map(|(path, slot)| {
            slot.map(|outcome| ResultEntry {
                path: path.clone(),
                outcome,
            })
            .ok_or_else(|| {
                PipelineError::Aggregation(format!("no result for {}", path.display()))
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(ResultSet::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureStage, FeatureValue, FeatureVector, FileFailure};
    use crate::services::dispatcher::partition;

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/m/{}.wav", i))).collect()
    }

    /// Outcome whose single feature value is the file's position
    fn tagged(position: usize) -> FileOutcome {
        FileOutcome::Extracted(FeatureVector {
            features: vec![FeatureValue {
                name: "rms".to_string(),
                values: vec![position as f64],
            }],
        })
    }

    fn outputs_for(shards: &[Shard]) -> Vec<Vec<FileOutcome>> {
        shards
            .iter()
            .map(|s| s.entries.iter().map(|e| tagged(e.position)).collect())
            .collect()
    }

    #[test]
    fn test_restores_discovery_order() {
        let order = files(10);
        let shards = partition(&order, 3);
        let set = aggregate(&order, outputs_for(&shards), &shards).unwrap();

        assert_eq!(set.len(), 10);
        for (i, entry) in set.entries().iter().enumerate() {
            assert_eq!(entry.path, order[i]);
            let value = entry.outcome.features().unwrap().get("rms").unwrap().values[0];
            assert_eq!(value, i as f64);
        }
    }

    #[test]
    fn test_shard_output_order_does_not_matter() {
        let order = files(5);
        let shards = partition(&order, 2);
        let mut reversed_shards = shards.clone();
        reversed_shards.reverse();

        let set = aggregate(&order, outputs_for(&reversed_shards), &reversed_shards).unwrap();
        assert_eq!(set.paths(), order.iter().map(PathBuf::as_path).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_keep_their_slot() {
        let order = files(3);
        let shards = partition(&order, 1);
        let outputs = vec![vec![
            tagged(0),
            FileOutcome::Failed(FileFailure::new(FailureStage::Decode, "bad")),
            tagged(2),
        ]];

        let set = aggregate(&order, outputs, &shards).unwrap();
        assert_eq!(set.succeeded(), 2);
        assert!(!set.entries()[1].outcome.is_success());
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let order = files(4);
        let shards = partition(&order, 2);
        let mut outputs = outputs_for(&shards);
        outputs[1].pop();

        assert!(matches!(
            aggregate(&order, outputs, &shards),
            Err(PipelineError::Aggregation(_))
        ));
    }

    #[test]
    fn test_missing_shard_is_error() {
        let order = files(4);
        let shards = partition(&order, 2);
        let mut outputs = outputs_for(&shards);
        outputs.pop();

        assert!(aggregate(&order, outputs, &shards).is_err());
    }

    #[test]
    fn test_uncovered_file_is_error() {
        let order = files(3);
        let mut shards = partition(&order, 1);
        shards[0].entries.remove(1);

        assert!(aggregate(&order, outputs_for(&shards), &shards).is_err());
    }

    #[test]
    fn test_duplicate_position_is_error() {
        let order = files(2);
        let mut shards = partition(&order, 2);
        shards[1].entries[0] = shards[0].entries[0].clone();

        assert!(aggregate(&order, outputs_for(&shards), &shards).is_err());
    }

    #[test]
    fn test_wrong_path_is_error() {
        let order = files(2);
        let mut shards = partition(&order, 1);
        shards[0].entries[1].path = PathBuf::from("/elsewhere.wav");

        assert!(aggregate(&order, outputs_for(&shards), &shards).is_err());
    }

    #[test]
    fn test_empty_run() {
        let shards = partition(&[], 4);
        let set = aggregate(&[], vec![Vec::new(); 4], &shards).unwrap();
        assert!(set.is_empty());
    }
}
