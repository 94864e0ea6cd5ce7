//! Worker process tests
//!
//! Exercise the real `musfeat worker` subprocess, both directly through its
//! stdin/stdout protocol and through the process launcher.

mod helpers;

use helpers::{generate_corrupt_file, generate_test_library, write_features};
use musfeat::models::{FailureStage, FeatureSpec, Shard, ShardEntry};
use musfeat::services::OutputDocument;
use musfeat::workers::{
    ProcessLauncher, ThreadLauncher, WorkerConfig, WorkerRequest, WorkerResponse,
};
use musfeat::{run, PipelineConfig, RunOutcome};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const BIN: &str = env!("CARGO_BIN_EXE_musfeat");

#[test]
fn test_worker_subcommand_speaks_json() {
    let temp_dir = TempDir::new().unwrap();
    let files = generate_test_library(temp_dir.path(), 2).unwrap();
    let corrupt = generate_corrupt_file(&temp_dir.path().join("zz.wav")).unwrap();

    let request = WorkerRequest {
        shard: Shard {
            index: 3,
            entries: vec![
                ShardEntry { position: 3, path: files[0].clone() },
                ShardEntry { position: 7, path: corrupt },
                ShardEntry { position: 11, path: files[1].clone() },
            ],
        },
        config: WorkerConfig::new(FeatureSpec::parse("rms;mfcc").unwrap()),
    };

    let mut child = Command::new(BIN)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start worker");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(&serde_json::to_vec(&request).unwrap())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let response: WorkerResponse = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response.shard_index, 3);
    assert_eq!(response.results.len(), 3);
    assert!(response.results[0].is_success());
    assert_eq!(response.results[1].failure().unwrap().stage, FailureStage::Decode);
    assert!(response.results[2].is_success());
}

#[test]
fn test_worker_rejects_garbage_request() {
    let mut child = Command::new(BIN)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start worker");

    child.stdin.take().unwrap().write_all(b"not a request").unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_with_worker_processes() {
    let temp_dir = TempDir::new().unwrap();
    let music = temp_dir.path().join("music");
    let expected = generate_test_library(&music, 5).unwrap();
    let features = write_features(temp_dir.path(), "rms;zcr;centroid").unwrap();

    let mut config = PipelineConfig::new(vec![music], features, temp_dir.path().join("out.json"));
    config.workers = 2;

    let outcome = run(
        &config,
        Arc::new(ProcessLauncher::new(BIN)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.succeeded, 5);
            assert_eq!(summary.crashed_workers, 0);
        }
        other => panic!("Expected completed run, got {:?}", other),
    }

    let document: OutputDocument =
        serde_json::from_str(&std::fs::read_to_string(&config.output).unwrap()).unwrap();
    let paths: Vec<_> = document.files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unstartable_worker_marks_files_failed() {
    let temp_dir = TempDir::new().unwrap();
    let music = temp_dir.path().join("music");
    generate_test_library(&music, 3).unwrap();
    let features = write_features(temp_dir.path(), "rms").unwrap();

    let mut config = PipelineConfig::new(vec![music], features, temp_dir.path().join("out.json"));
    config.workers = 2;

    let outcome = run(
        &config,
        Arc::new(ProcessLauncher::new(temp_dir.path().join("no-such-binary"))),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.crashed_workers, 2);
            assert_eq!(summary.failed, 3);
        }
        other => panic!("Expected completed run, got {:?}", other),
    }
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_process_receives_non_utf8_paths() {
    use helpers::{generate_test_wav, AudioConfig};
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp_dir = TempDir::new().unwrap();
    let music = temp_dir.path().join("music");
    generate_test_library(&music, 4).unwrap();
    generate_test_wav(&music.join(OsStr::from_bytes(b"caf\xe9.wav")), &AudioConfig::default())
        .unwrap();
    let features = write_features(temp_dir.path(), "rms").unwrap();

    let mut config = PipelineConfig::new(vec![music.clone()], features, temp_dir.path().join("out.json"));
    config.workers = 2;

    let outcome = run(&config, Arc::new(ProcessLauncher::new(BIN)), &CancellationToken::new())
        .await
        .unwrap();
    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.succeeded, 5);
            assert_eq!(summary.crashed_workers, 0);
        }
        other => panic!("Expected completed run, got {:?}", other),
    }

    let document: OutputDocument =
        serde_json::from_str(&std::fs::read_to_string(&config.output).unwrap()).unwrap();
    assert_eq!(document.files[0].path, music.join("caf\u{FFFD}.wav"));
    assert!(document.files[0].outcome.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_and_thread_workers_agree() {
    let temp_dir = TempDir::new().unwrap();
    let music = temp_dir.path().join("music");
    generate_test_library(&music, 3).unwrap();
    let features = write_features(temp_dir.path(), "rms;centroid;mfcc").unwrap();

    let mut config = PipelineConfig::new(vec![music], features, temp_dir.path().join("out.json"));
    config.workers = 2;

    let read = |path: &std::path::Path| -> OutputDocument {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    };

    run(&config, Arc::new(ThreadLauncher), &CancellationToken::new())
        .await
        .unwrap();
    let in_process = read(&config.output);

    run(&config, Arc::new(ProcessLauncher::new(BIN)), &CancellationToken::new())
        .await
        .unwrap();
    let out_of_process = read(&config.output);

    // Same values down to the last bit
    assert_eq!(in_process.files, out_of_process.files);
}
