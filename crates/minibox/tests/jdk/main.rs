//! Integration tests against a real JDK
//!
//! These tests require `javac` and `java` on PATH.
//! Run with: cargo test -p minibox --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::time::Duration;

use minibox::runner::timeout_marker;
use minibox::{Config, Rejection, RunEvent, RunOutcome, Runner};

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

fn java_runner(root: &std::path::Path) -> Runner {
    let mut config = Config::default();
    config.workspace.root = Some(root.to_path_buf());
    Runner::new(config).expect("Failed to create runner")
}

#[tokio::test]
async fn test_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("Hello.java")).await;
    match outcome {
        RunOutcome::Completed { output, exit_code } => {
            assert_eq!(output, vec!["ok"]);
            assert_eq!(exit_code, Some(0));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_stdout_and_stderr_share_one_stream() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("Counter.java")).await;
    assert_eq!(
        outcome.output(),
        ["line 1", "line 2", "line 3", "done"]
    );
}

#[tokio::test]
async fn test_exit_call_rejected_before_compiling() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("Exit.java")).await;
    match &outcome {
        RunOutcome::Rejected { rejection } => {
            assert_eq!(rejection, &Rejection::Literal("System.exit".into()));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(
        outcome.render(),
        vec!["Security Alert: Dangerous code detected! (System.exit)"]
    );
}

#[tokio::test]
async fn test_syntax_error_reports_line() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("SyntaxError.java")).await;
    match outcome {
        RunOutcome::CompileFailed { diagnostics } => {
            assert!(!diagnostics.is_empty());
            assert_eq!(diagnostics[0].line, Some(3));
            assert!(diagnostics[0].message.contains("';' expected"));
        }
        other => panic!("expected compile failure, got {other:?}"),
    }
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("InfiniteLoop.java")).await;
    match outcome {
        RunOutcome::TimedOut { output } => {
            assert_eq!(output.first().map(String::as_str), Some("start"));
            assert_eq!(output.last(), Some(&timeout_marker(Duration::from_secs(3))));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_uncaught_exception_completes_with_trace() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let outcome = runner.run(&fixture_source("Throws.java")).await;
    match outcome {
        RunOutcome::Completed { output, exit_code } => {
            assert_eq!(output[0], "before");
            assert!(output.iter().any(|l| l.contains("IllegalStateException: boom")));
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_reports_compiled_before_output() {
    let root = tempfile::tempdir().unwrap();
    let runner = java_runner(root.path());

    let mut stream = runner.stream(fixture_source("Hello.java"), None);
    assert!(matches!(stream.recv().await, Some(RunEvent::Compiled { .. })));
    assert!(matches!(stream.recv().await, Some(RunEvent::Line(line)) if line == "ok"));
    assert!(matches!(
        stream.recv().await,
        Some(RunEvent::Finished(RunOutcome::Completed { .. }))
    ));
    assert!(stream.recv().await.is_none());
}
