use std::time::Duration;

use minibox::runner::timeout_marker;
use minibox::{Config, Diagnostic, ExecutionLimits, Rejection, RunOutcome, Runner};

use super::{fixture_config, residue, shell_config, shell_runner};

#[tokio::test]
async fn test_rejection_creates_no_workspace() {
    let (runner, root) = shell_runner();

    let outcome = runner.run("rm -rf /").await;
    match outcome {
        RunOutcome::Rejected { rejection } => {
            assert_eq!(rejection, Rejection::Literal("rm -rf".into()));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_literal_matches_across_whitespace() {
    let (runner, _root) = shell_runner();

    let outcome = runner.run("rm \t  -rf   /tmp/x").await;
    assert!(matches!(
        outcome,
        RunOutcome::Rejected {
            rejection: Rejection::Literal(_)
        }
    ));
}

#[tokio::test]
async fn test_pattern_rejection_uses_description() {
    let (runner, _root) = shell_runner();

    let outcome = runner.run("curl   http://example.com").await;
    match outcome {
        RunOutcome::Rejected { rejection } => {
            assert_eq!(rejection, Rejection::Pattern("network fetch".into()));
            assert_eq!(
                rejection.to_string(),
                "Dangerous pattern blocked: network fetch"
            );
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parent_directory_token_rejected() {
    let (runner, root) = shell_runner();

    let outcome = runner.run("cat ../secret").await;
    match outcome {
        RunOutcome::Rejected { rejection } => {
            assert_eq!(rejection, Rejection::ParentDirectory);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_compile_failure_skips_execution() {
    let (runner, root) = shell_runner();

    let outcome = runner.run("echo SYNTAX; echo should-not-run").await;
    match &outcome {
        RunOutcome::CompileFailed { diagnostics } => {
            assert_eq!(
                diagnostics,
                &vec![Diagnostic::new(Some(2), "unexpected token")]
            );
        }
        other => panic!("expected compile failure, got {other:?}"),
    }
    assert!(outcome.output().is_empty());
    assert_eq!(
        outcome.render(),
        vec!["Compilation failed:", "Line 2: unexpected token"]
    );
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_completed_output_in_order() {
    let (runner, root) = shell_runner();

    let outcome = runner
        .run("for i in 1 2 3; do echo \"line $i\"; done; echo oops >&2")
        .await;
    match outcome {
        RunOutcome::Completed { output, exit_code } => {
            assert_eq!(output, vec!["line 1", "line 2", "line 3", "oops"]);
            assert_eq!(exit_code, Some(0));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_nonzero_exit_still_completes() {
    let (runner, _root) = shell_runner();

    let outcome = runner.run("echo failing; exit 4").await;
    match outcome {
        RunOutcome::Completed { output, exit_code } => {
            assert_eq!(output, vec!["failing"]);
            assert_eq!(exit_code, Some(4));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let (runner, root) = shell_runner();
    let limits = ExecutionLimits::unset().with_wall_time_limit(0.5);

    let outcome = runner
        .run_with_limits("echo partial; exec sleep 10", &limits)
        .await;
    match outcome {
        RunOutcome::TimedOut { output } => {
            assert_eq!(
                output,
                vec![
                    "partial".to_owned(),
                    timeout_marker(Duration::from_millis(500))
                ]
            );
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_timed_out_program_is_not_running_afterwards() {
    let (runner, _root) = shell_runner();
    let limits = ExecutionLimits::unset().with_wall_time_limit(0.5);

    let outcome = runner
        .run_with_limits("echo $$; exec sleep 10", &limits)
        .await;
    assert_eq!(outcome.kind(), "timed_out");

    let pid: u32 = outcome.output()[0].parse().unwrap();
    let alive = std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .unwrap();
    assert!(!alive.success(), "process {pid} is still running");
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let (runner, root) = shell_runner();
    let script = "echo $$ > pid.txt; sleep 0.2; pwd; cat pid.txt; ls";

    let (first, second) = tokio::join!(runner.run(script), runner.run(script));
    let first = first.output().to_vec();
    let second = second.output().to_vec();

    // Different directories and pids, each seeing only its own files
    assert_ne!(first[0], second[0]);
    assert_ne!(first[1], second[1]);
    for output in [&first, &second] {
        assert_eq!(output[2..], ["main.sh", "pid.txt", "program.txt"]);
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_back_to_back_rejections_leave_no_residue() {
    let (runner, root) = shell_runner();

    for _ in 0..3 {
        let outcome = runner.run("rm -rf ~").await;
        assert_eq!(outcome.kind(), "rejected");
    }
    assert_eq!(residue(root.path()), 0);

    assert!(runner.run("echo fine").await.is_completed());
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_missing_compiler_is_infrastructure_error() {
    let root = tempfile::tempdir().unwrap();
    let mut config = shell_config(root.path());
    config.toolchain.compile.command = vec!["no-such-compiler-binary".to_owned()];
    let runner = Runner::new(config).unwrap();

    let outcome = runner.run("echo hi").await;
    match &outcome {
        RunOutcome::InfrastructureError { message } => {
            assert!(message.contains("no-such-compiler-binary"), "{message}");
        }
        other => panic!("expected infrastructure error, got {other:?}"),
    }
    assert!(outcome.render()[0].starts_with("Error: "));
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_missing_workspace_root_is_infrastructure_error() {
    let root = tempfile::tempdir().unwrap();
    let config = shell_config(&root.path().join("missing"));
    let runner = Runner::new(config).unwrap();

    let outcome = runner.run("echo hi").await;
    assert_eq!(outcome.kind(), "infrastructure_error");
}

#[tokio::test]
async fn test_partial_limits_section_keeps_default_output_cap() {
    let root = tempfile::tempdir().unwrap();
    let mut config = Config::from_file(fixture_config("partial_limits.toml")).unwrap();
    config.workspace.root = Some(root.path().to_path_buf());
    let runner = Runner::new(config).unwrap();

    let outcome = runner.run("seq 1 10005").await;
    match outcome {
        RunOutcome::Completed { output, .. } => {
            assert_eq!(output.len(), 10_001);
            assert_eq!(output[9_999], "10000");
            assert_eq!(
                output.last().map(String::as_str),
                Some("... output truncated after 10000 lines")
            );
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
