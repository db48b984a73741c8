use minibox::{RunEvent, RunOutcome};

use super::{residue, shell_runner};

async fn collect(mut stream: minibox::OutputStream) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_stream_event_order() {
    let (runner, root) = shell_runner();

    let events = collect(runner.stream("echo one; echo two >&2; echo three", None)).await;

    assert!(matches!(events.first(), Some(RunEvent::Compiled { .. })));
    let lines: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Line(line) => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["one", "two", "three"]);

    match events.last() {
        Some(RunEvent::Finished(RunOutcome::Completed { output, .. })) => {
            assert_eq!(output, &lines);
        }
        other => panic!("expected completion last, got {other:?}"),
    }
    assert_eq!(residue(root.path()), 0);
}

#[tokio::test]
async fn test_stream_timeout_marker_is_last_line() {
    let (runner, _root) = shell_runner();
    let limits = minibox::ExecutionLimits::unset().with_wall_time_limit(0.5);

    let events = collect(runner.stream("echo partial; exec sleep 10", Some(limits))).await;

    let n = events.len();
    assert!(n >= 3);
    match &events[n - 2] {
        RunEvent::Line(line) => assert!(line.starts_with("Execution timed out")),
        other => panic!("expected marker line, got {other:?}"),
    }
    assert!(matches!(
        events[n - 1],
        RunEvent::Finished(RunOutcome::TimedOut { .. })
    ));
}

#[tokio::test]
async fn test_stream_compile_failure_has_no_compiled_event() {
    let (runner, _root) = shell_runner();

    let events = collect(runner.stream("SYNTAX", None)).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        RunEvent::Finished(RunOutcome::CompileFailed { .. })
    ));
}

#[tokio::test]
async fn test_stream_outcome_skips_lines() {
    let (runner, _root) = shell_runner();

    let outcome = runner.stream("echo a; echo b", None).outcome().await;
    assert_eq!(outcome.output(), ["a", "b"]);
}
