//! Dependency-ordered lifecycle scenarios over the `NullRuntime`.

use std::sync::Arc;

use mcp_compose_runtime::{compute_levels, LifecycleScheduler, NullRuntime};
use mcp_compose_test_utils::diamond_manifest;

#[test]
fn diamond_manifest_levels() {
    let config = diamond_manifest();
    let plan = compute_levels(&config.servers, &[]);
    assert_eq!(
        plan.levels,
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ]
    );
}

#[tokio::test]
async fn selection_pulls_dependencies() {
    let config = diamond_manifest();
    let runtime = Arc::new(NullRuntime::new());
    let scheduler = LifecycleScheduler::new(runtime.clone(), config);

    let summary = scheduler.up(&["d".to_string()]).await;
    assert!(summary.ok());
    assert_eq!(summary.results.len(), 4);

    let calls = runtime.calls();
    let position = |name: &str| {
        calls
            .iter()
            .position(|c| c == &format!("start {name}"))
            .unwrap_or_else(|| panic!("{name} never started"))
    };
    assert!(position("a") < position("b"));
    assert!(position("a") < position("c"));
    assert!(position("b") < position("d"));
    assert!(position("c") < position("d"));
}

#[tokio::test]
async fn partial_failure_reports_and_continues() {
    let config = diamond_manifest();
    let runtime = Arc::new(NullRuntime::new());
    runtime.fail_start("b");
    let scheduler = LifecycleScheduler::new(runtime.clone(), config);

    let summary = scheduler.up(&[]).await;
    let failed: Vec<&str> = summary.failed().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(failed, vec!["b"]);

    // peers of the failed server still run, and the dependent is attempted
    let calls = runtime.calls();
    assert!(calls.contains(&"start c".to_string()));
    assert!(calls.contains(&"start d".to_string()));

    // composite error for the CLI exit path
    assert!(summary.into_result().is_err());
}

#[tokio::test]
async fn down_is_reverse_of_up() {
    let config = diamond_manifest();
    let runtime = Arc::new(NullRuntime::new());
    let scheduler = LifecycleScheduler::new(runtime.clone(), config);

    scheduler.up(&[]).await;
    scheduler.down(&[]).await;

    let calls = runtime.calls();
    let stop_position = |name: &str| {
        calls
            .iter()
            .position(|c| c == &format!("stop {name}"))
            .unwrap()
    };
    assert!(stop_position("d") < stop_position("b"));
    assert!(stop_position("d") < stop_position("c"));
    assert!(stop_position("b") < stop_position("a"));
    assert!(stop_position("c") < stop_position("a"));
}
