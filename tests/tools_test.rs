#![cfg(unix)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use jobsmith::engine::JobEngine;
use jobsmith::tools::jobs::{KillTool, PollTool, SubmitTool, register_all};
use jobsmith::tools::{Outcome, Tool, ToolRegistry};

async fn registry() -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_all(&registry, Arc::new(JobEngine::default())).await;
    registry
}

fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn json(outcome: &Outcome) -> Value {
    match outcome {
        Outcome::Success(s) => serde_json::from_str(s).unwrap(),
        Outcome::Error(e) => panic!("tool failed: {e}"),
    }
}

#[tokio::test]
async fn registers_all_job_tools() {
    let registry = registry().await;
    let names: Vec<_> = registry
        .descriptions()
        .await
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, ["kill", "list", "poll", "remove", "run_command", "submit"]);
}

#[tokio::test]
async fn submit_then_poll_until_done() {
    let registry = registry().await;
    let submitted = registry
        .execute("submit", &args(&[("command", "echo hello")]))
        .await;
    let id = json(&submitted.outcome)["id"].as_str().unwrap().to_string();

    let mut result = Value::Null;
    for _ in 0..250 {
        let polled = registry.execute("poll", &args(&[("id", &id)])).await;
        result = json(&polled.outcome);
        if result["status"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(result["status"], "done");
    assert_eq!(result["exitCode"], 0);
    assert_eq!(result["output"], "hello");
    assert_eq!(result["fromLine"], 0);
}

#[tokio::test]
async fn blacklisted_submit_is_structured() {
    let registry = registry().await;
    let result = registry
        .execute("submit", &args(&[("command", "cmd /c del foo")]))
        .await;
    assert_eq!(json(&result.outcome)["error"], "blacklisted");
}

#[tokio::test]
async fn unknown_id_reports_not_found() {
    let registry = registry().await;
    for tool in ["poll", "kill", "remove"] {
        let result = registry.execute(tool, &args(&[("id", "job_0_0")])).await;
        assert_eq!(json(&result.outcome)["error"], "not found", "{tool}");
    }
}

#[tokio::test]
async fn kill_reports_success_twice() {
    let registry = registry().await;
    let submitted = registry
        .execute("submit", &args(&[("command", "sleep 5")]))
        .await;
    let id = json(&submitted.outcome)["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let killed = json(&registry.execute("kill", &args(&[("id", &id)])).await.outcome);
        assert_eq!(killed["success"], true);
        assert_eq!(killed["id"], id.as_str());
    }
    let polled = json(&registry.execute("poll", &args(&[("id", &id)])).await.outcome);
    assert_eq!(polled["status"], "killed");
}

#[tokio::test]
async fn list_returns_summaries() {
    let registry = registry().await;
    registry
        .execute("submit", &args(&[("command", "sleep 5")]))
        .await;

    let rows = json(&registry.execute("list", &HashMap::new()).await.outcome);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["commandPreview"], "sleep 5");
    assert_eq!(rows[0]["status"], "running");
    assert!(rows[0].get("output").is_none());

    let id = rows[0]["id"].as_str().unwrap();
    registry.execute("kill", &args(&[("id", id)])).await;
}

#[tokio::test]
async fn run_command_returns_output() {
    let registry = registry().await;
    let result = registry
        .execute("run_command", &args(&[("command", "echo sync")]))
        .await;
    let value = json(&result.outcome);
    assert_eq!(value["stdout"], "sync\n");
    assert_eq!(value["exitCode"], 0);
    assert_eq!(value["timedOut"], false);
}

#[tokio::test]
async fn missing_args_are_tool_errors() {
    let engine = Arc::new(JobEngine::default());

    let err = SubmitTool::new(Arc::clone(&engine))
        .execute(&HashMap::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("command"));

    let err = KillTool::new(Arc::clone(&engine))
        .execute(&HashMap::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("id"));
}

#[tokio::test]
async fn bad_from_line_is_a_tool_error() {
    let tool = PollTool::new(Arc::new(JobEngine::default()));
    let err = tool
        .execute(&args(&[("id", "job_1_1"), ("fromLine", "-1")]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fromLine"));
}

#[tokio::test]
async fn registry_returns_error_for_unknown_tool() {
    let registry = ToolRegistry::new();

    let result = registry.execute("nonexistent", &HashMap::new()).await;
    assert!(matches!(result.outcome, Outcome::Error(ref s) if s.contains("unknown tool")));
}
