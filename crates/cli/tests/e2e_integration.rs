//! End-to-end integration tests for the MoonAgent runtime.
//!
//! These tests wire Manus the way the CLI does, from a config file through
//! tool dispatch, streaming and interrupt/resume across agent instances.

use std::sync::{Arc, Mutex};

use moonagent_agent::{AgentError, BUDGET_EXHAUSTED_MARKER, LOOP_EXHAUSTED_MESSAGE, Manus, TASK_COMPLETED_MARKER};
use moonagent_checkpoint::FileCheckpointStore;
use moonagent_config::{AppConfig, CheckpointBackend};
use moonagent_core::error::ToolError;
use moonagent_core::{AgentState, CheckpointStore, Tool};
use moonagent_providers::ScriptedModel;
use moonagent_tools::ClockTool;

// ── Mock Tool ────────────────────────────────────────────────────────────

/// A lookup tool that records every invocation.
struct LookupTool {
    calls: Mutex<Vec<String>>,
}

impl LookupTool {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Look up a term in the project glossary"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(arguments.to_string());
        let args: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(format!("definition of {}", args["query"].as_str().unwrap_or("?")))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn config(max_steps: u32, max_loops: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.agent.max_steps = max_steps;
    config.agent.max_loops = max_loops;
    config
}

fn manus(config: &AppConfig, model: ScriptedModel, tools: Vec<Arc<dyn Tool>>) -> Manus {
    Manus::new(config, Arc::new(model), tools, None).unwrap()
}

// ── Runs ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_clock_tool_round_trip() {
    let model = ScriptedModel::new([r#"I need the clock {"utc_offset_hours": 9}"#]).with_fallback("It is morning in Tokyo.");
    let manus = manus(&config(2, 5), model, vec![Arc::new(ClockTool) as Arc<dyn Tool>]);
    let ctx = manus.context();

    let message = manus.run(&ctx, "What time is it in Tokyo?").await.unwrap();
    let lines: Vec<&str> = message.content.lines().collect();

    assert_eq!(lines[0], r#"Step 1 result: Thought: I need the clock {"utc_offset_hours": 9}"#);
    assert_eq!(lines[1], r#"Action: Called tool clock with arguments: {"utc_offset_hours":9}"#);
    assert!(message.content.contains("Observation: Tool executed."));
    assert!(message.content.contains("+09:00"));
    assert!(message.content.contains("Step 2 result: Thought: It is morning in Tokyo."));
    assert_eq!(*lines.last().unwrap(), BUDGET_EXHAUSTED_MARKER);

    assert_eq!(manus.state(), AgentState::Success);
    assert_eq!(manus.step_history().len(), 2);
    assert_eq!(manus.current_loop(), 2);

    // user prompt, two step results, the aggregate
    let history = ctx.conversation_history(10);
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "What time is it in Tokyo?");
    assert_eq!(history[3].content, message.content);
}

#[tokio::test]
async fn e2e_loop_budget_stops_run_early() {
    let model = ScriptedModel::repeating("Nothing more to add.");
    let manus = manus(&config(5, 1), model, vec![LookupTool::new() as Arc<dyn Tool>]);

    let message = manus.run(&manus.context(), "define moon").await.unwrap();

    assert!(message.content.contains(&format!("Step 2 result: {LOOP_EXHAUSTED_MESSAGE}")));
    assert!(!message.content.contains("Step 3 result"));
    assert!(!message.content.contains(BUDGET_EXHAUSTED_MARKER));
    assert_eq!(manus.current_loop(), 1);
}

#[tokio::test]
async fn e2e_second_run_requires_reset() {
    let manus = manus(&config(1, 5), ScriptedModel::repeating("ok"), vec![LookupTool::new() as Arc<dyn Tool>]);

    manus.run(&manus.context(), "first").await.unwrap();
    let busy = manus.run(&manus.context(), "second").await.unwrap_err();
    assert!(matches!(busy, AgentError::Busy { .. }));

    manus.reset();
    assert_eq!(manus.state(), AgentState::Idle);
    manus.run(&manus.context(), "second").await.unwrap();
    assert_eq!(manus.step_history(), vec!["Thought: ok"]);
}

#[tokio::test]
async fn e2e_model_failure_is_reported() {
    let model = ScriptedModel::new(Vec::<String>::new());
    let manus = manus(&config(3, 5), model, vec![LookupTool::new() as Arc<dyn Tool>]);

    let err = manus.run(&manus.context(), "anything").await.unwrap_err();

    assert!(matches!(err, AgentError::Model(_)));
    assert_eq!(manus.state(), AgentState::Error);
}

// ── Streaming ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_stream_yields_steps_then_completion() {
    let model = ScriptedModel::new([r#"I should lookup "orbit""#]).with_fallback("Answered.");
    let tool = LookupTool::new();
    let manus = manus(&config(2, 5), model, vec![tool.clone() as Arc<dyn Tool>]);

    let mut rx = manus.run_stream(Arc::new(manus.context()), "what is an orbit?").unwrap();
    let mut received = Vec::new();
    while let Some(message) = rx.recv().await {
        received.push(message.content);
    }

    assert_eq!(received.len(), 3);
    assert!(received[0].contains("Called tool lookup"));
    assert!(received[0].contains("Result: definition of orbit"));
    assert_eq!(received[1], "Thought: Answered.");
    assert_eq!(received[2], TASK_COMPLETED_MARKER);
    assert_eq!(tool.calls(), vec![r#"{"query":"orbit"}"#]);
}

#[tokio::test]
async fn e2e_stream_reports_failure_in_band() {
    let model = ScriptedModel::new(Vec::<String>::new());
    let manus = manus(&config(2, 5), model, vec![LookupTool::new() as Arc<dyn Tool>]);

    let mut rx = manus.run_stream(Arc::new(manus.context()), "q").unwrap();
    let mut received = Vec::new();
    while let Some(message) = rx.recv().await {
        received.push(message.content);
    }

    assert_eq!(received.len(), 1);
    assert!(received[0].starts_with("Error: "));
}

// ── Interrupt / resume ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_interrupt_survives_agent_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(2, 5);
    config.checkpoint.backend = CheckpointBackend::File;
    config.checkpoint.interrupt_before_tools = true;
    let store = || -> Arc<dyn CheckpointStore> { Arc::new(FileCheckpointStore::new(dir.path())) };

    // First process: suspends before the lookup
    let tool = LookupTool::new();
    let first = Manus::new(
        &config,
        Arc::new(ScriptedModel::new([r#"I need to lookup "perigee""#])),
        vec![tool.clone() as Arc<dyn Tool>],
        Some(store()),
    )
    .unwrap();
    let ctx = first.context().with_checkpoint_id("e2e-run");
    let err = first.run(&ctx, "explain perigee").await.unwrap_err();

    let interrupt = err.as_interrupt().unwrap();
    assert_eq!(interrupt.checkpoint_id, "e2e-run");
    assert_eq!(interrupt.pending.tool_call.function.arguments, r#"{"query":"perigee"}"#);
    assert!(tool.calls().is_empty());
    assert!(dir.path().join("e2e-run.json").exists());

    // Second process: edits the arguments and resumes
    let second = Manus::new(
        &config,
        Arc::new(ScriptedModel::repeating("Perigee is the closest point.")),
        vec![tool.clone() as Arc<dyn Tool>],
        Some(store()),
    )
    .unwrap();
    let pending = second.pending_action("e2e-run").await.unwrap().unwrap();
    assert_eq!(pending.tool_call.function.name, "lookup");

    second
        .amend_pending_arguments("e2e-run", r#"{"query":"perigee of the moon"}"#)
        .await
        .unwrap();
    let resumed = second.context().with_checkpoint_id("e2e-run");
    let message = second.run(&resumed, "").await.unwrap();

    assert_eq!(tool.calls(), vec![r#"{"query":"perigee of the moon"}"#]);
    assert!(message.content.starts_with(r#"Step 1 result: Thought: I need to lookup "perigee""#));
    assert!(message.content.contains("Result: definition of perigee of the moon"));
    assert!(message.content.contains("Step 2 result: Thought: Perigee is the closest point."));
    assert_eq!(resumed.user_prompt().as_deref(), Some("explain perigee"));

    // Consumed checkpoints cannot be resumed twice
    assert!(second.pending_action("e2e-run").await.unwrap().is_none());
}

// ── Config ───────────────────────────────────────────────────────────────

#[test]
fn e2e_config_file_drives_agent_budgets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[agent]
name = "navigator"
max_steps = 3
max_loops = 2
debug = true

[memory]
capacity = 8

[checkpoint]
backend = "file"
interrupt_before_tools = true
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.checkpoint.backend, CheckpointBackend::File);

    let manus = manus(&config, ScriptedModel::repeating("ok"), vec![LookupTool::new() as Arc<dyn Tool>]);
    assert_eq!(manus.name(), "navigator");
    let info = manus.debug_info().unwrap();
    assert_eq!(info.max_steps, 3);
    assert_eq!(info.max_loops, 2);
    assert_eq!(info.tools_count, 1);
    assert_eq!(manus.context().memory().capacity(), 8);
}

#[test]
fn e2e_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[agent]\nmax_steps = 0\n").unwrap();

    assert!(AppConfig::load_from(&path).is_err());
}
