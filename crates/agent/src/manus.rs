//! Manus: the configured, tool-using agent the CLI drives.
//!
//! Composes a [`ToolCallAgent`] from an [`AppConfig`], a chat model, a tool
//! set and an optional checkpoint store. Interrupts before tool calls are
//! enabled only when the config asks for them *and* a store is attached.

use std::sync::Arc;

use moonagent_config::AppConfig;
use moonagent_core::{AgentConfig, AgentState, ChatModel, CheckpointStore, EventBus, Message, Tool, ToolInfo};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::base::AgentProfile;
use crate::checkpoint::PendingAction;
use crate::context::{ExecutionContext, MemoryState};
use crate::error::AgentError;
use crate::tool_call::ToolCallAgent;

/// Introspection snapshot, available in debug mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub name: String,
    pub state: AgentState,
    pub tools_count: usize,
    pub step_history: Vec<String>,
    pub current_loop: u32,
    pub max_steps: u32,
    pub max_loops: u32,
}

pub struct Manus {
    agent: ToolCallAgent,
    config: RwLock<AgentConfig>,
    memory_capacity: usize,
}

impl Manus {
    pub fn new(
        config: &AppConfig,
        model: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
    ) -> Result<Self, AgentError> {
        let agent_config = config.agent.clone();
        let profile = AgentProfile::from_config(&agent_config, model);

        let mut agent = ToolCallAgent::new(profile, tools)?
            .with_max_steps(agent_config.max_steps)
            .with_max_loops(agent_config.max_loops)
            .with_stream_buffer(agent_config.stream_buffer);

        let interrupts = config.checkpoint.interrupt_before_tools;
        match checkpoints {
            Some(store) => {
                agent = agent.with_checkpoint_store(store).with_interrupts(interrupts);
            }
            None if interrupts => {
                warn!("interrupt_before_tools is set but no checkpoint store is attached; interrupts disabled");
            }
            None => {}
        }

        info!(
            agent = %agent_config.name,
            tools = agent.tools().len(),
            max_steps = agent_config.max_steps,
            max_loops = agent_config.max_loops,
            "Manus ready"
        );

        Ok(Self {
            agent,
            config: RwLock::new(agent_config),
            memory_capacity: config.memory.capacity,
        })
    }

    /// A fresh execution context with the configured memory capacity.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::with_memory(
            CancellationToken::new(),
            Arc::new(MemoryState::new(self.memory_capacity)),
        )
    }

    pub fn agent(&self) -> &ToolCallAgent {
        &self.agent
    }

    pub fn events(&self) -> &EventBus {
        self.agent.react().events()
    }

    pub async fn run(&self, ctx: &ExecutionContext, input: &str) -> Result<Message, AgentError> {
        info!(agent = %self.name(), input = %input, "Manus run");
        let result = self.agent.run(ctx, input).await;
        if let Err(e) = &result {
            if e.as_interrupt().is_none() {
                warn!(agent = %self.name(), error = %e, "Manus run failed");
            }
        }
        result
    }

    pub fn run_stream(
        &self,
        ctx: Arc<ExecutionContext>,
        input: impl Into<String>,
    ) -> Result<mpsc::Receiver<Message>, AgentError> {
        let input = input.into();
        info!(agent = %self.name(), input = %input, "Manus streaming run");
        self.agent.run_stream(ctx, input)
    }

    // ── Single phases ────────────────────────────────────────────────────

    pub async fn think(&self, ctx: &ExecutionContext) -> Result<Option<Message>, AgentError> {
        self.agent.react().think(ctx).await
    }

    pub async fn act(&self, ctx: &ExecutionContext, thought: &str) -> Result<Option<Message>, AgentError> {
        self.agent.react().act(ctx, thought).await
    }

    pub async fn observe(&self, ctx: &ExecutionContext, action: &Message) -> Result<Option<Message>, AgentError> {
        self.agent.react().observe(ctx, action).await
    }

    // ── Tools ────────────────────────────────────────────────────────────

    pub fn add_tool(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        self.agent.add_tool(tool)
    }

    pub fn remove_tool(&self, name: &str) -> Result<bool, AgentError> {
        self.agent.remove_tool(name)
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.agent.tools()
    }

    // ── State ────────────────────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.config.read().name.clone()
    }

    pub fn reset(&self) {
        self.agent.reset();
        info!(agent = %self.name(), "Manus state reset");
    }

    pub fn state(&self) -> AgentState {
        self.agent.state()
    }

    pub fn step_history(&self) -> Vec<String> {
        self.agent.step_history()
    }

    pub fn current_loop(&self) -> u32 {
        self.agent.react().current_loop()
    }

    pub fn config(&self) -> AgentConfig {
        self.config.read().clone()
    }

    /// Replace the agent config and re-apply its budgets.
    ///
    /// Name and prompts are fixed at construction; a changed value is kept
    /// for reporting only.
    pub fn update_config(&self, config: AgentConfig) {
        let react = self.agent.react();
        react.set_max_steps(config.max_steps);
        react.set_max_loops(config.max_loops);
        info!(
            agent = %config.name,
            max_steps = config.max_steps,
            max_loops = config.max_loops,
            debug = config.debug,
            "Manus config updated"
        );
        *self.config.write() = config;
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.config.write().debug = enabled;
        info!(agent = %self.name(), enabled, "Manus debug mode changed");
    }

    pub fn is_debug(&self) -> bool {
        self.config.read().debug
    }

    /// `None` unless debug mode is on.
    pub fn debug_info(&self) -> Option<DebugInfo> {
        let config = self.config.read().clone();
        if !config.debug {
            return None;
        }
        Some(DebugInfo {
            name: config.name,
            state: self.state(),
            tools_count: self.tools().len(),
            step_history: self.step_history(),
            current_loop: self.current_loop(),
            max_steps: config.max_steps,
            max_loops: config.max_loops,
        })
    }

    // ── Interrupts ───────────────────────────────────────────────────────

    pub async fn pending_action(&self, checkpoint_id: &str) -> Result<Option<PendingAction>, AgentError> {
        self.agent.pending_action(checkpoint_id).await
    }

    pub async fn amend_pending_arguments(
        &self,
        checkpoint_id: &str,
        arguments: impl Into<String>,
    ) -> Result<PendingAction, AgentError> {
        self.agent.amend_pending_arguments(checkpoint_id, arguments).await
    }
}

impl std::fmt::Debug for Manus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manus")
            .field("agent", &self.agent)
            .field("config", &*self.config.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingTool;
    use moonagent_checkpoint::InMemoryCheckpointStore;
    use moonagent_providers::ScriptedModel;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.agent.max_steps = 2;
        config.agent.max_loops = 3;
        config.memory.capacity = 4;
        config
    }

    fn search() -> Arc<dyn Tool> {
        Arc::new(RecordingTool::new("search", "found"))
    }

    #[tokio::test]
    async fn builds_from_config() {
        let manus = Manus::new(&config(), Arc::new(ScriptedModel::repeating("ok")), vec![search()], None).unwrap();

        assert_eq!(manus.name(), "manus");
        assert_eq!(manus.agent().react().base().max_steps(), 2);
        assert_eq!(manus.agent().react().max_loops(), 3);
        assert_eq!(manus.context().memory().capacity(), 4);
        assert_eq!(manus.tools().len(), 1);
        assert_eq!(manus.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn debug_info_only_in_debug_mode() {
        let manus = Manus::new(&config(), Arc::new(ScriptedModel::repeating("ok")), vec![search()], None).unwrap();
        assert!(manus.debug_info().is_none());

        manus.set_debug_mode(true);
        let info = manus.debug_info().unwrap();
        assert_eq!(info.tools_count, 1);
        assert_eq!(info.max_steps, 2);
        assert_eq!(info.state, AgentState::Idle);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["state"], "idle");
    }

    #[tokio::test]
    async fn update_config_reapplies_budgets() {
        let manus = Manus::new(&config(), Arc::new(ScriptedModel::repeating("ok")), vec![search()], None).unwrap();
        let updated = AgentConfig {
            max_steps: 7,
            max_loops: 1,
            ..AgentConfig::default()
        };

        manus.update_config(updated.clone());

        assert_eq!(manus.config(), updated);
        assert_eq!(manus.agent().react().base().max_steps(), 7);
        assert_eq!(manus.agent().react().max_loops(), 1);
    }

    #[tokio::test]
    async fn interrupts_need_a_store() {
        let mut config = config();
        config.checkpoint.interrupt_before_tools = true;
        let model = Arc::new(ScriptedModel::repeating("I should search for \"x\""));

        let without_store = Manus::new(&config, model.clone(), vec![search()], None).unwrap();
        assert!(!without_store.agent().react().cycle().interrupts_enabled());
        let ctx = without_store.context();
        assert!(without_store.run(&ctx, "q").await.is_ok());

        let with_store = Manus::new(
            &config,
            model,
            vec![search()],
            Some(Arc::new(InMemoryCheckpointStore::new())),
        )
        .unwrap();
        let err = with_store.run(&with_store.context(), "q").await.unwrap_err();
        let interrupt = err.as_interrupt().unwrap();
        let pending = with_store.pending_action(&interrupt.checkpoint_id).await.unwrap().unwrap();
        assert_eq!(pending.tool_call.function.name, "search");
    }

    #[tokio::test]
    async fn run_then_reset_allows_another_run() {
        let manus = Manus::new(&config(), Arc::new(ScriptedModel::repeating("All good.")), vec![search()], None).unwrap();
        let ctx = manus.context();

        manus.run(&ctx, "first").await.unwrap();
        assert_eq!(manus.state(), AgentState::Success);
        assert!(matches!(manus.run(&ctx, "second").await, Err(AgentError::Busy { .. })));

        manus.reset();
        manus.run(&ctx, "second").await.unwrap();
        assert_eq!(manus.step_history().len(), 2);
    }

    #[tokio::test]
    async fn phases_can_be_driven_one_at_a_time() {
        let model = Arc::new(ScriptedModel::repeating("I should search for \"moon\""));
        let tool = Arc::new(RecordingTool::new("search", "moon facts"));
        let manus = Manus::new(&config(), model, vec![tool.clone() as Arc<dyn Tool>], None).unwrap();
        let ctx = manus.context();
        ctx.set_user_prompt("tell me about the moon");

        let thought = manus.think(&ctx).await.unwrap().unwrap();
        assert_eq!(thought.content, "I should search for \"moon\"");

        let action = manus.act(&ctx, &thought.content).await.unwrap().unwrap();
        assert_eq!(action.tool_calls[0].function.name, "search");
        assert_eq!(tool.calls(), vec![r#"{"query":"moon"}"#]);

        let observation = manus.observe(&ctx, &action).await.unwrap().unwrap();
        assert!(observation.content.ends_with("Result: moon facts"));

        assert!(manus.step_history().is_empty());
        assert_eq!(manus.state(), AgentState::Idle);
    }
}
