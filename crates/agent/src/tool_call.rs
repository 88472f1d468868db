//! Tool-calling agent: a ReAct agent whose act phase dispatches tools.
//!
//! The thought is matched against the registered tool names
//! (case-insensitive substring, first registered wins). A match becomes a
//! `function` tool call whose arguments come from an [`ArgumentExtractor`].
//! Tool failures are reported as the action's content, never as run errors.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use moonagent_core::error::ToolError;
use moonagent_core::{
    AgentState, CheckpointStore, DomainEvent, EventBus, Message, Tool, ToolCall, ToolInfo,
    ToolRegistry,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::arguments::{ArgumentExtractor, JsonArgumentExtractor};
use crate::base::AgentProfile;
use crate::checkpoint::PendingAction;
use crate::context::ExecutionContext;
use crate::error::AgentError;
use crate::react::ReActAgent;
use crate::strategy::{CycleContext, ReActStrategy, ask, default_needs_action, render_history};

/// Action content when no registered tool matches the thought.
pub const NO_TOOL_NEEDED: &str = "No tool needed: the thought can be answered directly.";

/// Metadata key carrying a tool's raw output on the action message.
pub const TOOL_OUTPUT_KEY: &str = "tool_output";

/// Phases backed by a tool registry.
pub struct ToolCallStrategy {
    tools: RwLock<ToolRegistry>,
    extractor: Arc<dyn ArgumentExtractor>,
}

impl ToolCallStrategy {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools: RwLock::new(tools),
            extractor: Arc::new(JsonArgumentExtractor),
        }
    }

    pub fn with_argument_extractor(mut self, extractor: Arc<dyn ArgumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Descriptors of the registered tools, in registration order.
    pub fn tools(&self) -> Vec<ToolInfo> {
        self.tools.read().infos()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        self.tools.write().register(tool)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.tools.write().remove(name)
    }

    /// The system prompt extended with the tool catalog.
    fn system_prompt(&self, base: &str) -> String {
        let mut prompt = format!("{base}\n\nYou can use the following tools:\n");
        for info in self.tools.read().infos() {
            prompt.push_str(&format!("- {}: {}\n", info.name, info.description));
        }
        prompt.push_str(
            "\nWhen you need a tool, name it in your thought together with its arguments.",
        );
        prompt
    }

    fn think_prompt(user_prompt: &str, history: &[crate::react::ReActStep]) -> String {
        let mut prompt = format!("User question: {user_prompt}\n\n");
        if !history.is_empty() {
            prompt.push_str("Previous reasoning:\n");
            prompt.push_str(&render_history(history));
            prompt.push('\n');
        }
        prompt.push_str(
            "Analyze the current situation and decide whether a tool is needed. \
             If so, name the tool and its arguments.",
        );
        prompt
    }

    /// Match `thought` against the registry.
    fn plan(&self, thought: &str, history_len: usize) -> Option<ToolCall> {
        let lower = thought.to_lowercase();
        let tools = self.tools.read();
        let tool = tools.iter().find(|t| lower.contains(&t.name().to_lowercase()))?;
        let info = tool.info();
        Some(ToolCall::function(
            format!("call_{}_{history_len}", info.name),
            info.name.clone(),
            self.extractor.extract(thought, &info),
        ))
    }

    async fn dispatch(&self, events: &EventBus, call: &ToolCall) -> Result<String, ToolError> {
        let name = &call.function.name;
        let tools = self.tools.read().clone();
        let started = Instant::now();
        let result = tools.execute(name, &call.function.arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        events.publish(DomainEvent::ToolExecuted {
            tool_name: name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });
        match &result {
            Ok(_) => info!(tool = %name, arguments = %call.function.arguments, duration_ms, "Tool executed"),
            Err(e) => warn!(tool = %name, error = %e, duration_ms, "Tool execution failed"),
        }
        result
    }
}

impl std::fmt::Debug for ToolCallStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallStrategy")
            .field("tools", &*self.tools.read())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ReActStrategy for ToolCallStrategy {
    async fn think(&self, cx: CycleContext<'_>) -> Result<Option<Message>, AgentError> {
        if self.tools.read().is_empty() {
            return Err(AgentError::Step("no tools available".into()));
        }
        let system = self.system_prompt(&cx.profile.system_prompt);
        let prompt = Self::think_prompt(&cx.user_prompt()?, cx.history);
        let thought = ask(cx.profile, system, prompt).await?;
        info!(agent = %cx.profile.name, step = cx.step, thought = %thought.content, "Tool agent thought");
        Ok(Some(thought))
    }

    /// The keyword gate, or any registered tool named in the thought.
    fn needs_action(&self, thought: &str) -> bool {
        if default_needs_action(thought) {
            return true;
        }
        let lower = thought.to_lowercase();
        self.tools.read().iter().any(|t| lower.contains(&t.name().to_lowercase()))
    }

    fn plan_action(&self, cx: &CycleContext<'_>, thought: &str) -> Option<ToolCall> {
        self.plan(thought, cx.history_len)
    }

    async fn act(
        &self,
        cx: CycleContext<'_>,
        thought: &str,
        planned: Option<ToolCall>,
    ) -> Result<Option<Message>, AgentError> {
        let Some(call) = planned.or_else(|| self.plan(thought, cx.history_len)) else {
            return Ok(Some(Message::assistant(NO_TOOL_NEEDED)));
        };

        let message = match self.dispatch(cx.events, &call).await {
            Ok(output) => Message::assistant(format!(
                "Called tool {} with arguments: {}",
                call.function.name, call.function.arguments
            ))
            .with_metadata(TOOL_OUTPUT_KEY, serde_json::Value::String(output))
            .with_tool_calls(vec![call]),
            Err(e) => Message::assistant(format!("Tool call failed: {e}")),
        };
        Ok(Some(message))
    }

    async fn observe(&self, _cx: CycleContext<'_>, action: &Message) -> Result<Option<Message>, AgentError> {
        let mut observation = format!("Tool executed. Action: {}", action.content);
        if let Some(output) = action.metadata.get(TOOL_OUTPUT_KEY).and_then(|v| v.as_str()) {
            observation.push_str(&format!("\nResult: {output}"));
        }
        Ok(Some(Message::assistant(observation)))
    }
}

/// A ReAct agent that acts by calling registered tools.
#[derive(Clone, Debug)]
pub struct ToolCallAgent {
    react: ReActAgent<ToolCallStrategy>,
}

impl ToolCallAgent {
    /// Build an agent over `tools`, rejecting duplicate names.
    pub fn new(profile: AgentProfile, tools: Vec<Arc<dyn Tool>>) -> Result<Self, AgentError> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Self::with_strategy(profile, ToolCallStrategy::new(registry))
    }

    /// Build an agent over a prepared strategy and advertise its tools to
    /// the model.
    pub fn with_strategy(profile: AgentProfile, strategy: ToolCallStrategy) -> Result<Self, AgentError> {
        let agent = Self {
            react: ReActAgent::new(profile, strategy),
        };
        agent.bind_tools()?;
        Ok(agent)
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.react = self.react.with_max_steps(max_steps);
        self
    }

    pub fn with_max_loops(mut self, max_loops: u32) -> Self {
        self.react = self.react.with_max_loops(max_loops);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.react = self.react.with_checkpoint_store(store);
        self
    }

    /// Suspend before each tool dispatch for review.
    pub fn with_interrupts(mut self, enabled: bool) -> Self {
        self.react = self.react.with_interrupts(enabled);
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.react = self.react.with_stream_buffer(capacity);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.react = self.react.with_event_bus(events);
        self
    }

    pub fn react(&self) -> &ReActAgent<ToolCallStrategy> {
        &self.react
    }

    // ── Tools ────────────────────────────────────────────────────────────

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.react.strategy().tools()
    }

    pub fn add_tool(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        self.react.strategy().register(tool)?;
        self.bind_tools()?;
        info!(agent = %self.react.name(), tool = %name, "Tool added");
        Ok(())
    }

    /// Remove a tool by exact name. Removing an unknown tool is a no-op.
    pub fn remove_tool(&self, name: &str) -> Result<bool, AgentError> {
        if !self.react.strategy().remove(name) {
            return Ok(false);
        }
        self.bind_tools()?;
        info!(agent = %self.react.name(), tool = %name, "Tool removed");
        Ok(true)
    }

    fn bind_tools(&self) -> Result<(), AgentError> {
        let tools = self.tools();
        self.react.base().profile().model.bind_tools(&tools)?;
        Ok(())
    }

    // ── Delegated loop API ───────────────────────────────────────────────

    pub async fn run(&self, ctx: &ExecutionContext, input: &str) -> Result<Message, AgentError> {
        self.react.run(ctx, input).await
    }

    pub fn run_stream(
        &self,
        ctx: Arc<ExecutionContext>,
        input: impl Into<String>,
    ) -> Result<mpsc::Receiver<Message>, AgentError> {
        self.react.run_stream(ctx, input)
    }

    pub fn reset(&self) {
        self.react.reset();
    }

    pub fn state(&self) -> AgentState {
        self.react.state()
    }

    pub fn step_history(&self) -> Vec<String> {
        self.react.step_history()
    }

    pub async fn pending_action(&self, checkpoint_id: &str) -> Result<Option<PendingAction>, AgentError> {
        self.react.pending_action(checkpoint_id).await
    }

    pub async fn amend_pending_arguments(
        &self,
        checkpoint_id: &str,
        arguments: impl Into<String>,
    ) -> Result<PendingAction, AgentError> {
        self.react.amend_pending_arguments(checkpoint_id, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::RunCheckpoint;
    use crate::test_helpers::{RecordingTool, profile_with};
    use moonagent_checkpoint::InMemoryCheckpointStore;
    use moonagent_core::ChatModel;
    use moonagent_providers::ScriptedModel;

    fn search_agent(model: Arc<ScriptedModel>, tool: Arc<RecordingTool>) -> ToolCallAgent {
        ToolCallAgent::new(profile_with(model), vec![tool as Arc<dyn Tool>]).unwrap()
    }

    fn cx<'a>(
        ctx: &'a ExecutionContext,
        profile: &'a AgentProfile,
        events: &'a EventBus,
    ) -> CycleContext<'a> {
        CycleContext {
            ctx,
            profile,
            events,
            step: 1,
            history_len: 2,
            history: &[],
        }
    }

    #[tokio::test]
    async fn thought_naming_tool_dispatches_it() {
        let tool = Arc::new(RecordingTool::new("search", "three results"));
        let strategy = ToolCallStrategy::new(ToolRegistry::default());
        strategy.register(tool.clone()).unwrap();
        let profile = profile_with(Arc::new(ScriptedModel::repeating("unused")));
        let ctx = ExecutionContext::new();
        let events = EventBus::default();

        let action = strategy
            .act(cx(&ctx, &profile, &events), r#"I will use Search for "rust""#, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.tool_calls.len(), 1);
        let call = &action.tool_calls[0];
        assert_eq!(call.function.name, "search");
        assert_eq!(call.id, "call_search_2");
        assert_eq!(call.kind, "function");
        assert_eq!(call.function.arguments, r#"{"query":"rust"}"#);
        assert_eq!(tool.calls(), vec![r#"{"query":"rust"}"#]);
        assert_eq!(action.metadata[TOOL_OUTPUT_KEY], "three results");
    }

    #[tokio::test]
    async fn no_matching_tool_yields_canned_message() {
        let strategy = ToolCallStrategy::new(ToolRegistry::default());
        strategy.register(Arc::new(RecordingTool::new("search", "x"))).unwrap();
        let profile = profile_with(Arc::new(ScriptedModel::repeating("unused")));
        let ctx = ExecutionContext::new();
        let events = EventBus::default();

        let action = strategy
            .act(cx(&ctx, &profile, &events), "I can answer this myself", None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(action.content, NO_TOOL_NEEDED);
        assert!(action.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn first_registered_match_wins() {
        let strategy = ToolCallStrategy::new(ToolRegistry::default());
        strategy.register(Arc::new(RecordingTool::new("web_search", "a"))).unwrap();
        strategy.register(Arc::new(RecordingTool::new("search", "b"))).unwrap();

        let call = strategy.plan("run web_search now", 0).unwrap();
        assert_eq!(call.function.name, "web_search");
    }

    #[tokio::test]
    async fn tool_failure_becomes_content() {
        let strategy = ToolCallStrategy::new(ToolRegistry::default());
        strategy
            .register(Arc::new(RecordingTool::failing("search", "quota exceeded")))
            .unwrap();
        let profile = profile_with(Arc::new(ScriptedModel::repeating("unused")));
        let ctx = ExecutionContext::new();
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let action = strategy
            .act(cx(&ctx, &profile, &events), "search it", None)
            .await
            .unwrap()
            .unwrap();

        assert!(action.content.starts_with("Tool call failed: "));
        assert!(action.content.contains("quota exceeded"));
        assert!(action.tool_calls.is_empty());
        let event = rx.try_recv().unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::ToolExecuted { success: false, .. }));
    }

    #[tokio::test]
    async fn run_dispatches_tool_and_observes_output() {
        let model = Arc::new(ScriptedModel::new(["I should search for \"tokio\""]).with_fallback("The answer is ready."));
        let tool = Arc::new(RecordingTool::new("search", "tokio is an async runtime"));
        let agent = search_agent(model.clone(), tool.clone()).with_max_steps(1);

        agent.run(&ExecutionContext::new(), "what is tokio?").await.unwrap();

        assert_eq!(tool.calls(), vec![r#"{"query":"tokio"}"#]);
        let history = agent.step_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].contains("Action: Called tool search with arguments: {\"query\":\"tokio\"}"));
        assert!(history[0].contains("Result: tokio is an async runtime"));

        let system = &model.last_request().unwrap()[0].content;
        assert!(system.contains("- search: Test tool"));
    }

    #[tokio::test]
    async fn empty_catalog_fails_think() {
        let model = Arc::new(ScriptedModel::repeating("search"));
        let agent = ToolCallAgent::new(profile_with(model), vec![]).unwrap().with_max_steps(1);
        let err = agent.run(&ExecutionContext::new(), "q").await.unwrap_err();
        assert!(matches!(err, AgentError::Step(ref m) if m == "no tools available"));
    }

    #[tokio::test]
    async fn add_and_remove_tools_rebind_model() {
        let model = Arc::new(ScriptedModel::repeating("x"));
        let agent = ToolCallAgent::new(profile_with(model.clone()), vec![]).unwrap();

        agent.add_tool(Arc::new(RecordingTool::new("search", "x"))).unwrap();
        agent.add_tool(Arc::new(RecordingTool::new("clock", "x"))).unwrap();
        assert_eq!(model.bound_tool_names(), vec!["search", "clock"]);

        let dup = agent.add_tool(Arc::new(RecordingTool::new("search", "y")));
        assert!(matches!(dup, Err(AgentError::Tool(ToolError::AlreadyRegistered(_)))));

        assert!(agent.remove_tool("search").unwrap());
        assert!(!agent.remove_tool("search").unwrap());
        assert_eq!(model.bound_tool_names(), vec!["clock"]);
        assert_eq!(agent.tools().len(), 1);
        assert_eq!(model.name(), "scripted");
    }

    #[tokio::test]
    async fn interrupt_then_resume_dispatches_edited_arguments() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let model = Arc::new(ScriptedModel::new(["I need to search for \"rust\""]).with_fallback("done thinking"));
        let tool = Arc::new(RecordingTool::new("search", "rust results"));
        let agent = search_agent(model, tool.clone())
            .with_max_steps(2)
            .with_checkpoint_store(store.clone())
            .with_interrupts(true);

        let ctx = ExecutionContext::new().with_checkpoint_id("cp-42");
        let err = agent.run(&ctx, "find rust news").await.unwrap_err();

        let interrupt = err.as_interrupt().unwrap();
        assert_eq!(interrupt.checkpoint_id, "cp-42");
        assert_eq!(interrupt.pending.tool_call.function.name, "search");
        assert_eq!(interrupt.pending.tool_call.function.arguments, r#"{"query":"rust"}"#);
        assert!(tool.calls().is_empty());
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.react().thoughts().is_empty());

        agent
            .amend_pending_arguments("cp-42", r#"{"query":"rust 2024 edition"}"#)
            .await
            .unwrap();

        let resumed = ExecutionContext::new().with_checkpoint_id("cp-42");
        let message = agent.run(&resumed, "ignored").await.unwrap();

        assert_eq!(tool.calls(), vec![r#"{"query":"rust 2024 edition"}"#]);
        assert_eq!(agent.react().thoughts()[0], "I need to search for \"rust\"");
        assert!(message.content.starts_with("Step 1 result: Thought: I need to search"));
        assert!(message.content.contains("Step 2 result: Thought: done thinking"));
        assert_eq!(agent.state(), AgentState::Success);
        assert!(agent.pending_action("cp-42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn thought_naming_a_tool_passes_the_action_gate() {
        let model = Arc::new(ScriptedModel::new(["Let me check the clock"]).with_fallback("It is noon."));
        let tool = Arc::new(RecordingTool::new("clock", "12:00"));
        let agent = search_agent(model, tool.clone()).with_max_steps(1);

        assert!(!default_needs_action("Let me check the clock"));
        agent.run(&ExecutionContext::new(), "what time is it?").await.unwrap();

        assert_eq!(tool.calls(), vec!["{}"]);
        let history = agent.step_history();
        assert!(history[0].contains("Action: Called tool clock with arguments: {}"));
        assert!(history[0].contains("Result: 12:00"));
    }

    #[test]
    fn needs_action_ignores_unregistered_names() {
        let strategy = ToolCallStrategy::new(ToolRegistry::default());
        strategy.register(Arc::new(RecordingTool::new("clock", "x"))).unwrap();

        assert!(strategy.needs_action("Let me check the CLOCK"));
        assert!(strategy.needs_action("I should think more"));
        assert!(!strategy.needs_action("Let me check the weather"));
    }

    #[tokio::test]
    async fn failed_restore_keeps_checkpoint_resumable() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let model = Arc::new(ScriptedModel::new(["I need to search for \"rust\""]).with_fallback("done"));
        let tool = Arc::new(RecordingTool::new("search", "rust results"));
        let agent = search_agent(model, tool.clone())
            .with_max_steps(1)
            .with_checkpoint_store(store.clone())
            .with_interrupts(true);
        let ctx = ExecutionContext::new().with_checkpoint_id("cp-bad");
        agent.run(&ctx, "find rust news").await.unwrap_err();

        let original = store.get("cp-bad").await.unwrap().unwrap();
        let mut broken = RunCheckpoint::from_bytes(&original).unwrap();
        broken.stepper = serde_json::json!("not a cycle snapshot");
        store.set("cp-bad", broken.to_bytes().unwrap()).await.unwrap();

        let err = agent
            .run(&ExecutionContext::new().with_checkpoint_id("cp-bad"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Snapshot(_)));
        assert!(tool.calls().is_empty());
        assert!(agent.pending_action("cp-bad").await.unwrap().is_some());

        // Repaired checkpoint resumes normally
        store.set("cp-bad", original).await.unwrap();
        agent.reset();
        agent
            .run(&ExecutionContext::new().with_checkpoint_id("cp-bad"), "")
            .await
            .unwrap();
        assert_eq!(tool.calls(), vec![r#"{"query":"rust"}"#]);
    }
}
