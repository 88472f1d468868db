//! ReAct agent: Thought → Action → Observation, one cycle per step.
//!
//! [`ReActCycle`] is the step function; it runs one cycle through a
//! [`ReActStrategy`] and keeps the cycle record. [`ReActAgent`] wraps it in
//! the bounded loop.
//!
//! Each step returns only the cycle it just completed. The cumulative
//! record is available from [`ReActAgent::transcript`].
//!
//! When interrupts are enabled, a cycle whose strategy plans a tool call
//! suspends before `act`. The thought and call travel in the checkpoint and
//! the resumed step dispatches the call without thinking again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use moonagent_core::event::preview;
use moonagent_core::{AgentState, CheckpointStore, EventBus, Message};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::base::{AgentProfile, BaseAgent, StepFunction, StepScope};
use crate::checkpoint::PendingAction;
use crate::context::ExecutionContext;
use crate::error::AgentError;
use crate::strategy::{CycleContext, DefaultStrategy, ReActStrategy};

/// Returned by a step once the cycle budget is spent. Ends the loop.
pub const LOOP_EXHAUSTED_MESSAGE: &str = "ReAct loop budget exhausted";

/// One completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReActStep {
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

impl ReActStep {
    /// `Thought: ...` with `Action:` and `Observation:` lines when present.
    pub fn render(&self) -> String {
        let mut out = format!("Thought: {}", self.thought);
        if let Some(action) = &self.action {
            out.push_str(&format!("\nAction: {action}"));
        }
        if let Some(observation) = &self.observation {
            out.push_str(&format!("\nObservation: {observation}"));
        }
        out
    }
}

#[derive(Debug, Default)]
struct CycleState {
    cycles: Vec<ReActStep>,
    current_loop: u32,
    max_loops: u32,
    resume: Option<PendingAction>,
}

#[derive(Serialize, Deserialize)]
struct CycleSnapshot {
    cycles: Vec<ReActStep>,
    current_loop: u32,
}

/// The think/act/observe step function.
pub struct ReActCycle<T> {
    strategy: T,
    state: Mutex<CycleState>,
    interrupt_before_actions: AtomicBool,
}

impl<T: ReActStrategy> ReActCycle<T> {
    pub fn new(strategy: T, max_loops: u32) -> Self {
        Self {
            strategy,
            state: Mutex::new(CycleState {
                max_loops,
                ..CycleState::default()
            }),
            interrupt_before_actions: AtomicBool::new(false),
        }
    }

    pub fn strategy(&self) -> &T {
        &self.strategy
    }

    pub fn current_loop(&self) -> u32 {
        self.state.lock().current_loop
    }

    pub fn max_loops(&self) -> u32 {
        self.state.lock().max_loops
    }

    pub fn set_max_loops(&self, max_loops: u32) {
        self.state.lock().max_loops = max_loops;
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupt_before_actions.load(Ordering::Relaxed)
    }

    /// Suspend before dispatching a planned tool call.
    pub fn set_interrupt_before_actions(&self, enabled: bool) {
        self.interrupt_before_actions.store(enabled, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> Vec<ReActStep> {
        self.state.lock().cycles.clone()
    }

    /// Every completed cycle, separated by blank lines.
    pub fn transcript(&self) -> String {
        self.state
            .lock()
            .cycles
            .iter()
            .map(ReActStep::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Run the phases of one cycle into `cycle`. Returns the action message
    /// when the act phase produced one.
    async fn run_cycle(
        &self,
        cx: CycleContext<'_>,
        resume: Option<PendingAction>,
        cycle: &mut ReActStep,
        loop_no: u32,
    ) -> Result<Option<Message>, AgentError> {
        let (thought, planned) = match resume {
            Some(pending) => {
                debug!(agent = %cx.profile.name, cycle = loop_no, tool = %pending.tool_call.function.name, "Resuming cycle with pending tool call");
                (pending.thought, Some(pending.tool_call))
            }
            None => {
                let Some(thought) = self.strategy.think(cx).await?.filter(|m| !m.is_blank()) else {
                    return Ok(None);
                };
                let thought = thought.content;
                if !self.strategy.needs_action(&thought) {
                    info!(agent = %cx.profile.name, cycle = loop_no, thought = %preview(&thought, 120), "ReAct think");
                    cycle.thought = thought;
                    return Ok(None);
                }
                if self.interrupts_enabled() {
                    if let Some(tool_call) = self.strategy.plan_action(&cx, &thought) {
                        return Err(AgentError::Suspended(Box::new(PendingAction { thought, tool_call })));
                    }
                }
                (thought, None)
            }
        };

        info!(agent = %cx.profile.name, cycle = loop_no, thought = %preview(&thought, 120), "ReAct think");
        cycle.thought = thought;

        let Some(action) = self
            .strategy
            .act(cx, &cycle.thought, planned)
            .await?
            .filter(|m| !m.is_blank())
        else {
            return Ok(None);
        };
        info!(agent = %cx.profile.name, cycle = loop_no, action = %preview(&action.content, 120), "ReAct act");
        cycle.action = Some(action.content.clone());

        if let Some(observation) = self.strategy.observe(cx, &action).await?.filter(|m| !m.is_blank()) {
            info!(agent = %cx.profile.name, cycle = loop_no, observation = %preview(&observation.content, 120), "ReAct observe");
            cycle.observation = Some(observation.content);
        }
        Ok(Some(action))
    }
}

#[async_trait::async_trait]
impl<T: ReActStrategy> StepFunction for ReActCycle<T> {
    async fn step(&self, scope: StepScope<'_>) -> Result<Option<Message>, AgentError> {
        let (history, resume, loop_no) = {
            let mut s = self.state.lock();
            if s.current_loop >= s.max_loops {
                debug!(agent = %scope.profile.name, max_loops = s.max_loops, "ReAct loop budget exhausted");
                return Ok(Some(Message::assistant(LOOP_EXHAUSTED_MESSAGE)));
            }
            (s.cycles.clone(), s.resume.take(), s.current_loop + 1)
        };

        let cx = CycleContext {
            ctx: scope.ctx,
            profile: scope.profile,
            events: scope.events,
            step: scope.step,
            history_len: scope.history_len,
            history: &history,
        };
        let mut cycle = ReActStep::default();
        let outcome = self.run_cycle(cx, resume, &mut cycle, loop_no).await;

        // A suspended cycle is replayed on resume
        if matches!(outcome, Err(AgentError::Suspended(_))) {
            return outcome.map(|_| None);
        }

        let recorded = !cycle.thought.is_empty();
        {
            let mut s = self.state.lock();
            if recorded {
                s.cycles.push(cycle.clone());
            }
            s.current_loop += 1;
        }
        let action = outcome?;

        if !recorded {
            return Ok(None);
        }
        let mut message = Message::assistant(cycle.render());
        if let Some(action) = action {
            message.tool_calls = action.tool_calls;
            message.metadata = action.metadata;
        }
        Ok(Some(message))
    }

    fn should_stop(&self, message: &Message) -> bool {
        message.content == LOOP_EXHAUSTED_MESSAGE
    }

    fn reset(&self) {
        let mut s = self.state.lock();
        s.cycles.clear();
        s.current_loop = 0;
        s.resume = None;
    }

    fn snapshot(&self) -> Result<serde_json::Value, AgentError> {
        let s = self.state.lock();
        Ok(serde_json::to_value(CycleSnapshot {
            cycles: s.cycles.clone(),
            current_loop: s.current_loop,
        })?)
    }

    fn restore(
        &self,
        state: serde_json::Value,
        pending: Option<PendingAction>,
    ) -> Result<(), AgentError> {
        let snapshot: CycleSnapshot = serde_json::from_value(state)?;
        let mut s = self.state.lock();
        s.cycles = snapshot.cycles;
        s.current_loop = snapshot.current_loop;
        s.resume = pending;
        Ok(())
    }
}

/// A bounded loop of ReAct cycles.
pub struct ReActAgent<T = DefaultStrategy> {
    base: BaseAgent<ReActCycle<T>>,
}

impl<T> Clone for ReActAgent<T> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
        }
    }
}

impl ReActAgent<DefaultStrategy> {
    /// A ReAct agent whose phases are plain model calls.
    pub fn with_default_strategy(profile: AgentProfile) -> Self {
        Self::new(profile, DefaultStrategy)
    }
}

impl<T: ReActStrategy> ReActAgent<T> {
    pub fn new(profile: AgentProfile, strategy: T) -> Self {
        let max_loops = moonagent_core::AgentConfig::default().max_loops;
        Self {
            base: BaseAgent::new(profile, ReActCycle::new(strategy, max_loops)),
        }
    }

    pub fn with_max_steps(self, max_steps: u32) -> Self {
        self.base.set_max_steps(max_steps);
        self
    }

    pub fn with_max_loops(self, max_loops: u32) -> Self {
        self.set_max_loops(max_loops);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.base = self.base.with_checkpoint_store(store);
        self
    }

    /// Suspend before tool dispatch. Needs a checkpoint store to take effect.
    pub fn with_interrupts(self, enabled: bool) -> Self {
        self.cycle().set_interrupt_before_actions(enabled);
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.base = self.base.with_stream_buffer(capacity);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.base = self.base.with_event_bus(events);
        self
    }

    pub fn base(&self) -> &BaseAgent<ReActCycle<T>> {
        &self.base
    }

    pub fn cycle(&self) -> &ReActCycle<T> {
        self.base.stepper()
    }

    pub fn strategy(&self) -> &T {
        self.cycle().strategy()
    }

    // ── Delegated loop API ───────────────────────────────────────────────

    pub async fn run(&self, ctx: &ExecutionContext, input: &str) -> Result<Message, AgentError> {
        self.base.run(ctx, input).await
    }

    pub fn run_stream(
        &self,
        ctx: Arc<ExecutionContext>,
        input: impl Into<String>,
    ) -> Result<mpsc::Receiver<Message>, AgentError> {
        self.base.run_stream(ctx, input)
    }

    pub async fn step(&self, ctx: &ExecutionContext) -> Result<Option<Message>, AgentError> {
        self.base.step(ctx).await
    }

    /// Clears cycles and the loop counter along with the base state.
    pub fn reset(&self) {
        self.base.reset();
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn state(&self) -> AgentState {
        self.base.state()
    }

    pub fn step_history(&self) -> Vec<String> {
        self.base.step_history()
    }

    pub fn current_step(&self) -> u32 {
        self.base.current_step()
    }

    pub fn set_max_steps(&self, max_steps: u32) {
        self.base.set_max_steps(max_steps);
    }

    pub fn events(&self) -> &EventBus {
        self.base.events()
    }

    pub async fn pending_action(&self, checkpoint_id: &str) -> Result<Option<PendingAction>, AgentError> {
        self.base.pending_action(checkpoint_id).await
    }

    pub async fn amend_pending_arguments(
        &self,
        checkpoint_id: &str,
        arguments: impl Into<String>,
    ) -> Result<PendingAction, AgentError> {
        self.base.amend_pending_arguments(checkpoint_id, arguments).await
    }

    // ── Single phases ────────────────────────────────────────────────────
    //
    // One strategy phase outside the loop. Nothing is recorded: the cycle
    // list, loop counter and step history are left as they were.

    pub async fn think(&self, ctx: &ExecutionContext) -> Result<Option<Message>, AgentError> {
        let history = self.cycle().cycles();
        self.strategy().think(self.phase_context(ctx, &history)).await
    }

    /// Act on `thought`, planning the tool call from it.
    pub async fn act(&self, ctx: &ExecutionContext, thought: &str) -> Result<Option<Message>, AgentError> {
        let history = self.cycle().cycles();
        self.strategy().act(self.phase_context(ctx, &history), thought, None).await
    }

    pub async fn observe(&self, ctx: &ExecutionContext, action: &Message) -> Result<Option<Message>, AgentError> {
        let history = self.cycle().cycles();
        self.strategy().observe(self.phase_context(ctx, &history), action).await
    }

    fn phase_context<'a>(&'a self, ctx: &'a ExecutionContext, history: &'a [ReActStep]) -> CycleContext<'a> {
        CycleContext {
            ctx,
            profile: self.base.profile(),
            events: self.base.events(),
            step: self.base.current_step() + 1,
            history_len: self.base.step_history().len(),
            history,
        }
    }

    // ── Cycle record ─────────────────────────────────────────────────────

    pub fn thoughts(&self) -> Vec<String> {
        self.cycle().cycles().into_iter().map(|c| c.thought).collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.cycle().cycles().into_iter().filter_map(|c| c.action).collect()
    }

    pub fn observations(&self) -> Vec<String> {
        self.cycle().cycles().into_iter().filter_map(|c| c.observation).collect()
    }

    pub fn current_loop(&self) -> u32 {
        self.cycle().current_loop()
    }

    pub fn max_loops(&self) -> u32 {
        self.cycle().max_loops()
    }

    pub fn set_max_loops(&self, max_loops: u32) {
        self.cycle().set_max_loops(max_loops);
    }

    pub fn transcript(&self) -> String {
        self.cycle().transcript()
    }
}

impl<T> std::fmt::Debug for ReActAgent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReActAgent").field("base", &self.base).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{CustomStrategy, ThinkInput};
    use crate::test_helpers::profile_with;
    use moonagent_core::ModelError;
    use moonagent_providers::ScriptedModel;

    fn agent(model: ScriptedModel) -> ReActAgent {
        ReActAgent::with_default_strategy(profile_with(Arc::new(model)))
    }

    #[tokio::test]
    async fn full_cycle_records_all_phases() {
        let agent = agent(ScriptedModel::new([
            "I need to search for the answer",
            "Search the docs",
            "The docs say 42",
        ]))
        .with_max_steps(1);

        agent.run(&ExecutionContext::new(), "what is the answer?").await.unwrap();

        assert_eq!(agent.thoughts(), vec!["I need to search for the answer"]);
        assert_eq!(agent.actions(), vec!["Search the docs"]);
        assert_eq!(agent.observations(), vec!["The docs say 42"]);
        assert_eq!(agent.current_loop(), 1);
        assert_eq!(
            agent.step_history(),
            vec!["Thought: I need to search for the answer\nAction: Search the docs\nObservation: The docs say 42"]
        );
    }

    #[tokio::test]
    async fn thought_without_action_keyword_skips_act() {
        let model = Arc::new(ScriptedModel::new(["The answer is 42."]));
        let agent = ReActAgent::with_default_strategy(profile_with(model.clone())).with_max_steps(1);

        agent.run(&ExecutionContext::new(), "q").await.unwrap();

        assert_eq!(agent.thoughts(), vec!["The answer is 42."]);
        assert!(agent.actions().is_empty());
        assert!(agent.observations().is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn blank_thought_records_nothing_but_spends_a_loop() {
        let agent = agent(ScriptedModel::new(["   ", "The answer is 42."])).with_max_steps(2);

        let message = agent.run(&ExecutionContext::new(), "q").await.unwrap();

        assert_eq!(agent.thoughts(), vec!["The answer is 42."]);
        assert_eq!(agent.current_loop(), 2);
        assert_eq!(
            message.content,
            "Step 2 result: Thought: The answer is 42.\nAgent completed all steps"
        );
    }

    #[tokio::test]
    async fn step_results_are_per_cycle_deltas() {
        let agent = agent(ScriptedModel::new(["first idea", "second idea"])).with_max_steps(2);

        agent.run(&ExecutionContext::new(), "q").await.unwrap();

        assert_eq!(
            agent.step_history(),
            vec!["Thought: first idea", "Thought: second idea"]
        );
        assert_eq!(agent.transcript(), "Thought: first idea\n\nThought: second idea");
    }

    #[tokio::test]
    async fn loop_budget_exhaustion_stops_without_touching_cycles() {
        let agent = agent(ScriptedModel::repeating("just thinking"))
            .with_max_steps(5)
            .with_max_loops(2);

        let message = agent.run(&ExecutionContext::new(), "q").await.unwrap();

        assert_eq!(agent.thoughts().len(), 2);
        assert_eq!(agent.current_loop(), 2);
        assert_eq!(agent.current_step(), 3);
        assert_eq!(
            message.content,
            "Step 1 result: Thought: just thinking\n\
             Step 2 result: Thought: just thinking\n\
             Step 3 result: ReAct loop budget exhausted"
        );
        assert_eq!(agent.state(), AgentState::Success);
    }

    #[tokio::test]
    async fn model_failure_fails_the_run() {
        let agent = agent(
            ScriptedModel::new(["first idea"]).then_fail(ModelError::Network("connection reset".into())),
        )
        .with_max_steps(3);

        let err = agent.run(&ExecutionContext::new(), "q").await.unwrap_err();

        assert!(matches!(err, AgentError::Model(ModelError::Network(_))));
        assert_eq!(agent.step_history().len(), 1);
        assert_eq!(agent.state(), AgentState::Error);
        assert_eq!(agent.current_loop(), 2);
    }

    #[tokio::test]
    async fn reset_clears_cycles_and_loop_counter() {
        let agent = agent(ScriptedModel::repeating("idea")).with_max_steps(2);
        agent.run(&ExecutionContext::new(), "q").await.unwrap();

        agent.reset();

        assert!(agent.thoughts().is_empty());
        assert_eq!(agent.current_loop(), 0);
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.transcript().is_empty());
    }

    #[tokio::test]
    async fn custom_think_sees_prior_cycles() {
        let strategy = CustomStrategy::new().with_think(|input: ThinkInput| async move {
            Ok(Some(Message::assistant(format!("cycle {} after {}", input.step, input.history.len()))))
        });
        let agent = ReActAgent::new(
            profile_with(Arc::new(ScriptedModel::repeating("unused"))),
            strategy,
        )
        .with_max_steps(2);

        agent.run(&ExecutionContext::new(), "q").await.unwrap();

        assert_eq!(agent.thoughts(), vec!["cycle 1 after 0", "cycle 2 after 1"]);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let cycle = ReActCycle::new(DefaultStrategy, 5);
        {
            let mut s = cycle.state.lock();
            s.cycles.push(ReActStep {
                thought: "t".into(),
                action: Some("a".into()),
                observation: None,
            });
            s.current_loop = 1;
        }
        let snapshot = cycle.snapshot().unwrap();

        let restored = ReActCycle::new(DefaultStrategy, 5);
        restored.restore(snapshot, None).unwrap();

        assert_eq!(restored.cycles(), cycle.cycles());
        assert_eq!(restored.current_loop(), 1);
    }

    #[tokio::test]
    async fn single_phases_leave_the_record_untouched() {
        let agent = agent(ScriptedModel::new(["Look it up", "Looked it up", "Found 42"]));
        let ctx = ExecutionContext::new();

        let err = agent.think(&ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingInput(_)));

        ctx.set_user_prompt("what is the answer?");
        let thought = agent.think(&ctx).await.unwrap().unwrap();
        assert_eq!(thought.content, "Look it up");
        let action = agent.act(&ctx, &thought.content).await.unwrap().unwrap();
        assert_eq!(action.content, "Looked it up");
        let observation = agent.observe(&ctx, &action).await.unwrap().unwrap();
        assert_eq!(observation.content, "Found 42");

        assert!(agent.thoughts().is_empty());
        assert!(agent.step_history().is_empty());
        assert_eq!(agent.current_loop(), 0);
        assert_eq!(agent.state(), AgentState::Idle);
    }
}
