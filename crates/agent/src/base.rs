//! The bounded step loop shared by every agent.
//!
//! A [`BaseAgent`] owns the lifecycle (`Idle → Running → Success | Error`),
//! the step budget and the step history. What a single step does is
//! delegated to a [`StepFunction`]; the ReAct cycle is one such function.
//!
//! ```text
//!   run(ctx, input)
//!     ├── gate: Idle → Running (else Busy)
//!     ├── resume from checkpoint, or start fresh
//!     └── for step in 1..=max_steps
//!           ├── step function (raced against cancellation)
//!           ├── Some(msg) → history + "Step N result: ..." + memory
//!           └── should_stop(msg) → break
//! ```

use std::sync::Arc;

use chrono::Utc;
use moonagent_core::event::preview;
use moonagent_core::{
    AgentConfig, AgentState, ChatModel, CheckpointStore, DomainEvent, EventBus, Message,
};
use moonagent_core::error::CheckpointError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{
    CHECKPOINT_VERSION, CheckpointStatus, Interrupt, PendingAction, RunCheckpoint,
};
use crate::context::ExecutionContext;
use crate::error::AgentError;

/// Appended to the aggregated result when the step budget runs out.
pub const BUDGET_EXHAUSTED_MARKER: &str = "Agent completed all steps";

/// Final message of a successful stream.
pub const TASK_COMPLETED_MARKER: &str = "Task completed";

/// Identity and model handle of an agent.
#[derive(Clone)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    pub next_step_prompt: String,
    pub model: Arc<dyn ChatModel>,
}

impl AgentProfile {
    /// A profile with the default prompts.
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            name: name.into(),
            system_prompt: defaults.system_prompt,
            next_step_prompt: defaults.next_step_prompt,
            model,
        }
    }

    pub fn from_config(config: &AgentConfig, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: config.name.clone(),
            system_prompt: config.system_prompt.clone(),
            next_step_prompt: config.next_step_prompt.clone(),
            model,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_next_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_step_prompt = prompt.into();
        self
    }
}

impl std::fmt::Debug for AgentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProfile")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

/// Everything a step function may look at.
#[derive(Clone, Copy)]
pub struct StepScope<'a> {
    pub ctx: &'a ExecutionContext,
    pub profile: &'a AgentProfile,
    /// 1-based number of the step being executed
    pub step: u32,
    /// Length of the step history before this step
    pub history_len: usize,
    pub events: &'a EventBus,
}

/// One unit of agent work, driven by [`BaseAgent`].
///
/// Implementations keep their own state behind interior mutability; the
/// loop never runs two steps of the same agent concurrently.
#[async_trait::async_trait]
pub trait StepFunction: Send + Sync + 'static {
    /// Execute one step. `Ok(None)` means "nothing to record this step".
    async fn step(&self, scope: StepScope<'_>) -> Result<Option<Message>, AgentError>;

    /// Whether the loop should end after recording `message`.
    fn should_stop(&self, _message: &Message) -> bool {
        false
    }

    /// Clear per-run state.
    fn reset(&self) {}

    /// Serialize per-run state for a checkpoint.
    fn snapshot(&self) -> Result<serde_json::Value, AgentError> {
        Ok(serde_json::Value::Null)
    }

    /// Restore per-run state from a checkpoint, with the action that was
    /// held back when the run suspended.
    fn restore(
        &self,
        _state: serde_json::Value,
        _pending: Option<PendingAction>,
    ) -> Result<(), AgentError> {
        Ok(())
    }
}

#[derive(Debug)]
struct LoopState {
    state: AgentState,
    max_steps: u32,
    current_step: u32,
    step_history: Vec<String>,
}

/// The bounded step loop.
///
/// Cloning yields another handle to the same agent.
pub struct BaseAgent<S> {
    profile: Arc<AgentProfile>,
    stepper: Arc<S>,
    loop_state: Arc<Mutex<LoopState>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    stream_buffer: usize,
    events: EventBus,
}

impl<S> Clone for BaseAgent<S> {
    fn clone(&self) -> Self {
        Self {
            profile: Arc::clone(&self.profile),
            stepper: Arc::clone(&self.stepper),
            loop_state: Arc::clone(&self.loop_state),
            checkpoints: self.checkpoints.clone(),
            stream_buffer: self.stream_buffer,
            events: self.events.clone(),
        }
    }
}

impl<S: StepFunction> BaseAgent<S> {
    pub fn new(profile: AgentProfile, stepper: S) -> Self {
        let defaults = AgentConfig::default();
        Self {
            profile: Arc::new(profile),
            stepper: Arc::new(stepper),
            loop_state: Arc::new(Mutex::new(LoopState {
                state: AgentState::Idle,
                max_steps: defaults.max_steps,
                current_step: 0,
                step_history: Vec::new(),
            })),
            checkpoints: None,
            stream_buffer: defaults.stream_buffer,
            events: EventBus::default(),
        }
    }

    pub fn with_max_steps(self, max_steps: u32) -> Self {
        self.set_max_steps(max_steps);
        self
    }

    /// Attach the store used for interrupt/resume.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Capacity of the `run_stream` channel (at least 1).
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn state(&self) -> AgentState {
        self.loop_state.lock().state
    }

    pub fn current_step(&self) -> u32 {
        self.loop_state.lock().current_step
    }

    pub fn max_steps(&self) -> u32 {
        self.loop_state.lock().max_steps
    }

    pub fn set_max_steps(&self, max_steps: u32) {
        self.loop_state.lock().max_steps = max_steps;
    }

    /// Contents of every recorded step, in execution order.
    pub fn step_history(&self) -> Vec<String> {
        self.loop_state.lock().step_history.clone()
    }

    pub fn checkpoint_store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.checkpoints.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Return to `Idle` with empty history and counters.
    pub fn reset(&self) {
        let previous = {
            let mut s = self.loop_state.lock();
            let previous = s.state;
            s.state = AgentState::Idle;
            s.current_step = 0;
            s.step_history.clear();
            previous
        };
        self.stepper.reset();
        if previous != AgentState::Idle {
            self.publish_state(previous, AgentState::Idle);
        }
    }

    /// Run a single step outside the loop. Nothing is recorded.
    ///
    /// A step that suspends before a tool call is checkpointed and returned
    /// as `Interrupted`, as in [`run`](Self::run).
    pub async fn step(&self, ctx: &ExecutionContext) -> Result<Option<Message>, AgentError> {
        let (step, history_len) = {
            let s = self.loop_state.lock();
            (s.current_step + 1, s.step_history.len())
        };
        let outcome = self
            .stepper
            .step(StepScope {
                ctx,
                profile: &self.profile,
                step,
                history_len,
                events: &self.events,
            })
            .await;
        match outcome {
            Err(AgentError::Suspended(pending)) => {
                Err(self.suspend(ctx, step, Vec::new(), *pending).await)
            }
            other => other,
        }
    }

    // ── Running ──────────────────────────────────────────────────────────

    /// Run the loop to completion and return the aggregated result.
    ///
    /// If `ctx` carries the id of a suspended checkpoint, the run resumes
    /// from it and `input` is ignored.
    pub async fn run(&self, ctx: &ExecutionContext, input: &str) -> Result<Message, AgentError> {
        let guard = self.begin()?;
        let outcome = self.drive(ctx, input, None).await.map(|results| {
            let content = results.join("\n");
            ctx.add_assistant_message(content.clone());
            Message::assistant(content)
        });
        guard.finish(outcome_state(&outcome));
        outcome
    }

    /// Run the loop in a background task, sending each step result as soon
    /// as it is produced.
    ///
    /// The stream ends with `"Task completed"` on success or a single
    /// `"Error: ..."` message on failure. Dropping the receiver abandons the
    /// run.
    pub fn run_stream(
        &self,
        ctx: Arc<ExecutionContext>,
        input: impl Into<String>,
    ) -> Result<mpsc::Receiver<Message>, AgentError> {
        let guard = self.begin()?;
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let agent = self.clone();
        let input = input.into();

        tokio::spawn(async move {
            let outcome = agent.drive(&ctx, &input, Some(&tx)).await;
            match &outcome {
                Ok(_) => {
                    ctx.add_assistant_message(TASK_COMPLETED_MARKER);
                    let _ = tx.send(Message::assistant(TASK_COMPLETED_MARKER)).await;
                }
                Err(AgentError::StreamClosed) => {
                    debug!(agent = %agent.name(), "Stream receiver dropped, abandoning run");
                }
                Err(e) => {
                    let content = format!("Error: {e}");
                    ctx.add_assistant_message(content.clone());
                    let mut message = Message::assistant(content);
                    if let Some(interrupt) = e.as_interrupt() {
                        message = message.with_metadata(
                            "checkpoint_id",
                            serde_json::json!(interrupt.checkpoint_id),
                        );
                    }
                    let _ = tx.send(message).await;
                }
            }
            guard.finish(outcome_state(&outcome));
        });

        Ok(rx)
    }

    /// Idle → Running, or `Busy`.
    fn begin(&self) -> Result<RunGuard, AgentError> {
        {
            let mut s = self.loop_state.lock();
            if s.state != AgentState::Idle {
                return Err(AgentError::Busy {
                    agent: self.profile.name.clone(),
                    state: s.state,
                });
            }
            s.state = AgentState::Running;
        }
        self.publish_state(AgentState::Idle, AgentState::Running);
        Ok(RunGuard {
            agent: self.profile.name.clone(),
            loop_state: Arc::clone(&self.loop_state),
            events: self.events.clone(),
            finished: false,
        })
    }

    /// The loop itself. Returns the aggregated result lines.
    async fn drive(
        &self,
        ctx: &ExecutionContext,
        input: &str,
        sink: Option<&mpsc::Sender<Message>>,
    ) -> Result<Vec<String>, AgentError> {
        let mut results = match self.resume_from_checkpoint(ctx).await? {
            Some(results) => results,
            None => {
                self.start_fresh();
                ctx.set_user_prompt(input);
                ctx.add_user_message(input);
                Vec::new()
            }
        };

        info!(agent = %self.profile.name, max_steps = self.max_steps(), "Agent run starting");

        let mut stopped = false;
        loop {
            let (step, max_steps, history_len) = {
                let mut s = self.loop_state.lock();
                if s.current_step >= s.max_steps {
                    break;
                }
                s.current_step += 1;
                (s.current_step, s.max_steps, s.step_history.len())
            };
            debug!(agent = %self.profile.name, step, max_steps, "Agent is running");

            let scope = StepScope {
                ctx,
                profile: &self.profile,
                step,
                history_len,
                events: &self.events,
            };
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancelled() => Err(AgentError::Cancelled),
                result = self.stepper.step(scope) => result,
            };

            let message = match outcome {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(agent = %self.profile.name, step, "Step produced no result");
                    continue;
                }
                Err(AgentError::Suspended(pending)) => {
                    return Err(self.suspend(ctx, step, results, *pending).await);
                }
                Err(e) => {
                    warn!(agent = %self.profile.name, step, error = %e, "Step failed");
                    return Err(e);
                }
            };

            self.record(ctx, step, &message, &mut results);

            if let Some(tx) = sink {
                if tx.send(message.clone()).await.is_err() {
                    return Err(AgentError::StreamClosed);
                }
            }

            if self.stepper.should_stop(&message) {
                debug!(agent = %self.profile.name, step, "Step function requested stop");
                stopped = true;
                break;
            }
        }

        if !stopped {
            results.push(BUDGET_EXHAUSTED_MARKER.to_string());
        }
        info!(
            agent = %self.profile.name,
            steps = self.current_step(),
            stopped_early = stopped,
            "Agent run finished"
        );
        Ok(results)
    }

    fn start_fresh(&self) {
        {
            let mut s = self.loop_state.lock();
            s.current_step = 0;
            s.step_history.clear();
        }
        self.stepper.reset();
    }

    fn record(&self, ctx: &ExecutionContext, step: u32, message: &Message, results: &mut Vec<String>) {
        self.loop_state.lock().step_history.push(message.content.clone());
        results.push(format!("Step {step} result: {}", message.content));
        ctx.add_assistant_message(message.content.clone());
        self.events.publish(DomainEvent::StepCompleted {
            agent: self.profile.name.clone(),
            step,
            content_preview: preview(&message.content, 80),
            timestamp: Utc::now(),
        });
    }

    // ── Checkpointing ────────────────────────────────────────────────────

    /// Restore local state from the context's checkpoint, if it names a
    /// suspended one. Returns the aggregated results recorded so far.
    async fn resume_from_checkpoint(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Option<Vec<String>>, AgentError> {
        let (Some(id), Some(store)) = (ctx.checkpoint_id(), self.checkpoints.as_ref()) else {
            return Ok(None);
        };
        let Some(bytes) = store.get(id).await? else {
            return Ok(None);
        };
        let checkpoint = RunCheckpoint::from_bytes(&bytes)?;
        if !checkpoint.is_resumable() {
            debug!(agent = %self.profile.name, checkpoint_id = id, "Checkpoint already consumed, starting fresh");
            return Ok(None);
        }
        if checkpoint.agent != self.profile.name {
            warn!(
                agent = %self.profile.name,
                checkpoint_agent = %checkpoint.agent,
                checkpoint_id = id,
                "Resuming a checkpoint written by another agent"
            );
        }

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            }
            .into());
        }

        let mut consumed = checkpoint.clone();
        consumed.status = CheckpointStatus::Resumed;
        let consumed = consumed.to_bytes()?;

        let RunCheckpoint {
            current_step,
            step_history,
            results,
            user_prompt,
            memory,
            stepper,
            pending,
            ..
        } = checkpoint;

        // Consumed only once the stepper accepted its state
        self.stepper.restore(stepper, pending)?;
        store.set(id, consumed).await?;
        {
            let mut s = self.loop_state.lock();
            // The suspended step runs again
            s.current_step = current_step.saturating_sub(1);
            s.step_history = step_history;
        }
        ctx.set_user_prompt(user_prompt);
        ctx.memory().restore(memory);

        info!(agent = %self.profile.name, checkpoint_id = id, step = current_step, "Resuming run from checkpoint");
        Ok(Some(results))
    }

    /// Persist the run and build the interrupt handed back to the caller.
    async fn suspend(
        &self,
        ctx: &ExecutionContext,
        step: u32,
        results: Vec<String>,
        pending: PendingAction,
    ) -> AgentError {
        match self.write_checkpoint(ctx, step, results, pending).await {
            Ok(interrupt) => AgentError::Interrupted(Box::new(interrupt)),
            Err(e) => {
                warn!(agent = %self.profile.name, step, error = %e, "Failed to write checkpoint");
                e
            }
        }
    }

    async fn write_checkpoint(
        &self,
        ctx: &ExecutionContext,
        step: u32,
        results: Vec<String>,
        pending: PendingAction,
    ) -> Result<Interrupt, AgentError> {
        let store = self.checkpoints.as_ref().ok_or(CheckpointError::NotConfigured)?;
        let checkpoint_id = ctx
            .checkpoint_id()
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let checkpoint = RunCheckpoint {
            version: CHECKPOINT_VERSION,
            agent: self.profile.name.clone(),
            status: CheckpointStatus::Suspended,
            current_step: step,
            step_history: self.step_history(),
            results,
            user_prompt: ctx.user_prompt().unwrap_or_default(),
            memory: ctx.memory().snapshot(),
            stepper: self.stepper.snapshot()?,
            pending: Some(pending.clone()),
            created_at: Utc::now(),
        };
        let state = checkpoint.to_bytes()?;
        store.set(&checkpoint_id, state.clone()).await?;

        info!(
            agent = %self.profile.name,
            checkpoint_id = %checkpoint_id,
            step,
            tool = %pending.tool_call.function.name,
            "Run suspended before tool call"
        );
        self.events.publish(DomainEvent::RunInterrupted {
            agent: self.profile.name.clone(),
            checkpoint_id: checkpoint_id.clone(),
            tool_name: pending.tool_call.function.name.clone(),
            timestamp: Utc::now(),
        });

        Ok(Interrupt {
            checkpoint_id,
            pending,
            state,
        })
    }

    /// The action held back by a suspended checkpoint.
    pub async fn pending_action(&self, checkpoint_id: &str) -> Result<Option<PendingAction>, AgentError> {
        let store = self.checkpoints.as_ref().ok_or(CheckpointError::NotConfigured)?;
        let Some(bytes) = store.get(checkpoint_id).await? else {
            return Ok(None);
        };
        let checkpoint = RunCheckpoint::from_bytes(&bytes)?;
        let resumable = checkpoint.is_resumable();
        Ok(checkpoint.pending.filter(|_| resumable))
    }

    /// Replace the arguments of a suspended checkpoint's pending tool call.
    ///
    /// `arguments` must be valid JSON. Returns the updated action.
    pub async fn amend_pending_arguments(
        &self,
        checkpoint_id: &str,
        arguments: impl Into<String>,
    ) -> Result<PendingAction, AgentError> {
        let arguments = arguments.into();
        serde_json::from_str::<serde_json::Value>(&arguments).map_err(|e| {
            moonagent_core::ToolError::InvalidArguments(format!("arguments must be JSON: {e}"))
        })?;

        let store = self.checkpoints.as_ref().ok_or(CheckpointError::NotConfigured)?;
        let bytes = store
            .get(checkpoint_id)
            .await?
            .ok_or_else(|| AgentError::NoPendingAction(checkpoint_id.to_string()))?;
        let mut checkpoint = RunCheckpoint::from_bytes(&bytes)?;
        if !checkpoint.is_resumable() {
            return Err(AgentError::NoPendingAction(checkpoint_id.to_string()));
        }
        let pending = checkpoint
            .pending
            .as_mut()
            .ok_or_else(|| AgentError::NoPendingAction(checkpoint_id.to_string()))?;
        pending.tool_call.function.arguments = arguments;
        let updated = pending.clone();

        store.set(checkpoint_id, checkpoint.to_bytes()?).await?;
        debug!(checkpoint_id, tool = %updated.tool_call.function.name, "Pending tool arguments amended");
        Ok(updated)
    }

    fn publish_state(&self, from: AgentState, to: AgentState) {
        self.events.publish(DomainEvent::AgentStateChanged {
            agent: self.profile.name.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
    }
}

impl<S> std::fmt::Debug for BaseAgent<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAgent")
            .field("profile", &self.profile)
            .field("loop_state", &*self.loop_state.lock())
            .finish_non_exhaustive()
    }
}

/// State a finished run leaves the agent in.
fn outcome_state<T>(outcome: &Result<T, AgentError>) -> AgentState {
    match outcome {
        Ok(_) => AgentState::Success,
        // Suspended runs wait in Idle for the resume call
        Err(AgentError::Interrupted(_)) => AgentState::Idle,
        Err(_) => AgentState::Error,
    }
}

/// Settles the agent state when a run ends, including when its future is
/// dropped mid-flight.
struct RunGuard {
    agent: String,
    loop_state: Arc<Mutex<LoopState>>,
    events: EventBus,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, next: AgentState) {
        self.settle(next);
        self.finished = true;
    }

    fn settle(&self, next: AgentState) {
        let changed = {
            let mut s = self.loop_state.lock();
            // A reset during the run wins
            if s.state == AgentState::Running {
                s.state = next;
                true
            } else {
                false
            }
        };
        if changed {
            self.events.publish(DomainEvent::AgentStateChanged {
                agent: self.agent.clone(),
                from: AgentState::Running,
                to: next,
                timestamp: Utc::now(),
            });
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(agent = %self.agent, "Run abandoned before completion");
            self.settle(AgentState::Error);
        }
    }
}
