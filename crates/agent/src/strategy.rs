//! Strategies for the phases of a ReAct cycle.
//!
//! A [`ReActStrategy`] decides what each phase does: how a thought is
//! produced, whether it calls for action, what the action is and how its
//! outcome is observed. The cycle bookkeeping lives in
//! [`crate::react::ReActCycle`]; strategies only produce messages.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use moonagent_core::{EventBus, Message, ToolCall};

use crate::base::AgentProfile;
use crate::context::ExecutionContext;
use crate::error::AgentError;
use crate::react::ReActStep;

/// Keywords that mark a thought as calling for action.
const ACTION_KEYWORDS: &[&str] = &[
    "need", "should", "plan", "execute", "action", "query", "search", "call", "需要", "应该",
    "计划", "执行", "行动", "查询", "搜索", "调用",
];

/// Default action gate: a keyword heuristic over the lowercased thought.
pub fn default_needs_action(thought: &str) -> bool {
    let lower = thought.to_lowercase();
    ACTION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// What a strategy sees during one cycle.
#[derive(Clone, Copy)]
pub struct CycleContext<'a> {
    pub ctx: &'a ExecutionContext,
    pub profile: &'a AgentProfile,
    pub events: &'a EventBus,
    /// 1-based step number of the enclosing loop
    pub step: u32,
    /// Recorded steps before this one
    pub history_len: usize,
    /// Completed cycles, oldest first
    pub history: &'a [ReActStep],
}

impl CycleContext<'_> {
    /// The run's user prompt.
    pub fn user_prompt(&self) -> Result<String, AgentError> {
        self.ctx
            .user_prompt()
            .ok_or(AgentError::MissingInput(crate::context::USER_PROMPT_KEY))
    }
}

/// The phases of a think/act/observe cycle.
///
/// A phase returning `None` (or a blank message) ends the cycle early.
#[async_trait::async_trait]
pub trait ReActStrategy: Send + Sync + 'static {
    async fn think(&self, cx: CycleContext<'_>) -> Result<Option<Message>, AgentError>;

    /// Whether `thought` calls for the act phase.
    fn needs_action(&self, thought: &str) -> bool {
        default_needs_action(thought)
    }

    /// The tool call `thought` would dispatch, if the strategy dispatches
    /// tools. Used to hold the call back for review before `act`.
    fn plan_action(&self, _cx: &CycleContext<'_>, _thought: &str) -> Option<ToolCall> {
        None
    }

    /// Act on `thought`. `planned` is a previously planned call to dispatch
    /// as is, e.g. after a resumed interrupt.
    async fn act(
        &self,
        cx: CycleContext<'_>,
        thought: &str,
        planned: Option<ToolCall>,
    ) -> Result<Option<Message>, AgentError>;

    async fn observe(&self, cx: CycleContext<'_>, action: &Message) -> Result<Option<Message>, AgentError>;
}

// ── Prompts ──────────────────────────────────────────────────────────────

/// Render completed cycles as numbered Thought/Action/Observation lines.
pub fn render_history(history: &[ReActStep]) -> String {
    let mut out = String::new();
    for (i, cycle) in history.iter().enumerate() {
        let n = i + 1;
        out.push_str(&format!("Thought {n}: {}\n", cycle.thought));
        if let Some(action) = &cycle.action {
            out.push_str(&format!("Action {n}: {action}\n"));
        }
        if let Some(observation) = &cycle.observation {
            out.push_str(&format!("Observation {n}: {observation}\n"));
        }
    }
    out
}

fn think_prompt(user_prompt: &str, history: &[ReActStep]) -> String {
    let mut prompt = format!("User question: {user_prompt}\n\n");
    if !history.is_empty() {
        prompt.push_str("Previous reasoning:\n");
        prompt.push_str(&render_history(history));
        prompt.push('\n');
    }
    prompt.push_str(
        "Now think about the next step: analyze the current situation and decide what to do next.",
    );
    prompt
}

fn act_prompt(thought: &str) -> String {
    format!(
        "Based on the following thought, make a concrete action plan:\n{thought}\n\n\
         State the specific action to take."
    )
}

fn observe_prompt(action: &str) -> String {
    format!(
        "The following action was executed:\n{action}\n\n\
         Observe and analyze the result of the executed action and its impact."
    )
}

/// Ask the profile's model one question under its system prompt.
pub(crate) async fn ask(
    profile: &AgentProfile,
    system: String,
    prompt: String,
) -> Result<Message, AgentError> {
    let reply = profile
        .model
        .generate(vec![Message::system(system), Message::user(prompt)])
        .await?;
    Ok(reply)
}

// ── Default ──────────────────────────────────────────────────────────────

/// Every phase is a model call under the agent's system prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

#[async_trait::async_trait]
impl ReActStrategy for DefaultStrategy {
    async fn think(&self, cx: CycleContext<'_>) -> Result<Option<Message>, AgentError> {
        let prompt = think_prompt(&cx.user_prompt()?, cx.history);
        ask(cx.profile, cx.profile.system_prompt.clone(), prompt).await.map(Some)
    }

    async fn act(
        &self,
        cx: CycleContext<'_>,
        thought: &str,
        _planned: Option<ToolCall>,
    ) -> Result<Option<Message>, AgentError> {
        ask(cx.profile, cx.profile.system_prompt.clone(), act_prompt(thought))
            .await
            .map(Some)
    }

    async fn observe(&self, cx: CycleContext<'_>, action: &Message) -> Result<Option<Message>, AgentError> {
        ask(cx.profile, cx.profile.system_prompt.clone(), observe_prompt(&action.content))
            .await
            .map(Some)
    }
}

// ── Custom ───────────────────────────────────────────────────────────────

/// Owned view of a cycle handed to a custom think function.
#[derive(Debug, Clone)]
pub struct ThinkInput {
    pub user_prompt: Option<String>,
    pub step: u32,
    pub history: Vec<ReActStep>,
}

type PhaseResult = Result<Option<Message>, AgentError>;
type ThinkFn = Arc<dyn Fn(ThinkInput) -> BoxFuture<'static, PhaseResult> + Send + Sync>;
type PhaseFn = Arc<dyn Fn(String) -> BoxFuture<'static, PhaseResult> + Send + Sync>;
type GateFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A strategy assembled from closures. Any phase left unset falls back to
/// [`DefaultStrategy`].
#[derive(Clone, Default)]
pub struct CustomStrategy {
    think: Option<ThinkFn>,
    act: Option<PhaseFn>,
    observe: Option<PhaseFn>,
    needs_action: Option<GateFn>,
    fallback: DefaultStrategy,
}

impl CustomStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_think<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ThinkInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PhaseResult> + Send + 'static,
    {
        self.think = Some(Arc::new(move |input| Box::pin(f(input))));
        self
    }

    /// The act phase receives the thought.
    pub fn with_act<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PhaseResult> + Send + 'static,
    {
        self.act = Some(Arc::new(move |thought| Box::pin(f(thought))));
        self
    }

    /// The observe phase receives the action content.
    pub fn with_observe<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PhaseResult> + Send + 'static,
    {
        self.observe = Some(Arc::new(move |action| Box::pin(f(action))));
        self
    }

    pub fn with_needs_action<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.needs_action = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for CustomStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomStrategy")
            .field("think", &self.think.is_some())
            .field("act", &self.act.is_some())
            .field("observe", &self.observe.is_some())
            .field("needs_action", &self.needs_action.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl ReActStrategy for CustomStrategy {
    async fn think(&self, cx: CycleContext<'_>) -> Result<Option<Message>, AgentError> {
        match &self.think {
            Some(f) => {
                f(ThinkInput {
                    user_prompt: cx.ctx.user_prompt(),
                    step: cx.step,
                    history: cx.history.to_vec(),
                })
                .await
            }
            None => self.fallback.think(cx).await,
        }
    }

    fn needs_action(&self, thought: &str) -> bool {
        match &self.needs_action {
            Some(f) => f(thought),
            None => self.fallback.needs_action(thought),
        }
    }

    async fn act(
        &self,
        cx: CycleContext<'_>,
        thought: &str,
        planned: Option<ToolCall>,
    ) -> Result<Option<Message>, AgentError> {
        match &self.act {
            Some(f) => f(thought.to_string()).await,
            None => self.fallback.act(cx, thought, planned).await,
        }
    }

    async fn observe(&self, cx: CycleContext<'_>, action: &Message) -> Result<Option<Message>, AgentError> {
        match &self.observe {
            Some(f) => f(action.content.clone()).await,
            None => self.fallback.observe(cx, action).await,
        }
    }
}
