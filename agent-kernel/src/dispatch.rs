//! The dispatch loop: model turns interleaved with tool execution.
//!
//! One call to [`Dispatcher::run`] drives one user task to an outcome:
//!
//! 1. ask the model, advertising the session's registered tools;
//! 2. if the turn carries tool calls, check every name is registered, then
//!    run the calls in order and append each result under its call id;
//! 3. repeat until the model answers without tool calls, emits the
//!    termination marker, or the step budget is spent.
//!
//! Problems the model can fix (bad arguments, failing tools, unresolvable
//! capability descriptions) are reported back to it as tool results. Broken
//! invariants (unregistered names, registry rejections, model failures after
//! retries) end the task with a [`DispatchError`].

use std::fmt;
use std::sync::Arc;

use agent_adapters::traits::{
    AdapterError, AdapterResult, InferenceRequest, ModelAdapter, ToolCallRequest,
};
use agent_config::DispatchConfig;
use agent_prompts::{SystemInstruction, TemplateError};
use agent_tools::bootstrap::{bootstrap_parameters, registration_message};
use agent_tools::{
    BOOTSTRAP_PARAMETER, BOOTSTRAP_TOOL_NAME, Binding, ToolArgumentsExt, ToolError, ToolRegistry,
    decode_arguments, validate,
};
use futures::StreamExt;
use thiserror::Error;
use tokio::time;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::conversation::Conversation;
use crate::lifecycle::{LifecycleError, TaskEvent, TaskState};
use crate::resolver::CapabilityResolver;
use crate::session::Session;

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Tool result recorded for calls whose task was dropped before they ran.
const INTERRUPTED_OUTPUT: &str = "interrupted";

/// Failures that end a task.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The model called a name that is not registered in the session.
    #[error("model requested unregistered function `{name}`")]
    UnknownFunction {
        /// Requested name.
        name: String,
    },

    /// The model could not produce a turn, retries included.
    #[error("model `{model}` failed: {source}")]
    Model {
        /// Model identifier.
        model: String,
        /// Adapter failure.
        source: AdapterError,
    },

    /// The registry refused a resolved tool.
    #[error("failed to register `{name}`: {source}")]
    Registration {
        /// Tool name.
        name: String,
        /// Registry failure.
        source: ToolError,
    },

    /// The assistant-run backend failed.
    #[error("run `{run_id}` backend error: {source}")]
    Run {
        /// Run identifier.
        run_id: String,
        /// Backend failure.
        source: AdapterError,
    },

    /// The system prompt could not be rendered.
    #[error("invalid system prompt: {0}")]
    Prompt(#[from] TemplateError),

    /// Internal task state was violated.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// How a task ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The model answered without requesting tools.
    Completed {
        /// Final assistant text.
        answer: String,
        /// Model turns used.
        steps: usize,
    },
    /// The model emitted the termination marker.
    Terminated {
        /// Assistant text with the marker removed.
        answer: String,
        /// Model turns used.
        steps: usize,
    },
    /// The step budget ran out first. The task did not conclude.
    StepBudgetExceeded {
        /// Model turns used.
        steps: usize,
    },
}

impl TaskOutcome {
    /// Returns `true` when the task reached a natural conclusion.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !matches!(self, Self::StepBudgetExceeded { .. })
    }

    /// Returns the final answer, if any.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Completed { answer, .. } | Self::Terminated { answer, .. } => Some(answer),
            Self::StepBudgetExceeded { .. } => None,
        }
    }

    /// Returns the number of model turns used.
    #[must_use]
    pub const fn steps(&self) -> usize {
        match self {
            Self::Completed { steps, .. }
            | Self::Terminated { steps, .. }
            | Self::StepBudgetExceeded { steps } => *steps,
        }
    }
}

#[derive(Debug, Default)]
struct ModelTurn {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
}

/// Drives tasks for any number of sessions.
///
/// The dispatcher holds only shared, read-only state; everything mutable
/// lives in the [`Session`] passed to [`Dispatcher::run`].
pub struct Dispatcher {
    adapter: Arc<dyn ModelAdapter>,
    resolver: Arc<CapabilityResolver>,
    config: DispatchConfig,
    system_prompt: Option<String>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("Dispatcher")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .field("config", &self.config)
            .field("system_prompt", &self.system_prompt.is_some())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher without a system prompt.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ModelAdapter>,
        resolver: Arc<CapabilityResolver>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            adapter,
            resolver,
            config,
            system_prompt: None,
        }
    }

    /// Sets the system prompt added at the start of every fresh conversation.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Uses the default discovery instruction, naming the bootstrap tool and
    /// the configured termination marker.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Prompt`] if the instruction cannot be rendered.
    pub fn with_discovery_prompt(self) -> DispatchResult<Self> {
        let instruction = SystemInstruction::builder()
            .bootstrap_tool(BOOTSTRAP_TOOL_NAME)
            .termination_marker(self.config.termination_marker.as_str())
            .build()?;
        Ok(self.with_system_prompt(instruction.content()))
    }

    /// Returns the loop settings.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Returns the resolver used by the bootstrap tool.
    #[must_use]
    pub fn resolver(&self) -> &Arc<CapabilityResolver> {
        &self.resolver
    }

    /// Runs one user task in `session`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the model names an unregistered
    /// function, the model keeps failing after retries, or a registration is
    /// refused. The session's task state is then
    /// [`TaskState::Aborted`](crate::TaskState::Aborted).
    ///
    /// A task whose future was dropped mid-flight is aborted when the next
    /// one starts; its unanswered tool calls get an `interrupted` result so
    /// the history stays well-formed.
    pub async fn run(
        &self,
        session: &mut Session,
        user_message: impl Into<String>,
    ) -> DispatchResult<TaskOutcome> {
        let span = info_span!("task", session_id = %session.id());
        let result = self.drive(session, user_message.into()).instrument(span).await;

        match &result {
            Ok(outcome) => info!(
                session_id = %session.id(),
                steps = outcome.steps(),
                complete = outcome.is_complete(),
                "task finished"
            ),
            Err(err) => {
                let (_, _, lifecycle) = session.parts_mut();
                // Abort is accepted from every state.
                let _ = lifecycle.transition(TaskEvent::Abort);
                warn!(session_id = %session.id(), error = %err, "task aborted");
            }
        }
        result
    }

    async fn drive(
        &self,
        session: &mut Session,
        user_message: String,
    ) -> DispatchResult<TaskOutcome> {
        let (conversation, registry, lifecycle) = session.parts_mut();
        let previous = lifecycle.state();
        if previous != TaskState::Idle && !previous.is_terminal() {
            lifecycle.transition(TaskEvent::Abort)?;
            let closed = conversation.answer_pending_calls(INTERRUPTED_OUTPUT);
            warn!(state = ?previous, closed, "previous task was interrupted");
        }
        lifecycle.transition(TaskEvent::Begin)?;

        if conversation.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                conversation.push_system(prompt.as_str());
            }
        }
        conversation.push_user(user_message);

        let mut steps = 0;
        loop {
            if steps >= self.config.max_steps {
                lifecycle.transition(TaskEvent::BudgetExhausted)?;
                warn!(steps, "step budget exceeded");
                return Ok(TaskOutcome::StepBudgetExceeded { steps });
            }

            let turn = self.complete_turn(conversation, registry).await?;
            steps += 1;
            let terminated = self.has_marker(&turn.text);
            debug!(step = steps, tool_calls = turn.tool_calls.len(), terminated, "model turn");

            if turn.tool_calls.is_empty() {
                let answer = self.strip_marker(&turn.text);
                conversation.push_assistant(turn.text, Vec::new());
                lifecycle.transition(TaskEvent::FinalAnswer)?;
                return Ok(if terminated {
                    TaskOutcome::Terminated { answer, steps }
                } else {
                    TaskOutcome::Completed { answer, steps }
                });
            }

            lifecycle.transition(TaskEvent::ToolRequests)?;
            ensure_registered(registry, &turn.tool_calls)?;

            conversation.push_assistant(turn.text.as_str(), turn.tool_calls.clone());
            lifecycle.transition(TaskEvent::Execute)?;
            for call in &turn.tool_calls {
                let output = self.execute_call(registry, call).await?;
                conversation.push_tool_result(call.id.as_str(), call.name.as_str(), output);
            }

            if terminated {
                lifecycle.transition(TaskEvent::FinalAnswer)?;
                return Ok(TaskOutcome::Terminated {
                    answer: self.strip_marker(&turn.text),
                    steps,
                });
            }
            lifecycle.transition(TaskEvent::Continue)?;
        }
    }

    /// Executes `calls` in order against `registry` and returns
    /// `(call id, output)` pairs. Every name is checked before anything runs.
    pub(crate) async fn execute_calls(
        &self,
        registry: &mut ToolRegistry,
        calls: &[ToolCallRequest],
    ) -> DispatchResult<Vec<(String, String)>> {
        ensure_registered(registry, calls)?;
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let output = self.execute_call(registry, call).await?;
            outputs.push((call.id.clone(), output));
        }
        Ok(outputs)
    }

    async fn execute_call(
        &self,
        registry: &mut ToolRegistry,
        call: &ToolCallRequest,
    ) -> DispatchResult<String> {
        debug!(tool = %call.name, call_id = %call.id, "executing tool call");
        let binding = registry
            .binding(&call.name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownFunction {
                name: call.name.clone(),
            })?;

        let descriptor = match binding {
            Binding::Bootstrap => return self.register_capability(registry, call).await,
            Binding::Tool(descriptor) => descriptor,
        };

        let args = match decode_arguments(&call.arguments)
            .and_then(|args| descriptor.validate(&args).map(|()| args))
        {
            Ok(args) => args,
            Err(err) => {
                warn!(tool = %call.name, error = %err, "rejected tool arguments");
                return Ok(format!("invalid arguments for `{}`: {err}", call.name));
            }
        };

        match descriptor.invoke(args).await {
            Ok(output) => Ok(output),
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool failed");
                Ok(format!("error: {err}"))
            }
        }
    }

    async fn register_capability(
        &self,
        registry: &mut ToolRegistry,
        call: &ToolCallRequest,
    ) -> DispatchResult<String> {
        let args = match decode_arguments(&call.arguments)
            .and_then(|args| validate(&bootstrap_parameters(), &args).map(|()| args))
        {
            Ok(args) => args,
            Err(err) => {
                warn!(error = %err, "rejected registration arguments");
                return Ok(format!("invalid arguments for `{BOOTSTRAP_TOOL_NAME}`: {err}"));
            }
        };
        let description = match args.required_str(BOOTSTRAP_PARAMETER) {
            Ok(description) => description,
            Err(err) => return Ok(format!("invalid arguments for `{BOOTSTRAP_TOOL_NAME}`: {err}")),
        };

        let descriptor = match self.resolver.resolve(description).await {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(description, error = %err, "capability not resolved");
                return Ok(err.to_string());
            }
        };

        let name = descriptor.name().to_owned();
        registry
            .register(descriptor)
            .map_err(|source| DispatchError::Registration {
                name: name.clone(),
                source,
            })?;
        Ok(registration_message(&name, description))
    }

    async fn complete_turn(
        &self,
        conversation: &Conversation,
        registry: &ToolRegistry,
    ) -> DispatchResult<ModelTurn> {
        let request = InferenceRequest::new(conversation.messages().to_vec())
            .map_err(|source| self.model_error(source))?
            .with_tools(registry.schemas().to_vec());

        let deadline = self.config.turn_timeout();
        let mut attempt = 0;
        loop {
            let result = match time::timeout(deadline, self.infer(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout { elapsed: deadline }),
            };

            match result {
                Ok(turn) => return Ok(turn),
                Err(err) if err.is_transient() && attempt < self.config.max_turn_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    warn!(attempt, ?delay, error = %err, "model turn failed, retrying");
                    time::sleep(delay).await;
                }
                Err(err) => return Err(self.model_error(err)),
            }
        }
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<ModelTurn> {
        let mut stream = self.adapter.infer(request).await?;
        let mut turn = ModelTurn::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            turn.text.push_str(&chunk.delta);
            turn.tool_calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }
        Ok(turn)
    }

    fn model_error(&self, source: AdapterError) -> DispatchError {
        DispatchError::Model {
            model: self.adapter.metadata().model().to_owned(),
            source,
        }
    }

    fn has_marker(&self, text: &str) -> bool {
        let marker = self.config.termination_marker.as_str();
        !marker.is_empty() && text.contains(marker)
    }

    fn strip_marker(&self, text: &str) -> String {
        let marker = self.config.termination_marker.as_str();
        if marker.is_empty() {
            return text.trim().to_owned();
        }
        text.replace(marker, "").trim().to_owned()
    }
}

fn ensure_registered(registry: &ToolRegistry, calls: &[ToolCallRequest]) -> DispatchResult<()> {
    match calls.iter().find(|call| !registry.contains(&call.name)) {
        Some(call) => {
            warn!(
                tool = %call.name,
                registered = ?registry.names(),
                "unregistered function requested"
            );
            Err(DispatchError::UnknownFunction {
                name: call.name.clone(),
            })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use agent_adapters::traits::{InferenceChunk, MessageRole, PromptMessage};
    use serde_json::json;

    use crate::test_support::{ScriptedAdapter, call, insurance_resolver, text};

    async fn dispatcher(adapter: Arc<ScriptedAdapter>, config: DispatchConfig) -> Dispatcher {
        Dispatcher::new(adapter, Arc::new(insurance_resolver().await), config)
    }

    fn register(id: &str, description: &str) -> ToolCallRequest {
        call(id, BOOTSTRAP_TOOL_NAME, json!({ BOOTSTRAP_PARAMETER: description }))
    }

    #[tokio::test]
    async fn discovers_registers_and_calls_a_tool() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![register(
                "call_1",
                "get the account number of the health insurance account",
            )])),
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![call(
                "call_2",
                "get_health_insurance_account",
                json!({ "user": "alice" }),
            )])),
            Ok(text("Your account number is A12345. TERMINATE")),
        ]);
        let dispatcher = dispatcher(adapter.clone(), DispatchConfig::default()).await;
        let mut session = Session::new();

        let outcome = dispatcher
            .run(&mut session, "what is my insurance account number?")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Terminated {
                answer: "Your account number is A12345.".into(),
                steps: 3
            }
        );
        assert_eq!(session.state(), TaskState::HasFinalAnswer);

        let results: Vec<_> = session.conversation().tool_results().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_call_id(), Some("call_1"));
        assert_eq!(
            results[0].content(),
            "registering: get_health_insurance_account for: 'get the account number of the health insurance account'"
        );
        assert_eq!(results[1].tool_call_id(), Some("call_2"));
        assert_eq!(results[1].content(), "A12345");

        // the first request advertises only the bootstrap tool, the second also the new one
        let requests = adapter.requests();
        let advertised: Vec<Vec<&str>> = requests
            .iter()
            .map(|request| request.tools().iter().map(|tool| tool.name()).collect())
            .collect();
        assert_eq!(advertised[0], [BOOTSTRAP_TOOL_NAME]);
        assert_eq!(
            advertised[1],
            [BOOTSTRAP_TOOL_NAME, "get_health_insurance_account"]
        );
    }

    #[tokio::test]
    async fn unknown_function_aborts_without_touching_history() {
        let adapter = ScriptedAdapter::new([Ok(InferenceChunk::new("", true).with_tool_calls(vec![
            register("call_1", "read a local file"),
            call("call_2", "delete_everything", json!({})),
        ]))]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        let err = dispatcher
            .run(&mut session, "clean up")
            .await
            .expect_err("unregistered function");

        assert!(matches!(err, DispatchError::UnknownFunction { ref name } if name == "delete_everything"));
        assert_eq!(session.state(), TaskState::Aborted);
        assert_eq!(session.conversation().len(), 1);
        assert_eq!(session.conversation().tool_results().count(), 0);
        // the registration requested in the same turn never ran
        assert_eq!(session.registry().len(), 1);
    }

    #[tokio::test]
    async fn missing_argument_is_reported_and_loop_continues() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true)
                .with_tool_calls(vec![register("call_1", "save the given content to a local file")])),
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![call(
                "call_2",
                "save_to_file",
                json!({ "file_path": "/tmp/x.txt" }),
            )])),
            Ok(text("I could not save the file.")),
        ]);
        let (resolver, writes) = crate::test_support::insurance_resolver_with_writes().await;
        let dispatcher = Dispatcher::new(adapter, Arc::new(resolver), DispatchConfig::default());
        let mut session = Session::new();

        let outcome = dispatcher.run(&mut session, "save my policy").await.unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                answer: "I could not save the file.".into(),
                steps: 3
            }
        );
        let result = session
            .conversation()
            .tool_results()
            .find(|message| message.tool_call_id() == Some("call_2"))
            .unwrap();
        assert_eq!(
            result.content(),
            "invalid arguments for `save_to_file`: missing required arguments: content"
        );
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn step_budget_stops_a_looping_model() {
        let adapter = ScriptedAdapter::looping(
            InferenceChunk::new("", true)
                .with_tool_calls(vec![register("call_n", "get the policy number")]),
        );
        let config = DispatchConfig::default().with_max_steps(3);
        let dispatcher = dispatcher(adapter.clone(), config).await;
        let mut session = Session::new();

        let outcome = dispatcher.run(&mut session, "loop forever").await.unwrap();

        assert_eq!(outcome, TaskOutcome::StepBudgetExceeded { steps: 3 });
        assert!(!outcome.is_complete());
        assert_eq!(outcome.answer(), None);
        assert_eq!(session.state(), TaskState::StepBudgetExceeded);
        assert_eq!(session.conversation().tool_results().count(), 3);
        assert_eq!(adapter.requests().len(), 3);
        // re-registering the same tool never duplicates it
        assert_eq!(session.registry().len(), 2);
    }

    #[tokio::test]
    async fn marker_turn_still_executes_its_calls() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true)
                .with_tool_calls(vec![register("call_1", "get the policy number")])),
            Ok(InferenceChunk::new("Here it is. TERMINATE", true).with_tool_calls(vec![call(
                "call_2",
                "get_health_insurance_policy",
                json!({ "account": "A12345" }),
            )])),
        ]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        let outcome = dispatcher.run(&mut session, "policy number?").await.unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Terminated {
                answer: "Here it is.".into(),
                steps: 2
            }
        );
        let last = session.conversation().last().unwrap();
        assert_eq!(last.role(), MessageRole::Tool);
        assert_eq!(last.content(), "P56789");
    }

    #[tokio::test]
    async fn tool_failures_and_bad_json_become_text() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true)
                .with_tool_calls(vec![register("call_1", "read the content of a local file")])),
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![
                ToolCallRequest::new("call_2", "read_file", "{not json"),
                call("call_3", "read_file", json!({ "file_path": "/missing.txt" })),
            ])),
            Ok(text("The file does not exist.")),
        ]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        let outcome = dispatcher.run(&mut session, "read /missing.txt").await.unwrap();
        assert!(outcome.is_complete());

        let results: Vec<&str> = session
            .conversation()
            .tool_results()
            .map(|message| message.content())
            .collect();
        assert!(results[1].starts_with("invalid arguments for `read_file`: arguments must be a JSON object"));
        assert_eq!(results[2], "error: tool execution failed: no such file: /missing.txt");
    }

    #[tokio::test]
    async fn bad_registration_arguments_become_text() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![call(
                "call_1",
                BOOTSTRAP_TOOL_NAME,
                json!({ "name": "read_file" }),
            )])),
            Ok(text("done")),
        ]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        dispatcher.run(&mut session, "read a file").await.unwrap();

        let result = session.conversation().tool_results().next().unwrap();
        assert_eq!(
            result.content(),
            "invalid arguments for `register_functions`: unknown arguments: name; missing required arguments: function_description"
        );
        assert_eq!(session.registry().len(), 1);
    }

    #[tokio::test]
    async fn system_prompt_is_added_once() {
        let adapter = ScriptedAdapter::new([Ok(text("first")), Ok(text("second"))]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default())
            .await
            .with_discovery_prompt()
            .unwrap();
        let mut session = Session::new();

        dispatcher.run(&mut session, "one").await.unwrap();
        dispatcher.run(&mut session, "two").await.unwrap();

        let messages = session.conversation().messages();
        let systems = messages
            .iter()
            .filter(|message| message.role() == MessageRole::System)
            .count();
        assert_eq!(systems, 1);
        assert!(messages[0].content().contains("register_functions"));
        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_without_using_steps() {
        let adapter = ScriptedAdapter::new([
            Err(AdapterError::transport("connection reset")),
            Err(AdapterError::RateLimited { retry_after: None }),
            Ok(text("ok")),
        ]);
        let config = DispatchConfig::default().with_retries(2, Duration::from_millis(1));
        let dispatcher = dispatcher(adapter.clone(), config).await;
        let mut session = Session::new();

        let outcome = dispatcher.run(&mut session, "hello").await.unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                answer: "ok".into(),
                steps: 1
            }
        );
        assert_eq!(adapter.requests().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_abort() {
        let adapter = ScriptedAdapter::new([
            Err(AdapterError::transport("down")),
            Err(AdapterError::transport("still down")),
        ]);
        let config = DispatchConfig::default().with_retries(1, Duration::from_millis(1));
        let dispatcher = dispatcher(adapter, config).await;
        let mut session = Session::new();

        let err = dispatcher.run(&mut session, "hello").await.expect_err("retries spent");
        assert!(matches!(
            err,
            DispatchError::Model { source: AdapterError::Transport { .. }, .. }
        ));
        assert_eq!(session.state(), TaskState::Aborted);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let adapter = ScriptedAdapter::new([
            Err(AdapterError::configuration("no key")),
            Ok(text("unused")),
        ]);
        let dispatcher = dispatcher(adapter.clone(), DispatchConfig::default()).await;
        let mut session = Session::new();

        let err = dispatcher.run(&mut session, "hello").await.expect_err("not retried");
        assert!(matches!(
            err,
            DispatchError::Model { source: AdapterError::Configuration { .. }, .. }
        ));
        assert_eq!(adapter.requests().len(), 1);
    }

    #[tokio::test]
    async fn slow_turns_time_out() {
        let adapter = ScriptedAdapter::new([Ok(text("late"))]).with_delay(Duration::from_millis(200));
        let config = DispatchConfig::default()
            .with_turn_timeout(Duration::from_millis(10))
            .with_retries(0, Duration::from_millis(1));
        let dispatcher = dispatcher(adapter, config).await;
        let mut session = Session::new();

        let err = dispatcher.run(&mut session, "hello").await.expect_err("timed out");
        assert!(matches!(err, DispatchError::Model { source: AdapterError::Timeout { .. }, .. }));
    }

    #[tokio::test]
    async fn finished_session_accepts_next_task() {
        let adapter = ScriptedAdapter::new([
            Ok(InferenceChunk::new("", true).with_tool_calls(vec![call("call_1", "nope", json!({}))])),
            Ok(text("fine")),
        ]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        assert!(dispatcher.run(&mut session, "first").await.is_err());
        session.reset();
        let outcome = dispatcher.run(&mut session, "second").await.unwrap();
        assert_eq!(outcome.answer(), Some("fine"));
        assert_eq!(session.conversation().len(), 2);
    }

    #[tokio::test]
    async fn dropped_task_does_not_block_the_next_one() {
        let adapter = ScriptedAdapter::new([Ok(text("too late")), Ok(text("fine"))])
            .with_delay(Duration::from_millis(50));
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();

        let dropped = tokio::time::timeout(
            Duration::from_millis(5),
            dispatcher.run(&mut session, "first"),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(session.state(), TaskState::AwaitingModel);

        let outcome = dispatcher.run(&mut session, "second").await.unwrap();
        assert_eq!(outcome.answer(), Some("too late"));
        assert_eq!(session.state(), TaskState::HasFinalAnswer);
    }

    #[tokio::test]
    async fn interrupted_tool_calls_are_answered_before_the_next_task() {
        let adapter = ScriptedAdapter::new([Ok(text("fine"))]);
        let dispatcher = dispatcher(adapter, DispatchConfig::default()).await;
        let mut session = Session::new();
        {
            let (conversation, _, lifecycle) = session.parts_mut();
            conversation.push_user("first");
            conversation.push_assistant("", vec![register("call_1", "read a local file")]);
            lifecycle.transition(TaskEvent::Begin).unwrap();
            lifecycle.transition(TaskEvent::ToolRequests).unwrap();
            lifecycle.transition(TaskEvent::Execute).unwrap();
        }

        let outcome = dispatcher.run(&mut session, "second").await.unwrap();

        assert_eq!(outcome.answer(), Some("fine"));
        let results: Vec<_> = session.conversation().tool_results().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id(), Some("call_1"));
        assert_eq!(results[0].content(), INTERRUPTED_OUTPUT);
        let roles: Vec<MessageRole> = session
            .conversation()
            .messages()
            .iter()
            .map(PromptMessage::role)
            .collect();
        assert_eq!(
            roles,
            [
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }
}
