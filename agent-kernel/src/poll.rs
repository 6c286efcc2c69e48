//! Polling hosted assistant runs.
//!
//! Some providers execute the conversation server-side and only pause a run
//! when it needs tool outputs. [`RunPoller`] checks such a run on a bounded
//! schedule, answers its tool calls through the same execution path as the
//! [`Dispatcher`], and stops on a terminal status or after the attempt budget.

use std::future::Future;

use agent_adapters::traits::{AdapterError, AdapterResult, ToolCallRequest};
use agent_config::PollPolicy;
use agent_primitives::RunStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchError, DispatchResult, Dispatcher};
use crate::session::Session;

/// State of a run as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Current status.
    pub status: RunStatus,
    /// Pending tool calls when `status` is [`RunStatus::RequiresAction`].
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Final answer once the run completed.
    #[serde(default)]
    pub answer: Option<String>,
}

impl RunSnapshot {
    /// Creates a snapshot without tool calls or answer.
    #[must_use]
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            tool_calls: Vec::new(),
            answer: None,
        }
    }

    /// Attaches pending tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attaches the final answer.
    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }
}

/// Output for one pending tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Call id the output answers.
    pub call_id: String,
    /// Tool result text.
    pub output: String,
}

/// Remote run API.
#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Fetches the current state of `run_id`.
    async fn retrieve(&self, run_id: &str) -> AdapterResult<RunSnapshot>;

    /// Hands tool outputs back to a run waiting on them.
    async fn submit_tool_outputs(
        &self,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> AdapterResult<()>;
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run reached a terminal status.
    Finished {
        /// Terminal status.
        status: RunStatus,
        /// Final answer, if the backend provided one.
        answer: Option<String>,
    },
    /// The attempt budget ran out before a terminal status.
    StepBudgetExceeded {
        /// Status checks performed.
        attempts: u32,
    },
}

/// Polls runs according to a [`PollPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RunPoller {
    policy: PollPolicy,
}

impl RunPoller {
    /// Creates a poller.
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Polls `run_id` until it finishes or the attempt budget is spent.
    ///
    /// Tool calls requested by the run execute against `session`'s registry,
    /// so the bootstrap tool can register new capabilities mid-run. Every
    /// backend call is bounded by the policy's request timeout; timeouts and
    /// other transient failures use up an attempt and polling goes on.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Run`] on permanent backend failures and
    /// [`DispatchError::UnknownFunction`] when the run requests a name the
    /// session never registered.
    pub async fn poll(
        &self,
        backend: &dyn RunBackend,
        dispatcher: &Dispatcher,
        session: &mut Session,
        run_id: &str,
    ) -> DispatchResult<RunOutcome> {
        for attempt in 0..self.policy.max_attempts {
            if attempt > 0 {
                time::sleep(self.policy.delay_for(attempt - 1)).await;
            }

            let snapshot = match self.bounded(backend.retrieve(run_id)).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    Self::tolerate(run_id, attempt, err)?;
                    continue;
                }
            };
            debug!(run_id, attempt, status = %snapshot.status, "run status");

            if self.policy.is_terminal(snapshot.status) {
                info!(run_id, status = %snapshot.status, attempts = attempt + 1, "run finished");
                return Ok(RunOutcome::Finished {
                    status: snapshot.status,
                    answer: snapshot.answer,
                });
            }

            if snapshot.status == RunStatus::RequiresAction {
                let outputs = dispatcher
                    .execute_calls(session.registry_mut(), &snapshot.tool_calls)
                    .await?
                    .into_iter()
                    .map(|(call_id, output)| ToolOutput { call_id, output })
                    .collect();
                // The run keeps asking for the same calls until outputs land.
                let submitted = self.bounded(backend.submit_tool_outputs(run_id, outputs)).await;
                if let Err(err) = submitted {
                    Self::tolerate(run_id, attempt, err)?;
                }
            }
        }

        warn!(run_id, attempts = self.policy.max_attempts, "run did not finish in time");
        Ok(RunOutcome::StepBudgetExceeded {
            attempts: self.policy.max_attempts,
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = AdapterResult<T>>) -> AdapterResult<T> {
        let deadline = self.policy.request_timeout();
        time::timeout(deadline, call)
            .await
            .unwrap_or(Err(AdapterError::Timeout { elapsed: deadline }))
    }

    fn tolerate(run_id: &str, attempt: u32, err: AdapterError) -> DispatchResult<()> {
        if err.is_transient() {
            warn!(run_id, attempt, error = %err, "run backend call failed, polling on");
            return Ok(());
        }
        Err(DispatchError::Run {
            run_id: run_id.to_owned(),
            source: err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use agent_config::DispatchConfig;
    use agent_tools::{BOOTSTRAP_PARAMETER, BOOTSTRAP_TOOL_NAME};
    use serde_json::json;

    use crate::test_support::{ScriptedAdapter, call, insurance_resolver};

    struct ScriptedRun {
        snapshots: Mutex<VecDeque<AdapterResult<RunSnapshot>>>,
        submitted: Mutex<Vec<Vec<ToolOutput>>>,
    }

    impl ScriptedRun {
        fn new<I>(snapshots: I) -> Self
        where
            I: IntoIterator<Item = AdapterResult<RunSnapshot>>,
        {
            Self {
                snapshots: Mutex::new(snapshots.into_iter().collect()),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RunBackend for ScriptedRun {
        async fn retrieve(&self, _run_id: &str) -> AdapterResult<RunSnapshot> {
            self.snapshots
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RunSnapshot::new(RunStatus::InProgress)))
        }

        async fn submit_tool_outputs(
            &self,
            _run_id: &str,
            outputs: Vec<ToolOutput>,
        ) -> AdapterResult<()> {
            self.submitted.lock().unwrap().push(outputs);
            Ok(())
        }
    }

    fn quick_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            max_attempts,
            interval_ms: 1,
            ..PollPolicy::default()
        }
    }

    async fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            ScriptedAdapter::new([]),
            Arc::new(insurance_resolver().await),
            DispatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn answers_tool_calls_then_finishes() {
        let backend = ScriptedRun::new([
            Ok(RunSnapshot::new(RunStatus::Queued)),
            Ok(RunSnapshot::new(RunStatus::RequiresAction).with_tool_calls(vec![call(
                "call_1",
                BOOTSTRAP_TOOL_NAME,
                json!({ BOOTSTRAP_PARAMETER: "get the policy number" }),
            )])),
            Ok(RunSnapshot::new(RunStatus::RequiresAction).with_tool_calls(vec![call(
                "call_2",
                "get_health_insurance_policy",
                json!({ "account": "A12345" }),
            )])),
            Ok(RunSnapshot::new(RunStatus::Completed).with_answer("Your policy is P56789.")),
        ]);
        let dispatcher = dispatcher().await;
        let mut session = Session::new();

        let outcome = RunPoller::new(quick_policy(10))
            .poll(&backend, &dispatcher, &mut session, "run_1")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: RunStatus::Completed,
                answer: Some("Your policy is P56789.".into())
            }
        );
        let submitted = backend.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 2);
        assert_eq!(
            submitted[0][0].output,
            "registering: get_health_insurance_policy for: 'get the policy number'"
        );
        assert_eq!(
            submitted[1][0],
            ToolOutput {
                call_id: "call_2".into(),
                output: "P56789".into()
            }
        );
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let backend = ScriptedRun::new([]);
        let dispatcher = dispatcher().await;
        let mut session = Session::new();

        let outcome = RunPoller::new(quick_policy(3))
            .poll(&backend, &dispatcher, &mut session, "run_1")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::StepBudgetExceeded { attempts: 3 });
    }

    #[tokio::test]
    async fn failed_runs_are_terminal() {
        let backend = ScriptedRun::new([Ok(RunSnapshot::new(RunStatus::Failed))]);
        let dispatcher = dispatcher().await;
        let mut session = Session::new();

        let outcome = RunPoller::default()
            .poll(&backend, &dispatcher, &mut session, "run_1")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: RunStatus::Failed,
                answer: None
            }
        );
    }

    #[tokio::test]
    async fn backend_and_unknown_function_errors_propagate() {
        let dispatcher = dispatcher().await;
        let mut session = Session::new();

        let backend = ScriptedRun::new([Err(AdapterError::response("run not found"))]);
        let err = RunPoller::new(quick_policy(2))
            .poll(&backend, &dispatcher, &mut session, "run_9")
            .await
            .expect_err("backend failed");
        assert!(matches!(err, DispatchError::Run { ref run_id, .. } if run_id == "run_9"));

        let backend = ScriptedRun::new([Ok(RunSnapshot::new(RunStatus::RequiresAction)
            .with_tool_calls(vec![call("call_1", "delete_everything", json!({}))]))]);
        let err = RunPoller::new(quick_policy(2))
            .poll(&backend, &dispatcher, &mut session, "run_9")
            .await
            .expect_err("unregistered");
        assert!(matches!(err, DispatchError::UnknownFunction { .. }));
        assert!(backend.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_backend_errors_use_an_attempt_and_polling_goes_on() {
        let backend = ScriptedRun::new([
            Err(AdapterError::transport("gateway down")),
            Err(AdapterError::Timeout {
                elapsed: std::time::Duration::from_secs(30),
            }),
            Ok(RunSnapshot::new(RunStatus::Completed).with_answer("done")),
        ]);
        let dispatcher = dispatcher().await;
        let mut session = Session::new();

        let outcome = RunPoller::new(quick_policy(5))
            .poll(&backend, &dispatcher, &mut session, "run_1")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Finished {
                status: RunStatus::Completed,
                answer: Some("done".into())
            }
        );

        let backend = ScriptedRun::new([
            Err(AdapterError::transport("gateway down")),
            Err(AdapterError::transport("gateway down")),
        ]);
        let outcome = RunPoller::new(quick_policy(2))
            .poll(&backend, &dispatcher, &mut session, "run_1")
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::StepBudgetExceeded { attempts: 2 });
    }

    struct StalledRun;

    #[async_trait]
    impl RunBackend for StalledRun {
        async fn retrieve(&self, _run_id: &str) -> AdapterResult<RunSnapshot> {
            std::future::pending().await
        }

        async fn submit_tool_outputs(
            &self,
            _run_id: &str,
            _outputs: Vec<ToolOutput>,
        ) -> AdapterResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_backend_calls_time_out() {
        let dispatcher = dispatcher().await;
        let mut session = Session::new();
        let policy = PollPolicy {
            request_timeout_ms: 5,
            ..quick_policy(2)
        };

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            RunPoller::new(policy).poll(&StalledRun, &dispatcher, &mut session, "run_1"),
        )
        .await
        .expect("poll returns despite a hung backend")
        .unwrap();
        assert_eq!(outcome, RunOutcome::StepBudgetExceeded { attempts: 2 });
    }
}
