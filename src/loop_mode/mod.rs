//! Iteration controller for loop mode.
//!
//! ```text
//! INIT -> ITERATING -> { COMPLETED | CANCELLED | EXHAUSTED }
//! ```
//!
//! Each iteration sends the task plus a condensed view of the last few
//! iterations, runs any tool calls in the reply through the execution gate
//! and persists the loop state. Cancellation is only observed at the top of
//! an iteration; an in-flight request or tool always runs to completion or
//! its own timeout.

pub mod store;

use crate::api::{ModelClient, SendOptions};
use crate::config::LoopConfig;
use crate::error::ConfigError;
use crate::extract::{extract, infer_from_prose};
use crate::gate::{ExecutionGate, Prompter};
use crate::render::RenderSink;
use crate::types::Message;
use std::path::PathBuf;
use std::time::Duration;
use store::{LoopState, LoopStore};
use tokio::sync::watch;

pub use store::LoopStatus;

/// Per-run loop parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// Exact, case-sensitive completion marker.
    pub marker: String,
    pub max_iterations: u32,
    pub context_iterations: usize,
    /// Pause between iterations.
    pub delay: Duration,
}

impl LoopSettings {
    /// A blank marker would match every reply, so it is refused.
    pub fn from_config(
        marker: &str,
        max_iterations: Option<u32>,
        config: &LoopConfig,
    ) -> Result<Self, ConfigError> {
        if marker.trim().is_empty() {
            return Err(ConfigError::Invalid("loop completion marker is empty".into()));
        }
        Ok(Self {
            marker: marker.to_string(),
            max_iterations: max_iterations.unwrap_or(config.max_iterations),
            context_iterations: config.context_iterations,
            delay: Duration::from_millis(config.delay_ms),
        })
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub id: String,
    pub status: LoopStatus,
    pub iterations: u32,
    /// Where the final state was archived, if archiving succeeded.
    pub archived: Option<PathBuf>,
}

pub struct IterationController<'a> {
    client: &'a dyn ModelClient,
    options: SendOptions,
    gate: &'a ExecutionGate<'a>,
    store: &'a LoopStore,
    render: &'a dyn RenderSink,
    system_prompt: String,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> IterationController<'a> {
    pub fn new(
        client: &'a dyn ModelClient,
        options: SendOptions,
        gate: &'a ExecutionGate<'a>,
        store: &'a LoopStore,
        render: &'a dyn RenderSink,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            // Every iteration prompt is new; a cached reply would replay a
            // stale iteration.
            options: options.uncached(),
            gate,
            store,
            render,
            system_prompt: system_prompt.into(),
            cancel: None,
        }
    }

    /// In-process cancellation, e.g. from a Ctrl-C handler.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn run(
        &self,
        prompt: &str,
        settings: &LoopSettings,
        prompter: &mut dyn Prompter,
    ) -> LoopOutcome {
        let mut state = LoopState::new(prompt, &settings.marker, settings.max_iterations)
            .with_context_iterations(settings.context_iterations);
        self.persist(&mut state);
        tracing::info!(loop_id = %state.id, max = settings.max_iterations, "loop started");
        self.render.activity(&format!(
            "loop {} started (max {} iterations, marker '{}')",
            state.id, settings.max_iterations, settings.marker
        ));

        let status = loop {
            if self.cancelled(&state.id) {
                break LoopStatus::Cancelled;
            }
            if state.iteration_count >= state.max_iterations {
                break LoopStatus::Exhausted;
            }
            if state.iteration_count > 0 && !settings.delay.is_zero() {
                tokio::time::sleep(settings.delay).await;
            }

            state.status = LoopStatus::Iterating;
            self.render.activity(&format!(
                "iteration {}/{}",
                state.iteration_count + 1,
                state.max_iterations
            ));
            let messages = vec![
                Message::system(self.system_prompt.clone()),
                Message::user(state.build_prompt()),
            ];

            let reply = match self.client.send(&messages, &self.options).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(loop_id = %state.id, error = %err, "loop iteration request failed");
                    self.render.error(&format!("API request failed: {err}"));
                    state.record(String::new(), format!("API request failed: {err}"));
                    self.persist(&mut state);
                    continue;
                }
            };
            self.render.assistant_message(&reply);

            let tool_output = self.run_tools(&reply, prompter).await;
            let done = reply.contains(&settings.marker);
            state.record(reply, tool_output);
            if done {
                state.completion_reason = Some(format!("found completion marker '{}'", settings.marker));
                break LoopStatus::Completed;
            }
            self.persist(&mut state);
        };

        state.status = status;
        if state.completion_reason.is_none() {
            state.completion_reason = Some(match status {
                LoopStatus::Cancelled => "cancellation requested".to_string(),
                _ => format!("reached {} iterations without the marker", state.max_iterations),
            });
        }
        tracing::info!(loop_id = %state.id, status = status.as_str(), iterations = state.iteration_count, "loop finished");
        self.render.activity(&format!(
            "loop {} {} after {} iteration(s)",
            state.id,
            status.as_str(),
            state.iteration_count
        ));

        let archived = match self.store.archive(&mut state) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(loop_id = %state.id, error = %err, "could not archive loop state");
                self.persist(&mut state);
                None
            }
        };
        LoopOutcome {
            id: state.id,
            status,
            iterations: state.iteration_count,
            archived,
        }
    }

    /// Run every call in `reply` through the gate. Falls back to commands
    /// written as prose when the reply has no tool markers.
    async fn run_tools(&self, reply: &str, prompter: &mut dyn Prompter) -> String {
        let mut calls = extract(reply);
        if calls.is_empty() {
            calls = infer_from_prose(reply);
        }
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let report = self.gate.process(call, prompter).await;
            outputs.push(report.outcome.to_message(&report.call.name));
        }
        outputs.join("\n\n")
    }

    fn cancelled(&self, id: &str) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) || self.store.cancel_requested(id)
    }

    fn persist(&self, state: &mut LoopState) {
        if let Err(err) = self.store.save(state) {
            tracing::warn!(loop_id = %state.id, error = %err, "could not persist loop state");
        }
    }
}
