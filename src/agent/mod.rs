//! Query orchestration.
//!
//! One [`Agent::ask`] turn: load context from the history store, call the
//! model (cache, dedup and retries live behind [`ModelClient`]), extract tool
//! calls from the reply, run each through the execution gate and append the
//! results to history in call order. [`Agent::repl`] wraps turns in the
//! interactive session and [`Agent::run_loop`] hands control to the
//! iteration controller.

pub mod commands;

use crate::api::{ModelClient, SendOptions};
use crate::config::Config;
use crate::error::{AgentError, ApiError};
use crate::extract::extract;
use crate::gate::{ExecutionGate, GateOptions, GateReport, Prompter};
use crate::history::HistoryStore;
use crate::hooks::HookRunner;
use crate::interaction_log::InteractionLog;
use crate::loop_mode::store::LoopStore;
use crate::loop_mode::{IterationController, LoopOutcome, LoopSettings};
use crate::offline;
use crate::prompt::{render_system_prompt, SystemPromptParams};
use crate::render::RenderSink;
use crate::tools::ToolRegistry;
use crate::types::Message;
use commands::{parse_slash_command, SlashCommandAction, SLASH_COMMANDS};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything an [`Agent`] is assembled from.
pub struct AgentParts {
    pub client: Arc<dyn ModelClient>,
    pub options: SendOptions,
    pub history: HistoryStore,
    pub registry: ToolRegistry,
    pub hooks: HookRunner,
    pub log: InteractionLog,
    pub render: Arc<dyn RenderSink>,
    pub gate: GateOptions,
    /// Print reply deltas as they arrive.
    pub stream: bool,
}

/// Outcome of one query.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub reply: String,
    /// The API was unreachable and `reply` holds offline suggestions.
    pub offline: bool,
    /// The reply could not be used and `reply` holds the error text.
    pub failed: bool,
    pub tools: Vec<GateReport>,
}

pub struct Agent {
    client: Arc<dyn ModelClient>,
    options: SendOptions,
    history: HistoryStore,
    registry: ToolRegistry,
    hooks: HookRunner,
    log: InteractionLog,
    render: Arc<dyn RenderSink>,
    gate: GateOptions,
    stream: bool,
    system_prompt: String,
}

impl Agent {
    pub fn new(parts: AgentParts) -> Self {
        let system_prompt = render_system_prompt(SystemPromptParams {
            cwd: &parts.registry.context().cwd,
            plugins: parts.registry.plugins(),
            custom_instructions: None,
        });
        Self {
            client: parts.client,
            options: parts.options,
            history: parts.history,
            registry: parts.registry,
            hooks: parts.hooks,
            log: parts.log,
            render: parts.render,
            gate: parts.gate,
            stream: parts.stream,
            system_prompt,
        }
    }

    /// Wire an agent from configuration.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn ModelClient>,
        render: Arc<dyn RenderSink>,
        gate: GateOptions,
        log_interactions: bool,
        cwd: PathBuf,
    ) -> Self {
        Self::new(AgentParts {
            client,
            options: SendOptions::from_config(&config.api),
            history: HistoryStore::open(config.history_path(), &config.history),
            registry: ToolRegistry::from_config(cwd, &config.tools),
            hooks: HookRunner::from_config(&config.hooks, &config.hooks_dir()),
            log: InteractionLog::new(
                config.interaction_log_path(),
                log_interactions && config.logging.interactions,
            ),
            render,
            gate,
            stream: config.api.stream && config.display.stream_output,
        })
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one query to completion.
    pub async fn ask(&mut self, query: &str, prompter: &mut dyn Prompter) -> Result<TurnReport, AgentError> {
        self.history.set_system_prompt(&self.system_prompt);
        match self
            .history
            .compact_if_needed(self.client.as_ref(), &self.options)
            .await
        {
            Ok(Some(report)) => self.render.activity(&format!(
                "history compacted ({} -> {} messages)",
                report.before, report.after
            )),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "could not persist compacted history"),
        }

        let mut messages = self.history.messages().to_vec();
        messages.push(Message::user(query));

        let reply = match self.fetch(&messages).await {
            Ok(reply) => reply,
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "API unreachable after retries; offering offline suggestions");
                let text = offline::render(query);
                self.render.warn(&format!("API unreachable: {err}"));
                self.render.assistant_message(&text);
                self.log.record(query, &text, None);
                return Ok(TurnReport {
                    reply: text,
                    offline: true,
                    failed: false,
                    tools: Vec::new(),
                });
            }
            // Only an upstream rejection is fatal; anything else unusable
            // is reported and the turn ends normally.
            Err(err) if err.status_code().is_none() => {
                tracing::warn!(error = %err, "model reply could not be used");
                let text = err.to_string();
                self.render.error(&text);
                self.log.record(query, &text, None);
                return Ok(TurnReport {
                    reply: text,
                    offline: false,
                    failed: true,
                    tools: Vec::new(),
                });
            }
            Err(err) => {
                self.render.error(&err.to_string());
                return Err(err.into());
            }
        };

        self.remember(Message::user(query));
        self.remember(Message::assistant(reply.clone()));

        let mut tools = Vec::new();
        {
            let gate = ExecutionGate::new(&self.registry, &self.hooks, self.render.as_ref(), self.gate);
            for call in extract(&reply) {
                tools.push(gate.process(call, prompter).await);
            }
        }
        for report in &tools {
            self.remember(report.to_message());
        }

        let command = tools
            .iter()
            .find_map(|report| ToolRegistry::command_text(&report.call));
        self.log.record(query, &reply, command);

        Ok(TurnReport {
            reply,
            offline: false,
            failed: false,
            tools,
        })
    }

    /// Hand `prompt` to the iteration controller.
    pub async fn run_loop(
        &self,
        prompt: &str,
        settings: &LoopSettings,
        store: &LoopStore,
        prompter: &mut dyn Prompter,
        cancel: Option<watch::Receiver<bool>>,
    ) -> LoopOutcome {
        let gate = ExecutionGate::new(&self.registry, &self.hooks, self.render.as_ref(), self.gate);
        let mut controller = IterationController::new(
            self.client.as_ref(),
            self.options.clone(),
            &gate,
            store,
            self.render.as_ref(),
            self.system_prompt.clone(),
        );
        if let Some(cancel) = cancel {
            controller = controller.with_cancel(cancel);
        }
        let outcome = controller.run(prompt, settings, prompter).await;
        self.log.record(
            prompt,
            &format!("loop {} ended {} after {} iteration(s)", outcome.id, outcome.status.as_str(), outcome.iterations),
            None,
        );
        outcome
    }

    /// Interactive session. Ends on `/exit` or end of input.
    pub async fn repl(&mut self, lines: &mut dyn Iterator<Item = String>, prompter: &mut dyn Prompter) {
        self.render.header(&self.options.model);
        loop {
            self.render.prompt();
            let Some(line) = lines.next() else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(action) = parse_slash_command(line) {
                if action == SlashCommandAction::Exit {
                    break;
                }
                self.run_command(action);
                continue;
            }
            if let Err(err) = self.ask(line, prompter).await {
                tracing::debug!(error = %err, "query failed");
            }
        }
    }

    fn run_command(&mut self, action: SlashCommandAction) {
        match action {
            SlashCommandAction::Clear => match self.history.clear() {
                Ok(()) => self.render.activity("history cleared"),
                Err(err) => self.render.error(&format!("could not clear history: {err}")),
            },
            SlashCommandAction::History => {
                self.render.field("messages", &self.history.len().to_string());
                self.render
                    .field("file", &self.history.path().display().to_string());
            }
            SlashCommandAction::Cache => match self.client.cache_stats() {
                Some(stats) => {
                    self.render
                        .field("entries", &format!("{}/{}", stats.size, stats.capacity));
                    self.render.field("hits", &stats.hits.to_string());
                    self.render.field("misses", &stats.misses.to_string());
                    self.render.field("evictions", &stats.evictions.to_string());
                    self.render
                        .field("hit rate", &format!("{:.0}%", stats.hit_rate() * 100.0));
                }
                None => self.render.activity("response cache is disabled"),
            },
            SlashCommandAction::Help => {
                for cmd in SLASH_COMMANDS {
                    self.render.field(cmd.name, cmd.description);
                }
            }
            SlashCommandAction::Exit => {}
            SlashCommandAction::Unknown(name) => {
                self.render.warn(&format!("unknown command {name} (try /help)"));
            }
        }
    }

    async fn fetch(&self, messages: &[Message]) -> Result<String, ApiError> {
        if !self.stream {
            let reply = self.client.send(messages, &self.options).await?;
            self.render.assistant_message(&reply);
            return Ok(reply);
        }
        let stream = self.client.send_streaming(messages, &self.options).await?;
        let render = Arc::clone(&self.render);
        let result = stream.collect_with(|chunk| render.assistant_delta(chunk)).await;
        self.render.assistant_done();
        result
    }

    /// Append to history; a failed write keeps the message in memory.
    fn remember(&mut self, message: Message) {
        if let Err(err) = self.history.append(message) {
            tracing::warn!(error = %err, "could not persist history");
            self.render.warn(&format!("history not saved: {err}"));
        }
    }
}
