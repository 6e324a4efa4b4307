//! Execution gate: the per-call state machine between a proposed tool call
//! and its recorded outcome.
//!
//! ```text
//! PROPOSED -> PRE_HOOK -> { CONFIRMED | DENIED | EDITED } -> EXECUTING
//!          -> { SUCCEEDED | FAILED } -> POST_HOOK -> RECORDED
//! ```
//!
//! `EDITED` loops back to `PROPOSED` with the replacement text, which is
//! re-sanitized and re-classified. A DANGEROUS call without the override
//! flag ends in `DENIED` before any prompt is shown.

use crate::extract::ToolCall;
use crate::hooks::HookRunner;
use crate::render::RenderSink;
use crate::risk::{self, CommandRisk};
use crate::tools::{BuiltinTool, ExecOutput, ResolvedTool, ToolRegistry};
use crate::types::Message;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Edits accepted for one call before the gate gives up.
pub const DEFAULT_MAX_EDITS: usize = 3;

/// Exit code recorded when the call never ran.
const NOT_RUN_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Proposed,
    PreHook,
    Confirmed,
    Denied,
    Edited,
    Executing,
    Succeeded,
    Failed,
    PostHook,
    Recorded,
}

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    /// Replace the call's primary parameter with this text.
    Edit(String),
}

/// What the user is asked to confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub tool: String,
    pub preview: String,
    pub risk: CommandRisk,
    pub reason: Option<&'static str>,
    pub cwd: String,
}

/// Source of confirmation decisions.
pub trait Prompter: Send {
    fn decide(&mut self, proposal: &Proposal) -> Decision;
}

/// Reads `y` / `n` / `e` answers from stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn decide(&mut self, proposal: &Proposal) -> Decision {
        let Some(answer) = Self::read_line("  Execute? [y/N/e(dit)] ") else {
            return Decision::Reject;
        };
        match answer.to_ascii_lowercase().as_str() {
            "y" | "yes" => Decision::Approve,
            "e" | "edit" => {
                let prompt = format!("  Replace `{}` with: ", proposal.preview);
                match Self::read_line(&prompt) {
                    Some(text) if !text.is_empty() => Decision::Edit(text),
                    _ => Decision::Reject,
                }
            }
            _ => Decision::Reject,
        }
    }
}

/// Replays a fixed list of decisions, rejecting once it runs out.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    decisions: VecDeque<Decision>,
    seen: Vec<Proposal>,
}

impl ScriptedPrompter {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            seen: Vec::new(),
        }
    }

    /// Proposals shown so far, in order.
    pub fn seen(&self) -> &[Proposal] {
        &self.seen
    }
}

impl Prompter for ScriptedPrompter {
    fn decide(&mut self, proposal: &Proposal) -> Decision {
        self.seen.push(proposal.clone());
        self.decisions.pop_front().unwrap_or(Decision::Reject)
    }
}

/// Caller-supplied gate settings.
#[derive(Debug, Clone, Copy)]
pub struct GateOptions {
    /// Override flag: skips confirmation and admits DANGEROUS calls.
    pub force: bool,
    pub max_edits: usize,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_edits: DEFAULT_MAX_EDITS,
        }
    }
}

/// Terminal status of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Succeeded,
    Failed,
    Denied,
}

/// Everything the gate learned about one call.
#[derive(Debug, Clone)]
pub struct GateReport {
    /// The call as finally executed or denied (after edits).
    pub call: ToolCall,
    pub risk: CommandRisk,
    pub status: GateStatus,
    pub outcome: ExecOutput,
    pub trace: Vec<GateState>,
}

impl GateReport {
    pub fn reached(&self, state: GateState) -> bool {
        self.trace.contains(&state)
    }

    /// The `(exit_code, stdout, stderr)` triple as a conversation message.
    pub fn to_message(&self) -> Message {
        Message::user(self.outcome.to_message(&self.call.name))
    }
}

/// Drives calls through the state machine.
pub struct ExecutionGate<'a> {
    registry: &'a ToolRegistry,
    hooks: &'a HookRunner,
    render: &'a dyn RenderSink,
    options: GateOptions,
}

impl<'a> ExecutionGate<'a> {
    pub fn new(
        registry: &'a ToolRegistry,
        hooks: &'a HookRunner,
        render: &'a dyn RenderSink,
        options: GateOptions,
    ) -> Self {
        Self {
            registry,
            hooks,
            render,
            options,
        }
    }

    pub async fn process(&self, call: ToolCall, prompter: &mut dyn Prompter) -> GateReport {
        let mut call = call;
        let mut trace = Vec::new();
        let mut edits = 0usize;

        let risk = loop {
            trace.push(GateState::Proposed);

            let Some(resolved) = self.registry.resolve(&call.name) else {
                let message = format!("Unknown tool: {}", call.name);
                tracing::warn!(tool = %call.name, "model requested an unknown tool");
                return self.finish(call, CommandRisk::Safe, GateStatus::Failed, not_run(message), trace);
            };

            if matches!(resolved, ResolvedTool::Builtin(BuiltinTool::Bash)) {
                let raw = call.param("command").unwrap_or_default();
                match risk::sanitize_command(raw) {
                    Ok(clean) => call.set_param("command", clean),
                    Err(err) => {
                        let risk = risk::classify(raw);
                        let message = format!("Command refused: {err}");
                        return self.deny(call, risk, message, trace);
                    }
                }
            }

            let (risk, reason) = match call.param("command") {
                Some(command) if matches!(resolved, ResolvedTool::Builtin(BuiltinTool::Bash)) => {
                    let assessment = risk::assess(command);
                    (assessment.risk, assessment.reason)
                }
                _ => (self.registry.risk_of(&call), None),
            };
            let proposal = Proposal {
                tool: resolved.name().to_string(),
                preview: self.registry.describe(&call),
                risk,
                reason,
                cwd: self.registry.context().cwd.display().to_string(),
            };
            self.render
                .proposal(&proposal.tool, &proposal.preview, risk, &proposal.cwd);

            trace.push(GateState::PreHook);
            let verdict = self.hooks.pre_tool_use(&call).await;
            if !verdict.allow {
                let message = format!("Pre-hook failed: {}", verdict.message);
                return self.deny(call, risk, message, trace);
            }

            if risk == CommandRisk::Dangerous && !self.options.force {
                let why = reason.map(|r| format!(" ({r})")).unwrap_or_default();
                let message = format!(
                    "DANGEROUS command blocked{why}: requires --force flag to execute"
                );
                return self.deny(call, risk, message, trace);
            }

            if self.options.force {
                tracing::info!(tool = %proposal.tool, risk = %risk, "override flag set; executing without confirmation");
                trace.push(GateState::Confirmed);
                break risk;
            }

            match prompter.decide(&proposal) {
                Decision::Approve => {
                    trace.push(GateState::Confirmed);
                    break risk;
                }
                Decision::Reject => {
                    return self.deny(call, risk, "Cancelled by user".into(), trace);
                }
                Decision::Edit(text) => {
                    trace.push(GateState::Edited);
                    edits += 1;
                    if edits > self.options.max_edits {
                        let message = format!("Too many edits (limit {})", self.options.max_edits);
                        return self.deny(call, risk, message, trace);
                    }
                    let key = primary_param(resolved);
                    tracing::debug!(tool = %call.name, key, "call edited before execution");
                    call.set_param(key, text);
                }
            }
        };

        trace.push(GateState::Executing);
        let (status, outcome) = match self.registry.execute(&call).await {
            Ok(outcome) if outcome.success() => (GateStatus::Succeeded, outcome),
            Ok(outcome) => (GateStatus::Failed, outcome),
            Err(err) => (GateStatus::Failed, not_run(err.to_string())),
        };
        trace.push(match status {
            GateStatus::Succeeded => GateState::Succeeded,
            _ => GateState::Failed,
        });
        self.render.tool_result(&call.name, &outcome);

        trace.push(GateState::PostHook);
        // Advisory only; the runner logs failures itself.
        let _ = self.hooks.post_tool_use(&call, &outcome).await;

        self.finish(call, risk, status, outcome, trace)
    }

    fn deny(
        &self,
        call: ToolCall,
        risk: CommandRisk,
        message: String,
        mut trace: Vec<GateState>,
    ) -> GateReport {
        tracing::info!(tool = %call.name, risk = %risk, reason = %message, "tool call denied");
        self.render.warn(&message);
        trace.push(GateState::Denied);
        self.finish(call, risk, GateStatus::Denied, not_run(message), trace)
    }

    fn finish(
        &self,
        call: ToolCall,
        risk: CommandRisk,
        status: GateStatus,
        outcome: ExecOutput,
        mut trace: Vec<GateState>,
    ) -> GateReport {
        trace.push(GateState::Recorded);
        GateReport {
            call,
            risk,
            status,
            outcome,
            trace,
        }
    }
}

fn not_run(message: String) -> ExecOutput {
    ExecOutput {
        exit_code: NOT_RUN_EXIT_CODE,
        stdout: String::new(),
        stderr: message,
    }
}

/// Parameter an edit replaces.
fn primary_param(tool: ResolvedTool<'_>) -> &'static str {
    match tool {
        ResolvedTool::Builtin(builtin) => builtin.params().first().copied().unwrap_or("command"),
        ResolvedTool::Plugin(_) => "input",
    }
}
