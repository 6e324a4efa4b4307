//! Terminal rendering.
//!
//! `RenderSink` is the UI contract consumed by the agent, the gate and the
//! loop controller. `Renderer` is the crossterm-backed terminal
//! implementation; `Quiet` discards everything for library and test use.
//! Assistant text goes to stdout, status lines to stderr.

use crate::risk::CommandRisk;
use crate::tools::ExecOutput;
use crate::textutil::one_line_preview;
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

const INDENT: &str = "  ";

/// Injectable rendering interface used by orchestration code.
pub trait RenderSink: Send + Sync {
    /// Interactive prompt chrome.
    fn prompt(&self);
    /// Session header with the active model.
    fn header(&self, model: &str);
    /// One streamed fragment of assistant text.
    fn assistant_delta(&self, chunk: &str);
    /// End of a streamed reply.
    fn assistant_done(&self);
    /// A complete, non-streamed assistant reply.
    fn assistant_message(&self, content: &str);
    /// A tool call awaiting a decision.
    fn proposal(&self, tool: &str, preview: &str, risk: CommandRisk, cwd: &str);
    /// Outcome of an executed tool call.
    fn tool_result(&self, tool: &str, outcome: &ExecOutput);
    fn activity(&self, text: &str);
    fn field(&self, key: &str, value: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Crossterm terminal renderer.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn risk_color(risk: CommandRisk) -> Color {
        match risk {
            CommandRisk::Safe => Color::Green,
            CommandRisk::Caution => Color::Yellow,
            CommandRisk::Dangerous => Color::Red,
        }
    }

    fn status(&self, label: &str, color: Color, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", label.with(color).bold());
        } else {
            eprintln!("{label} {msg}");
        }
    }
}

impl RenderSink for Renderer {
    fn prompt(&self) {
        if self.color {
            eprint!("{} ", "eleven>".with(Color::Cyan).bold());
        } else {
            eprint!("eleven> ");
        }
        let _ = io::stderr().flush();
    }

    fn header(&self, model: &str) {
        if self.color {
            eprintln!("{} {}", "eleven".with(Color::Cyan).bold(), model.with(Color::DarkGrey));
        } else {
            eprintln!("eleven ({model})");
        }
    }

    fn assistant_delta(&self, chunk: &str) {
        let mut out = io::stdout();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }

    fn assistant_done(&self) {
        println!();
    }

    fn assistant_message(&self, content: &str) {
        println!("{}", content.trim_end());
    }

    fn proposal(&self, tool: &str, preview: &str, risk: CommandRisk, cwd: &str) {
        let label = format!("[{}]", risk.label());
        if self.color {
            eprintln!(
                "{INDENT}{} {} {}",
                label.with(Self::risk_color(risk)).bold(),
                tool.bold(),
                preview.with(Color::White)
            );
            eprintln!("{INDENT}{}", format!("in {cwd}").with(Color::DarkGrey));
        } else {
            eprintln!("{INDENT}{label} {tool} {preview}");
            eprintln!("{INDENT}in {cwd}");
        }
    }

    fn tool_result(&self, tool: &str, outcome: &ExecOutput) {
        let (glyph, color) = if outcome.success() {
            ("✓", Color::Green)
        } else {
            ("✗", Color::Red)
        };
        let summary = format!("{tool} exited with {}", outcome.exit_code);
        if self.color {
            eprintln!("{INDENT}{} {}", glyph.with(color), summary.with(Color::DarkGrey));
        } else {
            eprintln!("{INDENT}{glyph} {summary}");
        }
        if !outcome.stdout.trim().is_empty() {
            println!("{}", outcome.stdout.trim_end());
        }
        if !outcome.stderr.trim().is_empty() {
            let text = outcome.stderr.trim_end();
            if self.color {
                eprintln!("{}", text.with(Color::Red));
            } else {
                eprintln!("{text}");
            }
        }
    }

    fn activity(&self, text: &str) {
        if self.color {
            eprintln!("{} {}", "•".with(Color::Blue), text.with(Color::Grey).bold());
        } else {
            eprintln!("{text}");
        }
    }

    fn field(&self, key: &str, value: &str) {
        if self.color {
            eprintln!("{INDENT}{} {}", format!("{key}:").with(Color::DarkGrey), value);
        } else {
            eprintln!("{INDENT}{key}: {value}");
        }
    }

    fn warn(&self, msg: &str) {
        self.status("warning:", Color::Yellow, msg);
    }

    fn error(&self, msg: &str) {
        self.status("error:", Color::Red, &one_line_preview(msg, 400));
    }
}

/// Sink that renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quiet;

impl RenderSink for Quiet {
    fn prompt(&self) {}
    fn header(&self, _model: &str) {}
    fn assistant_delta(&self, _chunk: &str) {}
    fn assistant_done(&self) {}
    fn assistant_message(&self, _content: &str) {}
    fn proposal(&self, _tool: &str, _preview: &str, _risk: CommandRisk, _cwd: &str) {}
    fn tool_result(&self, _tool: &str, _outcome: &ExecOutput) {}
    fn activity(&self, _text: &str) {}
    fn field(&self, _key: &str, _value: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}
