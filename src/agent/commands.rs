//! REPL session commands.

/// One session command with its help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashCommand {
    pub name: &'static str,
    pub description: &'static str,
}

pub const SLASH_COMMANDS: [SlashCommand; 5] = [
    SlashCommand {
        name: "/clear",
        description: "Drop the conversation history.",
    },
    SlashCommand {
        name: "/history",
        description: "Show how many messages are stored.",
    },
    SlashCommand {
        name: "/cache",
        description: "Show response cache statistics.",
    },
    SlashCommand {
        name: "/help",
        description: "List session commands.",
    },
    SlashCommand {
        name: "/exit",
        description: "Leave interactive mode (also /quit, /q).",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommandAction {
    Clear,
    History,
    Cache,
    Help,
    Exit,
    Unknown(String),
}

/// `None` when the input is a query rather than a command.
pub fn parse_slash_command(input: &str) -> Option<SlashCommandAction> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let token = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    Some(match token.as_str() {
        "/clear" => SlashCommandAction::Clear,
        "/history" => SlashCommandAction::History,
        "/cache" => SlashCommandAction::Cache,
        "/" | "/help" => SlashCommandAction::Help,
        "/exit" | "/quit" | "/q" => SlashCommandAction::Exit,
        other => SlashCommandAction::Unknown(other.to_string()),
    })
}
