//! Keyword-based command suggestions for when the API cannot be reached.

/// Keyword to suggestion, checked in order.
const KEYWORD_COMMANDS: &[(&str, &str)] = &[
    ("list", "ls -la"),
    ("files", "ls -la"),
    ("directory", "ls -la"),
    ("find", "find . -name"),
    ("search", "grep -r"),
    ("grep", "grep -r"),
    ("process", "ps aux"),
    ("disk", "df -h"),
    ("space", "du -sh *"),
    ("network", "ifconfig"),
    ("git", "git status"),
    ("status", "git status"),
    ("permission", "ls -la"),
    ("error", "Check logs or man pages"),
];

const MAX_SUGGESTIONS: usize = 3;

pub const OFFLINE_HEADER: &str = "Offline - Unable to connect to API.";

/// Up to three distinct suggestions for `query`.
pub fn suggest(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for (keyword, command) in KEYWORD_COMMANDS {
        if out.len() >= MAX_SUGGESTIONS {
            break;
        }
        if lowered.contains(keyword) && !out.iter().any(|s| s == command) {
            out.push((*command).to_string());
        }
    }
    if out.is_empty() {
        match lowered.split_whitespace().next() {
            Some(word) => {
                out.push(format!("man {word}"));
                out.push(format!("{word} --help"));
            }
            None => {
                out.push("man <command>".into());
                out.push("<command> --help".into());
            }
        }
    }
    out
}

/// Full offline notice printed in place of a model reply.
pub fn render(query: &str) -> String {
    let lines = suggest(query)
        .iter()
        .map(|s| format!("  • Try: {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{OFFLINE_HEADER}\n\nLocal suggestions:\n{lines}\n\nFor more help, try:\n  • man <command>\n  • <command> --help\n  • Check connection and try again"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_distinct_commands() {
        assert_eq!(suggest("List all FILES in this directory"), vec!["ls -la"]);
        assert_eq!(suggest("show disk space"), vec!["df -h", "du -sh *"]);
    }

    #[test]
    fn at_most_three_suggestions() {
        let out = suggest("find and search the process list for git status");
        assert_eq!(out, vec!["ls -la", "find . -name", "grep -r"]);
    }

    #[test]
    fn unknown_query_falls_back_to_man_and_help() {
        assert_eq!(suggest("Tar the backups"), vec!["man tar", "tar --help"]);
        assert_eq!(suggest("   "), vec!["man <command>", "<command> --help"]);
    }

    #[test]
    fn render_starts_with_offline_header() {
        let text = render("check network");
        assert!(text.starts_with(OFFLINE_HEADER));
        assert!(text.contains("  • Try: ifconfig"));
    }
}
