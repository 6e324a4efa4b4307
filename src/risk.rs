//! Command risk classification and pre-execution sanitization.
//!
//! Classification is an ordered rule table of `(tier, pattern)` pairs matched
//! against the lowercased command. The highest matching tier wins.

use crate::error::ToolError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Longest command accepted for execution, in characters.
pub const MAX_COMMAND_CHARS: usize = 10_000;

/// Risk tier of a proposed command. Ordered so `max` picks the strictest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandRisk {
    Safe,
    Caution,
    Dangerous,
}

impl CommandRisk {
    pub fn label(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Dangerous => "DANGEROUS",
        }
    }
}

impl fmt::Display for CommandRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct RiskRule {
    tier: CommandRisk,
    reason: &'static str,
    pattern: Regex,
}

const RULE_TABLE: &[(CommandRisk, &str, &str)] = &[
    (CommandRisk::Dangerous, "recursive delete", r"\brm\s+-[a-z]*(?:rf|fr)[a-z]*\b"),
    (CommandRisk::Dangerous, "privilege escalation", r"\bsudo\s+"),
    (CommandRisk::Dangerous, "forced kill", r"\bkill\s+-9\b"),
    (CommandRisk::Dangerous, "filesystem creation", r"\bmkfs\b"),
    (CommandRisk::Dangerous, "raw disk copy", r"\bdd\s+if="),
    (CommandRisk::Dangerous, "world-writable permissions", r"\bchmod\s+(?:-[a-z]+\s+)*777\b"),
    (CommandRisk::Dangerous, "device file redirection", r">\s*/dev/"),
    (CommandRisk::Dangerous, "disk format", r"\bformat\b"),
    (CommandRisk::Dangerous, "partition editing", r"\bfdisk\b"),
    (CommandRisk::Dangerous, "forced delete", r"\bdel\s+/f\b"),
    (CommandRisk::Dangerous, "download piped to shell", r"\b(?:curl|wget)\s+.*\|\s*(?:ba|z)?sh\b"),
    (CommandRisk::Caution, "file removal", r"\brm\b"),
    (CommandRisk::Caution, "file move", r"\bmv\b"),
    (CommandRisk::Caution, "file copy", r"\bcp\b"),
    (CommandRisk::Caution, "output redirection", r">"),
    (CommandRisk::Caution, "tee write", r"\|\s*tee\b"),
    (CommandRisk::Caution, "permission change", r"\bchmod\b"),
    (CommandRisk::Caution, "ownership change", r"\bchown\b"),
];

static RULES: LazyLock<Vec<RiskRule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|&(tier, reason, source)| match Regex::new(source) {
            Ok(pattern) => Some(RiskRule {
                tier,
                reason,
                pattern,
            }),
            Err(err) => {
                tracing::error!(reason, error = %err, "invalid risk pattern");
                None
            }
        })
        .collect()
});

/// Tier plus the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub risk: CommandRisk,
    pub reason: Option<&'static str>,
}

/// Classify `command`. Total and side-effect free.
pub fn classify(command: &str) -> CommandRisk {
    assess(command).risk
}

/// Classify and report the first rule of the winning tier.
pub fn assess(command: &str) -> Assessment {
    let lowered = command.to_lowercase();
    let mut best = Assessment {
        risk: CommandRisk::Safe,
        reason: None,
    };
    for rule in RULES.iter() {
        if rule.tier > best.risk && rule.pattern.is_match(&lowered) {
            best = Assessment {
                risk: rule.tier,
                reason: Some(rule.reason),
            };
        }
    }
    best
}

static ROOT_TARGET: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[;&|(]\s*|\s)(?:sudo\s+)?(?:rm|chmod|chown|chgrp|shred)\b[^;&|]*\s(?:/\*?|--no-preserve-root)(?:\s|$|[;&|)])",
    )
    .ok()
});

/// Normalize a command for execution or refuse it outright.
///
/// Strips NUL and control characters (tab and newline survive), trims, and
/// rejects empty or oversized commands. Commands that operate on the
/// filesystem root are refused regardless of any override flag.
pub fn sanitize_command(raw: &str) -> Result<String, ToolError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ToolError::InvalidArguments("empty command".into()));
    }
    let length = cleaned.chars().count();
    if length > MAX_COMMAND_CHARS {
        return Err(ToolError::InvalidArguments(format!(
            "command too long ({length} chars, max {MAX_COMMAND_CHARS})"
        )));
    }
    if targets_filesystem_root(cleaned) {
        return Err(ToolError::InvalidArguments(
            "refusing to operate on the filesystem root".into(),
        ));
    }
    Ok(cleaned.to_string())
}

fn targets_filesystem_root(command: &str) -> bool {
    ROOT_TARGET
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(&command.to_lowercase()))
}
