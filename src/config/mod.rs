//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`ELEVEN_API_KEY`, `ELEVEN_BASE_URL`,
//!    `ELEVEN_MODEL`, `ELEVEN_HOME`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./eleven.toml in the current directory
//! 4. $XDG_CONFIG_HOME/eleven/eleven.toml (or the platform config dir)
//! 5. Built-in defaults

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

mod defaults;
mod types;

use defaults::{CONFIG_FILE_NAME, DATA_DIR_NAME};
pub use types::{
    ApiConfig, CacheConfig, Config, DisplayConfig, HistoryConfig, HooksConfig, LoggingConfig,
    LoopConfig, PluginSpec, ToolsConfig,
};
use types::FileConfig;

/// Where the effective config text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local,
    Global(PathBuf),
    BuiltInDefaults,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
    .map(|(config, source)| {
        tracing::debug!(?source, "configuration loaded");
        config
    })
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<(Config, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (text, source) = read_config_text(path_override, &read_file, &config_root)?;
    let parsed: FileConfig = toml::from_str(&text)?;
    let mut config = resolve_file_config(parsed, &env_lookup);
    apply_env_overrides(&mut config, &env_lookup);
    validate(&config)?;
    Ok((config, source))
}

fn read_config_text<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<(String, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(p) = path_override {
        let path = PathBuf::from(p);
        // An explicit path that cannot be read is an error, not a fallthrough.
        let text = read_file(&path)?;
        return Ok((text, ConfigSource::Explicit(path)));
    }
    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok((text, ConfigSource::Local));
    }
    if let Some(dir) = config_root() {
        let global = dir.join("eleven").join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            return Ok((text, ConfigSource::Global(global)));
        }
    }
    Ok((String::new(), ConfigSource::BuiltInDefaults))
}

fn resolve_file_config<FEnv>(parsed: FileConfig, env_lookup: &FEnv) -> Config
where
    FEnv: Fn(&str) -> Option<String>,
{
    let mut api = parsed.api;
    if api.api_key.trim().is_empty() {
        if let Some(name) = normalized_option(&api.api_key_env) {
            api.api_key = env_lookup(&name).unwrap_or_default();
        }
    }
    api.api_key = api.api_key.trim().to_string();
    api.base_url = api.base_url.trim().trim_end_matches('/').to_string();

    let data_dir = normalized_option(&parsed.data_dir)
        .map(|dir| expand_home(&dir))
        .unwrap_or_else(default_data_dir);

    Config {
        api,
        cache: parsed.cache,
        history: parsed.history,
        tools: parsed.tools,
        hooks: parsed.hooks,
        loop_mode: parsed.loop_mode,
        display: parsed.display,
        logging: parsed.logging,
        data_dir,
    }
}

fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: &FEnv)
where
    FEnv: Fn(&str) -> Option<String>,
{
    let lookup = |name: &str| env_lookup(name).and_then(|v| normalized_string(&v));
    if let Some(key) = lookup("ELEVEN_API_KEY") {
        config.api.api_key = key;
    }
    if let Some(url) = lookup("ELEVEN_BASE_URL") {
        config.api.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = lookup("ELEVEN_MODEL") {
        config.api.model = model;
    }
    if let Some(home) = lookup("ELEVEN_HOME") {
        config.data_dir = expand_home(&home);
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.is_empty() {
        return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
    }
    if config.history.message_limit == 0 {
        return Err(ConfigError::Invalid(
            "history.message_limit must be at least 1".into(),
        ));
    }
    if config.history.keep_recent >= config.history.compact_threshold {
        return Err(ConfigError::Invalid(format!(
            "history.keep_recent ({}) must be below history.compact_threshold ({})",
            config.history.keep_recent, config.history.compact_threshold
        )));
    }
    if config.tools.timeout_secs == 0 || config.hooks.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "tools.timeout_secs and hooks.timeout_secs must be positive".into(),
        ));
    }
    if config.cache.enabled && config.cache.max_entries == 0 {
        return Err(ConfigError::Invalid(
            "cache.max_entries must be at least 1 when the cache is enabled".into(),
        ));
    }
    for plugin in &config.tools.plugins {
        if plugin.name.trim().is_empty() || plugin.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "every [[tools.plugins]] entry needs a name and a command".into(),
            ));
        }
    }
    Ok(())
}

/// Fail with an actionable message when no API key is configured.
pub fn require_api_key(config: &Config) -> Result<&str, ConfigError> {
    if config.api.has_api_key() {
        Ok(config.api.api_key.as_str())
    } else {
        Err(ConfigError::MissingApiKey)
    }
}

fn normalized_option(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(normalized_string)
}

fn normalized_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

/// `~/.eleven`, or `./.eleven` when no home directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

pub fn config_root_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|path| path.is_absolute())
        .or_else(dirs::config_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_are_sensible() {
        let c = Config::default();
        assert_eq!(c.api.base_url, "https://api.x.ai/v1");
        assert_eq!(c.api.max_retries, 3);
        assert_eq!(c.cache.max_entries, 100);
        assert_eq!(c.cache.ttl_secs, 300);
        assert_eq!(c.history.message_limit, 40);
        assert_eq!(c.history.compact_threshold, 20);
        assert_eq!(c.loop_mode.max_iterations, 20);
        assert_eq!(c.loop_mode.context_iterations, 5);
        assert!(c.display.color);
        assert!(c.logging.interactions);
        assert!(!c.api.has_api_key());
    }

    #[test]
    fn parse_partial_toml() {
        let toml = r#"
            data_dir = "/tmp/eleven-test"

            [api]
            model = "grok-4"
            max_retries = 5

            [loop]
            max_iterations = 3

            [[tools.plugins]]
            name = "weather"
            command = "/usr/local/bin/weather"
        "#;
        let (c, source) = load_with(None, files(&[("eleven.toml", toml)]), env(&[]), None).unwrap();
        assert_eq!(source, ConfigSource::Local);
        assert_eq!(c.api.model, "grok-4");
        assert_eq!(c.api.max_retries, 5);
        assert_eq!(c.api.base_url, "https://api.x.ai/v1");
        assert_eq!(c.loop_mode.max_iterations, 3);
        assert_eq!(c.data_dir, PathBuf::from("/tmp/eleven-test"));
        assert_eq!(c.tools.plugins.len(), 1);
        assert!(c.tools.plugins[0].args.is_empty());
        assert_eq!(c.hooks_dir(), PathBuf::from("/tmp/eleven-test/hooks"));
    }

    #[test]
    fn parse_empty_string_uses_defaults() {
        let (c, source) = load_with(None, files(&[]), env(&[]), None).unwrap();
        assert_eq!(source, ConfigSource::BuiltInDefaults);
        assert_eq!(c.api.model, "grok-code-fast-1");
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load_with(Some("missing.toml"), files(&[]), env(&[]), None).unwrap_err();
        assert!(err.to_string().starts_with("io:"), "got: {err}");
    }

    #[test]
    fn local_file_wins_over_global() {
        let root = PathBuf::from("/cfg");
        let (c, source) = load_with(
            None,
            files(&[
                ("eleven.toml", "[api]\nmodel = \"local\"\n"),
                ("/cfg/eleven/eleven.toml", "[api]\nmodel = \"global\"\n"),
            ]),
            env(&[]),
            Some(root),
        )
        .unwrap();
        assert_eq!(source, ConfigSource::Local);
        assert_eq!(c.api.model, "local");
    }

    #[test]
    fn global_file_is_used_without_local() {
        let (c, source) = load_with(
            None,
            files(&[("/cfg/eleven/eleven.toml", "[api]\nmodel = \"global\"\n")]),
            env(&[]),
            Some(PathBuf::from("/cfg")),
        )
        .unwrap();
        assert_eq!(
            source,
            ConfigSource::Global(PathBuf::from("/cfg/eleven/eleven.toml"))
        );
        assert_eq!(c.api.model, "global");
    }

    #[test]
    fn env_overrides_beat_file_values() {
        let (c, _) = load_with(
            None,
            files(&[("eleven.toml", "[api]\nmodel = \"file\"\napi_key = \"file-key\"\n")]),
            env(&[
                ("ELEVEN_API_KEY", "env-key"),
                ("ELEVEN_MODEL", "env-model"),
                ("ELEVEN_BASE_URL", "http://localhost:9000/v1/"),
                ("ELEVEN_HOME", "/var/tmp/eleven"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(c.api.api_key, "env-key");
        assert_eq!(c.api.model, "env-model");
        assert_eq!(c.api.base_url, "http://localhost:9000/v1");
        assert_eq!(c.data_dir, PathBuf::from("/var/tmp/eleven"));
    }

    #[test]
    fn api_key_env_indirection_is_resolved() {
        let (c, _) = load_with(
            None,
            files(&[("eleven.toml", "[api]\napi_key_env = \"XAI_API_KEY\"\n")]),
            env(&[("XAI_API_KEY", " xai-123 ")]),
            None,
        )
        .unwrap();
        assert_eq!(require_api_key(&c).unwrap(), "xai-123");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let c = Config::default();
        assert!(matches!(
            require_api_key(&c),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn keep_recent_must_stay_below_threshold() {
        let err = load_with(
            None,
            files(&[(
                "eleven.toml",
                "[history]\ncompact_threshold = 4\nkeep_recent = 4\n",
            )]),
            env(&[]),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("keep_recent"), "got: {err}");
    }

    #[test]
    fn plugin_without_command_is_rejected() {
        let err = load_with(
            None,
            files(&[(
                "eleven.toml",
                "[[tools.plugins]]\nname = \"x\"\ncommand = \" \"\n",
            )]),
            env(&[]),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("tools.plugins"), "got: {err}");
    }

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn env(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        files(entries)
    }

    fn load_with(
        path_override: Option<&str>,
        files: BTreeMap<String, String>,
        env: BTreeMap<String, String>,
        config_root: Option<PathBuf>,
    ) -> Result<(Config, ConfigSource), ConfigError> {
        load_config_from_sources(
            path_override,
            move |path| {
                let key = path.to_string_lossy().into_owned();
                files
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, key))
            },
            move |name| env.get(name).cloned(),
            move || config_root.clone(),
        )
    }
}
