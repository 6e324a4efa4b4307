//! CLI entry point for eleven.

mod cli;

use clap::Parser;
use eleven::agent::Agent;
use eleven::api::ApiClient;
use eleven::build_info::startup_metadata_line;
use eleven::config::{load_config, require_api_key, Config};
use eleven::data::{self, DataPaths, DELETE_CONFIRMATION};
use eleven::gate::{GateOptions, TerminalPrompter};
use eleven::loop_mode::store::LoopStore;
use eleven::loop_mode::LoopSettings;
use eleven::offline;
use eleven::render::{RenderSink, Renderer};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    // Apply CLI overrides.
    if let Some(model) = &args.model {
        config.api.model = model.clone();
    }
    if args.no_color {
        config.display.color = false;
    }

    let renderer = Renderer::new(config.display.color);

    if args.offline {
        let query = args.query.as_deref().unwrap_or_default();
        renderer.assistant_message(&offline::render(query));
        return;
    }

    if let Some(id) = &args.cancel_loop {
        std::process::exit(cancel_loop(&renderer, &config, id));
    }
    if let Some(dest) = &args.export_data {
        std::process::exit(export_data(&renderer, &config, Path::new(dest)));
    }
    if args.delete_data {
        std::process::exit(delete_data(&renderer, &config, args.force));
    }

    if let Err(e) = require_api_key(&config) {
        renderer.error(&e.to_string());
        std::process::exit(1);
    }

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            renderer.error(&format!("cannot determine working directory: {e}"));
            std::process::exit(1);
        }
    };

    let client = Arc::new(ApiClient::new(&config.api, &config.cache));
    let render: Arc<dyn RenderSink> = Arc::new(renderer);
    let gate = GateOptions {
        force: args.force,
        ..GateOptions::default()
    };
    let mut agent = Agent::from_config(&config, client, render.clone(), gate, !args.no_log, cwd);
    let mut prompter = TerminalPrompter;

    match (&args.query, &args.loop_marker) {
        (Some(query), Some(marker)) => {
            let settings = match LoopSettings::from_config(marker, args.max_iterations, &config.loop_mode) {
                Ok(settings) => settings,
                Err(e) => {
                    render.error(&e.to_string());
                    std::process::exit(1);
                }
            };
            let store = LoopStore::new(config.loops_dir(), lock_timeout(&config));
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });
            let outcome = agent
                .run_loop(query, &settings, &store, &mut prompter, Some(cancel_rx))
                .await;
            render.field("loop", &outcome.id);
            render.field("status", outcome.status.as_str());
            render.field("iterations", &outcome.iterations.to_string());
            if let Some(path) = &outcome.archived {
                render.field("state", &path.display().to_string());
            }
        }
        (Some(query), None) => {
            if agent.ask(query, &mut prompter).await.is_err() {
                std::process::exit(1);
            }
        }
        (None, _) => {
            render.activity(&startup_metadata_line());
            let mut lines = std::iter::from_fn(read_stdin_line);
            agent.repl(&mut lines, &mut prompter).await;
        }
    }
}

/// `ELEVEN_LOG`, then `RUST_LOG`, then the configured level. Logs go to
/// stderr so they never mix with command output.
fn init_tracing(config: &Config) {
    let filter = std::env::var("ELEVEN_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .or_else(|| EnvFilter::try_new(&config.logging.level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn lock_timeout(config: &Config) -> Duration {
    Duration::from_millis(config.history.lock_timeout_ms)
}

/// One line from stdin without holding the lock between reads, so the
/// confirmation prompter can read in between.
fn read_stdin_line() -> Option<String> {
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn cancel_loop(renderer: &Renderer, config: &Config, id: &str) -> i32 {
    let store = LoopStore::new(config.loops_dir(), lock_timeout(config));
    match store.request_cancel(id) {
        Ok(true) => {
            renderer.activity(&format!("cancellation requested for {id}"));
            0
        }
        Ok(false) => {
            renderer.error(&format!("no running loop with id {id}"));
            1
        }
        Err(e) => {
            renderer.error(&format!("could not cancel {id}: {e}"));
            1
        }
    }
}

fn export_data(renderer: &Renderer, config: &Config, dest: &Path) -> i32 {
    match data::export(&DataPaths::from_config(config), dest, lock_timeout(config)) {
        Ok(summary) => {
            renderer.activity(&format!("exported to {}", dest.display()));
            renderer.field("messages", &summary.messages.to_string());
            renderer.field("loops", &summary.loops.to_string());
            renderer.field("interactions", &summary.interactions.to_string());
            0
        }
        Err(e) => {
            renderer.error(&format!("export failed: {e}"));
            1
        }
    }
}

fn delete_data(renderer: &Renderer, config: &Config, force: bool) -> i32 {
    if !force {
        eprint!("This removes all history, loop states and logs. Type {DELETE_CONFIRMATION} to confirm: ");
        let _ = io::stderr().flush();
        if !data::confirm_delete(&mut io::stdin().lock()) {
            renderer.warn("nothing deleted");
            return 0;
        }
    }
    match data::delete(&DataPaths::from_config(config)) {
        Ok(removed) if removed.is_empty() => {
            renderer.activity("no stored data found");
            0
        }
        Ok(removed) => {
            for path in removed {
                renderer.field("removed", &path.display().to_string());
            }
            0
        }
        Err(e) => {
            renderer.error(&format!("delete failed: {e}"));
            1
        }
    }
}
