//! Eleven: a terminal agent that turns natural-language requests into
//! reviewed shell commands.
//!
//! A query goes to an OpenAI-compatible chat API through a cached,
//! deduplicated, retrying client. Tool calls embedded in the reply are
//! extracted, risk-classified and run through an execution gate that asks
//! for confirmation, consults hooks and reports results back into the
//! conversation. History and loop state persist under `~/.eleven/`.
//!
//! # Quick start
//!
//! ```no_run
//! use eleven::agent::Agent;
//! use eleven::api::ApiClient;
//! use eleven::config::load_config;
//! use eleven::gate::{GateOptions, TerminalPrompter};
//! use eleven::render::Renderer;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?;
//! let client = Arc::new(ApiClient::new(&config.api, &config.cache));
//! let mut agent = Agent::from_config(
//!     &config,
//!     client,
//!     Arc::new(Renderer::new(true)),
//!     GateOptions::default(),
//!     true,
//!     std::env::current_dir()?,
//! );
//! let turn = agent.ask("list files", &mut TerminalPrompter).await?;
//! println!("{}", turn.reply);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod build_info;
pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod gate;
pub mod history;
pub mod hooks;
pub mod interaction_log;
pub mod loop_mode;
pub mod offline;
pub mod prompt;
pub mod render;
pub mod risk;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod tools;
pub mod types;
