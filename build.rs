//! Embeds commit, build time and target triple for `eleven --version`.
//!
//! Every value can be pinned from the environment for reproducible builds;
//! otherwise it is probed, and falls back to "unknown" when probing fails.

use std::env;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const PINNABLE: [&str; 3] = [
    "ELEVEN_BUILD_GIT_HASH",
    "ELEVEN_BUILD_TIMESTAMP",
    "ELEVEN_BUILD_TARGET",
];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    if let Some(reference) = head_reference() {
        println!("cargo:rerun-if-changed=.git/{reference}");
    }
    for name in PINNABLE {
        println!("cargo:rerun-if-env-changed={name}");
    }

    let commit = pinned("ELEVEN_BUILD_GIT_HASH").unwrap_or_else(|| {
        capture("git", &["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".into())
    });
    let built = pinned("ELEVEN_BUILD_TIMESTAMP").unwrap_or_else(utc_now);
    let target = pinned("ELEVEN_BUILD_TARGET")
        .or_else(|| env::var("TARGET").ok())
        .unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=ELEVEN_BUILD_GIT_HASH={commit}");
    println!("cargo:rustc-env=ELEVEN_BUILD_TIMESTAMP={built}");
    println!("cargo:rustc-env=ELEVEN_BUILD_TARGET={target}");
}

fn pinned(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn head_reference() -> Option<String> {
    let head = std::fs::read_to_string(".git/HEAD").ok()?;
    head.trim().strip_prefix("ref: ").map(str::to_string)
}

fn utc_now() -> String {
    capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]).unwrap_or_else(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        format!("unix:{secs}")
    })
}

fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
