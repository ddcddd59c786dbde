//! Minimal daemon entry point: loads an admin configuration, builds an
//! `Engine` wired to the in-memory recording test doubles (a real kernel
//! mroute socket and a real upstream send path are out of scope here),
//! and prints a diagnostic dump. Exercises the `config` → `engine`
//! wiring end to end without reintroducing a unicast test client.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::process::ExitCode;

use mroute_core::config::{AdminConfig, RawConfig};
use mroute_core::engine::Engine;
use mroute_core::error::Error;
use mroute_core::phy::recording::{RecordingMrouteSocket, RecordingUpstreamSender, StaticQuerierView};
use mroute_core::timer::WheelScheduler;
use mroute_core::wire::InterfaceId;

fn usage() -> &'static str {
    "usage: mroute-coreD --config <path.toml>"
}

/// Resolves interface names to indices. Interfaces named `if<N>` resolve
/// directly to `N`; any other name is looked up in `/sys/class/net/<name>/ifindex`,
/// the same source `if_nametoindex(3)` reads on Linux.
fn resolve_interface(name: &str) -> Option<InterfaceId> {
    if let Some(digits) = name.strip_prefix("if") {
        if let Ok(index) = digits.parse::<u32>() {
            return InterfaceId::new(index);
        }
    }
    let path = format!("/sys/class/net/{}/ifindex", name);
    let contents = fs::read_to_string(path).ok()?;
    InterfaceId::new(contents.trim().parse().ok()?)
}

fn main() -> ExitCode {
    if env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let mut args = env::args().skip(1);
    let config_path = loop {
        match args.next() {
            Some(flag) if flag == "--config" => break args.next(),
            Some(_) => continue,
            None => break None,
        }
    };

    let Some(config_path) = config_path else {
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    };

    let text = match fs::read_to_string(&config_path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("reading {}: {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    let raw = match RawConfig::parse(&text) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{}", Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    let mut cache: BTreeMap<String, Option<InterfaceId>> = BTreeMap::new();
    let config = match AdminConfig::try_from_raw(raw, |name: &str| {
        *cache.entry(name.to_string()).or_insert_with(|| resolve_interface(name))
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new(config, RecordingMrouteSocket::new(), RecordingUpstreamSender::new(), StaticQuerierView::new(), WheelScheduler::new());

    print!("{}", engine.dump());
    ExitCode::SUCCESS
}
