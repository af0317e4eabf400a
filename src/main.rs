//! Drive simulated players against a poker server.
//!
//! Runs one or all of the built-in scenarios and exits non-zero if any of
//! them fails.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use pico_args::Arguments;
use std::time::Duration;
use tokio::sync::watch;

use pp_harness::{
    Harness, HarnessConfig, Scenario,
    config::{ConfigOverrides, endpoint_for_port},
    scenario::{BUILTIN_SCENARIOS, MAX_PLAYERS},
};

const HELP: &str = "\
Drive simulated players against a poker server

USAGE:
  pp_harness [OPTIONS]

OPTIONS:
  --server URL          Server WebSocket URL  [default: env HARNESS_ENDPOINT or ws://localhost:8888]
  --port N              Shorthand for --server ws://localhost:N
  --scenario NAME       connect, two-players, manual-actions, game-flow or all  [default: all]
  --players A,B,...     Player names for two-players and game-flow
  --observe-secs N      Observation window  [default: env HARNESS_OBSERVE_SECS or 30]
  --hands N             Stop observing after N hand results

FLAGS:
  -h, --help            Print help information

ENVIRONMENT:
  HARNESS_ENDPOINT, HARNESS_CONNECT_TIMEOUT_MS, HARNESS_RECEIVE_TIMEOUT_MS,
  HARNESS_STEP_TIMEOUT_MS, HARNESS_SETTLE_DELAY_MS, HARNESS_THINK_TIME_MS,
  HARNESS_SMALL_CALL_THRESHOLD, HARNESS_RAISE_ELIGIBLE_THRESHOLD,
  HARNESS_OBSERVE_SECS, HARNESS_HAND_TARGET, HARNESS_STARTING_CHIPS
  (a .env file in the working directory is loaded first)
";

struct Args {
    server: Option<String>,
    port: Option<u16>,
    scenario: String,
    players: Option<Vec<String>>,
    observe_secs: Option<u64>,
    hands: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        server: pargs.opt_value_from_str("--server")?,
        port: pargs.opt_value_from_str("--port")?,
        scenario: pargs
            .opt_value_from_str("--scenario")?
            .unwrap_or_else(|| "all".to_string()),
        players: pargs
            .opt_value_from_fn("--players", parse_players)?,
        observe_secs: pargs.opt_value_from_str("--observe-secs")?,
        hands: pargs.opt_value_from_str("--hands")?,
    };

    env_logger::builder().format_target(false).init();

    if !run(args).await? {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_players(value: &str) -> Result<Vec<String>, String> {
    let players: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();
    if players.is_empty() {
        return Err("expected at least one player name".to_string());
    }
    Ok(players)
}

/// Returns whether every selected scenario passed.
async fn run(args: Args) -> Result<bool> {
    let overrides = ConfigOverrides {
        endpoint: args.server.or(args.port.map(endpoint_for_port)),
        observe: args.observe_secs.map(Duration::from_secs),
        hand_target: args.hands,
    };
    let config = HarnessConfig::from_env(overrides).context("Invalid configuration")?;

    let names: Vec<&str> = match args.scenario.as_str() {
        "all" => BUILTIN_SCENARIOS.to_vec(),
        name if BUILTIN_SCENARIOS.contains(&name) => vec![name],
        other => bail!(
            "Unknown scenario '{other}', expected one of: {}, all",
            BUILTIN_SCENARIOS.join(", ")
        ),
    };

    let players: Option<Vec<&str>> = args
        .players
        .as_ref()
        .map(|players| players.iter().map(String::as_str).collect());
    if args.scenario == "two-players" && players.as_ref().is_some_and(|p| p.len() < 2) {
        bail!("two-players needs at least two names in --players");
    }
    if players.as_ref().is_some_and(|p| p.len() > MAX_PLAYERS) {
        bail!("--players accepts at most {MAX_PLAYERS} names");
    }

    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, tearing down");
            let _ = abort_tx.send(true);
        }
    });

    info!("Testing poker server at {}", config.endpoint);
    let mut harness = Harness::new(config);
    let mut all_passed = true;

    for name in names {
        let Some(scenario) = Scenario::builtin(name, harness.config(), players.as_deref())
        else {
            continue;
        };
        let report = harness.run(&scenario, abort_rx.clone()).await;
        println!("{report}");
        all_passed &= report.passed();
        if report.aborted {
            break;
        }
    }

    Ok(all_passed)
}
