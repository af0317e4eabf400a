//! # Poker Harness
//!
//! A test harness that drives several independently connected simulated players
//! against a remote poker server speaking the `messageType`/`data` JSON protocol
//! over WebSockets.
//!
//! ## Architecture
//!
//! Data flows one way into each player agent and one way out:
//!
//! - server → [`net::session::Session`] → agent listener → [`tracker`] / [`decision`]
//! - [`decision`] / [`harness`] → [`net::codec`] → [`net::session::Session`] → server
//!
//! Agents never talk to each other. All coordination is mediated by the
//! server's broadcasts, which every agent folds into one shared
//! [`tracker::GameStateTracker`].
//!
//! ## Core Modules
//!
//! - [`net`]: Wire envelope, typed messages, codec, and connection sessions
//! - [`agent`]: One simulated player with a background listener task
//! - [`tracker`]: The latest game snapshot, shared by every agent
//! - [`decision`]: The deterministic per-turn action policy
//! - [`scenario`] / [`harness`]: Scripted scenarios and the orchestrator that runs them
//!
//! ## Example
//!
//! ```
//! use pp_harness::decision::{DecisionThresholds, decide};
//! use pp_harness::messages::{PlayerAction, TurnPrompt};
//!
//! let prompt = TurnPrompt {
//!     seat: 1,
//!     can_check: true,
//!     call_amount: 0.0,
//!     min_raise_to_total_bet: 0.0,
//!     ..TurnPrompt::default()
//! };
//! assert_eq!(decide(&prompt, &DecisionThresholds::default()), PlayerAction::Check);
//! ```

/// Networking components: envelopes, codec, and connection sessions.
pub mod net;
pub use net::{codec, errors::NetError, messages, session::Session};

pub mod agent;
pub mod config;
pub mod decision;
pub mod harness;
pub mod scenario;
pub mod tracker;

pub use agent::PlayerAgent;
pub use config::{AgentConfig, HarnessConfig};
pub use harness::{Harness, ScenarioReport};
pub use scenario::{Scenario, ScenarioError, ScenarioStep};
pub use tracker::GameStateTracker;
