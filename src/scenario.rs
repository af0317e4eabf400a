//! Scripted harness scenarios.
//!
//! A [`Scenario`] is an ordered list of [`ScenarioStep`]s. Steps move the
//! scenario forward through [`Phase`]s:
//!
//! `Idle → PlayersCreated → Registered → Seated → GameStarted → Observing → Finished`
//!
//! A step may not run before the phase it requires. Steps that do not
//! advance the phase (settle waits, expectations, manual actions) can run
//! anywhere their requirement allows.

use std::{fmt, time::Duration};
use thiserror::Error;

use crate::{config::HarnessConfig, messages::PlayerAction, net::errors::NetError};

/// Lifecycle position of a running scenario.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Phase {
    #[default]
    Idle,
    PlayersCreated,
    Registered,
    Seated,
    GameStarted,
    Observing,
    Finished,
}

/// When an observation step ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObserveUntil {
    /// After a fixed duration.
    Elapsed(Duration),
    /// After `count` hand results, failing if `within` elapses first.
    HandResults { count: u64, within: Duration },
}

impl ObserveUntil {
    /// Hand-count observation when a target is configured, timed otherwise.
    pub fn from_config(config: &HarnessConfig) -> Self {
        match config.hand_target {
            Some(count) => Self::HandResults {
                count,
                within: config.observe,
            },
            None => Self::Elapsed(config.observe),
        }
    }
}

/// A condition checked against the shared tracker or the agents.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expectation {
    /// Waits until a snapshot shows every listed seat occupied.
    ///
    /// This is the only way to confirm seating: the protocol has no
    /// acknowledgment message for it.
    SeatsOccupied(Vec<u8>),
    /// Waits until at least this many hand results have been seen.
    HandResults(u64),
    /// Every agent created so far is still connected.
    AllConnected,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SeatsOccupied(seats) => write!(f, "seats {seats:?} occupied"),
            Self::HandResults(count) => write!(f, "{count} hand result(s)"),
            Self::AllConnected => write!(f, "all players connected"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScenarioStep {
    /// Create and connect one agent per name.
    Connect { players: Vec<String> },
    Register { players: Vec<String> },
    TakeSeats { seats: Vec<(String, u8)> },
    StartGame { player: String },
    /// Send an action whether or not it is the player's turn.
    SendAction { player: String, action: PlayerAction },
    Settle(Duration),
    Observe(ObserveUntil),
    Expect(Expectation),
    /// Close named agents before the scenario ends.
    Disconnect { players: Vec<String> },
}

impl ScenarioStep {
    /// The phase the scenario must have reached before this step runs.
    pub fn requires(&self) -> Phase {
        match self {
            Self::Connect { .. } | Self::Settle(_) | Self::Expect(_) => Phase::Idle,
            Self::Register { .. } | Self::Disconnect { .. } => Phase::PlayersCreated,
            Self::TakeSeats { .. } => Phase::Registered,
            Self::StartGame { .. } => Phase::Seated,
            Self::SendAction { .. } | Self::Observe(_) => Phase::GameStarted,
        }
    }

    /// The phase this step moves the scenario into, if any.
    pub fn enters(&self) -> Option<Phase> {
        match self {
            Self::Connect { .. } => Some(Phase::PlayersCreated),
            Self::Register { .. } => Some(Phase::Registered),
            Self::TakeSeats { .. } => Some(Phase::Seated),
            Self::StartGame { .. } => Some(Phase::GameStarted),
            Self::Observe(_) => Some(Phase::Observing),
            _ => None,
        }
    }

    /// Upper bound on how long this step may take.
    ///
    /// Fixed waits get `step_timeout` on top of their own length.
    pub fn time_limit(&self, step_timeout: Duration) -> Duration {
        match self {
            Self::Settle(wait) | Self::Observe(ObserveUntil::Elapsed(wait)) => {
                *wait + step_timeout
            }
            Self::Observe(ObserveUntil::HandResults { within, .. }) => *within,
            _ => step_timeout,
        }
    }
}

impl fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Connect { players } => write!(f, "connect {}", players.join(", ")),
            Self::Register { players } => write!(f, "register {}", players.join(", ")),
            Self::TakeSeats { seats } => {
                let seats: Vec<String> = seats
                    .iter()
                    .map(|(player, seat)| format!("{player}@{seat}"))
                    .collect();
                write!(f, "take seats {}", seats.join(", "))
            }
            Self::StartGame { player } => write!(f, "start game ({player})"),
            Self::SendAction { player, action } => write!(f, "{player} sends {action}"),
            Self::Settle(wait) => write!(f, "settle {wait:?}"),
            Self::Observe(ObserveUntil::Elapsed(wait)) => write!(f, "observe for {wait:?}"),
            Self::Observe(ObserveUntil::HandResults { count, .. }) => {
                write!(f, "observe until {count} hand(s)")
            }
            Self::Expect(expectation) => write!(f, "expect {expectation}"),
            Self::Disconnect { players } => write!(f, "disconnect {}", players.join(", ")),
        }
    }
}

/// Errors that fail a scenario step.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("step '{step}' timed out after {elapsed:?}")]
    StepTimeout { step: String, elapsed: Duration },

    #[error("player {player}: {source}")]
    Net {
        player: String,
        #[source]
        source: NetError,
    },

    #[error("unknown player {0}")]
    UnknownPlayer(String),

    #[error("player {0} already exists")]
    DuplicatePlayer(String),

    #[error("step '{step}' requires phase {required:?} but the scenario is at {current:?}")]
    OutOfOrder {
        step: String,
        required: Phase,
        current: Phase,
    },

    #[error("expectation failed: {0}")]
    ExpectationFailed(String),
}

/// A named, ordered list of steps.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<ScenarioStep>,
}

fn owned(players: &[&str]) -> Vec<String> {
    players.iter().map(|player| player.to_string()).collect()
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn connect(self, players: &[&str]) -> Self {
        self.step(ScenarioStep::Connect {
            players: owned(players),
        })
    }

    pub fn register(self, players: &[&str]) -> Self {
        self.step(ScenarioStep::Register {
            players: owned(players),
        })
    }

    pub fn take_seats(self, seats: &[(&str, u8)]) -> Self {
        self.step(ScenarioStep::TakeSeats {
            seats: seats
                .iter()
                .map(|(player, seat)| (player.to_string(), *seat))
                .collect(),
        })
    }

    pub fn start_game(self, player: &str) -> Self {
        self.step(ScenarioStep::StartGame {
            player: player.to_string(),
        })
    }

    pub fn send_action(self, player: &str, action: PlayerAction) -> Self {
        self.step(ScenarioStep::SendAction {
            player: player.to_string(),
            action,
        })
    }

    pub fn settle(self, wait: Duration) -> Self {
        self.step(ScenarioStep::Settle(wait))
    }

    pub fn observe(self, until: ObserveUntil) -> Self {
        self.step(ScenarioStep::Observe(until))
    }

    pub fn expect(self, expectation: Expectation) -> Self {
        self.step(ScenarioStep::Expect(expectation))
    }

    pub fn disconnect(self, players: &[&str]) -> Self {
        self.step(ScenarioStep::Disconnect {
            players: owned(players),
        })
    }

    /// One player connects, idles, and disconnects.
    pub fn basic_connection() -> Self {
        Self::new("basic connection")
            .connect(&["TestPlayer1"])
            .settle(Duration::from_secs(1))
            .expect(Expectation::AllConnected)
            .disconnect(&["TestPlayer1"])
    }

    /// Alice and Bob register, sit at seats 1 and 2, Alice starts the game,
    /// and both seats must show up in a snapshot before observation.
    pub fn two_players(observe: ObserveUntil) -> Self {
        Self::heads_up("Alice", "Bob", observe)
    }

    /// [`Scenario::two_players`] with custom names. `first` starts the game.
    pub fn heads_up(first: &str, second: &str, observe: ObserveUntil) -> Self {
        Self::new("two players")
            .connect(&[first, second])
            .register(&[first, second])
            .take_seats(&[(first, 1), (second, 2)])
            .start_game(first)
            .expect(Expectation::SeatsOccupied(vec![1, 2]))
            .observe(observe)
    }

    /// Two players drive a short betting round by hand: check, raise 20,
    /// call. Nobody answers prompts on their behalf in between, so the
    /// server may reject actions sent out of turn.
    pub fn manual_actions(pause: Duration) -> Self {
        let (alice, bob) = ("ManualAlice", "ManualBob");
        Self::new("manual actions")
            .connect(&[alice, bob])
            .register(&[alice, bob])
            .take_seats(&[(alice, 1), (bob, 2)])
            .start_game(alice)
            .settle(pause * 2)
            .send_action(alice, PlayerAction::Check)
            .settle(pause)
            .send_action(bob, PlayerAction::Raise { amount: 20.0 })
            .settle(pause)
            .send_action(alice, PlayerAction::Call)
    }

    /// A full table: every player is seated in order from seat 1 and the
    /// first one starts the game. Only the first [`MAX_PLAYERS`] names are
    /// used.
    pub fn game_flow(players: &[&str], observe: ObserveUntil) -> Self {
        let players = &players[..players.len().min(MAX_PLAYERS)];
        let seats: Vec<(&str, u8)> = players
            .iter()
            .zip(1..=u8::MAX)
            .map(|(player, seat)| (*player, seat))
            .collect();
        let mut scenario = Self::new("game flow")
            .connect(players)
            .register(players)
            .take_seats(&seats);
        if let Some(first) = players.first() {
            scenario = scenario.start_game(first);
        }
        scenario.observe(observe)
    }

    /// Look up a built-in scenario by its CLI name.
    ///
    /// `players` replaces the default roster of `two-players` (first two
    /// names) and `game-flow`. `manual-actions` always uses its own pair.
    pub fn builtin(name: &str, config: &HarnessConfig, players: Option<&[&str]>) -> Option<Self> {
        let observe = ObserveUntil::from_config(config);
        match name {
            "connect" => Some(Self::basic_connection()),
            "two-players" => match players {
                Some(&[first, second, ..]) => Some(Self::heads_up(first, second, observe)),
                _ => Some(Self::two_players(observe)),
            },
            "manual-actions" => Some(Self::manual_actions(Duration::from_secs(1))),
            "game-flow" => Some(Self::game_flow(
                players.unwrap_or(&DEFAULT_TABLE),
                observe,
            )),
            _ => None,
        }
    }
}

/// Names used by the full-table scenario.
pub const DEFAULT_TABLE: [&str; 6] = ["Alice", "Bob", "Charlie", "Dave", "Eve", "Frank"];

/// Seats are numbered from 1 with a `u8`, which caps the table size.
pub const MAX_PLAYERS: usize = u8::MAX as usize;

/// CLI names accepted by [`Scenario::builtin`], in the order `all` runs them.
pub const BUILTIN_SCENARIOS: [&str; 4] = ["connect", "two-players", "manual-actions", "game-flow"];
