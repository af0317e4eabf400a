//! Scenario orchestration.
//!
//! The [`Harness`] owns every agent created by a scenario and runs its
//! steps strictly in order. Each step is bounded by a time limit and can be
//! interrupted by an external abort signal. A player whose connection drops
//! without a `Disconnect` step fails the step in flight. Whatever happens,
//! the run ends with a teardown that closes every connection.

use futures_util::future::{join_all, select_all};
use log::{error, info, warn};
use std::{
    fmt,
    time::{Duration, Instant},
};
use tokio::{sync::watch, time};

use crate::{
    agent::PlayerAgent,
    config::HarnessConfig,
    net::errors::NetError,
    scenario::{Expectation, ObserveUntil, Phase, Scenario, ScenarioError, ScenarioStep},
    tracker::GameStateTracker,
};

pub struct Harness {
    config: HarnessConfig,
    tracker: GameStateTracker,
    agents: Vec<PlayerAgent>,
    phase: Phase,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            tracker: GameStateTracker::new(),
            agents: Vec::new(),
            phase: Phase::Idle,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Tracker shared by the agents of the current run.
    pub fn tracker(&self) -> &GameStateTracker {
        &self.tracker
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn agents(&self) -> &[PlayerAgent] {
        &self.agents
    }

    pub fn agent(&self, name: &str) -> Option<&PlayerAgent> {
        self.agents.iter().find(|agent| agent.name() == name)
    }

    /// Run `scenario` to completion, failure, or abort.
    ///
    /// The first failing step stops the scenario. Remaining steps are
    /// skipped and reported as such. Flipping `abort` to `true` cancels the
    /// step in flight. Every agent is closed before this returns, and each
    /// run starts from a fresh tracker.
    pub async fn run(&mut self, scenario: &Scenario, mut abort: watch::Receiver<bool>) -> ScenarioReport {
        info!("Running scenario: {}", scenario.name);
        self.tracker = GameStateTracker::new();
        self.phase = Phase::Idle;

        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut aborted = false;

        for step in &scenario.steps {
            if *abort.borrow() {
                aborted = true;
                break;
            }

            info!("Step: {step}");
            let limit = step.time_limit(self.config.step_timeout);
            let mut losses = self.loss_signals();
            let started = Instant::now();
            let outcome = tokio::select! {
                result = time::timeout(limit, self.execute(step)) => match result {
                    Ok(result) => Some(result),
                    Err(_) => Some(Err(ScenarioError::StepTimeout {
                        step: step.to_string(),
                        elapsed: started.elapsed(),
                    })),
                },
                player = connection_lost(&mut losses) => Some(Err(lost_connection(player))),
                () = abort_requested(&mut abort) => None,
            };
            let elapsed = started.elapsed();

            let Some(result) = outcome else {
                warn!("Scenario '{}' aborted during '{step}'", scenario.name);
                aborted = true;
                break;
            };
            let result = result.and_then(|()| match self.lost_player() {
                Some(player) => Err(lost_connection(player.to_string())),
                None => Ok(()),
            });

            match result {
                Ok(()) => {
                    if let Some(next) = step.enters() {
                        self.phase = self.phase.max(next);
                    }
                    steps.push(StepReport {
                        step: step.to_string(),
                        elapsed,
                        error: None,
                    });
                }
                Err(error) => {
                    error!("Step '{step}' failed: {error}");
                    steps.push(StepReport {
                        step: step.to_string(),
                        elapsed,
                        error: Some(error),
                    });
                    break;
                }
            }
        }

        let reached = self.phase;
        let snapshots = self.tracker.update_count();
        let hands = self.tracker.hands_observed();
        self.teardown().await;

        let report = ScenarioReport {
            scenario: scenario.name.clone(),
            skipped: scenario.steps.len() - steps.len(),
            steps,
            aborted,
            reached,
            snapshots,
            hands,
        };
        info!("{report}");
        report
    }

    /// Close every agent and mark the run finished.
    pub async fn teardown(&mut self) {
        let mut agents = std::mem::take(&mut self.agents);
        if !agents.is_empty() {
            info!("Disconnecting {} player(s)", agents.len());
            join_all(agents.iter_mut().map(|agent| agent.close())).await;
        }
        self.phase = Phase::Finished;
    }

    async fn execute(&mut self, step: &ScenarioStep) -> Result<(), ScenarioError> {
        let required = step.requires();
        if self.phase < required {
            return Err(ScenarioError::OutOfOrder {
                step: step.to_string(),
                required,
                current: self.phase,
            });
        }

        match step {
            ScenarioStep::Connect { players } => {
                for name in players {
                    if self.agent(name).is_some() {
                        return Err(ScenarioError::DuplicatePlayer(name.clone()));
                    }
                    let agent = PlayerAgent::connect(
                        name.clone(),
                        &self.config.endpoint,
                        self.config.agent.clone(),
                        self.tracker.clone(),
                    )
                    .await
                    .map_err(net_error(name))?;
                    self.agents.push(agent);
                }
            }
            ScenarioStep::Register { players } => {
                for name in players {
                    self.find(name)?.register().await.map_err(net_error(name))?;
                }
            }
            ScenarioStep::TakeSeats { seats } => {
                for (name, seat) in seats {
                    self.find(name)?
                        .take_seat(*seat)
                        .await
                        .map_err(net_error(name))?;
                }
            }
            ScenarioStep::StartGame { player } => {
                self.find(player)?
                    .start_game()
                    .await
                    .map_err(net_error(player))?;
            }
            ScenarioStep::SendAction { player, action } => {
                self.find(player)?
                    .send_action(*action)
                    .map_err(net_error(player))?;
            }
            ScenarioStep::Settle(wait) => time::sleep(*wait).await,
            ScenarioStep::Observe(until) => {
                match until {
                    ObserveUntil::Elapsed(wait) => time::sleep(*wait).await,
                    ObserveUntil::HandResults { count, .. } => {
                        self.tracker.wait_for_hands(*count).await;
                    }
                }
                info!(
                    "Observed {} snapshot(s) and {} hand(s)",
                    self.tracker.update_count(),
                    self.tracker.hands_observed()
                );
            }
            ScenarioStep::Expect(expectation) => self.check(expectation).await?,
            ScenarioStep::Disconnect { players } => {
                for name in players {
                    let index = self.index_of(name)?;
                    self.agents[index].close().await;
                }
            }
        }
        Ok(())
    }

    async fn check(&self, expectation: &Expectation) -> Result<(), ScenarioError> {
        match expectation {
            Expectation::SeatsOccupied(seats) => {
                let snapshot = self
                    .tracker
                    .wait_for_snapshot(|snapshot| snapshot.has_seats(seats))
                    .await;
                info!("Snapshot shows seats {seats:?} occupied, pot: {}", snapshot.pot);
            }
            Expectation::HandResults(count) => {
                self.tracker.wait_for_hands(*count).await;
            }
            Expectation::AllConnected => {
                let lost: Vec<&str> = self
                    .agents
                    .iter()
                    .filter(|agent| !agent.is_connected())
                    .map(|agent| agent.name())
                    .collect();
                if !lost.is_empty() {
                    return Err(ScenarioError::ExpectationFailed(format!(
                        "disconnected: {}",
                        lost.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    fn loss_signals(&self) -> Vec<(String, watch::Receiver<bool>)> {
        self.agents
            .iter()
            .map(|agent| (agent.name().to_string(), agent.loss_signal()))
            .collect()
    }

    fn lost_player(&self) -> Option<&str> {
        self.agents
            .iter()
            .find(|agent| agent.connection_lost())
            .map(PlayerAgent::name)
    }

    fn find(&self, name: &str) -> Result<&PlayerAgent, ScenarioError> {
        self.agent(name)
            .ok_or_else(|| ScenarioError::UnknownPlayer(name.to_string()))
    }

    fn index_of(&self, name: &str) -> Result<usize, ScenarioError> {
        self.agents
            .iter()
            .position(|agent| agent.name() == name)
            .ok_or_else(|| ScenarioError::UnknownPlayer(name.to_string()))
    }
}

fn net_error(player: &str) -> impl FnOnce(NetError) -> ScenarioError + '_ {
    move |source| ScenarioError::Net {
        player: player.to_string(),
        source,
    }
}

fn lost_connection(player: String) -> ScenarioError {
    ScenarioError::Net {
        player,
        source: NetError::ConnectionClosed,
    }
}

/// Resolves with the name of the first player whose connection is lost.
/// Never resolves while every connection is up.
async fn connection_lost(losses: &mut [(String, watch::Receiver<bool>)]) -> String {
    if losses.is_empty() {
        return std::future::pending().await;
    }
    let waits = losses.iter_mut().map(|(player, signal)| {
        Box::pin(async move {
            let lost = signal.wait_for(|lost| *lost).await.is_ok();
            if !lost {
                std::future::pending::<()>().await;
            }
            player.clone()
        })
    });
    let (player, _, _) = select_all(waits).await;
    player
}

/// Resolves once `abort` reads `true`. Never resolves if the sender is gone.
async fn abort_requested(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Outcome of one executed step.
#[derive(Debug)]
pub struct StepReport {
    pub step: String,
    pub elapsed: Duration,
    pub error: Option<ScenarioError>,
}

impl StepReport {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: String,
    /// Steps that ran, in order. Only the last one can have failed.
    pub steps: Vec<StepReport>,
    /// Steps never started because of a failure or an abort.
    pub skipped: usize,
    pub aborted: bool,
    /// Furthest phase reached before teardown.
    pub reached: Phase,
    pub snapshots: u64,
    pub hands: u64,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        !self.aborted && self.skipped == 0 && self.steps.iter().all(StepReport::passed)
    }

    pub fn failure(&self) -> Option<&ScenarioError> {
        self.steps.iter().find_map(|step| step.error.as_ref())
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let verdict = if self.passed() {
            "PASSED"
        } else if self.aborted {
            "ABORTED"
        } else {
            "FAILED"
        };
        writeln!(
            f,
            "Scenario '{}': {verdict} (reached {:?}, {} snapshot(s), {} hand(s))",
            self.scenario, self.reached, self.snapshots, self.hands
        )?;
        for step in &self.steps {
            match &step.error {
                None => writeln!(f, "  ✓ {} ({:?})", step.step, step.elapsed)?,
                Some(error) => writeln!(f, "  ✗ {} ({:?}): {error}", step.step, step.elapsed)?,
            }
        }
        if self.skipped > 0 {
            write!(f, "  - {} step(s) skipped", self.skipped)?;
        }
        Ok(())
    }
}
