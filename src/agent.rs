//! One simulated player.
//!
//! A [`PlayerAgent`] binds one [`Session`] to one player identity. Once
//! connected, a background listener task runs for the agent's whole
//! connected lifetime and routes every inbound envelope:
//!
//! - `gameState` replaces the shared [`GameStateTracker`] snapshot
//! - `onmove` addressed to this agent's seat is answered with exactly one action
//! - `handWinnings` is logged and counted
//! - anything else, including malformed frames, is logged and dropped
//!
//! A connection that ends without [`PlayerAgent::close`] having been called
//! is recorded as lost and can be watched through
//! [`PlayerAgent::loss_signal`].
//!
//! Registration and seating are never confirmed by the server. `take_seat`
//! records the seat locally right away, so the local and server views may
//! disagree until a snapshot shows otherwise.

use log::{debug, error, info, warn};
use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{sync::watch, task::JoinHandle, time};

use crate::{
    config::AgentConfig,
    decision::decide,
    messages::{ClientCommand, Envelope, GameSnapshot, PlayerAction, ServerEvent, TurnPrompt},
    net::{
        errors::{NetError, Result},
        session::{CLOSE_TIMEOUT, Session},
    },
    tracker::GameStateTracker,
};

pub struct PlayerAgent {
    core: Arc<AgentCore>,
    listener: Option<JoinHandle<()>>,
}

/// State shared between the agent handle and its listener task.
struct AgentCore {
    name: String,
    session: Session,
    tracker: GameStateTracker,
    config: AgentConfig,
    local: Mutex<LocalState>,
    prompts_answered: AtomicU64,
    actions_sent: AtomicU64,
    lost: watch::Sender<bool>,
}

#[derive(Debug)]
struct LocalState {
    assigned_seat: Option<u8>,
    chip_stack: f64,
}

impl PlayerAgent {
    /// Connect a new player and start its listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened.
    pub async fn connect(
        name: impl Into<String>,
        endpoint: &str,
        config: AgentConfig,
        tracker: GameStateTracker,
    ) -> Result<Self> {
        let name = name.into();
        let session = Session::open(endpoint, config.connect_timeout).await?;
        info!("Player {name} connected to server");

        let core = Arc::new(AgentCore {
            local: Mutex::new(LocalState {
                assigned_seat: None,
                chip_stack: config.starting_chips,
            }),
            name,
            session,
            tracker,
            config,
            prompts_answered: AtomicU64::new(0),
            actions_sent: AtomicU64::new(0),
            lost: watch::Sender::new(false),
        });
        let listener = tokio::spawn(listen(core.clone()));

        Ok(Self {
            core,
            listener: Some(listener),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The seat this agent last asked for, whether or not the server agreed.
    pub fn assigned_seat(&self) -> Option<u8> {
        self.core.local().assigned_seat
    }

    pub fn chip_stack(&self) -> f64 {
        self.core.local().chip_stack
    }

    pub fn is_connected(&self) -> bool {
        self.core.session.is_connected()
    }

    /// Whether the connection ended without this side closing it.
    pub fn connection_lost(&self) -> bool {
        *self.core.lost.borrow()
    }

    /// Flips to `true` when the connection is lost. Never flips for a
    /// connection ended by [`PlayerAgent::close`].
    pub fn loss_signal(&self) -> watch::Receiver<bool> {
        self.core.lost.subscribe()
    }

    /// Turn prompts this agent has answered.
    pub fn prompts_answered(&self) -> u64 {
        self.core.prompts_answered.load(Ordering::Acquire)
    }

    /// Every action envelope sent, automatic or manual.
    pub fn actions_sent(&self) -> u64 {
        self.core.actions_sent.load(Ordering::Acquire)
    }

    /// Associate this agent's name with its connection.
    ///
    /// The protocol has no acknowledgment for this step; the call only
    /// waits the configured settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if the session is gone.
    pub async fn register(&self) -> Result<()> {
        self.core.send(ClientCommand::RegisterPlayer {
            name: self.core.name.clone(),
        })?;
        self.core.settle().await;
        Ok(())
    }

    /// Request a seat and optimistically record it locally.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if the session is gone.
    pub async fn take_seat(&self, seat: u8) -> Result<()> {
        self.core.send(ClientCommand::TakeSeat { seat })?;
        self.core.local().assigned_seat = Some(seat);
        self.core.settle().await;
        Ok(())
    }

    /// Ask the server to start the game.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if the session is gone.
    pub async fn start_game(&self) -> Result<()> {
        self.core.send(ClientCommand::StartGame)?;
        self.core.settle().await;
        Ok(())
    }

    /// Send an action regardless of whose turn it is.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NotConnected`] if the session is gone.
    pub fn send_action(&self, action: PlayerAction) -> Result<()> {
        self.core.send_action(action)
    }

    /// Close the connection and stop the listener. Idempotent.
    pub async fn close(&mut self) {
        self.core.session.close().await;
        if let Some(mut listener) = self.listener.take()
            && time::timeout(CLOSE_TIMEOUT, &mut listener).await.is_err()
        {
            warn!("Listener for {} did not stop in time", self.core.name);
            listener.abort();
        }
    }
}

impl fmt::Debug for PlayerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerAgent")
            .field("name", &self.core.name)
            .field("local", &*self.core.local())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for PlayerAgent {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl AgentCore {
    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: ClientCommand) -> Result<()> {
        let envelope = command.into_envelope();
        self.session.send(&envelope)?;
        info!("Player {} sent: {}", self.name, envelope);
        Ok(())
    }

    fn send_action(&self, action: PlayerAction) -> Result<()> {
        self.send(action.into())?;
        self.actions_sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            time::sleep(self.config.settle_delay).await;
        }
    }

    async fn dispatch(&self, envelope: Envelope) {
        let event = match ServerEvent::try_from(envelope) {
            Ok(event) => event,
            Err(error) => {
                warn!("Player {} discarded message: {error}", self.name);
                return;
            }
        };

        match event {
            ServerEvent::GameState(snapshot) => {
                debug!(
                    "Game state updated: {} players, pot: {}",
                    snapshot.players.len(),
                    snapshot.pot
                );
                self.refresh_chips(&snapshot);
                self.tracker.update(snapshot);
            }
            ServerEvent::OnMove(prompt) => {
                let seat = self.local().assigned_seat;
                if seat == Some(prompt.seat) {
                    self.answer(&prompt).await;
                }
            }
            ServerEvent::HandWinnings(winnings) => {
                info!("Hand finished, winnings: {winnings}");
                self.tracker.record_hand_result(&self.name);
            }
            ServerEvent::Other { message_type, .. } => {
                debug!("Player {} ignoring {message_type}", self.name);
            }
        }
    }

    /// The server's seating wins over the seat this agent asked for.
    fn refresh_chips(&self, snapshot: &GameSnapshot) {
        let mut local = self.local();
        let seat = snapshot.seat_of(&self.name).or(local.assigned_seat);
        if let Some(player) = seat.and_then(|seat| snapshot.players.get(&seat)) {
            local.chip_stack = player.chips;
        }
    }

    fn mark_lost(&self) {
        if !self.session.is_closed() {
            warn!("Player {} lost its connection", self.name);
            self.lost.send_replace(true);
        }
    }

    async fn answer(&self, prompt: &TurnPrompt) {
        info!("It's {}'s turn to act", self.name);
        if !self.config.think_time.is_zero() {
            time::sleep(self.config.think_time).await;
        }

        let action = decide(prompt, &self.config.thresholds);
        match self.send_action(action) {
            Ok(()) => {
                self.prompts_answered.fetch_add(1, Ordering::AcqRel);
            }
            Err(error) => warn!("Player {} could not answer its turn: {error}", self.name),
        }
    }
}

/// Runs until the session closes. Every wait is bounded by the receive
/// timeout so a silent server never parks the task forever.
async fn listen(core: Arc<AgentCore>) {
    loop {
        match core.session.receive(core.config.receive_timeout).await {
            Ok(envelope) => core.dispatch(envelope).await,
            Err(NetError::ReceiveTimeout(_)) => continue,
            Err(NetError::MalformedMessage(reason)) => {
                warn!("Player {} discarded malformed message: {reason}", core.name);
            }
            Err(NetError::ConnectionClosed) => {
                info!("Player {} connection closed", core.name);
                core.mark_lost();
                break;
            }
            Err(error) => {
                error!("Error listening for messages from {}: {error}", core.name);
                core.mark_lost();
                core.session.close().await;
                break;
            }
        }
    }
}
