use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::{collections::BTreeMap, fmt};

use super::errors::NetError;

pub const REGISTER_PLAYER: &str = "registerPlayer";
pub const TAKE_SEAT: &str = "takeSeat";
pub const START_GAME: &str = "startGame";
pub const GAME_STATE: &str = "gameState";
pub const ON_MOVE: &str = "onmove";
pub const HAND_WINNINGS: &str = "handWinnings";

/// One discrete protocol message.
///
/// The payload shape is determined solely by `message_type`. The envelope
/// itself makes no claim about it; see [`ServerEvent`] for typed inbound
/// payloads and [`ClientCommand`] for outbound ones.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Envelope {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }

    /// An envelope with an empty `{}` payload.
    pub fn bare(message_type: impl Into<String>) -> Self {
        Self::new(message_type, empty_object())
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message_type)
    }
}

/// Betting round, either sent by the server or inferred from the board.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Street {
    /// Infer the street from the number of community cards dealt.
    pub fn from_board_size(cards: usize) -> Option<Self> {
        match cards {
            0 => Some(Self::Preflop),
            3 => Some(Self::Flop),
            4 => Some(Self::Turn),
            5 => Some(Self::River),
            _ => None,
        }
    }
}

impl fmt::Display for Street {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
        };
        write!(f, "{repr}")
    }
}

/// A card as the server encodes it. The harness never interprets it.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Card {
    pub suit: u8,
    pub rank: u8,
}

/// Public per-seat information carried in a game snapshot.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerInfo {
    pub name: String,
    pub address: String,
    pub chips: f64,
    pub bet: f64,
    pub in_game: bool,
    pub on_move: bool,
    pub folded: bool,
    pub session_net_win_loss: f64,
    pub cards: Vec<Card>,
}

/// The full shared game state as broadcast by the server.
///
/// Seats are keyed by number; on the wire the keys are JSON strings
/// (`{"1": {...}}`).
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default)]
    pub game_started: bool,
    #[serde(default)]
    pub players: BTreeMap<u8, PlayerInfo>,
    #[serde(default)]
    pub pot: f64,
    #[serde(default)]
    pub community_cards: Vec<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<Street>,
}

impl GameSnapshot {
    /// The street the server reported, or the one implied by the board.
    pub fn street(&self) -> Option<Street> {
        self.street
            .or_else(|| Street::from_board_size(self.community_cards.len()))
    }

    /// Whether every listed seat is occupied.
    pub fn has_seats(&self, seats: &[u8]) -> bool {
        seats.iter().all(|seat| self.players.contains_key(seat))
    }

    /// The seat a named player occupies, if any.
    pub fn seat_of(&self, name: &str) -> Option<u8> {
        self.players
            .iter()
            .find(|(_, player)| player.name == name)
            .map(|(seat, _)| *seat)
    }
}

/// Server-to-player notification that a seat must act.
///
/// Only `seat` is required; the legal-action metadata falls back to
/// "cannot check, nothing to call, no raise" when absent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPrompt {
    pub seat: u8,
    #[serde(default)]
    pub can_check: bool,
    #[serde(default)]
    pub call_amount: f64,
    #[serde(default)]
    pub min_raise_to_total_bet: f64,
    #[serde(default)]
    pub pot_size: f64,
    #[serde(default)]
    pub chips: f64,
    #[serde(default)]
    pub name: String,
}

/// A typed inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Full snapshot replace.
    GameState(GameSnapshot),
    /// Turn prompt for one seat.
    OnMove(TurnPrompt),
    /// A hand concluded. Informational only, so the payload stays opaque.
    HandWinnings(Value),
    /// Any type the harness does not act on (e.g. `potUpdate`).
    Other { message_type: String, data: Value },
}

impl TryFrom<Envelope> for ServerEvent {
    type Error = NetError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope { message_type, data } = envelope;
        match message_type.as_str() {
            GAME_STATE => return payload(GAME_STATE, data).map(Self::GameState),
            ON_MOVE => return payload(ON_MOVE, data).map(Self::OnMove),
            HAND_WINNINGS => return Ok(Self::HandWinnings(data)),
            _ => {}
        }
        Ok(Self::Other { message_type, data })
    }
}

fn payload<T: DeserializeOwned>(message_type: &str, data: Value) -> Result<T, NetError> {
    serde_json::from_value(data)
        .map_err(|error| NetError::MalformedMessage(format!("{message_type} payload: {error}")))
}

/// A turn action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlayerAction {
    Check,
    Call,
    Fold,
    /// Raise to a target total bet.
    Raise { amount: f64 },
    Bet { amount: f64 },
}

impl PlayerAction {
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Call => "call",
            Self::Fold => "fold",
            Self::Raise { .. } => "raise",
            Self::Bet { .. } => "bet",
        }
    }
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Raise { amount } | Self::Bet { amount } => {
                write!(f, "{} {amount}", self.message_type())
            }
            _ => write!(f, "{}", self.message_type()),
        }
    }
}

/// A typed outbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientCommand {
    RegisterPlayer { name: String },
    TakeSeat { seat: u8 },
    StartGame,
    Action(PlayerAction),
}

impl ClientCommand {
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::RegisterPlayer { .. } => REGISTER_PLAYER,
            Self::TakeSeat { .. } => TAKE_SEAT,
            Self::StartGame => START_GAME,
            Self::Action(action) => action.message_type(),
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let message_type = self.message_type();
        let data = match self {
            Self::RegisterPlayer { name } => json!({ "name": name }),
            Self::TakeSeat { seat } => json!({ "seat": seat }),
            Self::Action(PlayerAction::Raise { amount } | PlayerAction::Bet { amount }) => {
                json!({ "amount": amount })
            }
            Self::StartGame | Self::Action(_) => empty_object(),
        };
        Envelope::new(message_type, data)
    }
}

impl From<PlayerAction> for ClientCommand {
    fn from(action: PlayerAction) -> Self {
        Self::Action(action)
    }
}
