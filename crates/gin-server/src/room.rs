//! Game room management.
//!
//! A room binds up to two connections to one `GameState` and decides who
//! hears what after every transition. It never touches a socket: every
//! operation returns the `Envelope`s the server should deliver.

use gin_core::{GameAction, GameError, GameEvent, GameState, PlayerId, PlayerView};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Shortest room code accepted on create
pub const MIN_CODE_LEN: usize = 4;

/// Seats per room
pub const PLAYERS_NEEDED: usize = gin_core::PLAYER_COUNT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Invalid room code.")]
    InvalidCode,

    #[error("4-player not supported yet (2-player only for now).")]
    UnsupportedPlayerCount,

    #[error("Code already exists. Try again.")]
    CodeTaken,

    #[error("Room not found.")]
    NotFound,

    #[error("Room is full.")]
    Full,

    #[error("Need more players to start.")]
    NeedMorePlayers,

    #[error("You are already in a room.")]
    AlreadySeated,

    #[error("Only the host can start the game")]
    NotHost,

    #[error("Connection is not seated in this room")]
    NotInRoom,

    #[error("No game in progress")]
    NoGame,

    #[error(transparent)]
    Game(#[from] GameError),
}

impl RoomError {
    /// Whether the offending client is told about this error. Everything
    /// else is dropped and the client resyncs on the next snapshot.
    pub fn is_reported(&self) -> bool {
        !matches!(
            self,
            RoomError::NotHost | RoomError::NotInRoom | RoomError::NoGame | RoomError::Game(_)
        )
    }
}

/// Trim and upper-case a client-supplied room code.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalise a code for a new room, rejecting ones that are too short.
pub fn validate_new_code(raw: &str) -> Result<String, RoomError> {
    let code = normalize_code(raw);
    if code.chars().count() < MIN_CODE_LEN {
        return Err(RoomError::InvalidCode);
    }
    Ok(code)
}

/// One outbound message for one connection
#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: Uuid,
    pub msg: ServerMessage,
}

/// What the server must do after an action was applied
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub envelopes: Vec<Envelope>,
    /// Round id to auto-advance from once the reveal delay has passed
    pub schedule_next_round: Option<u32>,
}

/// A room holding up to two players.
pub struct GameRoom {
    /// Distinguishes this room from a later one that reuses the code
    pub id: Uuid,
    pub code: String,
    pub players_needed: usize,
    pub target_score: u32,
    /// Seat index = position
    pub connections: Vec<Uuid>,
    /// The game state (once started)
    pub game: Option<GameState>,
    pending_start: Option<JoinHandle<()>>,
}

impl GameRoom {
    pub fn new(code: String, host: Uuid, target_score: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            players_needed: PLAYERS_NEEDED,
            target_score,
            connections: vec![host],
            game: None,
            pending_start: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.players_needed
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn seat_of(&self, conn: Uuid) -> Option<PlayerId> {
        self.connections
            .iter()
            .position(|&c| c == conn)
            .map(|i| i as PlayerId)
    }

    /// Seat a connection, returning its player index.
    pub fn add_player(&mut self, conn: Uuid) -> Result<PlayerId, RoomError> {
        if self.is_full() {
            return Err(RoomError::Full);
        }
        self.connections.push(conn);
        Ok((self.connections.len() - 1) as PlayerId)
    }

    /// Unseat a connection. Remaining players move down to fill the gap, and
    /// any game in progress is thrown away. Returns true if the room is now
    /// empty.
    pub fn remove_player(&mut self, conn: Uuid) -> Result<bool, RoomError> {
        let seat = self.seat_of(conn).ok_or(RoomError::NotInRoom)?;
        self.connections.remove(seat as usize);
        self.cancel_pending_start();
        self.game = None;
        Ok(self.connections.is_empty())
    }

    /// Occupancy for everyone in the room
    pub fn room_update(&self) -> Vec<Envelope> {
        self.broadcast(ServerMessage::RoomUpdate {
            code: self.code.clone(),
            joined: self.connections.len(),
            needed: self.players_needed,
        })
    }

    /// Host-only. Deals a fresh round, carrying scores if a match is still
    /// under way. A finished match starts over from zero.
    pub fn start_game(&mut self, requester: Uuid) -> Result<Vec<Envelope>, RoomError> {
        match self.seat_of(requester) {
            Some(0) => {}
            Some(_) => return Err(RoomError::NotHost),
            None => return Err(RoomError::NotInRoom),
        }
        if !self.is_full() {
            return Err(RoomError::NeedMorePlayers);
        }

        self.cancel_pending_start();
        match self.game.as_mut().filter(|game| !game.is_match_over()) {
            Some(game) => {
                game.start_next_round();
            }
            None => self.game = Some(GameState::new(self.target_score)),
        }

        let mut out = self.broadcast(ServerMessage::GameStart {
            code: self.code.clone(),
        });
        out.extend(self.snapshots());
        Ok(out)
    }

    /// Apply one player action and work out what everybody sees.
    pub fn apply_action(
        &mut self,
        conn: Uuid,
        action: GameAction,
    ) -> Result<ActionOutcome, RoomError> {
        let seat = self.seat_of(conn).ok_or(RoomError::NotInRoom)?;
        let game = self.game.as_mut().ok_or(RoomError::NoGame)?;
        let events = game.apply_action(seat, action)?;

        let mut outcome = ActionOutcome::default();
        let mut round_won = false;
        let mut round_restarted = false;

        for event in &events {
            match event {
                GameEvent::DeckReplenished(info) => {
                    outcome
                        .envelopes
                        .extend(self.broadcast(ServerMessage::DeckReshuffle {
                            code: self.code.clone(),
                            deck_count: info.after,
                            info: *info,
                        }));
                }
                GameEvent::RoundWon { .. } => round_won = true,
                GameEvent::RoundStarted { .. } => round_restarted = true,
                _ => {}
            }
        }

        if round_won {
            outcome.envelopes.extend(self.round_end_messages());
            if let Some(game) = &self.game {
                if !game.is_match_over() {
                    outcome.schedule_next_round = Some(game.round_id());
                }
            }
        }
        if round_restarted {
            // A rematch dealt before the timer fired
            self.cancel_pending_start();
        }

        if events.iter().any(GameEvent::changes_view) {
            outcome.envelopes.extend(self.snapshots());
        }
        Ok(outcome)
    }

    /// Deal the next round if the room is still showing the finished round
    /// `round_id` of a live match. Returns `None` when something else has
    /// happened in the meantime.
    pub fn start_scheduled_round(&mut self, round_id: u32) -> Option<Vec<Envelope>> {
        // Drop the handle without aborting: this runs on that very task
        self.pending_start = None;

        let game = self.game.as_mut()?;
        if game.round_id() != round_id || !game.is_round_over() || game.is_match_over() {
            return None;
        }
        game.start_next_round();
        Some(self.snapshots())
    }

    pub fn set_pending_start(&mut self, handle: JoinHandle<()>) {
        self.cancel_pending_start();
        self.pending_start = Some(handle);
    }

    pub fn cancel_pending_start(&mut self) {
        if let Some(handle) = self.pending_start.take() {
            handle.abort();
        }
    }

    /// Private `state` message for every seat. An empty deck in the draw
    /// phase is replenished first so clients never see zero cards to draw.
    pub fn snapshots(&mut self) -> Vec<Envelope> {
        let Some(game) = self.game.as_mut() else {
            return Vec::new();
        };
        let replenished = game.replenish_for_view();
        let game = &*game;

        self.connections
            .iter()
            .enumerate()
            .map(|(seat, &to)| Envelope {
                to,
                msg: ServerMessage::State(Box::new(PlayerView::for_player(
                    game,
                    seat as PlayerId,
                    replenished,
                ))),
            })
            .collect()
    }

    fn round_end_messages(&self) -> Vec<Envelope> {
        let Some(game) = &self.game else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(end) = game.round_end() {
            out.extend(self.broadcast(ServerMessage::RoundEnd(Box::new(end))));
        }
        if let Some(reveal) = game.round_reveal() {
            out.extend(self.broadcast(ServerMessage::RoundReveal {
                code: self.code.clone(),
                reveal: Box::new(reveal),
            }));
        }
        out
    }

    pub fn broadcast(&self, msg: ServerMessage) -> Vec<Envelope> {
        self.connections
            .iter()
            .map(|&to| Envelope {
                to,
                msg: msg.clone(),
            })
            .collect()
    }
}

impl Drop for GameRoom {
    fn drop(&mut self) {
        self.cancel_pending_start();
    }
}
