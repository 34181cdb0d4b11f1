//! WebSocket server and connection handling.

use crate::config::ServerConfig;
use crate::protocol::{ClientMessage, LooseCount, ServerMessage};
use crate::room::{normalize_code, validate_new_code, Envelope, GameRoom, RoomError, PLAYERS_NEEDED};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server state shared across all connections.
pub struct ServerState {
    pub config: ServerConfig,
    /// All active rooms, keyed by normalised code
    pub rooms: DashMap<String, GameRoom>,
    /// Mapping from connection ID to the code of the room it sits in
    pub player_rooms: DashMap<Uuid, String>,
    /// Mapping from connection ID to its message sender
    pub player_senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            rooms: DashMap::new(),
            player_rooms: DashMap::new(),
            player_senders: DashMap::new(),
        }
    }

    /// Send a message to a specific connection. Closed connections are skipped.
    pub fn send_to_player(&self, conn: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.player_senders.get(&conn) {
            let _ = sender.send(msg);
        }
    }

    pub fn deliver(&self, envelopes: Vec<Envelope>) {
        for Envelope { to, msg } in envelopes {
            self.send_to_player(to, msg);
        }
    }

    fn send_error(&self, conn: Uuid, err: &RoomError) {
        self.send_to_player(
            conn,
            ServerMessage::JoinError {
                message: err.to_string(),
            },
        );
    }
}

/// Run the WebSocket server.
pub async fn run_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = state.config.addr;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Gin Rummy server listening");

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!(%peer_addr, "Connection error: {}", e);
            }
        });
    }

    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let config = &state.config;
    let check_origin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get("origin")
            .and_then(|value| value.to_str().ok());
        if config.origin_allowed(origin) {
            Ok(resp)
        } else {
            warn!(%addr, ?origin, "Blocked WebSocket origin");
            let mut reject = ErrorResponse::new(Some("Origin not allowed".into()));
            *reject.status_mut() = StatusCode::FORBIDDEN;
            Err(reject)
        }
    };

    let ws_stream = accept_hdr_async(stream, check_origin).await?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Seats are only handed out on create/join
    let conn = Uuid::new_v4();
    info!(%addr, %conn, "New WebSocket connection");

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.player_senders.insert(conn, tx);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(conn, client_msg, &state),
                Err(e) => warn!(%conn, "Invalid message: {} ({})", text, e),
            },
            Ok(Message::Close(_)) => {
                info!(%conn, "Client closing connection");
                break;
            }
            Err(e) => {
                error!(%conn, "WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Clean up on disconnect
    handle_disconnect(conn, &state);
    state.player_senders.remove(&conn);
    send_task.abort();

    info!(%conn, "Connection closed");
    Ok(())
}

/// Handle a client message.
pub fn handle_message(conn: Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateRoom {
            code,
            players_needed,
            points_target,
        } => {
            if let Err(e) = create_room(conn, &code, players_needed, points_target, state) {
                debug!(%conn, "create_room refused: {}", e);
                state.send_error(conn, &e);
            }
        }

        ClientMessage::JoinRoom { code } => {
            if let Err(e) = join_room(conn, &code, state) {
                debug!(%conn, "join_room refused: {}", e);
                state.send_error(conn, &e);
            }
        }

        ClientMessage::StartGame { code } => {
            let code = normalize_code(&code);
            let seated_here = state
                .player_rooms
                .get(&conn)
                .is_some_and(|c| *c == code);
            if !seated_here {
                return;
            }
            let Some(mut room) = state.rooms.get_mut(&code) else {
                return;
            };
            match room.start_game(conn) {
                Ok(envelopes) => {
                    info!(%code, round_id = ?room.game.as_ref().map(|g| g.round_id()), "Game started");
                    state.deliver(envelopes);
                }
                Err(e) if e.is_reported() => state.send_error(conn, &e),
                Err(e) => debug!(%code, %conn, "start_game ignored: {}", e),
            }
        }

        other => {
            let Some(action) = other.into_action() else {
                debug!(%conn, "Unparseable action dropped");
                return;
            };
            let Some(code) = state.player_rooms.get(&conn).map(|c| c.value().clone()) else {
                return;
            };
            let Some(mut room) = state.rooms.get_mut(&code) else {
                return;
            };

            match room.apply_action(conn, action) {
                Ok(outcome) => {
                    // Sent while the room is still locked so the next action
                    // for this room can't overtake these messages
                    state.deliver(outcome.envelopes);
                    if let Some(round_id) = outcome.schedule_next_round {
                        info!(%code, round_id, "Round over, next deal scheduled");
                        schedule_next_round(state, &mut room, round_id);
                    }
                }
                Err(e) => debug!(%code, %conn, "Action dropped: {}", e),
            }
        }
    }
}

fn create_room(
    conn: Uuid,
    raw_code: &str,
    players_needed: Option<LooseCount>,
    points_target: Option<LooseCount>,
    state: &Arc<ServerState>,
) -> Result<(), RoomError> {
    if state.player_rooms.contains_key(&conn) {
        return Err(RoomError::AlreadySeated);
    }
    let code = validate_new_code(raw_code)?;
    // Missing, zero or blank means the default seat count
    let players = match players_needed.as_ref().map(LooseCount::value) {
        None | Some(Some(0)) => PLAYERS_NEEDED as u32,
        Some(Some(n)) => n,
        Some(None) => return Err(RoomError::UnsupportedPlayerCount),
    };
    if players != PLAYERS_NEEDED as u32 {
        return Err(RoomError::UnsupportedPlayerCount);
    }
    let target = points_target
        .as_ref()
        .and_then(LooseCount::value)
        .filter(|&t| t > 0)
        .unwrap_or(state.config.default_target_score);

    match state.rooms.entry(code.clone()) {
        Entry::Occupied(_) => Err(RoomError::CodeTaken),
        Entry::Vacant(slot) => {
            let room = slot.insert(GameRoom::new(code.clone(), conn, target));
            state.player_rooms.insert(conn, code.clone());
            info!(%code, %conn, target, "Room created");

            state.send_to_player(conn, ServerMessage::Init { player_id: 0 });
            state.deliver(room.room_update());
            Ok(())
        }
    }
}

fn join_room(conn: Uuid, raw_code: &str, state: &Arc<ServerState>) -> Result<(), RoomError> {
    if state.player_rooms.contains_key(&conn) {
        return Err(RoomError::AlreadySeated);
    }
    let code = normalize_code(raw_code);
    let mut room = state.rooms.get_mut(&code).ok_or(RoomError::NotFound)?;
    let seat = room.add_player(conn)?;
    state.player_rooms.insert(conn, code.clone());
    info!(%code, %conn, seat, "Player joined");

    state.send_to_player(conn, ServerMessage::Init { player_id: seat });
    state.send_to_player(conn, ServerMessage::JoinOk { code });
    state.deliver(room.room_update());
    Ok(())
}

/// Deal the next round after the reveal delay, unless the room has moved on.
fn schedule_next_round(state: &Arc<ServerState>, room: &mut GameRoom, round_id: u32) {
    let delay = state.config.next_round_delay;
    let code = room.code.clone();
    let room_id = room.id;
    let task_state = Arc::clone(state);

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let Some(mut room) = task_state.rooms.get_mut(&code) else {
            debug!(%code, "Room gone before next round");
            return;
        };
        if room.id != room_id {
            return;
        }
        match room.start_scheduled_round(round_id) {
            Some(envelopes) => {
                info!(%code, round_id = round_id + 1, "Next round dealt");
                task_state.deliver(envelopes);
            }
            None => debug!(%code, round_id, "Scheduled round no longer applies"),
        }
    });
    room.set_pending_start(handle);
}

/// Handle connection disconnect.
pub fn handle_disconnect(conn: Uuid, state: &Arc<ServerState>) {
    let Some((_, code)) = state.player_rooms.remove(&conn) else {
        return;
    };

    let now_empty = match state.rooms.get_mut(&code) {
        Some(mut room) => match room.remove_player(conn) {
            Ok(true) => true,
            Ok(false) => {
                info!(%code, %conn, "Player left, round discarded");
                state.deliver(room.room_update());
                false
            }
            Err(e) => {
                warn!(%code, %conn, "Disconnect from room: {}", e);
                false
            }
        },
        None => false,
    };

    if now_empty && state.rooms.remove_if(&code, |_, room| room.is_empty()).is_some() {
        info!(%code, "Room closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gin_core::{Card, TurnPhase};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn test_state(delay_ms: u64) -> Arc<ServerState> {
        Arc::new(ServerState::new(ServerConfig {
            next_round_delay: Duration::from_millis(delay_ms),
            ..ServerConfig::default()
        }))
    }

    fn connect(state: &Arc<ServerState>) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.player_senders.insert(conn, tx);
        (conn, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn create(code: &str) -> ClientMessage {
        ClientMessage::CreateRoom {
            code: code.into(),
            players_needed: None,
            points_target: None,
        }
    }

    fn join(code: &str) -> ClientMessage {
        ClientMessage::JoinRoom { code: code.into() }
    }

    fn join_error(msgs: &[ServerMessage]) -> Option<&str> {
        msgs.iter().find_map(|m| match m {
            ServerMessage::JoinError { message } => Some(message.as_str()),
            _ => None,
        })
    }

    fn round_id(state: &ServerState, code: &str) -> Option<u32> {
        state
            .rooms
            .get(code)
            .and_then(|r| r.game.as_ref().map(|g| g.round_id()))
    }

    /// Two seated players with round 1 dealt in room ABCD
    fn started(
        state: &Arc<ServerState>,
    ) -> (
        (Uuid, mpsc::UnboundedReceiver<ServerMessage>),
        (Uuid, mpsc::UnboundedReceiver<ServerMessage>),
    ) {
        let (mut host, mut guest) = (connect(state), connect(state));
        handle_message(host.0, create("abcd"), state);
        handle_message(guest.0, join("abcd"), state);
        handle_message(host.0, ClientMessage::StartGame { code: "ABCD".into() }, state);
        drain(&mut host.1);
        drain(&mut guest.1);
        (host, guest)
    }

    /// Seat 0 holds a gin, seat 1 a clean club run
    fn rig_gin(state: &ServerState) {
        let mut room = state.rooms.get_mut("ABCD").unwrap();
        let game = room.game.as_mut().unwrap();
        let gin: Vec<Card> = [
            "A♠", "2♠", "3♠", "4♠", "5♥", "6♥", "7♥", "J♦", "Q♦", "K♦", "9♠",
        ]
        .iter()
        .map(|id| id.parse().unwrap())
        .collect();
        let mut pool: Vec<Card> = gin_core::build_standard_deck()
            .into_iter()
            .filter(|c| !gin.contains(c))
            .collect();
        game.round.hands[1] = pool.split_off(pool.len() - 10);
        game.round.discard_pile = pool.split_off(pool.len() - 1);
        game.round.deck = pool;
        game.round.hands[0] = gin;
        game.round.current_player = 0;
        game.round.phase = TurnPhase::Discard;
    }

    #[test]
    fn test_create_and_join_flow() {
        let state = test_state(10);
        let (host, mut host_rx) = connect(&state);
        let (guest, mut guest_rx) = connect(&state);

        handle_message(host, create(" abcd "), &state);
        let msgs = drain(&mut host_rx);
        assert!(matches!(msgs[0], ServerMessage::Init { player_id: 0 }));
        assert!(matches!(
            msgs[1],
            ServerMessage::RoomUpdate {
                joined: 1,
                needed: 2,
                ..
            }
        ));

        handle_message(guest, join("ABCD"), &state);
        let msgs = drain(&mut guest_rx);
        assert!(matches!(msgs[0], ServerMessage::Init { player_id: 1 }));
        assert!(matches!(&msgs[1], ServerMessage::JoinOk { code } if code == "ABCD"));
        assert!(matches!(msgs[2], ServerMessage::RoomUpdate { joined: 2, .. }));
        assert!(matches!(
            drain(&mut host_rx)[..],
            [ServerMessage::RoomUpdate { joined: 2, .. }]
        ));
    }

    #[test]
    fn test_protocol_errors() {
        let state = test_state(10);
        let (a, mut a_rx) = connect(&state);
        let (b, mut b_rx) = connect(&state);
        let (c, mut c_rx) = connect(&state);

        handle_message(a, create("ab"), &state);
        assert_eq!(join_error(&drain(&mut a_rx)), Some("Invalid room code."));

        handle_message(
            a,
            ClientMessage::CreateRoom {
                code: "ABCD".into(),
                players_needed: Some(4.into()),
                points_target: None,
            },
            &state,
        );
        assert_eq!(
            join_error(&drain(&mut a_rx)),
            Some("4-player not supported yet (2-player only for now).")
        );

        handle_message(a, create("ABCD"), &state);
        drain(&mut a_rx);
        handle_message(a, create("WXYZ"), &state);
        assert_eq!(
            join_error(&drain(&mut a_rx)),
            Some("You are already in a room.")
        );

        handle_message(b, create("abcd"), &state);
        assert_eq!(
            join_error(&drain(&mut b_rx)),
            Some("Code already exists. Try again.")
        );

        handle_message(b, join("nope"), &state);
        assert_eq!(join_error(&drain(&mut b_rx)), Some("Room not found."));

        handle_message(a, ClientMessage::StartGame { code: "abcd".into() }, &state);
        assert_eq!(
            join_error(&drain(&mut a_rx)),
            Some("Need more players to start.")
        );

        handle_message(b, join("abcd"), &state);
        drain(&mut b_rx);
        handle_message(c, join("abcd"), &state);
        assert_eq!(join_error(&drain(&mut c_rx)), Some("Room is full."));
    }

    /// Feed a raw text frame through the same path a socket uses
    fn send_text(state: &Arc<ServerState>, conn: Uuid, text: &str) {
        let msg = serde_json::from_str::<ClientMessage>(text).unwrap();
        handle_message(conn, msg, state);
    }

    #[test]
    fn test_malformed_requests_get_join_error() {
        let state = test_state(10);
        let (a, mut a_rx) = connect(&state);
        let (b, mut b_rx) = connect(&state);

        send_text(&state, a, r#"{"type":"create_room"}"#);
        assert_eq!(join_error(&drain(&mut a_rx)), Some("Invalid room code."));

        send_text(&state, a, r#"{"type":"create_room","code":"ABCD","playersNeeded":"4"}"#);
        assert_eq!(
            join_error(&drain(&mut a_rx)),
            Some("4-player not supported yet (2-player only for now).")
        );

        send_text(&state, a, r#"{"type":"create_room","code":"ABCD","playersNeeded":"lots"}"#);
        assert_eq!(
            join_error(&drain(&mut a_rx)),
            Some("4-player not supported yet (2-player only for now).")
        );

        send_text(&state, b, r#"{"type":"join_room"}"#);
        assert_eq!(join_error(&drain(&mut b_rx)), Some("Room not found."));

        send_text(
            &state,
            a,
            r#"{"type":"create_room","code":"abcd","playersNeeded":"2","pointsTarget":"50"}"#,
        );
        assert!(join_error(&drain(&mut a_rx)).is_none());
        assert_eq!(state.rooms.get("ABCD").unwrap().target_score, 50);
    }

    #[test]
    fn test_custom_target_score() {
        let state = test_state(10);
        let (host, _host_rx) = connect(&state);
        let (guest, _guest_rx) = connect(&state);
        handle_message(
            host,
            ClientMessage::CreateRoom {
                code: "ABCD".into(),
                players_needed: Some(2.into()),
                points_target: Some(50.into()),
            },
            &state,
        );
        handle_message(guest, join("ABCD"), &state);
        handle_message(host, ClientMessage::StartGame { code: "ABCD".into() }, &state);

        let room = state.rooms.get("ABCD").unwrap();
        assert_eq!(room.game.as_ref().unwrap().match_state.target_score, 50);
    }

    #[test]
    fn test_guest_cannot_start() {
        let state = test_state(10);
        let (host, _host_rx) = connect(&state);
        let (guest, mut guest_rx) = connect(&state);
        handle_message(host, create("ABCD"), &state);
        handle_message(guest, join("ABCD"), &state);
        drain(&mut guest_rx);

        handle_message(guest, ClientMessage::StartGame { code: "ABCD".into() }, &state);
        assert!(drain(&mut guest_rx).is_empty());
        assert_eq!(round_id(&state, "ABCD"), None);
    }

    #[tokio::test]
    async fn test_out_of_turn_action_is_silent() {
        let state = test_state(10);
        let ((_, mut host_rx), (guest, mut guest_rx)) = started(&state);

        handle_message(guest, ClientMessage::DrawDeck, &state);
        assert!(drain(&mut host_rx).is_empty());
        assert!(drain(&mut guest_rx).is_empty());
    }

    #[tokio::test]
    async fn test_gin_then_next_round_after_delay() {
        let state = test_state(20);
        let ((host, mut host_rx), (_, mut guest_rx)) = started(&state);
        rig_gin(&state);

        handle_message(host, ClientMessage::Gin, &state);
        let msgs = drain(&mut guest_rx);
        assert!(matches!(msgs[0], ServerMessage::RoundEnd(_)));
        assert!(matches!(msgs[1], ServerMessage::RoundReveal { .. }));
        assert!(matches!(&msgs[2], ServerMessage::State(v) if v.round_over));
        drain(&mut host_rx);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(round_id(&state, "ABCD"), Some(2));
        let msgs = drain(&mut host_rx);
        assert!(matches!(
            msgs.last(),
            Some(ServerMessage::State(v)) if v.round_id == 2 && !v.round_over
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_next_round() {
        let state = test_state(20);
        let ((host, _host_rx), (guest, mut guest_rx)) = started(&state);
        rig_gin(&state);
        handle_message(host, ClientMessage::Gin, &state);
        drain(&mut guest_rx);

        handle_disconnect(host, &state);
        assert!(matches!(
            drain(&mut guest_rx)[..],
            [ServerMessage::RoomUpdate { joined: 1, .. }]
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(round_id(&state, "ABCD"), None);
        assert!(drain(&mut guest_rx).is_empty());

        // Last one out closes the room
        handle_disconnect(guest, &state);
        assert!(state.rooms.get("ABCD").is_none());
    }

    #[tokio::test]
    async fn test_rematch_preempts_scheduled_round() {
        let state = test_state(100);
        let ((host, _host_rx), (guest, _guest_rx)) = started(&state);
        rig_gin(&state);
        handle_message(host, ClientMessage::Gin, &state);

        handle_message(guest, ClientMessage::Rematch, &state);
        assert_eq!(round_id(&state, "ABCD"), Some(1));
        handle_message(host, ClientMessage::Rematch, &state);
        assert_eq!(round_id(&state, "ABCD"), Some(2));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(round_id(&state, "ABCD"), Some(2));
        let room = state.rooms.get("ABCD").unwrap();
        assert_eq!(room.game.as_ref().unwrap().match_state.scores, [0, 0]);
    }

    #[tokio::test]
    async fn test_discard_by_card_id() {
        let state = test_state(10);
        let ((host, mut host_rx), _guest) = started(&state);

        handle_message(host, ClientMessage::DrawDeck, &state);
        drain(&mut host_rx);
        let card = {
            let room = state.rooms.get("ABCD").unwrap();
            room.game.as_ref().unwrap().hand(0)[0]
        };

        handle_message(
            host,
            ClientMessage::Discard {
                card_id: card.id(),
            },
            &state,
        );
        let msgs = drain(&mut host_rx);
        assert!(matches!(
            msgs.last(),
            Some(ServerMessage::State(v)) if v.discard_top == Some(card) && !v.your_turn
        ));
        assert_eq!(
            state.rooms.get("ABCD").unwrap().game.as_ref().unwrap().current_player(),
            1
        );
    }
}
