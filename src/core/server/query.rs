// ─── Server Query ───
// Datagram "full stat" query spoken by the game server's query listener:
// a handshake returns a challenge token, which the stat request echoes back.

use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
/// `type` byte plus session id precede every response payload.
const RESPONSE_HEADER_LEN: usize = 5;
/// `splitnum\0\x80\0` padding before the key/value section.
const FULL_STAT_PADDING: usize = 11;
const PLAYER_SECTION_MARKER: &[u8] = b"\x01player_\x00\x00";

/// What the full stat response says about players.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub online: u32,
    pub max: u32,
    pub players: Vec<String>,
}

pub fn handshake_request(session_id: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(7);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_HANDSHAKE);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet
}

pub fn full_stat_request(session_id: u32, token: i32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(15);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_STAT);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet.extend_from_slice(&token.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet
}

/// The challenge token is sent as a NUL-terminated decimal string.
pub fn parse_challenge(response: &[u8]) -> LauncherResult<i32> {
    let invalid = || LauncherError::PlayersUnavailable("malformed query handshake".into());
    let body = response.get(RESPONSE_HEADER_LEN..).ok_or_else(invalid)?;
    let digits = body.split(|b| *b == 0).next().ok_or_else(invalid)?;
    let text = std::str::from_utf8(digits).map_err(|_| invalid())?;
    // tokens above i32::MAX wrap, matching how servers read them back
    text.trim()
        .parse::<i64>()
        .map(|t| t as i32)
        .map_err(|_| invalid())
}

pub fn parse_full_stat(response: &[u8]) -> LauncherResult<QueryStats> {
    let start = RESPONSE_HEADER_LEN + FULL_STAT_PADDING;
    if response.len() < start || response.first() != Some(&TYPE_STAT) {
        return Err(LauncherError::PlayersUnavailable("malformed full stat response".into()));
    }
    let body = &response[start..];

    let (kv_section, player_section) = match find(body, PLAYER_SECTION_MARKER) {
        Some(pos) => (&body[..pos], &body[pos + PLAYER_SECTION_MARKER.len()..]),
        None => (body, &[][..]),
    };

    let mut stats = QueryStats::default();
    let mut fields = kv_section.split(|b| *b == 0);
    while let Some(key) = fields.next() {
        if key.is_empty() {
            break;
        }
        let value = fields.next().unwrap_or_default();
        let value = String::from_utf8_lossy(value);
        match key {
            b"numplayers" => stats.online = value.trim().parse().unwrap_or(0),
            b"maxplayers" => stats.max = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    for name in player_section.split(|b| *b == 0).filter(|n| !n.is_empty()) {
        let name = String::from_utf8_lossy(name).into_owned();
        if !stats.players.contains(&name) {
            stats.players.push(name);
        }
    }

    Ok(stats)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Handshake and full stat exchange against `addr`, bounded by `limit` overall.
pub async fn query_full_stat(addr: &str, limit: Duration) -> LauncherResult<QueryStats> {
    tokio::time::timeout(limit, exchange(addr))
        .await
        .map_err(|_| LauncherError::PlayersUnavailable(format!("query to {addr} timed out")))?
}

async fn exchange(addr: &str) -> LauncherResult<QueryStats> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(addr).await?;
    // servers only keep the low nibble of each byte
    let session_id = rand_session_id() & 0x0F0F_0F0F;

    socket.send(&handshake_request(session_id)).await?;
    let mut buf = vec![0u8; 4096];
    let n = socket.recv(&mut buf).await?;
    let token = parse_challenge(&buf[..n])?;
    debug!(addr, token, "query challenge received");

    socket.send(&full_stat_request(session_id, token)).await?;
    let n = socket.recv(&mut buf).await?;
    parse_full_stat(&buf[..n])
}

fn rand_session_id() -> u32 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
