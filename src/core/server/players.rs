use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::query::query_full_stat;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::{BotEntry, ServerEndpoint};

/// One player as reported by the server API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub achievements: u32,
    /// Seconds.
    #[serde(default)]
    pub server_play_time: u64,
    #[serde(default)]
    pub head_url: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

/// Where a player list came from. Only the API reports real stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayersSource {
    Api,
    Query,
    #[default]
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlinePlayers {
    pub players: Vec<PlayerRecord>,
    pub online: u32,
    pub max: u32,
    #[serde(default)]
    pub source: PlayersSource,
}

impl OnlinePlayers {
    /// Records worth copying onto stored profiles: real players from the API.
    /// Query results carry names only, so they yield nothing.
    pub fn server_stats(&self) -> Vec<PlayerRecord> {
        if self.source != PlayersSource::Api {
            return Vec::new();
        }
        self.players.iter().filter(|p| !p.is_bot).cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    players: Vec<PlayerRecord>,
    #[serde(default)]
    online: u32,
    #[serde(default)]
    max: u32,
}

/// Asks the server who is online: HTTP API first, datagram query second,
/// an empty list last. Never fails.
pub struct PlayersClient {
    client: reqwest::Client,
    server: ServerEndpoint,
    api_timeout: Duration,
    query_timeout: Duration,
    bot: Option<BotEntry>,
}

impl PlayersClient {
    pub fn new(
        client: reqwest::Client,
        server: ServerEndpoint,
        api_timeout: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            client,
            server,
            api_timeout,
            query_timeout,
            bot: None,
        }
    }

    pub fn with_bot(mut self, bot: Option<BotEntry>) -> Self {
        self.bot = bot;
        self
    }

    pub async fn online_players(&self) -> OnlinePlayers {
        let mut result = match self.from_api().await {
            Ok(players) => players,
            Err(e) => {
                warn!(error = %e, "player API unreachable, trying server query");
                match self.from_query().await {
                    Ok(players) => players,
                    Err(e) => {
                        warn!(error = %e, "server query failed, reporting no players");
                        OnlinePlayers::default()
                    }
                }
            }
        };

        if let Some(bot) = &self.bot {
            prepend_bot(&mut result.players, bot);
        }
        result
    }

    async fn from_api(&self) -> LauncherResult<OnlinePlayers> {
        let url = self.server.players_api_url();
        debug!(url = %url, "requesting player API");
        let response = self
            .client
            .get(&url)
            .timeout(self.api_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let body: ApiResponse = response.json().await?;
        if !body.success {
            return Err(LauncherError::PlayersUnavailable("API reported failure".into()));
        }

        let players: Vec<PlayerRecord> = body
            .players
            .into_iter()
            .map(|mut p| {
                if p.head_url.as_deref().map_or(true, str::is_empty) {
                    p.head_url = Some(head_url_for_uuid(&p.uuid));
                }
                p
            })
            .collect();

        info!(players = players.len(), online = body.online, "player API answered");
        Ok(OnlinePlayers {
            players,
            online: body.online,
            max: body.max,
            source: PlayersSource::Api,
        })
    }

    async fn from_query(&self) -> LauncherResult<OnlinePlayers> {
        let addr = format!("{}:{}", self.server.host, self.server.query_port);
        let stats = query_full_stat(&addr, self.query_timeout).await?;

        let players = stats
            .players
            .into_iter()
            .map(|name| PlayerRecord {
                head_url: Some(head_url_for_name(&name)),
                name,
                uuid: String::new(),
                online: true,
                achievements: 0,
                server_play_time: 0,
                is_bot: false,
            })
            .collect();

        Ok(OnlinePlayers {
            players,
            online: stats.online,
            max: stats.max,
            source: PlayersSource::Query,
        })
    }
}

fn head_url_for_uuid(uuid: &str) -> String {
    format!("https://mc-heads.net/avatar/{}/32", uuid.replace('-', ""))
}

fn head_url_for_name(name: &str) -> String {
    format!("https://mc-heads.net/avatar/{}/32", urlencoding::encode(name))
}

fn prepend_bot(players: &mut Vec<PlayerRecord>, bot: &BotEntry) {
    let present = players.iter().any(|p| p.is_bot || p.name.contains(&bot.name));
    if present {
        return;
    }
    players.insert(
        0,
        PlayerRecord {
            name: bot.name.clone(),
            uuid: String::new(),
            online: true,
            achievements: 0,
            server_play_time: 0,
            head_url: Some(bot.head_url.clone()),
            is_bot: true,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server::query::tests::full_stat_response;
    use crate::core::test_support::{ok, serve_routes, serve_silent};
    use tokio::net::UdpSocket;

    fn port_of(base: &str) -> u16 {
        base.rsplit(':').next().unwrap().parse().unwrap()
    }

    fn client_for(api_port: u16, query_port: u16) -> PlayersClient {
        let http = crate::core::http::build_http_client(Duration::from_secs(1)).unwrap();
        PlayersClient::new(
            http,
            ServerEndpoint {
                host: "127.0.0.1".into(),
                game_port: 30081,
                query_port,
                api_port,
            },
            Duration::from_millis(300),
            Duration::from_millis(300),
        )
        .with_bot(Some(BotEntry::default()))
    }

    /// A bound socket that never answers.
    async fn silent_udp() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[tokio::test]
    async fn api_players_get_default_heads_and_bot() {
        let body = r#"{ "success": true, "online": 1, "max": 20, "players": [
            { "name": "Steve", "uuid": "0bd9fcb2-a1b6-c8ab-6eef-4a4a3e82d6c4", "online": true,
              "achievements": 4, "serverPlayTime": 3600 }
        ] }"#;
        let base = serve_routes(vec![("/api/players".into(), ok(body))]).await;
        let (_udp, query_port) = silent_udp().await;

        let result = client_for(port_of(&base), query_port).online_players().await;

        assert_eq!(result.source, PlayersSource::Api);
        assert_eq!(result.online, 1);
        assert_eq!(result.max, 20);
        assert_eq!(result.players.len(), 2);
        assert!(result.players[0].is_bot);
        assert_eq!(result.players[0].name, "Angella");
        let steve = &result.players[1];
        assert_eq!(steve.server_play_time, 3600);
        assert_eq!(
            steve.head_url.as_deref(),
            Some("https://mc-heads.net/avatar/0bd9fcb2a1b6c8ab6eef4a4a3e82d6c4/32")
        );
    }

    #[tokio::test]
    async fn unresponsive_api_and_query_yield_only_bot() {
        let base = serve_silent().await;
        let (_udp, query_port) = silent_udp().await;

        let result = client_for(port_of(&base), query_port).online_players().await;

        assert_eq!(result.source, PlayersSource::Unavailable);
        assert_eq!(result.online, 0);
        assert_eq!(result.max, 0);
        assert_eq!(result.players.len(), 1);
        assert!(result.server_stats().is_empty());
        assert!(result.players[0].is_bot);
    }

    #[tokio::test]
    async fn failed_api_falls_back_to_query() {
        let base = serve_routes(vec![("/api/players".into(), ok(r#"{ "success": false }"#))]).await;
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query_port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            let session = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
            let mut reply = vec![0x09];
            reply.extend_from_slice(&session.to_be_bytes());
            reply.extend_from_slice(b"77\x00");
            server.send_to(&reply, peer).await.unwrap();
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            server
                .send_to(&full_stat_response(session, 1, 10, &["Alex"]), peer)
                .await
                .unwrap();
        });

        let result = client_for(port_of(&base), query_port).online_players().await;

        assert_eq!(result.source, PlayersSource::Query);
        assert!(result.server_stats().is_empty());
        assert_eq!(result.online, 1);
        assert_eq!(result.max, 10);
        let names: Vec<&str> = result.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Angella", "Alex"]);
        assert_eq!(
            result.players[1].head_url.as_deref(),
            Some("https://mc-heads.net/avatar/Alex/32")
        );
    }

    #[test]
    fn bot_is_not_duplicated() {
        let bot = BotEntry::default();
        let mut players = Vec::new();
        prepend_bot(&mut players, &bot);
        prepend_bot(&mut players, &bot);
        assert_eq!(players.len(), 1);
    }

    #[test]
    fn names_are_percent_encoded() {
        assert_eq!(head_url_for_name("a b"), "https://mc-heads.net/avatar/a%20b/32");
        assert_eq!(head_url_for_name("Steve_01"), "https://mc-heads.net/avatar/Steve_01/32");
    }

    #[test]
    fn only_api_lists_carry_stats() {
        let steve = PlayerRecord {
            name: "Steve".into(),
            uuid: "0bd9fcb2-a1b6-c8ab-6eef-4a4a3e82d6c4".into(),
            online: true,
            achievements: 7,
            server_play_time: 60,
            head_url: None,
            is_bot: false,
        };
        let mut bot = steve.clone();
        bot.name = "Angella".into();
        bot.is_bot = true;

        let mut list = OnlinePlayers {
            players: vec![bot, steve.clone()],
            online: 1,
            max: 20,
            source: PlayersSource::Api,
        };
        assert_eq!(list.server_stats(), vec![steve]);

        list.source = PlayersSource::Query;
        assert!(list.server_stats().is_empty());
    }
}
