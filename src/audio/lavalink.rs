//! Client for a Lavalink v4 audio node.
//!
//! The node owns decoding and streaming. This side loads tracks over REST,
//! pushes player state (`PATCH /v4/sessions/{session}/players/{guild}`) and
//! listens on the node's websocket for the session id, position updates and
//! track events.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message as WsMessage},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::LavalinkSettings;

const CLIENT_NAME: &str = concat!("mapache-bot/", env!("CARGO_PKG_VERSION"));
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub encoded: String,
    pub info: TrackInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Duración en milisegundos
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub source_name: String,
}

impl Track {
    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn uri(&self) -> &str {
        self.info.uri.as_deref().unwrap_or("")
    }

    pub fn duration(&self) -> Option<Duration> {
        (!self.info.is_stream).then(|| Duration::from_millis(self.info.length))
    }
}

impl crate::prompt::Candidate for Track {
    fn label(&self) -> String {
        self.info.title.clone()
    }
}

/// Respuesta de `GET /v4/loadtracks`
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
pub enum LoadResult {
    Track(Track),
    Playlist(PlaylistData),
    Search(Vec<Track>),
    Empty(serde_json::Value),
    Error(NodeException),
}

#[derive(Debug, Deserialize)]
pub struct PlaylistData {
    pub info: PlaylistInfo,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeException {
    pub message: Option<String>,
    pub severity: String,
    #[serde(default)]
    pub cause: String,
}

impl std::fmt::Display for NodeException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({})", message, self.severity),
            None => write!(f, "{} ({})", self.cause, self.severity),
        }
    }
}

/// Cuerpo de `PATCH /v4/sessions/{session}/players/{guild}`
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdateTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceServer>,
}

/// `encoded: None` is sent as `null`, which stops the current track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateTrack {
    pub encoded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceServer {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

impl UpdatePlayer {
    pub fn play(track: &Track, volume: u16) -> Self {
        Self {
            track: Some(UpdateTrack {
                encoded: Some(track.encoded.clone()),
            }),
            paused: Some(false),
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            track: Some(UpdateTrack { encoded: None }),
            ..Default::default()
        }
    }
}

/// Mensajes del websocket del nodo
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum NodeMessage {
    #[serde(rename_all = "camelCase")]
    Ready { resumed: bool, session_id: String },
    #[serde(rename_all = "camelCase")]
    PlayerUpdate { guild_id: String, state: PlayerState },
    Event(NodeEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub position: u64,
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    #[serde(rename = "TrackStartEvent", rename_all = "camelCase")]
    TrackStart { guild_id: String, track: Track },
    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: String,
        track: Track,
        reason: TrackEndReason,
    },
    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: String,
        exception: NodeException,
    },
    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck { guild_id: String, threshold_ms: u64 },
    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: String,
        code: u16,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the queue should advance after a track ended this way.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

/// Parses the guild id the node sends as a decimal string.
pub fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

/// REST side of an audio node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult>;

    async fn update_player(&self, guild_id: GuildId, update: UpdatePlayer) -> Result<()>;

    async fn destroy_player(&self, guild_id: GuildId) -> Result<()>;
}

pub struct LavalinkNode {
    http: reqwest::Client,
    rest_base: Url,
    ws_url: Url,
    password: String,
    user_id: UserId,
    session_id: RwLock<Option<String>>,
}

impl LavalinkNode {
    pub fn new(settings: &LavalinkSettings, user_id: UserId) -> Result<Self> {
        let (http_scheme, ws_scheme) = if settings.secure {
            ("https", "wss")
        } else {
            ("http", "ws")
        };

        let rest_base = Url::parse(&format!(
            "{}://{}:{}/v4/",
            http_scheme, settings.host, settings.port
        ))
        .context("Dirección de Lavalink inválida")?;
        let ws_url = Url::parse(&format!(
            "{}://{}:{}/v4/websocket",
            ws_scheme, settings.host, settings.port
        ))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        info!("🎼 Nodo Lavalink configurado en {}:{}", settings.host, settings.port);

        Ok(Self {
            http,
            rest_base,
            ws_url,
            password: settings.password.clone(),
            user_id,
            session_id: RwLock::new(None),
        })
    }

    fn session_id(&self) -> Result<String> {
        self.session_id
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("El nodo de audio aún no está conectado"))
    }

    fn player_url(&self, guild_id: GuildId) -> Result<Url> {
        let session = self.session_id()?;
        Ok(self
            .rest_base
            .join(&format!("sessions/{}/players/{}", session, guild_id))?)
    }

    /// Keeps the websocket connected until `shutdown` fires, forwarding every
    /// node message to `events`.
    pub async fn run(
        self: Arc<Self>,
        events: mpsc::UnboundedSender<NodeMessage>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.connect_and_listen(&events) => {
                    if let Err(e) = result {
                        warn!("🔌 Conexión con Lavalink perdida: {:#}", e);
                    }
                }
            }

            self.session_id.write().take();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {
                    info!("🔄 Reintentando conexión con Lavalink...");
                }
            }
        }

        info!("👋 Cliente de Lavalink detenido");
    }

    async fn connect_and_listen(&self, events: &mpsc::UnboundedSender<NodeMessage>) -> Result<()> {
        let mut request = self.ws_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("authorization", HeaderValue::from_str(&self.password)?);
        headers.insert("user-id", HeaderValue::from_str(&self.user_id.to_string())?);
        headers.insert("client-name", HeaderValue::from_static(CLIENT_NAME));

        let (mut ws, _) = connect_async(request)
            .await
            .context("No se pudo conectar al websocket de Lavalink")?;
        info!("✅ Conectado a Lavalink");

        while let Some(frame) = ws.next().await {
            match frame? {
                WsMessage::Text(text) => {
                    let message = match serde_json::from_str::<NodeMessage>(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            debug!("Mensaje de Lavalink no reconocido: {} ({})", text, e);
                            continue;
                        }
                    };

                    if let NodeMessage::Ready {
                        resumed,
                        session_id,
                    } = &message
                    {
                        info!("🎼 Sesión de Lavalink {} (reanudada: {})", session_id, resumed);
                        *self.session_id.write() = Some(session_id.clone());
                    }

                    if events.send(message).is_err() {
                        anyhow::bail!("Receptor de eventos cerrado");
                    }
                }
                WsMessage::Close(frame) => {
                    anyhow::bail!("Lavalink cerró el websocket: {:?}", frame);
                }
                _ => {}
            }
        }

        anyhow::bail!("El websocket de Lavalink terminó")
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult> {
        let url = self.rest_base.join("loadtracks")?;
        let result = self
            .http
            .get(url)
            .header("Authorization", &self.password)
            .query(&[("identifier", identifier)])
            .send()
            .await
            .context("Error al buscar tracks en Lavalink")?
            .error_for_status()?
            .json::<LoadResult>()
            .await?;

        Ok(result)
    }

    async fn update_player(&self, guild_id: GuildId, update: UpdatePlayer) -> Result<()> {
        let url = self.player_url(guild_id)?;
        self.http
            .patch(url)
            .header("Authorization", &self.password)
            .query(&[("noReplace", "false")])
            .json(&update)
            .send()
            .await
            .context("Error al actualizar el reproductor en Lavalink")?
            .error_for_status()?;

        Ok(())
    }

    async fn destroy_player(&self, guild_id: GuildId) -> Result<()> {
        let url = self.player_url(guild_id)?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", &self.password)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                "Lavalink respondió {} al destruir el reproductor de {}",
                response.status(),
                guild_id
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACK: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Rick Astley - Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    #[test]
    fn search_result_is_a_track_list() {
        let raw = format!(r#"{{"loadType":"search","data":[{}]}}"#, TRACK);
        match serde_json::from_str::<LoadResult>(&raw).unwrap() {
            LoadResult::Search(tracks) => {
                assert_eq!(tracks.len(), 1);
                assert_eq!(tracks[0].title(), "Rick Astley - Never Gonna Give You Up");
                assert_eq!(tracks[0].duration(), Some(Duration::from_secs(212)));
            }
            other => panic!("resultado inesperado: {:?}", other),
        }
    }

    #[test]
    fn empty_and_error_results() {
        let empty = serde_json::from_str::<LoadResult>(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(matches!(empty, LoadResult::Empty(_)));

        let raw = r#"{"loadType":"error","data":{"message":"Video unavailable","severity":"common","cause":"x"}}"#;
        match serde_json::from_str::<LoadResult>(raw).unwrap() {
            LoadResult::Error(e) => assert_eq!(e.to_string(), "Video unavailable (common)"),
            other => panic!("resultado inesperado: {:?}", other),
        }
    }

    #[test]
    fn playlist_result_keeps_name() {
        let raw = format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"Mix","selectedTrack":-1}},"pluginInfo":{{}},"tracks":[{}]}}}}"#,
            TRACK
        );
        match serde_json::from_str::<LoadResult>(&raw).unwrap() {
            LoadResult::Playlist(playlist) => {
                assert_eq!(playlist.info.name, "Mix");
                assert_eq!(playlist.tracks.len(), 1);
            }
            other => panic!("resultado inesperado: {:?}", other),
        }
    }

    #[test]
    fn node_messages_are_decoded() {
        let ready: NodeMessage =
            serde_json::from_str(r#"{"op":"ready","resumed":false,"sessionId":"abc"}"#).unwrap();
        assert!(matches!(ready, NodeMessage::Ready { ref session_id, .. } if session_id == "abc"));

        let update: NodeMessage = serde_json::from_str(
            r#"{"op":"playerUpdate","guildId":"123","state":{"time":1,"position":5000,"connected":true,"ping":20}}"#,
        )
        .unwrap();
        assert!(matches!(update, NodeMessage::PlayerUpdate { state, .. } if state.position == 5000));

        let stats: NodeMessage = serde_json::from_str(r#"{"op":"stats","players":1}"#).unwrap();
        assert!(matches!(stats, NodeMessage::Other));
    }

    #[test]
    fn track_end_event_carries_reason() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"123","track":{},"reason":"finished"}}"#,
            TRACK
        );
        match serde_json::from_str::<NodeMessage>(&raw).unwrap() {
            NodeMessage::Event(NodeEvent::TrackEnd { guild_id, reason, .. }) => {
                assert_eq!(parse_guild_id(&guild_id), Some(GuildId::new(123)));
                assert!(reason.may_start_next());
            }
            other => panic!("mensaje inesperado: {:?}", other),
        }
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
    }

    #[test]
    fn stop_update_sends_null_track() {
        let body = serde_json::to_value(UpdatePlayer::stop()).unwrap();
        assert_eq!(body, serde_json::json!({ "track": { "encoded": null } }));
    }
}
