use anyhow::Result;
use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    lavalink::{parse_guild_id, AudioNode, LoadResult, NodeEvent, NodeMessage, Track, UpdatePlayer, VoiceServer},
    queue::{MusicQueue, QueueItem},
};

/// Estado de reproducción de un servidor
#[derive(Debug)]
pub struct GuildPlayer {
    pub queue: MusicQueue,
    pub volume: u16,
    pub paused: bool,
    /// Posición reportada por el nodo, en milisegundos
    pub position: u64,
    /// Canal de texto donde se anuncian las canciones
    pub text_channel: Option<ChannelId>,
}

/// A track that just started, to be announced in `channel_id`.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub channel_id: ChannelId,
    pub item: QueueItem,
}

pub struct PlayerManager {
    node: Arc<dyn AudioNode>,
    players: DashMap<GuildId, Arc<RwLock<GuildPlayer>>>,
    max_queue_size: usize,
}

impl PlayerManager {
    pub fn new(node: Arc<dyn AudioNode>, max_queue_size: usize) -> Self {
        Self {
            node,
            players: DashMap::new(),
            max_queue_size,
        }
    }

    /// Crea el reproductor del servidor con la configuración guardada,
    /// si todavía no existe.
    pub fn ensure(&self, guild_id: GuildId, volume: u16, shuffle: bool) -> Arc<RwLock<GuildPlayer>> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🎛️ Reproductor creado para guild {}", guild_id);
                let mut queue = MusicQueue::new(self.max_queue_size);
                queue.set_shuffle(shuffle);
                Arc::new(RwLock::new(GuildPlayer {
                    queue,
                    volume,
                    paused: false,
                    position: 0,
                    text_channel: None,
                }))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<RwLock<GuildPlayer>>> {
        self.players.get(&guild_id).map(|player| player.clone())
    }

    fn require(&self, guild_id: GuildId) -> Result<Arc<RwLock<GuildPlayer>>> {
        self.get(guild_id)
            .ok_or_else(|| anyhow::anyhow!("No hay reproductor activo en este servidor"))
    }

    /// Busca tracks en el nodo. Lo que no es una URL se busca en YouTube.
    pub async fn search(&self, query: &str) -> Result<LoadResult> {
        self.node.load_tracks(&search_identifier(query)).await
    }

    /// Reenvía al nodo la sesión de voz obtenida del gateway
    pub async fn connect(&self, guild_id: GuildId, voice: VoiceServer) -> Result<()> {
        info!("🔗 Enviando sesión de voz de {} a Lavalink", guild_id);
        self.node
            .update_player(
                guild_id,
                UpdatePlayer {
                    voice: Some(voice),
                    ..Default::default()
                },
            )
            .await
    }

    pub fn set_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        if let Some(player) = self.get(guild_id) {
            player.write().text_channel = Some(channel_id);
        }
    }

    /// Agrega un track. Devuelve la posición en la cola (0 si se reproduce ya).
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        track: Track,
        requested_by: UserId,
        front: bool,
    ) -> Result<usize> {
        let player = self.require(guild_id)?;
        let position = {
            let mut player = player.write();
            let item = QueueItem::new(track, requested_by);
            if front {
                player.queue.add_front(item)?;
                1
            } else {
                player.queue.add_track(item)?;
                player.queue.len()
            }
        };

        if self.start_if_idle(guild_id).await?.is_some() {
            return Ok(0);
        }
        Ok(position)
    }

    pub async fn enqueue_many(
        &self,
        guild_id: GuildId,
        tracks: Vec<Track>,
        requested_by: UserId,
    ) -> Result<usize> {
        let player = self.require(guild_id)?;
        let added = player.write().queue.add_playlist(tracks, requested_by);
        self.start_if_idle(guild_id).await?;
        Ok(added)
    }

    /// Starts the queue head when nothing is playing.
    pub async fn start_if_idle(&self, guild_id: GuildId) -> Result<Option<QueueItem>> {
        let idle = self
            .get(guild_id)
            .map(|player| player.read().queue.current().is_none())
            .unwrap_or(false);

        if idle {
            self.play_next(guild_id).await
        } else {
            Ok(None)
        }
    }

    /// Avanza la cola y manda el siguiente track al nodo
    pub async fn play_next(&self, guild_id: GuildId) -> Result<Option<QueueItem>> {
        let player = self.require(guild_id)?;
        let (next, volume) = {
            let mut player = player.write();
            player.position = 0;
            player.paused = false;
            let volume = player.volume;
            (player.queue.next_track().cloned(), volume)
        };

        match &next {
            Some(item) => {
                info!("🎵 Reproduciendo: {}", item.title());
                if let Err(e) = self
                    .node
                    .update_player(guild_id, UpdatePlayer::play(&item.track, volume))
                    .await
                {
                    player.write().queue.requeue_current();
                    return Err(e);
                }
            }
            None => debug!("Cola vacía para guild {}", guild_id),
        }

        Ok(next)
    }

    /// Salta la canción actual. Si no queda nada, detiene el reproductor.
    pub async fn skip(&self, guild_id: GuildId) -> Result<Option<QueueItem>> {
        let next = self.play_next(guild_id).await?;
        if next.is_none() {
            self.node.update_player(guild_id, UpdatePlayer::stop()).await?;
        }
        info!("⏭️ Canción saltada");
        Ok(next)
    }

    /// Reanuda la reproducción: quita la pausa o arranca la cola.
    pub async fn resume(&self, guild_id: GuildId) -> Result<Option<QueueItem>> {
        let player = self.require(guild_id)?;
        let (paused, playing) = {
            let player = player.read();
            (player.paused, player.queue.current().is_some())
        };

        if playing {
            if paused {
                self.set_paused(guild_id, false).await?;
            }
            Ok(None)
        } else {
            self.play_next(guild_id).await
        }
    }

    /// Detiene la reproducción, limpia la cola y destruye el reproductor del nodo
    pub async fn stop(&self, guild_id: GuildId) -> Result<()> {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            let mut player = player.write();
            player.queue.clear();
            player.queue.finish_current();
        }

        self.node.destroy_player(guild_id).await?;
        info!("⏹️ Reproducción detenida en {}", guild_id);
        Ok(())
    }

    pub async fn toggle_pause(&self, guild_id: GuildId) -> Result<bool> {
        let paused = !self.require(guild_id)?.read().paused;
        self.set_paused(guild_id, paused).await?;
        Ok(paused)
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<()> {
        self.node
            .update_player(
                guild_id,
                UpdatePlayer {
                    paused: Some(paused),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(player) = self.get(guild_id) {
            player.write().paused = paused;
        }
        info!("{} Pausa: {}", if paused { "⏸️" } else { "▶️" }, paused);
        Ok(())
    }

    /// Salto relativo dentro del track actual. Devuelve la nueva posición.
    pub async fn seek(&self, guild_id: GuildId, offset_secs: i64) -> Result<Duration> {
        let player = self.require(guild_id)?;
        let target = {
            let player = player.read();
            let Some(current) = player.queue.current() else {
                anyhow::bail!("No hay nada reproduciéndose");
            };
            if !current.track.info.is_seekable {
                anyhow::bail!("Este track no permite adelantar");
            }
            seek_target(player.position, offset_secs, current.track.info.length)
        };

        self.node
            .update_player(
                guild_id,
                UpdatePlayer {
                    position: Some(target),
                    ..Default::default()
                },
            )
            .await?;

        player.write().position = target;
        Ok(Duration::from_millis(target))
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<()> {
        let player = self.require(guild_id)?;
        let playing = player.read().queue.current().is_some();
        if playing {
            self.node
                .update_player(
                    guild_id,
                    UpdatePlayer {
                        volume: Some(volume),
                        ..Default::default()
                    },
                )
                .await?;
        }

        player.write().volume = volume;
        info!("🔊 Volumen ajustado a {}%", volume);
        Ok(())
    }

    pub fn set_shuffle(&self, guild_id: GuildId, enabled: bool) -> Result<()> {
        self.require(guild_id)?.write().queue.set_shuffle(enabled);
        Ok(())
    }

    pub fn toggle_repeat(&self, guild_id: GuildId) -> Result<bool> {
        Ok(self.require(guild_id)?.write().queue.toggle_repeat())
    }

    pub fn shuffle_queue(&self, guild_id: GuildId) -> Result<()> {
        self.require(guild_id)?.write().queue.shuffle_queue();
        Ok(())
    }

    pub fn clear_queue(&self, guild_id: GuildId) -> Result<()> {
        self.require(guild_id)?.write().queue.clear();
        Ok(())
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> Result<QueueItem> {
        self.require(guild_id)?.write().queue.remove_track(position)
    }

    /// Track actual y su posición
    pub fn now_playing(&self, guild_id: GuildId) -> Option<(QueueItem, Duration)> {
        let player = self.get(guild_id)?;
        let player = player.read();
        let current = player.queue.current()?.clone();
        Some((current, Duration::from_millis(player.position)))
    }

    /// Copia de la cola pendiente (sin el track actual)
    pub fn queued(&self, guild_id: GuildId) -> Vec<QueueItem> {
        self.get(guild_id)
            .map(|player| player.read().queue.items().cloned().collect())
            .unwrap_or_default()
    }

    /// Tracks to persist as a playlist: the current one first.
    pub fn snapshot(&self, guild_id: GuildId) -> Vec<Track> {
        self.get(guild_id)
            .map(|player| player.read().queue.snapshot())
            .unwrap_or_default()
    }

    /// Aplica un mensaje del nodo. Devuelve el track que empezó, si hay que anunciarlo.
    pub async fn handle_message(&self, message: NodeMessage) -> Result<Option<NowPlaying>> {
        match message {
            NodeMessage::PlayerUpdate { guild_id, state } => {
                if !state.connected {
                    debug!("Reproductor de {} sin conexión de voz", guild_id);
                }
                if let Some(player) = parse_guild_id(&guild_id).and_then(|id| self.get(id)) {
                    player.write().position = state.position;
                }
            }
            NodeMessage::Event(NodeEvent::TrackEnd {
                guild_id,
                track,
                reason,
            }) => {
                let Some(guild_id) = parse_guild_id(&guild_id) else {
                    return Ok(None);
                };
                debug!("Track {} terminado en {} ({:?})", track.title(), guild_id, reason);

                if !reason.may_start_next() || self.get(guild_id).is_none() {
                    return Ok(None);
                }

                let channel_id = self.get(guild_id).and_then(|player| player.read().text_channel);
                if let Some(item) = self.play_next(guild_id).await? {
                    return Ok(channel_id.map(|channel_id| NowPlaying { channel_id, item }));
                }
            }
            NodeMessage::Event(NodeEvent::TrackException { guild_id, exception }) => {
                warn!("⚠️ Error de reproducción en {}: {}", guild_id, exception);
            }
            NodeMessage::Event(NodeEvent::TrackStuck {
                guild_id,
                threshold_ms,
            }) => {
                warn!("⚠️ Track atascado en {} ({} ms), saltando", guild_id, threshold_ms);
                if let Some(guild_id) = parse_guild_id(&guild_id) {
                    if self.get(guild_id).is_some() {
                        self.skip(guild_id).await?;
                    }
                }
            }
            NodeMessage::Event(NodeEvent::WebSocketClosed {
                guild_id,
                code,
                reason,
            }) => {
                warn!("🔌 Voz cerrada en {}: {} {}", guild_id, code, reason);
            }
            NodeMessage::Event(NodeEvent::TrackStart { guild_id, track }) => {
                debug!("▶️ Lavalink empezó {} en {}", track.title(), guild_id);
            }
            NodeMessage::Ready { .. } | NodeMessage::Other => {}
        }

        Ok(None)
    }

    /// Consume los mensajes del nodo hasta que se cierre el canal
    pub async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<NodeMessage>,
        announcements: mpsc::UnboundedSender<NowPlaying>,
    ) {
        while let Some(message) = events.recv().await {
            match self.handle_message(message).await {
                Ok(Some(now_playing)) => {
                    let _ = announcements.send(now_playing);
                }
                Ok(None) => {}
                Err(e) => error!("Error al procesar evento de Lavalink: {:?}", e),
            }
        }
        debug!("Canal de eventos de Lavalink cerrado");
    }
}

/// Identificador para `loadtracks`
pub fn search_identifier(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch:{}", query)
    }
}

fn seek_target(position_ms: u64, offset_secs: i64, length_ms: u64) -> u64 {
    let target = position_ms as i64 + offset_secs.saturating_mul(1000);
    (target.max(0) as u64).min(length_ms)
}
