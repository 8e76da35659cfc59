use anyhow::Result;
use serenity::{builder::CreateMessage, http::Http, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod prompt;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    lavalink::{AudioNode, LavalinkNode},
    player::{NowPlaying, PlayerManager},
};
use crate::bot::Bot;
use crate::config::Config;
use crate::sources::Resources;
use crate::storage::JsonStorage;
use crate::ui::embeds;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mapache_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🦝 Iniciando Mapache Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone(), config.default_volume).await?,
    ));

    let resources = Resources::load(&config.resources_dir).await?;
    let http = sources::http_client()?;

    // Nodo de audio
    let user_id = Http::new(&config.discord_token).get_current_user().await?.id;
    let node = Arc::new(LavalinkNode::new(&config.lavalink, user_id)?);
    let shutdown = CancellationToken::new();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(node.clone().run(events_tx, shutdown.clone()));

    let player = Arc::new(PlayerManager::new(
        node as Arc<dyn AudioNode>,
        config.max_queue_size,
    ));

    let (announce_tx, announce_rx) = mpsc::unbounded_channel();
    tokio::spawn(player.clone().run_events(events_rx, announce_tx));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = Bot::new(config.clone(), storage, player, http, resources);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    tokio::spawn(announce_tracks(client.http.clone(), announce_rx));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let node_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        node_shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    Ok(())
}

/// Anuncia en el canal de texto cada track que empieza al avanzar la cola
async fn announce_tracks(http: Arc<Http>, mut announcements: mpsc::UnboundedReceiver<NowPlaying>) {
    while let Some(NowPlaying { channel_id, item }) = announcements.recv().await {
        let message = CreateMessage::new().embed(embeds::create_next_track_embed(&item));
        if let Err(e) = channel_id.send_message(&http, message).await {
            warn!("No se pudo anunciar {}: {:?}", item.title(), e);
        }
    }
}
