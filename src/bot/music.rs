//! Music and playlist commands.
//!
//! Every command first loads the guild settings into the player, enforces
//! the voice channel rules from [`voice`] and remembers the text channel for
//! now-playing announcements.

use anyhow::{Context as _, Result};
use serenity::{
    builder::{CreateMessage, EditMessage},
    model::{
        channel::{Message, Reaction, ReactionType},
        id::GuildId,
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    acknowledge,
    router::{Command, CommandError},
    say, send_embed,
    voice::{self, VoiceAction},
    Bot,
};
use crate::{
    audio::{
        lavalink::{LoadResult, PlaylistData, Track},
        player::PlayerManager,
        queue::QueueItem,
    },
    sources::genius::{self, MAX_LYRICS_LEN},
    ui::{
        embeds,
        pager::{Pager, PagerAction, PagerControl},
    },
};

/// Tracks por página en la vista de la cola
const QUEUE_PAGE_SIZE: usize = 10;

const MAX_VOLUME: u16 = 1000;

fn nothing_playing() -> anyhow::Error {
    CommandError::NotFound("🔇 No hay nada reproduciéndose".into()).into()
}

fn queue_empty() -> anyhow::Error {
    CommandError::NotFound("📭 La cola está vacía".into()).into()
}

fn require_playing(player: &PlayerManager, guild_id: GuildId) -> Result<()> {
    match player.now_playing(guild_id) {
        Some(_) => Ok(()),
        None => Err(nothing_playing()),
    }
}

fn require_queued(player: &PlayerManager, guild_id: GuildId) -> Result<()> {
    if player.queued(guild_id).is_empty() {
        return Err(queue_empty());
    }
    Ok(())
}

pub async fn run(bot: &Bot, ctx: &Context, msg: &Message, command: Command, args: &str) -> Result<()> {
    let guild_id = msg.guild_id.context("Comando solo disponible en servidores")?;
    prepare(bot, ctx, msg, guild_id, command).await?;

    match command {
        Command::Play => play(bot, ctx, msg, guild_id, args, false).await,
        Command::Force => play(bot, ctx, msg, guild_id, args, true).await,
        Command::Seek => seek(bot, ctx, msg, guild_id, args).await,
        Command::Skip => skip(bot, ctx, msg, guild_id).await,
        Command::Stop => stop(bot, ctx, msg, guild_id).await,
        Command::Clear => clear(bot, ctx, msg, guild_id).await,
        Command::Now => now(bot, ctx, msg, guild_id).await,
        Command::CurrentLyrics => current_lyrics(bot, ctx, msg, guild_id).await,
        Command::Queue => show_queue(bot, ctx, msg, guild_id).await,
        Command::Pause => pause(bot, ctx, msg, guild_id).await,
        Command::Volume => volume(bot, ctx, msg, guild_id, args).await,
        Command::Shuffle => shuffle(bot, ctx, msg, guild_id).await,
        Command::QueueShuffle => {
            require_queued(&bot.player, guild_id)?;
            bot.player.shuffle_queue(guild_id)?;
            acknowledge(ctx, msg).await
        }
        Command::Repeat => repeat(bot, ctx, msg, guild_id).await,
        Command::Remove => remove(bot, ctx, msg, guild_id, args).await,
        Command::Disconnect => disconnect(bot, ctx, msg, guild_id).await,
        Command::Join => acknowledge(ctx, msg).await,
        Command::Save => save(bot, ctx, msg, guild_id, args).await,
        Command::Load => load(bot, ctx, msg, guild_id, args).await,
        Command::Delete => delete(bot, ctx, msg, args).await,
        Command::Playlists => playlists(bot, ctx, msg).await,
        other => {
            debug!("Comando {:?} no es de música", other);
            Ok(())
        }
    }
}

async fn prepare(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, command: Command) -> Result<()> {
    let settings = bot.storage.lock().await.guild_settings(guild_id.get()).await?;
    bot.player.ensure(guild_id, settings.volume, settings.shuffle);

    let (author, current) = voice::voice_channels(ctx, guild_id, msg.author.id);
    if let VoiceAction::Join(channel_id) = voice::check(voice::requirement(command), author, current)? {
        if let Some(permissions) = voice::bot_permissions(ctx, guild_id, channel_id) {
            voice::can_join(permissions)?;
        }
        voice::join(ctx, &bot.player, guild_id, channel_id).await?;
    }

    bot.player.set_text_channel(guild_id, msg.channel_id);
    Ok(())
}

async fn play(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, query: &str, front: bool) -> Result<()> {
    if query.is_empty() {
        return resume(bot, ctx, msg, guild_id).await;
    }

    let typing = msg.channel_id.start_typing(&ctx.http);
    let result = bot.player.search(query).await;
    typing.stop();

    match loaded(result.context("Error al buscar tracks")?)? {
        Loaded::Single(track) => add_track(bot, ctx, msg, guild_id, track, front).await,
        Loaded::Playlist(playlist) => {
            let added = bot
                .player
                .enqueue_many(guild_id, playlist.tracks, msg.author.id)
                .await?;
            info!("📃 Playlist {} agregada ({} tracks)", playlist.info.name, added);
            send_embed(ctx, msg, embeds::create_playlist_added_embed(&playlist.info.name, added)).await
        }
        Loaded::Choices(tracks) => match bot.choose(ctx, msg, "🔍 Resultados de búsqueda", tracks).await? {
            Some(track) => add_track(bot, ctx, msg, guild_id, track, front).await,
            None => Ok(()),
        },
    }
}

/// Lo que `play` hace con una respuesta de `loadtracks`
#[derive(Debug)]
enum Loaded {
    Single(Track),
    Playlist(PlaylistData),
    Choices(Vec<Track>),
}

fn loaded(result: LoadResult) -> Result<Loaded, CommandError> {
    match result {
        LoadResult::Track(track) => Ok(Loaded::Single(track)),
        LoadResult::Playlist(playlist) => Ok(Loaded::Playlist(playlist)),
        LoadResult::Search(tracks) if !tracks.is_empty() => Ok(Loaded::Choices(tracks)),
        LoadResult::Search(_) | LoadResult::Empty(_) => {
            Err(CommandError::NotFound("🔍 No se encontraron resultados".into()))
        }
        LoadResult::Error(exception) => {
            warn!("⚠️ Lavalink no pudo cargar: {}", exception);
            Err(CommandError::NotFound(format!("❌ No se pudo cargar: {}", exception)))
        }
    }
}

async fn add_track(
    bot: &Bot,
    ctx: &Context,
    msg: &Message,
    guild_id: GuildId,
    track: Track,
    front: bool,
) -> Result<()> {
    let position = bot
        .player
        .enqueue(guild_id, track.clone(), msg.author.id, front)
        .await?;

    let embed = if position == 0 {
        embeds::create_now_playing_embed(&QueueItem::new(track, msg.author.id), Duration::ZERO)
    } else {
        embeds::create_track_added_embed(&track, position)
    };
    send_embed(ctx, msg, embed).await
}

/// `play` sin argumentos: quita la pausa o vuelve a arrancar la cola
async fn resume(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    match bot.player.resume(guild_id).await? {
        Some(item) => send_embed(ctx, msg, embeds::create_now_playing_embed(&item, Duration::ZERO)).await,
        None if bot.player.now_playing(guild_id).is_some() => acknowledge(ctx, msg).await,
        None => Err(queue_empty()),
    }
}

async fn seek(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, args: &str) -> Result<()> {
    let seconds: i64 = args
        .parse()
        .map_err(|_| CommandError::usage(Command::Seek, bot.prefix()))?;
    require_playing(&bot.player, guild_id)?;

    let position = bot.player.seek(guild_id, seconds).await?;
    debug!("⏩ Nueva posición: {:?}", position);
    acknowledge(ctx, msg).await
}

async fn skip(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    require_playing(&bot.player, guild_id)?;

    if let Some(next) = bot.player.skip(guild_id).await? {
        send_embed(ctx, msg, embeds::create_next_track_embed(&next)).await?;
    }
    acknowledge(ctx, msg).await
}

async fn stop(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    bot.player.stop(guild_id).await?;
    voice::leave(ctx, guild_id).await?;
    acknowledge(ctx, msg).await
}

async fn clear(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    require_queued(&bot.player, guild_id)?;
    bot.player.clear_queue(guild_id)?;
    acknowledge(ctx, msg).await
}

async fn now(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    let (item, position) = bot.player.now_playing(guild_id).ok_or_else(nothing_playing)?;
    send_embed(ctx, msg, embeds::create_now_playing_embed(&item, position)).await
}

/// Letra de la canción actual: toma el primer resultado de Genius sin preguntar
async fn current_lyrics(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    let (item, _) = bot.player.now_playing(guild_id).ok_or_else(nothing_playing)?;
    let client = bot.genius.as_ref().ok_or(CommandError::Unavailable)?;

    let song = client
        .search(&genius::clean_title(item.title()))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CommandError::NotFound("🔍 Letra no encontrada".into()))?;

    let lyrics = client.lyrics(&song).await?;
    if lyrics.chars().count() > MAX_LYRICS_LEN {
        return Err(CommandError::Invalid(
            "📜 El texto es demasiado largo, seguramente no es una letra".into(),
        )
        .into());
    }

    for embed in embeds::create_lyrics_embeds(&song.full_title(), &lyrics) {
        send_embed(ctx, msg, embed).await?;
    }
    Ok(())
}

async fn pause(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    require_playing(&bot.player, guild_id)?;

    let paused = bot.player.toggle_pause(guild_id).await?;
    say(ctx, msg, if paused { "⏸️ En pausa" } else { "▶️ Reanudado" }).await
}

async fn volume(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, args: &str) -> Result<()> {
    if args.is_empty() {
        let settings = bot.storage.lock().await.guild_settings(guild_id.get()).await?;
        return say(ctx, msg, format!("🔊 Volumen: {}%", settings.volume)).await;
    }

    let volume = parse_volume(args).ok_or_else(|| CommandError::usage(Command::Volume, bot.prefix()))?;
    bot.player.set_volume(guild_id, volume).await?;
    bot.storage.lock().await.set_volume(guild_id.get(), volume).await?;

    say(ctx, msg, format!("🔊 Volumen ajustado a {}%", volume)).await
}

pub fn parse_volume(args: &str) -> Option<u16> {
    args.trim_end_matches('%')
        .parse::<u16>()
        .ok()
        .filter(|volume| (1..=MAX_VOLUME).contains(volume))
}

async fn shuffle(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    let enabled = {
        let mut storage = bot.storage.lock().await;
        let enabled = !storage.guild_settings(guild_id.get()).await?.shuffle;
        storage.set_shuffle(guild_id.get(), enabled).await?;
        enabled
    };
    bot.player.set_shuffle(guild_id, enabled)?;

    say(
        ctx,
        msg,
        if enabled {
            "🔀 Orden aleatorio activado"
        } else {
            "➡️ Orden aleatorio desactivado"
        },
    )
    .await
}

async fn repeat(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    require_playing(&bot.player, guild_id)?;
    let enabled = bot.player.toggle_repeat(guild_id)?;
    say(
        ctx,
        msg,
        if enabled {
            "🔁 Repetición activada"
        } else {
            "➡️ Repetición desactivada"
        },
    )
    .await
}

async fn remove(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, args: &str) -> Result<()> {
    let position: usize = args
        .parse()
        .map_err(|_| CommandError::usage(Command::Remove, bot.prefix()))?;

    let queued = bot.player.queued(guild_id).len();
    if queued == 0 {
        return Err(queue_empty());
    }
    if !(1..=queued).contains(&position) {
        return Err(CommandError::Invalid(format!("❌ La posición debe estar entre 1 y {}", queued)).into());
    }

    let removed = bot.player.remove(guild_id, position)?;
    say(ctx, msg, format!("🗑️ Eliminado: **{}**", removed.title())).await
}

async fn disconnect(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    bot.player.stop(guild_id).await?;
    voice::leave(ctx, guild_id).await?;
    say(ctx, msg, "👋 Desconectado").await
}

async fn save(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, name: &str) -> Result<()> {
    let tracks = bot.player.snapshot(guild_id);
    if tracks.is_empty() {
        return Err(queue_empty());
    }
    if name.is_empty() {
        return Err(CommandError::usage(Command::Save, bot.prefix()).into());
    }

    let saved = bot
        .storage
        .lock()
        .await
        .save_playlist(msg.author.id.get(), name, tracks)
        .await?;

    send_embed(
        ctx,
        msg,
        embeds::create_success_embed(
            "Playlist guardado",
            &format!("**{}** ({})", name.to_lowercase(), embeds::tracks_label(saved)),
        ),
    )
    .await
}

async fn load(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CommandError::usage(Command::Load, bot.prefix()).into());
    }

    let playlist = bot
        .storage
        .lock()
        .await
        .load_playlist(msg.author.id.get(), name)
        .await?;

    let added = bot
        .player
        .enqueue_many(guild_id, playlist.tracks, msg.author.id)
        .await?;
    send_embed(ctx, msg, embeds::create_playlist_added_embed(&playlist.name, added)).await
}

async fn delete(bot: &Bot, ctx: &Context, msg: &Message, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CommandError::usage(Command::Delete, bot.prefix()).into());
    }

    bot.storage
        .lock()
        .await
        .delete_playlist(msg.author.id.get(), name)
        .await?;
    acknowledge(ctx, msg).await
}

async fn playlists(bot: &Bot, ctx: &Context, msg: &Message) -> Result<()> {
    let names = bot.storage.lock().await.list_playlists(msg.author.id.get()).await?;
    if names.is_empty() {
        return Err(CommandError::NotFound("💾 No tienes playlists guardados".into()).into());
    }
    send_embed(ctx, msg, embeds::create_playlists_embed(&names)).await
}

fn control_reaction(control: PagerControl) -> ReactionType {
    ReactionType::Unicode(control.emoji().to_string())
}

fn reaction_control(reaction: &Reaction) -> Option<PagerControl> {
    match &reaction.emoji {
        ReactionType::Unicode(emoji) => PagerControl::from_emoji(emoji),
        _ => None,
    }
}

fn queue_page(items: &[QueueItem], pager: &Pager) -> EditMessage {
    EditMessage::new().embed(embeds::create_queue_embed(
        items,
        pager.range(items.len(), QUEUE_PAGE_SIZE),
        pager.page(),
        pager.pages(),
    ))
}

/// Quita las reacciones del bot que ya no aplican y agrega las nuevas
async fn sync_controls(ctx: &Context, view: &Message, shown: &[PagerControl], wanted: &[PagerControl]) {
    for control in shown.iter().filter(|control| !wanted.contains(control)) {
        if let Err(e) = view.delete_reaction(&ctx.http, None, control_reaction(*control)).await {
            debug!("No se pudo quitar la reacción {}: {:?}", control.emoji(), e);
        }
    }
    for control in wanted.iter().filter(|control| !shown.contains(control)) {
        if let Err(e) = view.react(&ctx.http, control_reaction(*control)).await {
            warn!("No se pudo agregar la reacción {}: {:?}", control.emoji(), e);
        }
    }
}

/// Paged queue view. The snapshot only changes on refresh.
async fn show_queue(bot: &Bot, ctx: &Context, msg: &Message, guild_id: GuildId) -> Result<()> {
    let mut items = bot.player.queued(guild_id);
    if items.is_empty() {
        return Err(queue_empty());
    }

    let mut pager = Pager::new(items.len(), QUEUE_PAGE_SIZE);
    let first_page = embeds::create_queue_embed(
        &items,
        pager.range(items.len(), QUEUE_PAGE_SIZE),
        pager.page(),
        pager.pages(),
    );
    let mut view = msg
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(first_page))
        .await?;

    let mut shown = pager.controls();
    sync_controls(ctx, &view, &[], &shown).await;

    let bot_id = ctx.cache.current_user().id;
    loop {
        let reaction = view
            .await_reaction(&ctx.shard)
            .timeout(bot.config.queue_view_timeout)
            .filter(move |reaction| reaction.user_id != Some(bot_id))
            .await;
        let Some(reaction) = reaction else {
            debug!("⌛ Vista de la cola expirada");
            return Ok(());
        };

        let action = match reaction_control(&reaction) {
            Some(control) => pager.apply(control),
            None => PagerAction::Ignore,
        };

        match action {
            PagerAction::Close => {
                view.delete(&ctx.http).await?;
                return Ok(());
            }
            PagerAction::Reload => {
                items = bot.player.queued(guild_id);
                pager.reload(items.len(), QUEUE_PAGE_SIZE);
                view.edit(&ctx.http, queue_page(&items, &pager)).await?;
                if let Err(e) = view.delete_reactions(&ctx.http).await {
                    debug!("No se pudieron limpiar las reacciones: {:?}", e);
                }
                shown = pager.controls();
                sync_controls(ctx, &view, &[], &shown).await;
            }
            PagerAction::Show(_) => {
                view.edit(&ctx.http, queue_page(&items, &pager)).await?;
                remove_user_reaction(ctx, &reaction).await;
                let wanted = pager.controls();
                sync_controls(ctx, &view, &shown, &wanted).await;
                shown = wanted;
            }
            PagerAction::Ignore => remove_user_reaction(ctx, &reaction).await,
        }
    }
}

async fn remove_user_reaction(ctx: &Context, reaction: &Reaction) {
    if let Err(e) = reaction.delete(&ctx.http).await {
        debug!("No se pudo quitar la reacción del usuario: {:?}", e);
    }
}
