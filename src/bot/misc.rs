use anyhow::{Context as _, Result};
use chrono::DateTime;
use serenity::{
    builder::{CreateAttachment, CreateMessage},
    model::{channel::ChannelType, channel::Message},
    prelude::Context,
};
use std::path::Path;
use tracing::{debug, info};

use super::{
    router::{Command, CommandError},
    say, send_embed, voice, Bot,
};
use crate::{
    sources::{self, genius, speech::MAX_TTS_CHARS},
    ui::embeds,
};

const CHANGELOG_ENTRIES: usize = 10;
const GIT_LOG_LIMIT: &str = "200";

pub async fn run(bot: &Bot, ctx: &Context, msg: &Message, command: Command, args: &str) -> Result<()> {
    match command {
        Command::Raccoon => raccoon(bot, ctx, msg, args).await,
        Command::Inspirobot => inspirobot(bot, ctx, msg, args).await,
        Command::Fact => fact(bot, ctx, msg, args).await,
        Command::Wikia => wikia(bot, ctx, msg, args).await,
        Command::Fandom => fandom(bot, ctx, msg, args).await,
        Command::Lyrics => lyrics(bot, ctx, msg, args).await,
        Command::Link => link(ctx, msg, args).await,
        Command::Changelog => changelog(bot, ctx, msg).await,
        Command::Tts => tts(bot, ctx, msg, args).await,
        other => {
            debug!("Comando {:?} no es misceláneo", other);
            Ok(())
        }
    }
}

/// Texto que acompaña a la imagen: el del usuario o su mención
fn caption(msg: &Message, args: &str) -> String {
    if args.is_empty() {
        format!("<@{}>", msg.author.id)
    } else {
        args.to_string()
    }
}

async fn raccoon(bot: &Bot, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
    let url = bot
        .resources
        .random_raccoon()
        .ok_or_else(|| CommandError::NotFound("🦝 No hay mapaches cargados".into()))?;

    msg.channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .content(caption(msg, args))
                .embed(embeds::create_image_embed(url)),
        )
        .await?;
    Ok(())
}

async fn inspirobot(bot: &Bot, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
    let url = sources::inspirobot(&bot.http).await?;

    msg.channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .content(caption(msg, args))
                .embed(embeds::create_image_embed(&url)),
        )
        .await?;
    Ok(())
}

async fn fact(bot: &Bot, ctx: &Context, msg: &Message, args: &str) -> Result<()> {
    let fact = bot
        .resources
        .random_fact()
        .ok_or_else(|| CommandError::NotFound("🤔 No hay datos curiosos cargados".into()))?;

    say(ctx, msg, format!("{}\n{}", caption(msg, args), fact)).await
}

async fn wikia(bot: &Bot, ctx: &Context, msg: &Message, query: &str) -> Result<()> {
    if query.is_empty() {
        return Err(CommandError::usage(Command::Wikia, bot.prefix()).into());
    }

    let wikis = bot.fandom.search_wikis(query, "ru,en", 10).await?;
    if wikis.is_empty() {
        return Err(CommandError::NotFound("🔍 No se encontraron wikis".into()).into());
    }

    let Some(wiki) = bot.choose(ctx, msg, "📚 Elige una wiki", wikis).await? else {
        return Ok(());
    };

    match bot.fandom.find_article(&wiki, query).await? {
        Some(article) => send_embed(ctx, msg, embeds::create_article_embed(&article)).await,
        None => Err(CommandError::NotFound("🔍 No se encontró nada".into()).into()),
    }
}

async fn fandom(bot: &Bot, ctx: &Context, msg: &Message, query: &str) -> Result<()> {
    if query.is_empty() {
        return Err(CommandError::usage(Command::Fandom, bot.prefix()).into());
    }

    let wikis = bot.fandom.search_wikis_topped_up(query).await?;
    if wikis.is_empty() {
        return Err(CommandError::NotFound("🔍 No se encontraron wikis".into()).into());
    }

    let Some(wiki) = bot.choose(ctx, msg, "📚 Elige una wiki", wikis).await? else {
        return Ok(());
    };

    let Some(article_query) = bot
        .ask(ctx, msg, &wiki.title, "✏️ ¿Qué artículo buscas?")
        .await?
    else {
        return Ok(());
    };

    match bot.fandom.find_article(&wiki, &article_query).await? {
        Some(article) => send_embed(ctx, msg, embeds::create_article_embed(&article)).await,
        None => Err(CommandError::NotFound("🔍 No se encontró nada".into()).into()),
    }
}

async fn lyrics(bot: &Bot, ctx: &Context, msg: &Message, title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(CommandError::usage(Command::Lyrics, bot.prefix()).into());
    }
    let client = bot.genius.as_ref().ok_or(CommandError::Unavailable)?;

    let songs = client.search(&genius::clean_title(title)).await?;
    if songs.is_empty() {
        return Err(CommandError::NotFound("🔍 Canción no encontrada".into()).into());
    }

    let Some(song) = bot.choose(ctx, msg, "🎤 Elige una canción", songs).await? else {
        return Ok(());
    };

    let lyrics = client.lyrics(&song).await?;
    for embed in embeds::create_lyrics_embeds(&song.full_title(), &lyrics) {
        send_embed(ctx, msg, embed).await?;
    }
    Ok(())
}

async fn link(ctx: &Context, msg: &Message, name: &str) -> Result<()> {
    let guild_id = msg.guild_id.context("Comando solo disponible en servidores")?;
    let channels = guild_id.channels(&ctx.http).await?;

    let mut voice_channels = channels.values().filter(|channel| channel.kind == ChannelType::Voice);
    let channel = if name.is_empty() {
        let (author_channel, _) = voice::voice_channels(ctx, guild_id, msg.author.id);
        let author_channel =
            author_channel.ok_or_else(|| CommandError::Voice("🔇 Primero conéctate a un canal de voz".into()))?;
        voice_channels.find(|channel| channel.id == author_channel)
    } else {
        let wanted = name.to_lowercase();
        voice_channels.find(|channel| channel.name.to_lowercase() == wanted)
    };

    let channel = channel.ok_or_else(|| CommandError::NotFound("🔍 No hay un canal con ese nombre".into()))?;
    let url = channel_link(guild_id.get(), channel.id.get());

    send_embed(
        ctx,
        msg,
        embeds::create_text_embed(&format!("[🔗 Enlace mágico al canal {}]({})", channel.name, url)),
    )
    .await
}

pub fn channel_link(guild_id: u64, channel_id: u64) -> String {
    format!("https://discord.com/channels/{}/{}", guild_id, channel_id)
}

async fn changelog(bot: &Bot, ctx: &Context, msg: &Message) -> Result<()> {
    let log = git_log(&bot.config.repo_dir, &bot.config.changelog_branch).await?;
    let entries = parse_changelog(&log, CHANGELOG_ENTRIES);
    if entries.is_empty() {
        return Err(CommandError::NotFound("📜 No hay cambios registrados".into()).into());
    }

    let description = entries
        .iter()
        .map(|(date, subject)| format!("{}: {}", date, subject))
        .collect::<Vec<_>>()
        .join("\n");

    send_embed(ctx, msg, embeds::create_info_embed("📜 Últimos cambios", &description)).await
}

async fn git_log(repo: &Path, branch: &str) -> Result<String> {
    let output = async_process::Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["log", branch, "-n", GIT_LOG_LIMIT, "--format=%at%x09%s"])
        .output()
        .await
        .context("No se pudo ejecutar git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git log falló: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `<unix time>\t<subject>` lines into `(dd-mm-yyyy, subject)`,
/// skipping repeated subjects.
pub fn parse_changelog(log: &str, limit: usize) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for line in log.lines() {
        let Some((timestamp, subject)) = line.split_once('\t') else {
            continue;
        };
        let subject = subject.trim();
        if subject.is_empty() || entries.iter().any(|(_, seen)| seen == subject) {
            continue;
        }
        let Some(date) = timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        else {
            continue;
        };

        entries.push((date.format("%d-%m-%Y").to_string(), subject.to_string()));
        if entries.len() == limit {
            break;
        }
    }

    entries
}

async fn tts(bot: &Bot, ctx: &Context, msg: &Message, text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(CommandError::usage(Command::Tts, bot.prefix()).into());
    }
    if text.chars().count() > MAX_TTS_CHARS {
        return Err(CommandError::Invalid(format!(
            "📏 El texto es demasiado largo (máximo {} caracteres)",
            MAX_TTS_CHARS
        ))
        .into());
    }
    let client = bot.speech.as_ref().ok_or(CommandError::Unavailable)?;

    let speech = client.synthesize(text).await?;
    info!(
        "🗣️ TTS para {} en {} (voz {})",
        msg.author.name,
        speech.language,
        speech.voice.as_deref().unwrap_or("por defecto")
    );

    msg.channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new().add_file(CreateAttachment::bytes(speech.audio.to_vec(), "tts.mp3")),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn changelog_skips_repeated_subjects() {
        let log = "1700000000\tArreglar cola\n\
                   1699900000\tArreglar cola\n\
                   1699800000\tAgregar tts\n\
                   basura\n\
                   1699700000\t\n";

        assert_eq!(
            parse_changelog(log, 10),
            vec![
                ("14-11-2023".to_string(), "Arreglar cola".to_string()),
                ("12-11-2023".to_string(), "Agregar tts".to_string()),
            ]
        );
    }

    #[test]
    fn changelog_stops_at_limit() {
        let log = (0..20)
            .map(|i| format!("{}\tcommit {}", 1_600_000_000 + i, i))
            .collect::<Vec<_>>()
            .join("\n");

        let entries = parse_changelog(&log, 10);
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[9].1, "commit 9");
    }

    #[test]
    fn builds_channel_links() {
        assert_eq!(channel_link(1, 2), "https://discord.com/channels/1/2");
    }
}
