use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{lavalink::Track, queue::QueueItem},
    prompt::PromptView,
    sources::fandom::Article,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);

    pub const YOUTUBE_RED: Colour = Colour::from_rgb(255, 0, 0);
    pub const SOUNDCLOUD_ORANGE: Colour = Colour::from_rgb(255, 85, 0);
    pub const TWITCH_PURPLE: Colour = Colour::from_rgb(145, 70, 255);
    pub const BANDCAMP_TEAL: Colour = Colour::from_rgb(98, 154, 169);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🦝 Mapache Bot";

/// Límite de caracteres de la descripción de un embed que usamos para letras
pub const LYRICS_PAGE_LEN: usize = 2000;

/// Color según la plataforma de origen del track
pub fn source_colour(uri: &str) -> serenity::all::Colour {
    let uri = uri.to_lowercase();
    if uri.contains("youtube.com") || uri.contains("youtu.be") {
        colors::YOUTUBE_RED
    } else if uri.contains("soundcloud.com") {
        colors::SOUNDCLOUD_ORANGE
    } else if uri.contains("twitch.tv") {
        colors::TWITCH_PURPLE
    } else if uri.contains("bandcamp.com") {
        colors::BANDCAMP_TEAL
    } else {
        colors::MUSIC_PURPLE
    }
}

/// "1 canción", "3 canciones"
pub fn tracks_label(count: usize) -> String {
    if count == 1 {
        "1 canción".to_string()
    } else {
        format!("{} canciones", count)
    }
}

/// Embed de un prompt de selección o pregunta
pub fn create_prompt_embed(view: &PromptView) -> CreateEmbed {
    CreateEmbed::default()
        .title(&view.title)
        .description(&view.body)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(&view.footer))
}

fn track_link(track: &Track) -> String {
    match track.info.uri.as_deref() {
        Some(uri) => format!("[{}]({})", track.title(), uri),
        None => track.title().to_string(),
    }
}

/// Crea un embed para un track agregado a la cola
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción agregada")
        .description(track_link(track))
        .color(source_colour(track.uri()));

    if position > 0 {
        embed = embed.field("📍 Posición", position.to_string(), true);
    }

    if let Some(duration) = track.duration() {
        embed = embed.field("⏱️ Duración", format_duration(duration), true);
    }

    if let Some(artwork) = &track.info.artwork_url {
        embed = embed.thumbnail(artwork);
    }

    embed
}

/// Crea un embed para una playlist agregada
pub fn create_playlist_added_embed(name: &str, count: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Playlist agregada")
        .description(format!("**{}** ({})", name, tracks_label(count)))
        .color(colors::SUCCESS_GREEN)
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(item: &QueueItem, position: Duration) -> CreateEmbed {
    let track = &item.track;
    let length = match track.duration() {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    };

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!(
            "{}\n`{} / {}`",
            track_link(track),
            format_duration(position),
            length
        ))
        .color(source_colour(track.uri()))
        .field("🎤 Artista", &track.info.author, true)
        .field("👤 Solicitado por", format!("<@{}>", item.requested_by), true);

    if let Some(artwork) = &track.info.artwork_url {
        embed = embed.thumbnail(artwork);
    }

    embed
        .timestamp(item.added_at)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Anuncio del siguiente track cuando avanza la cola
pub fn create_next_track_embed(item: &QueueItem) -> CreateEmbed {
    CreateEmbed::default()
        .title("⏩ A continuación")
        .description(track_link(&item.track))
        .color(source_colour(item.track.uri()))
}

/// Crea un embed para una página de la cola de reproducción
pub fn create_queue_embed(
    items: &[QueueItem],
    range: std::ops::Range<usize>,
    page: usize,
    pages: usize,
) -> CreateEmbed {
    if items.is_empty() {
        return CreateEmbed::default()
            .title("📋 Cola de Reproducción")
            .description("😴 **La cola está vacía**")
            .color(colors::NEUTRAL_GRAY);
    }

    let start = range.start;
    let list = items[range]
        .iter()
        .enumerate()
        .map(|(i, item)| format!("`{}.` [**{}**]({})", start + i + 1, item.title(), item.track.uri()))
        .collect::<Vec<_>>()
        .join("\n");

    let total: Duration = items.iter().filter_map(|item| item.track.duration()).sum();

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(format!("**{}** • {}\n\n{}", tracks_label(items.len()), format_duration(total), list))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Mapache Bot",
            page, pages
        )))
}

/// Crea el embed de un artículo de Fandom
pub fn create_article_embed(article: &Article) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&article.title)
        .url(&article.url)
        .description(&article.summary)
        .color(colors::MUSIC_PURPLE);

    if let Some(thumbnail) = &article.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Parte una letra en páginas y crea un embed por página
pub fn create_lyrics_embeds(title: &str, lyrics: &str) -> Vec<CreateEmbed> {
    let pages = split_lyrics(lyrics, LYRICS_PAGE_LEN);
    let numbered = pages.len() > 1;

    pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| {
            let title = if numbered {
                format!("📝 Letra de {} ({})", title, i + 1)
            } else {
                format!("📝 Letra de {}", title)
            };
            CreateEmbed::default()
                .title(title)
                .description(page)
                .color(colors::MUSIC_PURPLE)
        })
        .collect()
}

/// Embed con solo una imagen (mapaches, InspiroBot)
pub fn create_image_embed(url: &str) -> CreateEmbed {
    CreateEmbed::default().image(url).color(colors::MUSIC_PURPLE)
}

/// Crea un embed de texto simple en el color del bot
pub fn create_text_embed(text: &str) -> CreateEmbed {
    CreateEmbed::default().description(text).color(colors::MUSIC_PURPLE)
}

/// Lista numerada de los playlists de un usuario
pub fn create_playlists_embed(names: &[String]) -> CreateEmbed {
    let list = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title("💾 Playlists guardados")
        .description(list)
        .color(colors::MUSIC_PURPLE)
}

/// Ayuda general o de un comando
pub fn create_help_embed(title: &str, description: &str, fields: Vec<(String, String)>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE);

    for (name, value) in fields {
        embed = embed.field(name, value, false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Splits text into pages of at most `max_len` characters, breaking on line
/// boundaries. A single line longer than `max_len` is cut at a char boundary.
pub fn split_lyrics(text: &str, max_len: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();

    for line in text.lines() {
        let mut line = line;

        while line.chars().count() > max_len {
            if !page.is_empty() {
                pages.push(std::mem::take(&mut page));
            }
            let cut = line
                .char_indices()
                .nth(max_len)
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            pages.push(line[..cut].to_string());
            line = &line[cut..];
        }

        let needed = if page.is_empty() {
            line.chars().count()
        } else {
            page.chars().count() + 1 + line.chars().count()
        };
        if needed > max_len {
            pages.push(std::mem::take(&mut page));
        }

        if !page.is_empty() {
            page.push('\n');
        }
        page.push_str(line);
    }

    if !page.trim().is_empty() {
        pages.push(page);
    }
    pages
}
