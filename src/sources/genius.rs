use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::unescape_html;
use crate::prompt::Candidate;

const SEARCH_URL: &str = "https://api.genius.com/search";

/// Textos más largos que esto casi seguro no son una letra
pub const MAX_LYRICS_LEN: usize = 4000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Song {
    pub id: u64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub lyrics_state: String,
    pub primary_artist: Artist,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Artist {
    pub name: String,
}

impl Song {
    pub fn full_title(&self) -> String {
        format!("{} - {}", self.primary_artist.name, self.title)
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics_state == "complete"
    }
}

impl Candidate for Song {
    fn label(&self) -> String {
        self.full_title()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "type")]
    kind: String,
    result: serde_json::Value,
}

pub struct GeniusClient {
    http: reqwest::Client,
    token: String,
}

impl GeniusClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self { http, token }
    }

    /// Canciones con letra completa para `query` (ya limpiado)
    pub async fn search(&self, query: &str) -> Result<Vec<Song>> {
        debug!("🔍 Buscando letras: {}", query);

        let response: SearchResponse = self
            .http
            .get(SEARCH_URL)
            .bearer_auth(&self.token)
            .query(&[("q", query)])
            .send()
            .await
            .context("No se pudo conectar con Genius")?
            .error_for_status()?
            .json()
            .await?;

        let songs = songs_with_lyrics(response.response.hits);
        info!("✅ Genius: {} canciones con letra", songs.len());
        Ok(songs)
    }

    /// Descarga la página de la canción y extrae la letra
    pub async fn lyrics(&self, song: &Song) -> Result<String> {
        let html = self
            .http
            .get(&song.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_lyrics(&html).context("No se encontró la letra en la página")
    }
}

fn songs_with_lyrics(hits: Vec<Hit>) -> Vec<Song> {
    hits.into_iter()
        .filter(|hit| hit.kind == "song")
        .filter_map(|hit| serde_json::from_value::<Song>(hit.result).ok())
        .filter(Song::has_lyrics)
        .collect()
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("regex inválida {}: {}", pattern, e)))
}

/// Limpia el título de un video para buscarlo en Genius: minúsculas, sin
/// partes entre paréntesis o corchetes ni marcas de "lyrics video".
pub fn clean_title(title: &str) -> String {
    static BRACKETS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let lower = title.to_lowercase();
    let stripped = regex(&BRACKETS, r"\([^)]*\)|\[[^\]]*\]").replace_all(&lower, "");
    let stripped = stripped
        .replace("lyric video", "")
        .replace("lyrics video", "")
        .replace("lyrics", "");

    regex(&SPACES, r"\s+").replace_all(stripped.trim(), " ").into_owned()
}

/// Extracts plain-text lyrics from a Genius song page.
///
/// Current pages split the lyrics over several `data-lyrics-container`
/// blocks; older ones keep them in the first `<p>`.
pub fn extract_lyrics(html: &str) -> Option<String> {
    static CONTAINER: OnceLock<Regex> = OnceLock::new();
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    static BREAK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let containers: Vec<&str> = regex(
        &CONTAINER,
        r#"(?s)<div[^>]*data-lyrics-container="true"[^>]*>(.*?)</div>"#,
    )
    .captures_iter(html)
    .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
    .collect();

    let raw = if containers.is_empty() {
        regex(&PARAGRAPH, r"(?s)<p[^>]*>(.*?)</p>")
            .captures(html)?
            .get(1)?
            .as_str()
            .to_string()
    } else {
        containers.join("\n")
    };

    let text = regex(&BREAK, r"(?i)<br\s*/?>").replace_all(&raw, "\n");
    let text = regex(&TAG, r"<[^>]+>").replace_all(&text, "");
    let text = unescape_html(&text);
    let text = text.trim();

    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_title_strips_decorations() {
        assert_eq!(
            clean_title("Rick Astley - Never Gonna Give You Up (Official Music Video) [HD]"),
            "rick astley - never gonna give you up"
        );
        assert_eq!(clean_title("Numb (Lyric Video)"), "numb");
        assert_eq!(clean_title("Song lyrics video"), "song");
    }

    #[test]
    fn search_keeps_complete_songs_only() {
        let body = r#"{"meta":{"status":200},"response":{"hits":[
            {"type":"song","result":{"id":1,"title":"Numb","url":"https://genius.com/numb","lyrics_state":"complete","primary_artist":{"name":"Linkin Park"}}},
            {"type":"song","result":{"id":2,"title":"Numb (Demo)","url":"https://genius.com/demo","lyrics_state":"unreleased","primary_artist":{"name":"Linkin Park"}}},
            {"type":"article","result":{"id":3}}
        ]}}"#;

        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let songs = songs_with_lyrics(response.response.hits);
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].label(), "Linkin Park - Numb");
    }

    #[test]
    fn extracts_lyrics_containers() {
        let html = r#"<html><body>
            <div class="Lyrics" data-lyrics-container="true">[Verse 1]<br/>I'm tired of being what you want me to be<br>Feeling so faithless</div>
            <div>ad</div>
            <div data-lyrics-container="true"><a href="/x"><span>Lost under the surface</span></a><br/>Don&#x27;t know what you&#39;re expecting</div>
        </body></html>"#;

        assert_eq!(
            extract_lyrics(html).unwrap(),
            "[Verse 1]\nI'm tired of being what you want me to be\nFeeling so faithless\nLost under the surface\nDon't know what you're expecting"
        );
    }

    #[test]
    fn falls_back_to_first_paragraph() {
        let html = "<div class=\"lyrics\"><p>Line one<br>Line &amp; two</p></div><p>footer</p>";
        assert_eq!(extract_lyrics(html).unwrap(), "Line one\nLine & two");
        assert_eq!(extract_lyrics("<html></html>"), None);
    }
}
