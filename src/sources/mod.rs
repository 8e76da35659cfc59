//! Clients for the content lookups: Fandom wikis, Genius lyrics, Google
//! speech, plus the local image and fact collections.

pub mod fandom;
pub mod genius;
pub mod speech;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use std::{path::Path, time::Duration};
use tracing::{info, warn};

pub use fandom::FandomClient;
pub use genius::GeniusClient;
pub use speech::SpeechClient;

const USER_AGENT: &str = concat!("mapache-bot/", env!("CARGO_PKG_VERSION"));
const INSPIROBOT_URL: &str = "https://inspirobot.me/api?generate=true";

/// Cliente HTTP compartido por todas las fuentes
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .context("No se pudo crear el cliente HTTP")?;
    Ok(client)
}

/// Colecciones locales de mapaches y datos curiosos
#[derive(Debug, Default, Clone)]
pub struct Resources {
    raccoons: Vec<String>,
    facts: Vec<String>,
}

impl Resources {
    /// Carga `raccoons.json` y `facts.json`. Un archivo ausente deja la
    /// colección vacía.
    pub async fn load(dir: &Path) -> Result<Self> {
        let raccoons = load_list(&dir.join("raccoons.json")).await?;
        let facts = load_list(&dir.join("facts.json")).await?;
        info!("🦝 Recursos cargados: {} mapaches, {} datos", raccoons.len(), facts.len());
        Ok(Self { raccoons, facts })
    }

    #[cfg(test)]
    pub fn from_lists(raccoons: Vec<String>, facts: Vec<String>) -> Self {
        Self { raccoons, facts }
    }

    pub fn random_raccoon(&self) -> Option<&str> {
        self.raccoons.choose(&mut rand::thread_rng()).map(String::as_str)
    }

    pub fn random_fact(&self) -> Option<&str> {
        self.facts.choose(&mut rand::thread_rng()).map(String::as_str)
    }
}

async fn load_list(path: &Path) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("JSON inválido en {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("⚠️ No existe {}", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Pide una imagen nueva a InspiroBot. La respuesta es la URL en texto plano.
pub async fn inspirobot(http: &reqwest::Client) -> Result<String> {
    let url = http
        .get(INSPIROBOT_URL)
        .send()
        .await
        .context("No se pudo conectar con InspiroBot")?
        .error_for_status()?
        .text()
        .await?;

    let url = url.trim();
    if !url.starts_with("http") {
        anyhow::bail!("Respuesta inesperada de InspiroBot");
    }
    Ok(url.to_string())
}

/// Decodes the handful of HTML entities the wiki and lyrics pages use.
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unescapes_named_and_numeric_entities() {
        assert_eq!(unescape_html("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(unescape_html("&quot;hi&quot; &#39;there&#x27;"), "\"hi\" 'there'");
        assert_eq!(unescape_html("a &lt;b&gt; c"), "a <b> c");
    }

    #[test]
    fn leaves_unknown_entities_alone() {
        assert_eq!(unescape_html("R&D &bogus; 5 & 6"), "R&D &bogus; 5 & 6");
    }

    #[test]
    fn empty_collections_pick_nothing() {
        let resources = Resources::default();
        assert!(resources.random_raccoon().is_none());

        let resources = Resources::from_lists(vec!["https://img/1.png".to_string()], vec![]);
        assert_eq!(resources.random_raccoon(), Some("https://img/1.png"));
        assert!(resources.random_fact().is_none());
    }

    #[tokio::test]
    async fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("facts.json"), r#"["Los mapaches lavan su comida"]"#)
            .await
            .unwrap();

        let resources = Resources::load(dir.path()).await.unwrap();
        assert!(resources.random_raccoon().is_none());
        assert_eq!(resources.random_fact(), Some("Los mapaches lavan su comida"));
    }
}
