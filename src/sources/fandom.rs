use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::unescape_html;
use crate::prompt::{Candidate, MAX_CANDIDATES};

const CROSS_WIKI_URL: &str = "https://community.fandom.com/api/v1/Search/CrossWiki";

/// Ancho máximo de la miniatura de un artículo
pub const THUMBNAIL_MAX_WIDTH: u32 = 200;

/// Una wiki encontrada por la búsqueda global
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Wiki {
    pub title: String,
    pub url: String,
}

impl Wiki {
    /// Base de la API v1 de la wiki
    pub fn api_base(&self) -> String {
        format!("{}/api/v1/", self.url.trim_end_matches('/'))
    }
}

impl Candidate for Wiki {
    fn label(&self) -> String {
        self.title.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossWikiResponse {
    #[serde(default)]
    items: Vec<Option<CrossWikiItem>>,
}

#[derive(Debug, Deserialize)]
struct CrossWikiItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    batches: u32,
    #[serde(default)]
    items: Vec<SearchListItem>,
}

#[derive(Debug, Deserialize)]
struct SearchListItem {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    basepath: String,
    items: HashMap<String, ArticleDetails>,
}

#[derive(Debug, Deserialize)]
struct ArticleDetails {
    title: String,
    url: String,
    #[serde(default, rename = "abstract")]
    summary: String,
    thumbnail: Option<String>,
    original_dimensions: Option<Dimensions>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Dimensions {
    width: u32,
    height: u32,
}

/// Cliente de la API pública de Fandom
pub struct FandomClient {
    http: reqwest::Client,
}

impl FandomClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Busca wikis por nombre en los idiomas dados (`"ru,en"`, `"en"`...)
    pub async fn search_wikis(&self, query: &str, lang: &str, limit: usize) -> Result<Vec<Wiki>> {
        debug!("🔍 Buscando wikis: {} ({})", query, lang);

        let response = self
            .http
            .get(CROSS_WIKI_URL)
            .query(&[
                ("expand", "1"),
                ("query", query),
                ("lang", lang),
                ("limit", &limit.to_string()),
                ("batch", "1"),
                ("rank", "default"),
            ])
            .send()
            .await
            .context("No se pudo conectar con Fandom")?;

        // Fandom responde 404 con una excepción cuando no hay resultados
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body = response.error_for_status()?.text().await?;
        Ok(parse_cross_wiki(&body))
    }

    /// Búsqueda en inglés completada con resultados en ruso hasta llenar el prompt
    pub async fn search_wikis_topped_up(&self, query: &str) -> Result<Vec<Wiki>> {
        let mut wikis = self.search_wikis(query, "en", MAX_CANDIDATES).await?;
        if wikis.len() < MAX_CANDIDATES {
            let extra = self.search_wikis(query, "ru", MAX_CANDIDATES).await?;
            wikis.extend(extra.into_iter().take(MAX_CANDIDATES - wikis.len()));
        }
        Ok(wikis)
    }

    /// Busca el mejor artículo para `query` dentro de `wiki`
    pub async fn find_article(&self, wiki: &Wiki, query: &str) -> Result<Option<Article>> {
        let api = wiki.api_base();

        let response = self
            .http
            .get(format!("{}Search/List", api))
            .query(&[
                ("query", query),
                ("namespaces", "0,14"),
                ("limit", "1"),
                ("minArticleQuality", "0"),
                ("batch", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Fandom Search/List respondió {}", response.status());
            return Ok(None);
        }

        let list = match serde_json::from_str::<SearchListResponse>(&response.text().await?) {
            Ok(list) => list,
            Err(_) => return Ok(None),
        };
        let Some(page_id) = list.items.first().map(|item| item.id).filter(|_| list.batches > 0) else {
            return Ok(None);
        };

        let (basepath, details) = self
            .details(&api, page_id, 500, THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_WIDTH)
            .await?;

        let mut thumbnail = details.thumbnail.clone();
        if let Some(dims) = details.original_dimensions {
            let (width, height) = thumbnail_size(dims.width, dims.height);
            thumbnail = self
                .details(&api, page_id, 0, width, height)
                .await?
                .1
                .thumbnail;
        }

        info!("📖 Artículo encontrado: {}", details.title);
        Ok(Some(Article {
            url: format!("{}{}", basepath, details.url),
            title: details.title,
            summary: unescape_html(&details.summary),
            thumbnail,
        }))
    }

    async fn details(
        &self,
        api: &str,
        page_id: u64,
        abstract_len: u32,
        width: u32,
        height: u32,
    ) -> Result<(String, ArticleDetails)> {
        let mut response = self
            .http
            .get(format!("{}Articles/Details", api))
            .query(&[
                ("ids", page_id.to_string()),
                ("abstract", abstract_len.to_string()),
                ("width", width.to_string()),
                ("height", height.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<DetailsResponse>()
            .await?;

        let details = response
            .items
            .remove(&page_id.to_string())
            .context("Fandom no devolvió el artículo pedido")?;
        Ok((response.basepath, details))
    }
}

fn parse_cross_wiki(body: &str) -> Vec<Wiki> {
    let Ok(response) = serde_json::from_str::<CrossWikiResponse>(body) else {
        return Vec::new();
    };

    response
        .items
        .into_iter()
        .flatten()
        .filter_map(|item| match (item.title, item.url) {
            (Some(title), Some(url)) if !title.trim().is_empty() => Some(Wiki { title, url }),
            _ => None,
        })
        .collect()
}

/// Scales an image to at most [`THUMBNAIL_MAX_WIDTH`] wide, keeping the
/// aspect ratio. Smaller images keep their size.
pub fn thumbnail_size(width: u32, height: u32) -> (u32, u32) {
    if width <= THUMBNAIL_MAX_WIDTH {
        return (width, height);
    }
    let ratio = height as f64 / width as f64;
    (THUMBNAIL_MAX_WIDTH, (ratio * THUMBNAIL_MAX_WIDTH as f64).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn small_images_keep_their_size() {
        assert_eq!(thumbnail_size(120, 300), (120, 300));
        assert_eq!(thumbnail_size(200, 50), (200, 50));
    }

    #[test]
    fn wide_images_are_scaled_down() {
        assert_eq!(thumbnail_size(800, 600), (200, 150));
        assert_eq!(thumbnail_size(1000, 333), (200, 67));
    }

    #[test]
    fn cross_wiki_skips_untitled_items() {
        let body = r#"{
            "items": [
                {"id": 1, "title": "Witcher Wiki", "url": "https://witcher.fandom.com/"},
                null,
                {"id": 2, "title": "", "url": "https://empty.fandom.com"},
                {"id": 3, "title": "Ведьмак вики", "url": "https://witcher.fandom.com/ru"}
            ],
            "total": 4
        }"#;

        let wikis = parse_cross_wiki(body);
        assert_eq!(
            wikis.iter().map(|w| w.title.as_str()).collect::<Vec<_>>(),
            vec!["Witcher Wiki", "Ведьмак вики"]
        );
        assert_eq!(wikis[0].api_base(), "https://witcher.fandom.com/api/v1/");
        assert_eq!(wikis[1].api_base(), "https://witcher.fandom.com/ru/api/v1/");
    }

    #[test]
    fn cross_wiki_exception_means_nothing_found() {
        let body = r#"{"exception":{"type":"NotFoundApiException","message":"Results not found","code":404}}"#;
        assert!(parse_cross_wiki(body).is_empty());
    }

    #[test]
    fn details_decode_abstract_and_dimensions() {
        let body = r#"{
            "items": {"42": {
                "id": 42, "title": "Geralt", "url": "/wiki/Geralt",
                "abstract": "Geralt of Rivia &amp; Roach", "thumbnail": null,
                "original_dimensions": {"width": 400, "height": 800}
            }},
            "basepath": "https://witcher.fandom.com"
        }"#;

        let mut details: DetailsResponse = serde_json::from_str(body).unwrap();
        let article = details.items.remove("42").unwrap();
        assert_eq!(article.summary, "Geralt of Rivia &amp; Roach");
        let dims = article.original_dimensions.unwrap();
        assert_eq!(thumbnail_size(dims.width, dims.height), (200, 400));
    }
}
