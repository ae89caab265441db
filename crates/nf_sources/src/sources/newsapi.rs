use chrono::{DateTime, Utc};
use nf_core::{ArticleRecord, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{decode_items, non_empty, parse_published, Provider};

pub const BASE_URL: &str = "https://newsapi.org/v2/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    source: Option<NewsApiSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewsApiProvider;

impl NewsApiProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for NewsApiProvider {
    fn name(&self) -> &str {
        "NewsAPI"
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn endpoint(&self) -> &str {
        "top-headlines"
    }

    fn credential_param(&self) -> &str {
        "apiKey"
    }

    fn query(&self) -> Vec<(String, String)> {
        vec![("language".to_string(), "en".to_string())]
    }

    fn normalize(&self, payload: &Value, fetched_at: DateTime<Utc>) -> Result<Vec<ArticleRecord>> {
        let items: Vec<NewsApiArticle> = decode_items(payload, "/articles")?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let url = non_empty(item.url)?;
                let title = non_empty(item.title)?;
                let label = match item.source.and_then(|s| non_empty(s.name)) {
                    Some(name) => format!("NewsAPI - {name}"),
                    None => "NewsAPI".to_string(),
                };

                Some(
                    ArticleRecord::new(
                        url,
                        title,
                        label,
                        parse_published(item.published_at.as_deref(), fetched_at),
                    )
                    .with_description(non_empty(item.description))
                    .with_content(non_empty(item.content))
                    .with_image_url(non_empty(item.url_to_image))
                    .with_raw_authors(item.author.as_deref()),
                )
            })
            .collect())
    }
}
