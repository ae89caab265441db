use chrono::{DateTime, Utc};
use nf_core::{ArticleRecord, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{decode_items, non_empty, parse_published, Provider};

pub const BASE_URL: &str = "https://api.nytimes.com/svc/search/v2/";
const MEDIA_HOST: &str = "https://www.nytimes.com/";

#[derive(Debug, Deserialize)]
struct NytDoc {
    headline: Option<NytHeadline>,
    #[serde(rename = "abstract")]
    summary: Option<String>,
    lead_paragraph: Option<String>,
    byline: Option<NytByline>,
    news_desk: Option<String>,
    section_name: Option<String>,
    web_url: Option<String>,
    // a list in the search API, an object in some newer responses
    multimedia: Option<Value>,
    pub_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NytHeadline {
    main: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NytByline {
    original: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewYorkTimesProvider;

impl NewYorkTimesProvider {
    pub fn new() -> Self {
        Self
    }
}

fn clean_byline(byline: Option<NytByline>) -> String {
    byline
        .and_then(|b| non_empty(b.original))
        .map(|original| match original.strip_prefix("By ") {
            Some(rest) => rest.to_string(),
            None => original,
        })
        .and_then(|b| non_empty(Some(b)))
        .unwrap_or_else(|| "Unknown Author".to_string())
}

fn first_image(multimedia: Option<&Value>) -> Option<String> {
    multimedia?
        .as_array()?
        .iter()
        .find_map(|media| media.get("url").and_then(Value::as_str))
        .map(|url| {
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("{MEDIA_HOST}{}", url.trim_start_matches('/'))
            }
        })
}

impl Provider for NewYorkTimesProvider {
    fn name(&self) -> &str {
        "The New York Times"
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn endpoint(&self) -> &str {
        "articlesearch.json"
    }

    fn credential_param(&self) -> &str {
        "api-key"
    }

    fn query(&self) -> Vec<(String, String)> {
        vec![("q".to_string(), "news".to_string())]
    }

    fn normalize(&self, payload: &Value, fetched_at: DateTime<Utc>) -> Result<Vec<ArticleRecord>> {
        let docs: Vec<NytDoc> = decode_items(payload, "/response/docs")?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| {
                let url = non_empty(doc.web_url)?;
                let title = non_empty(doc.headline.and_then(|h| h.main))?;
                let category = non_empty(doc.news_desk)
                    .or_else(|| non_empty(doc.section_name))
                    .unwrap_or_else(|| "Uncategorized".to_string());
                let author = clean_byline(doc.byline);

                Some(
                    ArticleRecord::new(
                        url,
                        title,
                        "The New York Times",
                        parse_published(doc.pub_date.as_deref(), fetched_at),
                    )
                    .with_description(non_empty(doc.summary))
                    .with_content(non_empty(doc.lead_paragraph))
                    .with_image_url(first_image(doc.multimedia.as_ref()))
                    .with_raw_authors(Some(&author))
                    .with_category(Some(category)),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_normalize_article_search() {
        let payload = json!({
            "status": "OK",
            "response": {
                "docs": [
                    {
                        "abstract": "A summary",
                        "web_url": "https://www.nytimes.com/2024/03/05/world/story.html",
                        "lead_paragraph": "Lead",
                        "multimedia": [{"url": "images/2024/03/05/photo.jpg"}],
                        "headline": {"main": "Big story"},
                        "pub_date": "2024-03-05T12:30:00+0000",
                        "news_desk": "Foreign",
                        "section_name": "World",
                        "byline": {"original": "By John Doe and Jane Smith"}
                    },
                    {
                        "web_url": "https://www.nytimes.com/2024/03/05/other.html",
                        "headline": {"main": "Other story"},
                        "news_desk": "",
                        "section_name": "Opinion",
                        "multimedia": []
                    },
                    {
                        "web_url": "https://www.nytimes.com/untitled.html",
                        "headline": {"main": null}
                    }
                ]
            }
        });

        let records = NewYorkTimesProvider::new().normalize(&payload, Utc::now()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.source, "The New York Times");
        assert_eq!(first.category.as_deref(), Some("Foreign"));
        assert_eq!(first.author_names, vec!["John Doe and Jane Smith"]);
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://www.nytimes.com/images/2024/03/05/photo.jpg")
        );
        assert_eq!(first.published_at, Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap());

        let second = &records[1];
        assert_eq!(second.category.as_deref(), Some("Opinion"));
        assert_eq!(second.author_names, vec!["Unknown Author"]);
        assert!(second.image_url.is_none());
    }

    #[test]
    fn test_category_falls_back_to_uncategorized() {
        let payload = json!({"response": {"docs": [
            {"web_url": "https://www.nytimes.com/x.html", "headline": {"main": "X"}}
        ]}});
        let records = NewYorkTimesProvider::new().normalize(&payload, Utc::now()).unwrap();
        assert_eq!(records[0].category.as_deref(), Some("Uncategorized"));
    }
}
