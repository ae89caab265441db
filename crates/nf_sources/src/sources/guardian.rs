use chrono::{DateTime, Utc};
use nf_core::{ArticleRecord, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{decode_items, non_empty, parse_published, Provider};

pub const BASE_URL: &str = "https://content.guardianapis.com/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardianResult {
    web_title: Option<String>,
    web_url: Option<String>,
    web_publication_date: Option<String>,
    section_name: Option<String>,
    #[serde(default)]
    fields: GuardianFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardianFields {
    trail_text: Option<String>,
    body_text: Option<String>,
    byline: Option<String>,
    thumbnail: Option<String>,
    publication: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GuardianProvider;

impl GuardianProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for GuardianProvider {
    fn name(&self) -> &str {
        "The Guardian"
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn endpoint(&self) -> &str {
        "search"
    }

    fn credential_param(&self) -> &str {
        "api-key"
    }

    fn query(&self) -> Vec<(String, String)> {
        vec![("show-fields".to_string(), "all".to_string())]
    }

    fn normalize(&self, payload: &Value, fetched_at: DateTime<Utc>) -> Result<Vec<ArticleRecord>> {
        let items: Vec<GuardianResult> = decode_items(payload, "/response/results")?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let url = non_empty(item.web_url)?;
                let title = non_empty(item.web_title)?;
                let fields = item.fields;
                let label = match non_empty(fields.publication) {
                    Some(publication) => format!("The Guardian - {publication}"),
                    None => "The Guardian".to_string(),
                };

                Some(
                    ArticleRecord::new(
                        url,
                        title,
                        label,
                        parse_published(item.web_publication_date.as_deref(), fetched_at),
                    )
                    .with_description(non_empty(fields.trail_text))
                    .with_content(non_empty(fields.body_text))
                    .with_image_url(non_empty(fields.thumbnail))
                    .with_raw_authors(fields.byline.as_deref())
                    .with_category(item.section_name),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_search_results() {
        let payload = json!({
            "response": {
                "status": "ok",
                "results": [
                    {
                        "id": "world/2024/mar/05/story",
                        "sectionName": "World news",
                        "webPublicationDate": "2024-03-05T12:30:00Z",
                        "webTitle": "Summit ends",
                        "webUrl": "https://www.theguardian.com/world/2024/mar/05/story",
                        "fields": {
                            "trailText": "Leaders agree",
                            "bodyText": "Body",
                            "byline": "Jane Smith",
                            "thumbnail": "https://media.guim.co.uk/1.jpg",
                            "publication": "The Observer"
                        }
                    },
                    {
                        "sectionName": "Sport",
                        "webTitle": "Match report",
                        "webUrl": "https://www.theguardian.com/sport/1"
                    }
                ]
            }
        });

        let records = GuardianProvider::new().normalize(&payload, Utc::now()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].source, "The Guardian - The Observer");
        assert_eq!(records[0].category.as_deref(), Some("World news"));
        assert_eq!(records[0].author_names, vec!["Jane Smith"]);
        assert_eq!(records[0].description.as_deref(), Some("Leaders agree"));

        assert_eq!(records[1].source, "The Guardian");
        assert_eq!(records[1].category.as_deref(), Some("Sport"));
        assert!(records[1].image_url.is_none());
    }
}
