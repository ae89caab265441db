use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized article as produced by a single fetch from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    /// Human-readable origin, e.g. "NewsAPI - BBC News".
    pub source: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub author_names: Vec<String>,
    pub category: Option<String>,
}

impl ArticleRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            description: None,
            content: None,
            source: source.into(),
            image_url: None,
            published_at,
            author_names: Vec::new(),
            category: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    /// Sets the authors from a raw, possibly comma-joined, byline.
    pub fn with_raw_authors(mut self, raw: Option<&str>) -> Self {
        self.author_names = raw.map(parse_author_names).unwrap_or_default();
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }
}

/// Splits a comma-joined author field into trimmed, non-empty names, keeping order.
pub fn parse_author_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// The persisted article, unique per `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub authors: Vec<Author>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredArticle {
    pub fn author_names(&self) -> Vec<&str> {
        self.authors.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_author_names_trims_and_drops_empty() {
        let names = parse_author_names("  John Doe  ,  Jane Smith ");
        assert_eq!(names, vec!["John Doe", "Jane Smith"]);

        let names = parse_author_names("John Doe, , Jane Smith,");
        assert_eq!(names, vec!["John Doe", "Jane Smith"]);

        assert!(parse_author_names("   ").is_empty());
        assert!(parse_author_names("").is_empty());
    }

    #[test]
    fn test_record_builder() {
        let record =
            ArticleRecord::new("https://example.com/1", "Title", "NewsAPI - BBC", Utc::now())
                .with_raw_authors(Some("Alice, Bob"))
                .with_category(Some("  World ".to_string()))
                .with_description(Some("desc".to_string()));

        assert_eq!(record.author_names, vec!["Alice", "Bob"]);
        assert_eq!(record.category.as_deref(), Some("World"));
        assert_eq!(record.description.as_deref(), Some("desc"));
        assert!(record.content.is_none());
    }

    #[test]
    fn test_blank_category_is_dropped() {
        let record = ArticleRecord::new("u", "t", "s", Utc::now()).with_category(Some(" ".into()));
        assert!(record.category.is_none());
    }
}
