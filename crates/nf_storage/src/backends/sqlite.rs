use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nf_core::{ArticleRecord, ArticleStorage, Author, Category, Error, Result, StoredArticle};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT,
        content TEXT,
        source TEXT NOT NULL,
        image_url TEXT,
        published_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_authors (
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES authors(id),
        position INTEGER NOT NULL,
        PRIMARY KEY (article_id, author_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_categories (
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        category_id INTEGER NOT NULL REFERENCES categories(id),
        PRIMARY KEY (article_id, category_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at)",
    "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles (source)",
];

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
}

// Primary result codes that mean the database file itself is unusable.
const SQLITE_READONLY: i32 = 8;
const SQLITE_IOERR: i32 = 10;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

/// Extended codes carry the primary code in their low byte.
fn is_unavailable_code(code: &str) -> bool {
    let Ok(code) = code.parse::<i32>() else {
        return false;
    };
    matches!(
        code & 0xff,
        SQLITE_READONLY | SQLITE_IOERR | SQLITE_CORRUPT | SQLITE_FULL | SQLITE_CANTOPEN
    )
}

/// Pool loss, I/O and an unwritable database file mean the database is gone,
/// not that one write was rejected.
fn map_sqlx(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            Error::StorageUnavailable(err.to_string())
        }
        sqlx::Error::Database(db) if db.code().is_some_and(|code| is_unavailable_code(&code)) => {
            Error::StorageUnavailable(err.to_string())
        }
        _ => Error::Storage(err.to_string()),
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date {raw:?}: {e}")))
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        // Single writer; upserts are serialized by the pool itself.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to connect to database: {e}")))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| {
                    Error::StorageUnavailable(format!("Failed to run migration {i}: {e}"))
                })?;
        }

        debug!("Opened article database at {}", db_path.display());

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn locate_or_create(conn: &mut SqliteConnection, table: &str, name: &str) -> Result<i64> {
    sqlx::query(&format!(
        "INSERT INTO {table} (name) VALUES (?) ON CONFLICT(name) DO NOTHING"
    ))
    .bind(name)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    let row = sqlx::query(&format!("SELECT id FROM {table} WHERE name = ?"))
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;
    row.try_get("id").map_err(map_sqlx)
}

async fn load_article(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<StoredArticle> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;

    let authors = sqlx::query(
        r#"
        SELECT a.id, a.name FROM authors a
        JOIN article_authors aa ON aa.author_id = a.id
        WHERE aa.article_id = ?
        ORDER BY aa.position
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx)?
    .into_iter()
    .map(|r| {
        Ok(Author {
            id: r.try_get("id").map_err(map_sqlx)?,
            name: r.try_get("name").map_err(map_sqlx)?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    let categories = sqlx::query(
        r#"
        SELECT c.id, c.name FROM categories c
        JOIN article_categories ac ON ac.category_id = c.id
        WHERE ac.article_id = ?
        ORDER BY c.name
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_sqlx)?
    .into_iter()
    .map(|r| {
        Ok(Category {
            id: r.try_get("id").map_err(map_sqlx)?,
            name: r.try_get("name").map_err(map_sqlx)?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(StoredArticle {
        id,
        url: row.try_get("url").map_err(map_sqlx)?,
        title: row.try_get("title").map_err(map_sqlx)?,
        description: row.try_get("description").map_err(map_sqlx)?,
        content: row.try_get("content").map_err(map_sqlx)?,
        source: row.try_get("source").map_err(map_sqlx)?,
        image_url: row.try_get("image_url").map_err(map_sqlx)?,
        published_at: parse_time(&row.try_get::<String, _>("published_at").map_err(map_sqlx)?)?,
        authors,
        categories,
        created_at: parse_time(&row.try_get::<String, _>("created_at").map_err(map_sqlx)?)?,
        updated_at: parse_time(&row.try_get::<String, _>("updated_at").map_err(map_sqlx)?)?,
    })
}

async fn load_many(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteRow>,
) -> Result<Vec<StoredArticle>> {
    let mut articles = Vec::with_capacity(rows.len());
    for row in rows {
        articles.push(load_article(conn, &row).await?);
    }
    Ok(articles)
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn upsert_article(&self, record: &ArticleRecord) -> Result<StoredArticle> {
        let now = format_time(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO articles
            (url, title, description, content, source, image_url, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                content = excluded.content,
                source = excluded.source,
                image_url = excluded.image_url,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.url)
        .bind(&record.title)
        .bind(record.description.as_deref())
        .bind(record.content.as_deref())
        .bind(&record.source)
        .bind(record.image_url.as_deref())
        .bind(format_time(&record.published_at))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(&record.url)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let article_id: i64 = row.try_get("id").map_err(map_sqlx)?;

        if !record.author_names.is_empty() {
            sqlx::query("DELETE FROM article_authors WHERE article_id = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;

            for (position, name) in record.author_names.iter().enumerate() {
                let author_id = locate_or_create(&mut tx, "authors", name).await?;
                sqlx::query(
                    "INSERT OR IGNORE INTO article_authors (article_id, author_id, position) VALUES (?, ?, ?)",
                )
                .bind(article_id)
                .bind(author_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            }
        }

        if let Some(category) = record.category.as_deref() {
            let category_id = locate_or_create(&mut tx, "categories", category).await?;
            sqlx::query("DELETE FROM article_categories WHERE article_id = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            sqlx::query("INSERT INTO article_categories (article_id, category_id) VALUES (?, ?)")
                .bind(article_id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }

        let stored = load_article(&mut tx, &row).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(stored)
    }

    async fn get_article(&self, url: &str) -> Result<Option<StoredArticle>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(load_article(&mut conn, &row).await?)),
            None => Ok(None),
        }
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<StoredArticle>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE source = ?
            ORDER BY published_at DESC
            "#,
        )
        .bind(source)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        load_many(&mut conn, rows).await
    }

    async fn latest(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx)?;
        let rows = sqlx::query("SELECT * FROM articles ORDER BY published_at DESC, id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx)?;

        load_many(&mut conn, rows).await
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(n as usize)
    }
}
