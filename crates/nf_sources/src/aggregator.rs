use futures::StreamExt;
use nf_core::{ArticleObserver, ArticleRecord, ArticleStorage, Result, StoredArticle};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::logging::Logger;
use crate::sources::NewsSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Returned this many records
    Produced(usize),
    Empty,
    /// Raised or panicked past its own boundary
    Failed(String),
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Produced(n) => write!(f, "{} articles", n),
            SourceOutcome::Empty => f.write_str("no articles"),
            SourceOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub successful_sources: usize,
    pub minimum_sources_required: usize,
    /// Everything persisted in this run, in fetch order
    pub articles: Vec<StoredArticle>,
    /// Upserts that failed and were rolled back
    pub failed_upserts: usize,
}

impl RunReport {
    pub fn is_healthy(&self) -> bool {
        self.successful_sources >= self.minimum_sources_required
    }
}

/// Fans in all sources, persists their records and notifies observers.
pub struct Aggregator {
    sources: Vec<Arc<dyn NewsSource>>,
    observers: Vec<Arc<dyn ArticleObserver>>,
    storage: Arc<dyn ArticleStorage>,
    concurrency: usize,
    logger: Logger,
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Aggregator {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self {
            sources: Vec::new(),
            observers: Vec::new(),
            storage,
            concurrency: 1,
            logger: Logger::new().with_prefix("Aggregator".to_string()),
        }
    }

    /// Sources fetched at once. 1 keeps the run strictly sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn NewsSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ArticleObserver>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name())
    }

    /// Run one ingestion pass.
    ///
    /// Only a systemic storage failure is returned as `Err`; everything else
    /// ends up in the report and the logs.
    pub async fn run(&self, minimum_sources_required: usize) -> Result<RunReport> {
        let mut report = RunReport {
            minimum_sources_required,
            ..RunReport::default()
        };

        self.logger.info(&format!("🚀 Fetching from {} sources", self.sources.len()));

        // fetches run as tasks and keep going while earlier results persist
        let fetches = futures::stream::iter(self.sources.iter().cloned().map(|source| {
            let name = source.name().to_string();
            let task = tokio::spawn(async move { source.fetch_articles().await });
            async move { (name, task.await) }
        }))
        .buffered(self.concurrency);
        futures::pin_mut!(fetches);

        while let Some((source, fetched)) = fetches.next().await {
            let outcome = match fetched {
                Ok(Ok(records)) if records.is_empty() => SourceOutcome::Empty,
                Ok(Ok(records)) => {
                    report.successful_sources += 1;
                    let produced = records.len();
                    self.persist(&source, records, &mut report).await?;
                    SourceOutcome::Produced(produced)
                }
                Ok(Err(e)) => {
                    error!(source = %source, error = %e, "Source failed");
                    SourceOutcome::Failed(e.to_string())
                }
                Err(join_error) if join_error.is_panic() => {
                    let reason = format!("panicked: {}", panic_message(join_error.into_panic()));
                    error!(source = %source, "Source {}", reason);
                    SourceOutcome::Failed(reason)
                }
                Err(join_error) => {
                    let reason = join_error.to_string();
                    error!(source = %source, "Source {}", reason);
                    SourceOutcome::Failed(reason)
                }
            };
            report.sources.push(SourceReport { source, outcome });
        }

        if !report.is_healthy() {
            error!(
                severity = "critical",
                successful = report.successful_sources,
                required = minimum_sources_required,
                "Insufficient news sources available"
            );
        }

        if report.articles.is_empty() {
            self.logger.info("No articles persisted, observers not notified");
        } else {
            self.notify_observers(&report.articles).await;
        }

        self.logger.info(&format!(
            "✅ Run finished: {}/{} sources, {} articles, {} failed upserts",
            report.successful_sources,
            self.sources.len(),
            report.articles.len(),
            report.failed_upserts
        ));
        Ok(report)
    }

    async fn persist(
        &self,
        source: &str,
        records: Vec<ArticleRecord>,
        report: &mut RunReport,
    ) -> Result<()> {
        for record in records {
            match self.storage.upsert_article(&record).await {
                Ok(stored) => report.articles.push(stored),
                Err(e) if e.is_systemic() => {
                    error!(source, url = %record.url, error = %e, "Storage unavailable, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    error!(source, url = %record.url, error = %e, "Failed to persist article");
                    report.failed_upserts += 1;
                }
            }
        }
        info!(source, "💾 Persisted articles");
        Ok(())
    }

    async fn notify_observers(&self, articles: &[StoredArticle]) {
        for observer in &self.observers {
            if let Err(e) = observer.on_news_updated(articles).await {
                warn!(observer = observer.name(), error = %e, "Observer failed");
            }
        }
    }
}
