use clap::Subcommand;
use nf_core::{AppConfig, ArticleStorage, Result, SharedClock, StateStore};
use std::sync::Arc;
use tracing::warn;

use crate::aggregator::{Aggregator, RunReport, SourceOutcome};
use crate::client::SourceContext;
use crate::http::HttpClient;
use crate::observers::CacheObserver;
use crate::sources::{build_sources, ProviderKind};

#[derive(Subcommand, Debug, Clone)]
pub enum IngestCommands {
    /// Run one ingestion pass over all configured sources
    Fetch {
        /// Successful sources required before a critical alert is raised
        #[arg(long)]
        min_sources: Option<usize>,
        /// Sources fetched at once (1 = sequential)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List configured sources with their credential, rate limit and circuit state
    Sources,
    /// Print the newest stored articles
    Latest {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Everything a command needs, already built from configuration.
#[derive(Clone)]
pub struct Runtime {
    pub config: AppConfig,
    pub storage: Arc<dyn ArticleStorage>,
    pub state: Arc<dyn StateStore>,
    pub http: Arc<dyn HttpClient>,
    pub clock: SharedClock,
}

impl Runtime {
    pub fn context(&self) -> SourceContext {
        SourceContext::from_config(
            &self.config,
            self.http.clone(),
            self.state.clone(),
            self.clock.clone(),
        )
    }

    /// Aggregator over every configured source, with the cache warming observer attached.
    pub fn aggregator(&self, concurrency: Option<usize>) -> Aggregator {
        let ingestion = &self.config.ingestion;
        let mut aggregator = Aggregator::new(self.storage.clone())
            .with_concurrency(concurrency.unwrap_or(ingestion.concurrency));

        for client in build_sources(&self.config, &self.context()) {
            aggregator.add_source(Arc::new(client));
        }

        aggregator.add_observer(Arc::new(
            CacheObserver::new(self.state.clone())
                .with_size(ingestion.latest_cache_size)
                .with_ttl(self.config.latest_cache_ttl()),
        ));
        aggregator
    }
}

pub async fn handle_command(command: IngestCommands, runtime: &Runtime) -> Result<()> {
    match command {
        IngestCommands::Fetch {
            min_sources,
            concurrency,
        } => {
            let aggregator = runtime.aggregator(concurrency);
            if aggregator.sources().next().is_none() {
                warn!("No sources configured with an api_key, nothing to fetch");
            }
            let minimum = min_sources.unwrap_or(runtime.config.ingestion.minimum_sources);
            let report = aggregator.run(minimum).await?;
            print_report(&report);
        }
        IngestCommands::Sources => {
            let ctx = runtime.context();
            println!("Configured sources:");
            for kind in ProviderKind::all() {
                let name = kind.provider().name().to_string();
                let Some(source) = runtime.config.source(kind.config_key()) else {
                    println!("  {:<16} not configured", kind.config_key());
                    continue;
                };
                let limit = source
                    .rate_limit
                    .map(|l| format!("{} req / {} min", l.max_requests, l.per_minutes))
                    .unwrap_or_else(|| "unlimited".to_string());
                let circuit = match ctx.breaker(&name).state().await {
                    Ok(state) => {
                        format!("{} ({} failures)", state.status, state.consecutive_failures)
                    }
                    Err(e) => format!("unknown ({e})"),
                };
                println!(
                    "  {:<16} {:<20} enabled={} credential={} rate={} circuit={}",
                    kind.config_key(),
                    name,
                    source.enabled,
                    if source.api_key.is_some() { "yes" } else { "no" },
                    limit,
                    circuit
                );
            }
        }
        IngestCommands::Latest { limit } => {
            let articles = runtime.storage.latest(limit).await?;
            if articles.is_empty() {
                println!("No articles stored yet");
            }
            for article in articles {
                println!(
                    "{}  {} - {} ({})",
                    article.published_at.format("%Y-%m-%d %H:%M"),
                    article.title,
                    article.url,
                    article.source
                );
            }
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for source in &report.sources {
        let emoji = match source.outcome {
            SourceOutcome::Produced(_) => "🆕",
            SourceOutcome::Empty => "⏭️",
            SourceOutcome::Failed(_) => "❌",
        };
        println!("{} {}: {}", emoji, source.source, source.outcome);
    }
    println!(
        "{}/{} sources succeeded (minimum {}), {} articles stored, {} failed",
        report.successful_sources,
        report.sources.len(),
        report.minimum_sources_required,
        report.articles.len(),
        report.failed_upserts
    );
    if !report.is_healthy() {
        println!("⚠️  Insufficient news sources available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nf_core::config::SourceConfig;
    use nf_core::{Error, ManualClock};
    use nf_storage::{InMemoryStateStore, InMemoryStorage};
    use serde_json::Value;
    use std::time::Duration;

    struct OfflineHttp;

    #[async_trait]
    impl HttpClient for OfflineHttp {
        async fn get_json(
            &self,
            _url: &str,
            _query: &[(String, String)],
            _timeout: Duration,
        ) -> Result<Value> {
            Err(Error::InvalidPayload("offline".into()))
        }
    }

    fn runtime(config: AppConfig) -> Runtime {
        let clock: SharedClock = Arc::new(ManualClock::default());
        Runtime {
            config,
            storage: Arc::new(InMemoryStorage::new()),
            state: Arc::new(InMemoryStateStore::with_clock(clock.clone())),
            http: Arc::new(OfflineHttp),
            clock,
        }
    }

    #[test]
    fn test_only_credentialed_sources_are_built() {
        let mut config = AppConfig::default();
        config.sources.insert(
            "newsapi".into(),
            SourceConfig {
                api_key: Some("key".into()),
                enabled: true,
                ..SourceConfig::default()
            },
        );
        config.sources.insert(
            "guardian".into(),
            SourceConfig {
                api_key: None,
                enabled: true,
                ..SourceConfig::default()
            },
        );
        config.sources.insert(
            "new_york_times".into(),
            SourceConfig {
                api_key: Some("key".into()),
                enabled: false,
                ..SourceConfig::default()
            },
        );

        let aggregator = runtime(config).aggregator(None);
        let names: Vec<_> = aggregator.sources().collect();
        assert_eq!(names, vec!["NewsAPI"]);
    }

    #[tokio::test]
    async fn test_commands_run_without_sources() {
        let runtime = runtime(AppConfig::default());
        let fetch = IngestCommands::Fetch {
            min_sources: Some(0),
            concurrency: None,
        };
        handle_command(fetch, &runtime).await.unwrap();
        handle_command(IngestCommands::Sources, &runtime).await.unwrap();
        handle_command(IngestCommands::Latest { limit: 5 }, &runtime).await.unwrap();
    }
}
