pub mod aggregator;
pub mod cli;
pub mod client;
pub mod http;
pub mod logging;
pub mod observers;
pub mod resilience;
pub mod sources;

pub use aggregator::{Aggregator, RunReport, SourceOutcome, SourceReport};
pub use client::{SourceClient, SourceContext};
pub use http::{HttpClient, ReqwestHttpClient};
pub use observers::CacheObserver;
pub use sources::{build_sources, NewsSource, Provider, ProviderKind};

pub use cli::{handle_command, IngestCommands, Runtime};
