pub mod clock;
pub mod config;
pub mod error;
pub mod observer;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::AppConfig;
pub use error::{Error, FailureKind};
pub use observer::ArticleObserver;
pub use storage::{ArticleStorage, StateStore, StateStoreExt};
pub use types::{parse_author_names, ArticleRecord, Author, Category, StoredArticle};

pub type Result<T> = std::result::Result<T, Error>;
