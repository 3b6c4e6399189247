// src/lib.rs

pub mod config;
pub mod error;
pub mod indexer;

pub mod entities {
    pub mod prelude;
    pub mod launches;
}

pub mod models {
    pub mod launch;
}

pub mod services {
    pub mod chain_reader;
    pub mod launch_store;
    pub mod ingestor;
    pub mod backfill;
}

pub mod jobs {
    pub mod live_listener;
    pub mod refresh_scheduler;
}

pub use config::IndexerConfig;
pub use indexer::LaunchIndexer;
