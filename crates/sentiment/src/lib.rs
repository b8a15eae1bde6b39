//! News path: feeds, relevance filtering, estimator fan-out and fusion.

pub mod cadence;
pub mod config;
pub mod estimator;
pub mod feeds;
pub mod fusion;
pub mod http;
pub mod news;
pub mod relevance;
pub mod worker;

pub use cadence::{Cadence, CadenceMode, ModeSettings};
pub use config::SourcesFileConfig;
pub use fusion::{fuse, FusionCycle, SentimentFusion};
pub use relevance::RelevanceFilter;
pub use worker::SentimentWorker;
