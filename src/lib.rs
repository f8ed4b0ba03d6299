pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{ApiSettings, GraphApiClient};
pub use config::{cli::LocalStorage, toml_config::TomlConfig};
pub use crate::core::{
    batch::{BackoffPolicy, BatchOutcome, BatchRunner, BatchStatus},
    etl::{EtlEngine, RunReport},
    pipeline::{Job, QueryPlan, ReachPipeline},
    work_queue::WorkQueue,
};
pub use utils::error::{EtlError, Result};
