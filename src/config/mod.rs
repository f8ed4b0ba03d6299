pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "mig-reach")]
#[command(about = "Estimate migrant stocks and age-sex structures from advertising reach estimates")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "mig-reach.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Validate names and show the planned calls without fetching estimates
    #[arg(long)]
    pub dry_run: bool,

    /// Print the destination names accepted by the platform and exit
    #[arg(long)]
    pub list_destinations: bool,

    /// Print the origin names accepted by the platform and exit
    #[arg(long)]
    pub list_origins: bool,

    /// Override query.destinations (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub destinations: Vec<String>,

    /// Override query.origins (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub origins: Vec<String>,

    /// Override query.jobs (migration, age_structure, country_structure)
    #[arg(long, value_delimiter = ',')]
    pub jobs: Vec<String>,

    /// Override load.output_path
    #[arg(long)]
    pub output_path: Option<String>,

    /// Pause on every failure, not only on rate limits
    #[arg(long)]
    pub pause_on_any_error: bool,

    /// Keep estimates already in the output's mig_table.csv and fetch only blank cells
    #[arg(long)]
    pub resume: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 命令列參數覆蓋 TOML 設定
    pub fn apply_overrides(&self, config: &mut TomlConfig) {
        if !self.destinations.is_empty() {
            config.query.destinations = self.destinations.clone();
            tracing::info!("🔧 Destinations overridden: {}", self.destinations.join(", "));
        }
        if !self.origins.is_empty() {
            config.query.origins = self.origins.clone();
            tracing::info!("🔧 Origins overridden: {}", self.origins.join(", "));
        }
        if !self.jobs.is_empty() {
            config.query.jobs = Some(self.jobs.clone());
            tracing::info!("🔧 Jobs overridden: {}", self.jobs.join(", "));
        }
        if let Some(output_path) = &self.output_path {
            config.load.output_path = output_path.clone();
        }
        if self.resume {
            config.load.resume = Some(true);
            tracing::info!("🔧 Resuming from the existing migration table");
        }
        if self.pause_on_any_error {
            config.batch.treat_all_errors_as_rate_limit = Some(true);
            tracing::warn!("🔧 Every failure will be treated as a rate limit");
        }
    }
}
