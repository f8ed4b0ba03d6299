use crate::adapters::ApiSettings;
use crate::core::batch::BackoffPolicy;
use crate::core::pipeline::{check_structure_names, Job};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v18.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub api: ApiConfig,
    pub query: QueryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub access_token: String,
    pub account_id: String,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub search_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub destinations: Vec<String>,
    #[serde(default)]
    pub origins: Vec<String>,
    pub jobs: Option<Vec<String>>,
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    pub migration_age_min: Option<u32>,
    pub migration_age_max: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    pub call_delay_ms: Option<u64>,
    pub pause_seconds: Option<u64>,
    pub delay_increment_ms: Option<u64>,
    pub call_budget: Option<u64>,
    pub max_pauses: Option<u32>,
    pub max_transport_retries: Option<u32>,
    pub transport_retry_delay_ms: Option<u64>,
    pub treat_all_errors_as_rate_limit: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    /// 沿用輸出目錄中既有 mig_table.csv 的數值，只請求空白的格子
    pub resume: Option<bool>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub json_logs: Option<bool>,
    pub write_summary: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${FB_ACCESS_TOKEN})，找不到的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    fn check_substituted(field: &str, value: &str) -> Result<()> {
        if value.contains("${") {
            return Err(EtlError::MissingConfigError {
                field: format!("{} (environment variable in '{}' is not set)", field, value),
            });
        }
        validation::validate_non_empty_string(field, value)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        Self::check_substituted("api.access_token", &self.api.access_token)?;
        Self::check_substituted("api.account_id", &self.api.account_id)?;
        validation::validate_url("api.base_url", self.base_url())?;
        validation::validate_non_empty_string("api.api_version", self.api_version())?;
        validation::validate_positive_number("api.timeout_seconds", self.timeout().as_secs(), 1)?;
        validation::validate_positive_number("api.search_limit", self.search_limit() as u64, 1)?;

        validation::validate_name_list("query.destinations", &self.query.destinations)?;
        let job_names = self.job_names();
        validation::validate_name_list("query.jobs", &job_names)?;
        validation::validate_one_of("query.jobs", &job_names, &Job::NAMES)?;

        let jobs = self.jobs()?;
        if jobs.iter().any(|job| job.needs_origins()) {
            validation::validate_name_list("query.origins", &self.query.origins)?;
        }
        check_structure_names(&self.query.destinations, &self.query.origins, &jobs)?;

        let (age_min, age_max) = self.age_range();
        validation::validate_range("query.age_min", age_min, 13, 65)?;
        validation::validate_range("query.age_max", age_max, age_min, 65)?;
        let (mig_min, mig_max) = self.migration_age_range();
        validation::validate_range("query.migration_age_min", mig_min, 13, 65)?;
        validation::validate_range("query.migration_age_max", mig_max, mig_min, 65)?;

        if let Some(budget) = self.batch.call_budget {
            validation::validate_positive_number("batch.call_budget", budget, 1)?;
        }

        validation::validate_path("load.output_path", &self.load.output_path)?;
        if let Some(compression) = &self.load.compression {
            if compression.enabled {
                validation::validate_non_empty_string(
                    "load.compression.filename",
                    &compression.filename,
                )?;
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn api_version(&self) -> &str {
        self.api.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds.unwrap_or(30))
    }

    pub fn search_limit(&self) -> u32 {
        self.api.search_limit.unwrap_or(1000)
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.base_url().to_string(),
            api_version: self.api_version().to_string(),
            access_token: self.api.access_token.clone(),
            account_id: self.api.account_id.clone(),
            timeout: self.timeout(),
            search_limit: self.search_limit(),
        }
    }

    /// 年齡結構表的年齡範圍，預設 13..65
    pub fn age_range(&self) -> (u32, u32) {
        (
            self.query.age_min.unwrap_or(13),
            self.query.age_max.unwrap_or(65),
        )
    }

    /// 移民表使用的年齡範圍，預設 18..65
    pub fn migration_age_range(&self) -> (u32, u32) {
        (
            self.query.migration_age_min.unwrap_or(18),
            self.query.migration_age_max.unwrap_or(65),
        )
    }

    fn job_names(&self) -> Vec<String> {
        match &self.query.jobs {
            Some(jobs) => jobs.clone(),
            None => vec![Job::Migration.name().to_string()],
        }
    }

    pub fn jobs(&self) -> Result<Vec<Job>> {
        self.job_names()
            .iter()
            .map(|name| {
                Job::from_name(name).ok_or_else(|| EtlError::InvalidConfigValueError {
                    field: "query.jobs".to_string(),
                    value: name.clone(),
                    reason: format!("Allowed values: {}", Job::NAMES.join(", ")),
                })
            })
            .collect()
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        let defaults = BackoffPolicy::default();
        let batch = &self.batch;
        BackoffPolicy {
            call_delay: batch
                .call_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_delay),
            pause_duration: batch
                .pause_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.pause_duration),
            delay_increment: batch
                .delay_increment_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay_increment),
            call_budget: batch.call_budget,
            max_pauses: batch.max_pauses,
            max_transport_retries: batch
                .max_transport_retries
                .unwrap_or(defaults.max_transport_retries),
            transport_retry_delay: batch
                .transport_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.transport_retry_delay),
            treat_all_errors_as_rate_limit: batch.treat_all_errors_as_rate_limit.unwrap_or(false),
        }
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }

    pub fn resume(&self) -> bool {
        self.load.resume.unwrap_or(false)
    }

    pub fn archive_name(&self) -> Option<&str> {
        self.load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.as_str())
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }

    pub fn write_summary(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.write_summary)
            .unwrap_or(true)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
