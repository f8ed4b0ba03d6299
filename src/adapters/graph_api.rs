use crate::domain::model::{ReachEstimate, TargetingSpec};
use crate::domain::ports::{BehaviorEntry, LocationEntry, ReachApi};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// 平台回報「呼叫過多」的錯誤代碼
const RATE_LIMIT_CODES: [i64; 5] = [4, 17, 32, 613, 80004];

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_version: String,
    pub access_token: String,
    pub account_id: String,
    pub timeout: Duration,
    pub search_limit: u32,
}

/// Marketing API client. Built once and shared by reference.
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    client: Client,
    settings: ApiSettings,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    name: String,
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

impl GraphApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.api_version.trim_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn reach_estimate_path(&self) -> String {
        let account = self.settings.account_id.trim();
        if account.starts_with("act_") {
            format!("{}/reachestimate", account)
        } else {
            format!("act_{}/reachestimate", account)
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint(path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("access_token", self.settings.access_token.as_str())])
            .send()
            .await
            .map_err(|e| EtlError::TransportError {
                message: format!("{}: {}", path, e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| EtlError::TransportError {
            message: format!("{}: failed to read body: {}", path, e),
        })?;

        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ReachApi for GraphApiClient {
    async fn search_countries(&self) -> Result<Vec<LocationEntry>> {
        let query = [
            ("type", "adgeolocation".to_string()),
            ("location_types", r#"["country"]"#.to_string()),
            ("limit", self.settings.search_limit.to_string()),
        ];
        let body = self.get_json("search", &query).await?;
        let response: SearchResponse<RawLocation> = serde_json::from_value(body)?;

        Ok(response
            .data
            .into_iter()
            .filter_map(|raw| {
                raw.country_code.map(|country_code| LocationEntry {
                    name: raw.name,
                    country_code,
                })
            })
            .collect())
    }

    async fn search_behaviors(&self) -> Result<Vec<BehaviorEntry>> {
        let query = [
            ("type", "adTargetingCategory".to_string()),
            ("class", "behaviors".to_string()),
            ("limit", self.settings.search_limit.to_string()),
        ];
        let body = self.get_json("search", &query).await?;
        let response: SearchResponse<BehaviorEntry> = serde_json::from_value(body)?;
        Ok(response.data)
    }

    async fn reach_estimate(&self, spec: &TargetingSpec) -> Result<ReachEstimate> {
        let query = [("targeting_spec", spec.to_json().to_string())];
        let body = self.get_json(&self.reach_estimate_path(), &query).await?;
        parse_reach_estimate(&body)
    }
}

/// `data` 可能是物件或只有一個元素的陣列；優先取 `users`，否則取 `users_lower_bound`
pub fn parse_reach_estimate(body: &Value) -> Result<ReachEstimate> {
    let data = body.get("data").ok_or_else(|| EtlError::ProcessingError {
        message: "Reach estimate response has no 'data' field".to_string(),
    })?;

    let record = match data {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
    .ok_or_else(|| EtlError::ProcessingError {
        message: "Reach estimate response has an empty 'data' array".to_string(),
    })?;

    record
        .get("users")
        .and_then(Value::as_u64)
        .or_else(|| record.get("users_lower_bound").and_then(Value::as_u64))
        .map(ReachEstimate)
        .ok_or_else(|| EtlError::ProcessingError {
            message: format!("Reach estimate response has no user count: {}", record),
        })
}

pub fn classify_error(status: StatusCode, body: &str) -> EtlError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let code = parsed.as_ref().and_then(|e| e.code);
    let message = match &parsed {
        Some(error) => match error.error_subcode {
            Some(subcode) => format!("{} (HTTP {}, subcode {})", error.message, status, subcode),
            None => format!("{} (HTTP {})", error.message, status),
        },
        None => format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
    };

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c));

    if rate_limited {
        EtlError::RateLimited { code, message }
    } else if status.is_server_error() {
        EtlError::TransportError { message }
    } else {
        EtlError::InvalidInput { code, message }
    }
}
