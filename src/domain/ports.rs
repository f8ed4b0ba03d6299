use crate::domain::model::{ReachEstimate, TargetingSpec};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Geolocation search result (`type=adgeolocation`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub name: String,
    pub country_code: String,
}

/// Targeting-category search result (`type=adTargetingCategory`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Vec<String>,
}

/// 廣告平台的三個端點；client 只建立一次並明確傳入各個元件
#[async_trait]
pub trait ReachApi: Send + Sync {
    async fn search_countries(&self) -> Result<Vec<LocationEntry>>;
    async fn search_behaviors(&self) -> Result<Vec<BehaviorEntry>>;
    async fn reach_estimate(&self, spec: &TargetingSpec) -> Result<ReachEstimate>;
}
