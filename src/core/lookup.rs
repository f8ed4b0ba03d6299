use crate::domain::model::{CountryCode, OriginCategory};
use crate::domain::ports::{BehaviorEntry, LocationEntry, ReachApi};
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

const EXPATS_PATH: &str = "Expats";
const LIVED_IN_PREFIX: &str = "Lived in";

/// 目前平台上可用的目的地與來源國分類
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    destinations: HashMap<String, CountryCode>,
    origins: HashMap<String, OriginCategory>,
}

impl Lookup {
    /// Queries both search endpoints once.
    pub async fn fetch<A: ReachApi + ?Sized>(api: &A) -> Result<Self> {
        tracing::debug!("Fetching destination countries");
        let countries = api.search_countries().await?;
        tracing::debug!("Fetching expat behaviour categories");
        let behaviors = api.search_behaviors().await?;

        let lookup = Self::from_entries(countries, behaviors);
        tracing::info!(
            "🔎 Lookup loaded {} destinations and {} origins",
            lookup.destinations.len(),
            lookup.origins.len()
        );
        Ok(lookup)
    }

    pub fn from_entries(countries: Vec<LocationEntry>, behaviors: Vec<BehaviorEntry>) -> Self {
        let destinations = countries
            .into_iter()
            .map(|entry| (entry.name, CountryCode(entry.country_code)))
            .collect();

        let origins = behaviors
            .into_iter()
            .filter_map(origin_from_behavior)
            .map(|origin| (origin.country.clone(), origin))
            .collect();

        Self {
            destinations,
            origins,
        }
    }

    pub fn destination(&self, name: &str) -> Option<&CountryCode> {
        self.destinations.get(name)
    }

    pub fn origin(&self, name: &str) -> Option<&OriginCategory> {
        self.origins.get(name)
    }

    pub fn check_destinations(&self, names: &[String]) -> Result<()> {
        check_names("destination", names, |name| self.destinations.contains_key(name))
    }

    pub fn check_origins(&self, names: &[String]) -> Result<()> {
        check_names("origin", names, |name| self.origins.contains_key(name))
    }

    /// 驗證後依呼叫端順序回傳 (名稱, 國家代碼)
    pub fn resolve_destinations(&self, names: &[String]) -> Result<Vec<(String, CountryCode)>> {
        self.check_destinations(names)?;
        Ok(names
            .iter()
            .filter_map(|name| {
                self.destinations
                    .get(name)
                    .map(|code| (name.clone(), code.clone()))
            })
            .collect())
    }

    pub fn resolve_origins(&self, names: &[String]) -> Result<Vec<OriginCategory>> {
        self.check_origins(names)?;
        Ok(names
            .iter()
            .filter_map(|name| self.origins.get(name).cloned())
            .collect())
    }

    pub fn destination_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.destinations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn origin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.origins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn check_names(kind: &str, names: &[String], known: impl Fn(&str) -> bool) -> Result<()> {
    match names.iter().find(|name| !known(name.as_str())) {
        Some(name) => Err(EtlError::UnknownTarget {
            kind: kind.to_string(),
            name: name.clone(),
        }),
        None => Ok(()),
    }
}

/// "Lived in Italy (Formerly Expats - Italy)" -> Italy
fn origin_from_behavior(entry: BehaviorEntry) -> Option<OriginCategory> {
    if entry.path.first().map(String::as_str) != Some(EXPATS_PATH)
        || !entry.name.starts_with(LIVED_IN_PREFIX)
    {
        return None;
    }

    let start = entry.name.rfind("- ")? + 2;
    let end = entry.name.rfind(')').filter(|&end| end > start)?;
    let country = entry.name[start..end].trim().to_string();
    if country.is_empty() {
        return None;
    }

    Some(OriginCategory {
        id: entry.id,
        name: entry.name,
        country,
    })
}
