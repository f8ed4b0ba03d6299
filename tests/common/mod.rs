#![allow(dead_code)]

use async_trait::async_trait;
use mig_reach::core::{ReachApi, ReachEstimate};
use mig_reach::domain::model::TargetingSpec;
use mig_reach::domain::ports::{BehaviorEntry, LocationEntry};
use mig_reach::utils::shutdown::SharedShutdown;
use mig_reach::{EtlError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    RateLimited,
    Transport,
    Invalid,
}

impl Fault {
    fn to_error(self) -> EtlError {
        match self {
            Fault::RateLimited => EtlError::RateLimited {
                code: Some(17),
                message: "User request limit reached".to_string(),
            },
            Fault::Transport => EtlError::TransportError {
                message: "connection reset".to_string(),
            },
            Fault::Invalid => EtlError::InvalidInput {
                code: Some(100),
                message: "Invalid parameter".to_string(),
            },
        }
    }
}

/// 測試用的平台：固定的查詢結果，並可在指定的第 N 次估計呼叫時失敗
pub struct ScriptedApi {
    countries: Vec<LocationEntry>,
    behaviors: Vec<BehaviorEntry>,
    faults: Mutex<HashMap<usize, Fault>>,
    attempts: AtomicUsize,
    searches: AtomicUsize,
    successes: Mutex<Vec<TargetingSpec>>,
    interrupt: Mutex<Option<(usize, SharedShutdown)>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            countries: vec![
                location("Spain", "ES"),
                location("Germany", "DE"),
                location("United Kingdom", "GB"),
            ],
            behaviors: vec![
                expat("6015559470583", "Italy"),
                expat("6015559470584", "Peru"),
                expat("6015559470585", "Morocco"),
                BehaviorEntry {
                    id: "6002714895372".to_string(),
                    name: "Frequent Travelers".to_string(),
                    path: vec!["Travel".to_string()],
                },
            ],
            faults: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            successes: Mutex::new(Vec::new()),
            interrupt: Mutex::new(None),
        }
    }

    /// Fail the estimate attempt with zero-based index `attempt`.
    pub fn with_fault(self, attempt: usize, fault: Fault) -> Self {
        self.faults.lock().unwrap().insert(attempt, fault);
        self
    }

    /// Request shutdown right after the `n`-th successful estimate.
    pub fn interrupt_after(self, n: usize, shutdown: SharedShutdown) -> Self {
        *self.interrupt.lock().unwrap() = Some((n, shutdown));
        self
    }

    pub fn estimate_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn successful_specs(&self) -> Vec<TargetingSpec> {
        self.successes.lock().unwrap().clone()
    }

    /// 同一個 targeting spec 被成功請求超過一次的數量
    pub fn duplicate_successes(&self) -> usize {
        let specs: Vec<String> = self
            .successful_specs()
            .iter()
            .map(|spec| spec.to_json().to_string())
            .collect();
        let mut unique = specs.clone();
        unique.sort();
        unique.dedup();
        specs.len() - unique.len()
    }
}

pub fn users_for(spec: &TargetingSpec) -> u64 {
    let gender = spec.gender.map(|g| g.platform_id() as u64).unwrap_or(3);
    let origin = spec.origin.as_ref().map(|o| o.country.len() as u64).unwrap_or(0);
    gender * 100_000 + origin * 1_000 + spec.age_min as u64
}

fn location(name: &str, code: &str) -> LocationEntry {
    LocationEntry {
        name: name.to_string(),
        country_code: code.to_string(),
    }
}

fn expat(id: &str, country: &str) -> BehaviorEntry {
    let name = format!("Lived in {c} (Formerly Expats - {c})", c = country);
    BehaviorEntry {
        id: id.to_string(),
        name: name.clone(),
        path: vec!["Expats".to_string(), name],
    }
}

#[async_trait]
impl ReachApi for ScriptedApi {
    async fn search_countries(&self) -> Result<Vec<LocationEntry>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.countries.clone())
    }

    async fn search_behaviors(&self) -> Result<Vec<BehaviorEntry>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.behaviors.clone())
    }

    async fn reach_estimate(&self, spec: &TargetingSpec) -> Result<ReachEstimate> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.faults.lock().unwrap().remove(&attempt) {
            return Err(fault.to_error());
        }

        let done = {
            let mut successes = self.successes.lock().unwrap();
            successes.push(spec.clone());
            successes.len()
        };

        if let Some((n, shutdown)) = self.interrupt.lock().unwrap().as_ref() {
            if done == *n {
                shutdown.request_shutdown();
            }
        }

        Ok(ReachEstimate(users_for(spec)))
    }
}
