use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// 平台發給地理位置的國家代碼，例如 "IT"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryCode(pub String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// "Expats" 行為分類：平台 id、完整顯示名稱、以及解析出的來源國名稱
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginCategory {
    pub id: String,
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn platform_id(self) -> u8 {
        match self {
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Gender::ALL.into_iter().find(|g| g.label() == label)
    }
}

/// Age interval. `max == None` is open-ended ("65+").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeBucket {
    pub min: u32,
    pub max: Option<u32>,
}

impl AgeBucket {
    pub fn closed(min: u32, max: u32) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn open(min: u32) -> Self {
        Self { min, max: None }
    }

    pub fn is_open_ended(&self) -> bool {
        self.max.is_none()
    }

    pub fn label(&self) -> String {
        match self.max {
            Some(max) => format!("{}-{}", self.min, max),
            None => format!("{}+", self.min),
        }
    }

    pub fn contains(&self, age: u32) -> bool {
        age >= self.min && self.max.map_or(true, |max| age <= max)
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A fully specified targeting request for one reach estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetingSpec {
    pub country: CountryCode,
    pub age_min: u32,
    pub age_max: Option<u32>,
    pub gender: Option<Gender>,
    pub origin: Option<OriginCategory>,
}

impl TargetingSpec {
    pub fn for_country(country: CountryCode, ages: AgeBucket) -> Self {
        Self {
            country,
            age_min: ages.min,
            age_max: ages.max,
            gender: None,
            origin: None,
        }
    }

    pub fn with_gender(mut self, gender: Option<Gender>) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_origin(mut self, origin: Option<OriginCategory>) -> Self {
        self.origin = origin;
        self
    }

    /// 轉成平台的 targeting_spec JSON；未指定的欄位不輸出
    pub fn to_json(&self) -> Value {
        let mut spec = Map::new();
        spec.insert(
            "geo_locations".to_string(),
            json!({ "countries": [self.country.as_str()] }),
        );
        spec.insert("age_min".to_string(), json!(self.age_min));
        if let Some(age_max) = self.age_max {
            spec.insert("age_max".to_string(), json!(age_max));
        }
        if let Some(gender) = self.gender {
            spec.insert("genders".to_string(), json!([gender.platform_id()]));
        }
        if let Some(origin) = &self.origin {
            spec.insert(
                "behaviors".to_string(),
                json!([{ "id": origin.id, "name": origin.name }]),
            );
        }
        Value::Object(spec)
    }
}

/// Platform estimate of matching users. Re-fetched on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReachEstimate(pub u64);

impl ReachEstimate {
    pub fn users(self) -> u64 {
        self.0
    }
}
