pub mod age_groups;
pub mod batch;
pub mod estimates;
pub mod etl;
pub mod export;
pub mod lookup;
pub mod pipeline;
pub mod work_queue;

pub use crate::domain::model::{AgeBucket, CountryCode, Gender, OriginCategory, ReachEstimate};
pub use crate::domain::ports::{ReachApi, Storage};
pub use crate::utils::error::Result;
