use crate::domain::model::{CountryCode, ReachEstimate, TargetingSpec};
use crate::domain::ports::ReachApi;
use crate::domain::table::{CellKey, Segment};
use crate::utils::error::Result;

/// 單次 reach estimate 呼叫；不重試，錯誤直接往上傳
pub struct EstimateFetcher<'a, A: ReachApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: ReachApi + ?Sized> EstimateFetcher<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    pub async fn fetch(&self, spec: &TargetingSpec) -> Result<ReachEstimate> {
        let estimate = self.api.reach_estimate(spec).await?;
        tracing::debug!(
            "Reach estimate {} for {:?}: {} users",
            spec.country,
            spec.origin.as_ref().map(|o| o.country.as_str()),
            estimate.users()
        );
        Ok(estimate)
    }

    pub async fn fetch_cell(
        &self,
        country: &CountryCode,
        segment: &Segment,
        cell: &CellKey,
    ) -> Result<ReachEstimate> {
        self.fetch(&targeting_spec(country, segment, cell)).await
    }
}

pub fn targeting_spec(country: &CountryCode, segment: &Segment, cell: &CellKey) -> TargetingSpec {
    TargetingSpec::for_country(country.clone(), cell.bucket)
        .with_gender(cell.gender)
        .with_origin(segment.origin().cloned())
}
