use crate::config::toml_config::TomlConfig;
use crate::core::age_groups::age_groups;
use crate::core::batch::{BackoffPolicy, BatchOutcome, BatchRunner, BatchStats, BatchStatus};
use crate::core::export::TableExporter;
use crate::core::lookup::Lookup;
use crate::core::work_queue::WorkQueue;
use crate::core::{ReachApi, Storage};
use crate::domain::model::{AgeBucket, CountryCode, OriginCategory};
use crate::domain::table::{AgeStructureSet, EstimateSink, MigrationTable};
use crate::utils::error::{EtlError, Result};
use crate::utils::shutdown::SharedShutdown;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    /// 目的地 x 來源國的移民人數，加上 "Total Population"
    Migration,
    /// 每個 (目的地, 來源國) 的年齡性別結構
    AgeStructure,
    /// 每個目的地本身人口的年齡性別結構
    CountryStructure,
}

impl Job {
    pub const NAMES: [&'static str; 3] = ["migration", "age_structure", "country_structure"];

    pub fn name(self) -> &'static str {
        match self {
            Job::Migration => "migration",
            Job::AgeStructure => "age_structure",
            Job::CountryStructure => "country_structure",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "migration" => Some(Job::Migration),
            "age_structure" => Some(Job::AgeStructure),
            "country_structure" => Some(Job::CountryStructure),
            _ => None,
        }
    }

    pub fn needs_origins(self) -> bool {
        matches!(self, Job::Migration | Job::AgeStructure)
    }
}

/// What to fetch, already checked by config validation.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub destinations: Vec<String>,
    pub origins: Vec<String>,
    pub jobs: Vec<Job>,
    pub age_range: (u32, u32),
    pub migration_age_range: (u32, u32),
}

impl QueryPlan {
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Ok(Self {
            destinations: config.query.destinations.clone(),
            origins: config.query.origins.clone(),
            jobs: config.jobs()?,
            age_range: config.age_range(),
            migration_age_range: config.migration_age_range(),
        })
    }

    pub fn buckets(&self) -> Vec<AgeBucket> {
        age_groups(self.age_range.0, self.age_range.1)
    }

    fn needs_origins(&self) -> bool {
        self.jobs.iter().any(|job| job.needs_origins())
    }
}

/// 年齡結構檔以 (目的地, 來源國) 命名，目的地本身人口的檔案則是 (目的地, 目的地)；
/// 兩個工作一起執行時來源國不可與目的地同名
pub fn check_structure_names(
    destinations: &[String],
    origins: &[String],
    jobs: &[Job],
) -> Result<()> {
    if !(jobs.contains(&Job::AgeStructure) && jobs.contains(&Job::CountryStructure)) {
        return Ok(());
    }
    match origins.iter().find(|origin| destinations.contains(origin)) {
        Some(name) => Err(EtlError::InvalidConfigValueError {
            field: "query.origins".to_string(),
            value: name.clone(),
            reason: "Origin shares its name with a destination, so its age structure table \
                     would overwrite the destination's own population table"
                .to_string(),
        }),
        None => Ok(()),
    }
}

/// Names validated against the current lookup, in caller order.
#[derive(Debug, Clone)]
pub struct ResolvedTargets {
    pub destinations: Vec<(String, CountryCode)>,
    pub origins: Vec<OriginCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Interrupted,
    Aborted,
    /// 前一個工作中斷或失敗，未執行
    Skipped,
}

impl From<BatchStatus> for JobStatus {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => JobStatus::Completed,
            BatchStatus::Interrupted => JobStatus::Interrupted,
            BatchStatus::Aborted => JobStatus::Aborted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemainingDestination {
    pub destination: String,
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: Job,
    pub status: JobStatus,
    pub stats: BatchStats,
    pub remaining_calls: usize,
    pub remaining: Vec<RemainingDestination>,
    pub error: Option<String>,
}

impl JobReport {
    fn new(job: Job, status: JobStatus, stats: BatchStats, queue: &WorkQueue) -> Self {
        let remaining = queue
            .remaining_destinations()
            .into_iter()
            .map(|destination| RemainingDestination {
                segments: queue.remaining_segments(&destination),
                destination,
            })
            .collect();
        Self {
            job,
            status,
            stats,
            remaining_calls: queue.remaining_calls(),
            remaining,
            error: None,
        }
    }
}

/// Tables gathered by [`ReachPipeline::collect`], possibly partial.
#[derive(Debug)]
pub struct CollectedTables {
    pub migration: Option<MigrationTable>,
    pub age_structures: Option<AgeStructureSet>,
    pub reports: Vec<JobReport>,
    /// Unfinished work per job; feed back to [`ReachPipeline::run_jobs`] to resume.
    pub remaining: Vec<(Job, WorkQueue)>,
    pub error: Option<EtlError>,
}

pub struct ReachPipeline<A: ReachApi, S: Storage> {
    api: A,
    exporter: TableExporter<S>,
    plan: QueryPlan,
    policy: BackoffPolicy,
    shutdown: SharedShutdown,
    archive_name: Option<String>,
    reuse_output: bool,
}

impl<A: ReachApi, S: Storage> ReachPipeline<A, S> {
    pub fn new(
        api: A,
        storage: S,
        plan: QueryPlan,
        policy: BackoffPolicy,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            api,
            exporter: TableExporter::new(storage),
            plan,
            policy,
            shutdown,
            archive_name: None,
            reuse_output: false,
        }
    }

    pub fn with_archive(mut self, archive_name: Option<String>) -> Self {
        self.archive_name = archive_name;
        self
    }

    /// 沿用輸出目錄中既有移民表的數值，已有值的格子不再請求
    pub fn with_reuse_output(mut self, enabled: bool) -> Self {
        self.reuse_output = enabled;
        self
    }

    pub fn reuses_output(&self) -> bool {
        self.reuse_output
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn exporter(&self) -> &TableExporter<S> {
        &self.exporter
    }

    /// 查詢可用名稱並驗證；任何未知名稱都在第一次估計呼叫前失敗
    pub async fn resolve(&self) -> Result<ResolvedTargets> {
        check_structure_names(&self.plan.destinations, &self.plan.origins, &self.plan.jobs)?;
        let lookup = Lookup::fetch(&self.api).await?;
        let destinations = lookup.resolve_destinations(&self.plan.destinations)?;
        let origins = if self.plan.needs_origins() {
            lookup.resolve_origins(&self.plan.origins)?
        } else {
            Vec::new()
        };
        Ok(ResolvedTargets {
            destinations,
            origins,
        })
    }

    pub fn queue_for(&self, job: Job, targets: &ResolvedTargets) -> WorkQueue {
        match job {
            Job::Migration => {
                let (age_min, age_max) = self.plan.migration_age_range;
                WorkQueue::migration(
                    &targets.destinations,
                    &targets.origins,
                    AgeBucket::closed(age_min, age_max),
                )
            }
            Job::AgeStructure => WorkQueue::age_structure(
                &targets.destinations,
                &targets.origins,
                &self.plan.buckets(),
            ),
            Job::CountryStructure => {
                WorkQueue::age_structure(&targets.destinations, &[], &self.plan.buckets())
            }
        }
    }

    /// Every job's queue, in run order. Used for dry runs.
    pub fn planned_queues(&self, targets: &ResolvedTargets) -> Vec<(Job, WorkQueue)> {
        self.plan
            .jobs
            .iter()
            .map(|&job| (job, self.queue_for(job, targets)))
            .collect()
    }

    pub async fn run_queue<K: EstimateSink + ?Sized>(
        &self,
        queue: WorkQueue,
        sink: &mut K,
    ) -> BatchOutcome {
        BatchRunner::new(&self.api, self.policy.clone(), self.shutdown.clone())
            .run(queue, sink)
            .await
    }

    /// 建立空白表格並依序執行所有工作。
    /// `previous` 是先前匯出的移民表：其中已有的數值直接沿用，對應的格子不再請求
    pub async fn collect(
        &self,
        targets: &ResolvedTargets,
        previous: Option<&MigrationTable>,
    ) -> CollectedTables {
        let mut queues = self.planned_queues(targets);

        let migration = self.plan.jobs.contains(&Job::Migration).then(|| {
            let mut table = MigrationTable::new(
                targets.destinations.iter().map(|(n, _)| n.clone()).collect(),
                targets.origins.iter().map(|o| o.country.clone()).collect(),
            );
            if let Some(previous) = previous {
                let reused = table.fill_missing_from(previous);
                tracing::info!("♻️ Reusing {} estimates from the previous migration table", reused);
                for (job, queue) in queues.iter_mut().filter(|(job, _)| *job == Job::Migration) {
                    queue.retain_cells(|item, _| {
                        table
                            .get(&item.destination, item.segment.column_label())
                            .is_none()
                    });
                    tracing::debug!("{}: {} calls left", job.name(), queue.remaining_calls());
                }
            }
            table
        });
        let age_structures = self
            .plan
            .jobs
            .iter()
            .any(|job| matches!(job, Job::AgeStructure | Job::CountryStructure))
            .then(|| AgeStructureSet::new(self.plan.buckets()));

        self.run_jobs(queues, migration, age_structures).await
    }

    /// 依序執行各工作並寫入給定的表格；某個工作未完成時，後續工作標記為 Skipped。
    /// 傳入上一輪的 [`CollectedTables::remaining`] 即可從中斷處繼續
    pub async fn run_jobs(
        &self,
        queues: Vec<(Job, WorkQueue)>,
        mut migration: Option<MigrationTable>,
        mut age_structures: Option<AgeStructureSet>,
    ) -> CollectedTables {
        let mut reports = Vec::new();
        let mut remaining = Vec::new();
        let mut error = None;

        for (job, queue) in queues {
            if error.is_some() || self.shutdown.is_shutdown_requested() {
                tracing::info!("⏭️ Skipping job: {}", job.name());
                reports.push(JobReport::new(
                    job,
                    JobStatus::Skipped,
                    BatchStats::default(),
                    &queue,
                ));
                remaining.push((job, queue));
                continue;
            }

            tracing::info!("🚀 Running job: {} ({} calls)", job.name(), queue.remaining_calls());
            let outcome = match job {
                Job::Migration => match migration.as_mut() {
                    Some(table) => self.run_queue(queue, table).await,
                    None => BatchOutcome {
                        status: BatchStatus::Aborted,
                        remaining: queue,
                        stats: BatchStats::default(),
                        error: Some(EtlError::ProcessingError {
                            message: "No migration table to record estimates into".to_string(),
                        }),
                    },
                },
                Job::AgeStructure | Job::CountryStructure => {
                    let set = age_structures
                        .get_or_insert_with(|| AgeStructureSet::new(self.plan.buckets()));
                    self.run_queue(queue, set).await
                }
            };

            let mut report =
                JobReport::new(job, outcome.status.into(), outcome.stats, &outcome.remaining);
            report.error = outcome.error.as_ref().map(ToString::to_string);
            reports.push(report);

            if !outcome.remaining.is_empty() {
                remaining.push((job, outcome.remaining));
            }
            if outcome.status != BatchStatus::Completed {
                error = Some(outcome.error.unwrap_or(EtlError::Interrupted));
            }
        }

        CollectedTables {
            migration,
            age_structures,
            reports,
            remaining,
            error,
        }
    }

    /// 匯出所有（可能不完整的）表格，回傳寫出的相對路徑
    pub async fn load(&self, tables: &CollectedTables) -> Result<Vec<String>> {
        let mut files = Vec::new();

        if let Some(table) = &tables.migration {
            files.push(self.exporter.export_migration_table(table).await?);
        }
        if let Some(set) = &tables.age_structures {
            files.extend(self.exporter.export_age_structures(set).await?);
        }

        if let Some(archive_name) = &self.archive_name {
            if !files.is_empty() {
                let archive = self.exporter.bundle(&files, archive_name).await?;
                tracing::info!("📦 Tables bundled into {}", archive);
                files.push(archive);
            }
        }

        Ok(files)
    }
}
