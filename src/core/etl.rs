use crate::core::pipeline::{CollectedTables, Job, JobReport, JobStatus, ReachPipeline};
use crate::core::work_queue::WorkQueue;
use crate::core::{ReachApi, Storage};
use crate::domain::table::{AgeStructureSet, MigrationTable};
use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

/// Serialised next to the tables so an interrupted run can be resumed by hand.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub complete: bool,
    pub jobs: Vec<JobReport>,
    pub files: Vec<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub migration: Option<MigrationTable>,
    pub age_structures: Option<AgeStructureSet>,
    /// 尚未完成的工作，交給 [`EtlEngine::resume`] 繼續
    pub remaining: Vec<(Job, WorkQueue)>,
    /// 第一個讓批次停止的錯誤（中斷時為 Interrupted）
    pub error: Option<EtlError>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.summary.complete
    }
}

pub struct EtlEngine<A: ReachApi, S: Storage> {
    pipeline: ReachPipeline<A, S>,
    write_summary: bool,
}

impl<A: ReachApi, S: Storage> EtlEngine<A, S> {
    pub fn new(pipeline: ReachPipeline<A, S>) -> Self {
        Self {
            pipeline,
            write_summary: true,
        }
    }

    pub fn with_summary(mut self, enabled: bool) -> Self {
        self.write_summary = enabled;
        self
    }

    pub fn pipeline(&self) -> &ReachPipeline<A, S> {
        &self.pipeline
    }

    /// resolve -> collect -> load。名稱驗證失敗直接回傳錯誤；
    /// 批次中斷或失敗時仍匯出部分結果，錯誤放在 RunReport 中
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();

        tracing::info!("🔎 Resolving destinations and origins...");
        let targets = self.pipeline.resolve().await?;
        tracing::info!(
            "✅ {} destinations and {} origins validated",
            targets.destinations.len(),
            targets.origins.len()
        );

        let previous = if self.pipeline.reuses_output() {
            self.pipeline.exporter().read_previous_migration_table().await?
        } else {
            None
        };

        tracing::info!("📡 Collecting reach estimates...");
        let tables = self.pipeline.collect(&targets, previous.as_ref()).await;
        self.finish(started_at, tables).await
    }

    /// 繼續先前未完成的執行：只跑 `report.remaining` 中的格子，
    /// 結果寫回同一組表格後重新匯出
    pub async fn resume(&self, report: RunReport) -> Result<RunReport> {
        let started_at = Utc::now();
        let RunReport {
            migration,
            age_structures,
            remaining,
            ..
        } = report;

        let calls: usize = remaining.iter().map(|(_, queue)| queue.remaining_calls()).sum();
        tracing::info!("🔁 Resuming {} jobs ({} calls left)", remaining.len(), calls);
        let tables = self
            .pipeline
            .run_jobs(remaining, migration, age_structures)
            .await;
        self.finish(started_at, tables).await
    }

    async fn finish(&self, started_at: DateTime<Utc>, tables: CollectedTables) -> Result<RunReport> {
        tracing::info!("💾 Exporting tables...");
        let mut files = self.pipeline.load(&tables).await?;

        let CollectedTables {
            migration,
            age_structures,
            reports,
            remaining,
            error,
        } = tables;

        let complete = error.is_none()
            && reports
                .iter()
                .all(|r| r.status == JobStatus::Completed);

        let mut summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            complete,
            jobs: reports,
            files: files.clone(),
        };

        if self.write_summary {
            let path = self
                .pipeline
                .exporter()
                .write_json(RUN_SUMMARY_FILE, &summary)
                .await?;
            files.push(path);
            summary.files = files;
        }

        for job in &summary.jobs {
            tracing::info!(
                "📊 {} - {:?}: {} calls, {} pauses, {} calls remaining",
                job.job.name(),
                job.status,
                job.stats.calls_consumed,
                job.stats.pauses,
                job.remaining_calls
            );
        }

        Ok(RunReport {
            summary,
            migration,
            age_structures,
            remaining,
            error,
        })
    }
}
