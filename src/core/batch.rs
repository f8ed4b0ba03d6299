//! Rate-limit aware batch loop.
//!
//! Drives [`EstimateFetcher`] over a [`WorkQueue`]. Items are taken off the
//! front by value; a failed item is replaced by a new item holding only its
//! unfinished cells, so a later run with [`BatchOutcome::remaining`] never
//! re-requests a completed cell.

use crate::core::estimates::EstimateFetcher;
use crate::core::work_queue::{WorkItem, WorkQueue};
use crate::domain::ports::ReachApi;
use crate::domain::table::EstimateSink;
use crate::utils::error::{EtlError, FailureKind};
use crate::utils::shutdown::SharedShutdown;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 每次呼叫之間的固定間隔
    pub call_delay: Duration,
    /// 觸發速率限制後的暫停時間
    pub pause_duration: Duration,
    /// 每次暫停後 call_delay 增加的量
    pub delay_increment: Duration,
    /// 每個視窗內可用的呼叫數，None 表示只靠平台回報
    pub call_budget: Option<u64>,
    /// 連續暫停上限，None 表示不設限
    pub max_pauses: Option<u32>,
    pub max_transport_retries: u32,
    pub transport_retry_delay: Duration,
    /// 舊行為：任何錯誤都當成速率限制處理
    pub treat_all_errors_as_rate_limit: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            call_delay: Duration::from_millis(1_000),
            pause_duration: Duration::from_secs(300),
            delay_increment: Duration::from_millis(500),
            call_budget: None,
            max_pauses: None,
            max_transport_retries: 3,
            transport_retry_delay: Duration::from_secs(5),
            treat_all_errors_as_rate_limit: false,
        }
    }
}

impl BackoffPolicy {
    /// Same rules, no waiting. Used for dry runs against mocks.
    pub fn without_delays() -> Self {
        Self {
            call_delay: Duration::ZERO,
            pause_duration: Duration::ZERO,
            delay_increment: Duration::ZERO,
            transport_retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// 不計暫停時的最短執行時間：每次呼叫前等待 call_delay
    pub fn minimum_duration(&self, calls: usize) -> Duration {
        let calls = u32::try_from(calls).unwrap_or(u32::MAX);
        self.call_delay.saturating_mul(calls)
    }

    fn classify(&self, error: &EtlError) -> FailureKind {
        if self.treat_all_errors_as_rate_limit {
            FailureKind::RateLimited
        } else {
            error.failure_kind()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Running,
    RateLimited,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub calls_consumed: u64,
    pub pauses: u32,
    pub transport_retries: u32,
    pub final_call_delay_ms: u64,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub remaining: WorkQueue,
    pub stats: BatchStats,
    pub error: Option<EtlError>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Completed && self.remaining.is_empty()
    }
}

enum StopReason {
    Interrupted,
    BudgetExhausted,
    Failed(EtlError),
}

enum ItemProgress {
    Done,
    Stopped { done: usize, reason: StopReason },
}

/// 連續狀態：有進度就歸零
#[derive(Default)]
struct Counters {
    window_calls: u64,
    consecutive_pauses: u32,
    consecutive_transport: u32,
}

pub struct BatchRunner<'a, A: ReachApi + ?Sized> {
    fetcher: EstimateFetcher<'a, A>,
    policy: BackoffPolicy,
    shutdown: SharedShutdown,
}

impl<'a, A: ReachApi + ?Sized> BatchRunner<'a, A> {
    pub fn new(api: &'a A, policy: BackoffPolicy, shutdown: SharedShutdown) -> Self {
        Self {
            fetcher: EstimateFetcher::new(api),
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub async fn run<S: EstimateSink + ?Sized>(
        &self,
        mut queue: WorkQueue,
        sink: &mut S,
    ) -> BatchOutcome {
        let mut stats = BatchStats::default();
        let mut counters = Counters::default();
        let mut call_delay = self.policy.call_delay;
        let mut last_error: Option<EtlError> = None;
        let mut state = BatchState::Running;
        let mut status = BatchStatus::Completed;

        tracing::info!(
            "▶️ Batch started: {} items, {} calls",
            queue.len(),
            queue.remaining_calls()
        );

        while state != BatchState::Terminated {
            state = match state {
                BatchState::Running => {
                    let Some(item) = queue.pop_front() else {
                        status = BatchStatus::Completed;
                        break;
                    };

                    match self
                        .process_item(&item, sink, &mut stats, &mut counters, call_delay)
                        .await
                    {
                        ItemProgress::Done => {
                            counters.consecutive_pauses = 0;
                            counters.consecutive_transport = 0;
                            last_error = None;
                            tracing::debug!("✅ Finished {}", item.label());
                            if !queue.items().any(|i| i.destination == item.destination) {
                                tracing::info!("🏁 Destination complete: {}", item.destination);
                            }
                            BatchState::Running
                        }
                        ItemProgress::Stopped { done, reason } => {
                            if done > 0 {
                                counters.consecutive_pauses = 0;
                                counters.consecutive_transport = 0;
                                last_error = None;
                            }
                            if let Some(rest) = item.remainder(done) {
                                queue.push_front(rest);
                            }
                            match reason {
                                StopReason::Interrupted => {
                                    status = BatchStatus::Interrupted;
                                    BatchState::Terminated
                                }
                                StopReason::BudgetExhausted => {
                                    tracing::info!(
                                        "⏳ Call budget of {} used for this window",
                                        counters.window_calls
                                    );
                                    BatchState::RateLimited
                                }
                                StopReason::Failed(error) => {
                                    let next = self
                                        .on_failure(&error, &mut stats, &mut counters, &mut status)
                                        .await;
                                    last_error = Some(error);
                                    next
                                }
                            }
                        }
                    }
                }
                BatchState::RateLimited => {
                    counters.consecutive_pauses += 1;

                    let exhausted = self
                        .policy
                        .max_pauses
                        .is_some_and(|max| counters.consecutive_pauses > max);

                    if exhausted {
                        tracing::error!(
                            "❌ Giving up after {} consecutive pauses without progress",
                            counters.consecutive_pauses - 1
                        );
                        status = BatchStatus::Aborted;
                        last_error.get_or_insert(EtlError::RateLimited {
                            code: None,
                            message: "call budget exhausted".to_string(),
                        });
                        BatchState::Terminated
                    } else {
                        stats.pauses += 1;
                        if self.sleep_paused(queue.len()).await {
                            call_delay += self.policy.delay_increment;
                            counters.window_calls = 0;
                            tracing::info!("▶️ Resuming with call delay {:?}", call_delay);
                            BatchState::Running
                        } else {
                            status = BatchStatus::Interrupted;
                            BatchState::Terminated
                        }
                    }
                }
                BatchState::Terminated => BatchState::Terminated,
            };
        }

        stats.final_call_delay_ms = call_delay.as_millis() as u64;

        // 正常結束時不回報先前已恢復的錯誤
        let error = match status {
            BatchStatus::Completed => None,
            BatchStatus::Interrupted => Some(EtlError::Interrupted),
            BatchStatus::Aborted => last_error,
        };

        tracing::info!(
            "⏹️ Batch {:?}: {} calls, {} pauses, {} items remaining",
            status,
            stats.calls_consumed,
            stats.pauses,
            queue.len()
        );

        BatchOutcome {
            status,
            remaining: queue,
            stats,
            error,
        }
    }

    async fn sleep_paused(&self, items_left: usize) -> bool {
        tracing::warn!(
            "⏸️ Rate limited, pausing {:?} ({} items left)",
            self.policy.pause_duration,
            items_left
        );
        self.shutdown.sleep(self.policy.pause_duration).await
    }

    async fn on_failure(
        &self,
        error: &EtlError,
        stats: &mut BatchStats,
        counters: &mut Counters,
        status: &mut BatchStatus,
    ) -> BatchState {
        match self.policy.classify(error) {
            FailureKind::RateLimited => {
                tracing::warn!("⚠️ {}", error);
                BatchState::RateLimited
            }
            FailureKind::Transport => {
                counters.consecutive_transport += 1;
                if counters.consecutive_transport > self.policy.max_transport_retries {
                    tracing::error!(
                        "❌ Transport error after {} retries: {}",
                        self.policy.max_transport_retries,
                        error
                    );
                    *status = BatchStatus::Aborted;
                    return BatchState::Terminated;
                }

                stats.transport_retries += 1;
                tracing::warn!(
                    "🔄 Transport error (retry {}/{}): {}",
                    counters.consecutive_transport,
                    self.policy.max_transport_retries,
                    error
                );
                if self.shutdown.sleep(self.policy.transport_retry_delay).await {
                    BatchState::Running
                } else {
                    *status = BatchStatus::Interrupted;
                    BatchState::Terminated
                }
            }
            FailureKind::Fatal => {
                tracing::error!("❌ Fatal error, stopping batch: {}", error);
                *status = BatchStatus::Aborted;
                BatchState::Terminated
            }
        }
    }

    async fn process_item<S: EstimateSink + ?Sized>(
        &self,
        item: &WorkItem,
        sink: &mut S,
        stats: &mut BatchStats,
        counters: &mut Counters,
        call_delay: Duration,
    ) -> ItemProgress {
        for (done, cell) in item.cells.iter().enumerate() {
            if self.shutdown.is_shutdown_requested() {
                return ItemProgress::Stopped {
                    done,
                    reason: StopReason::Interrupted,
                };
            }
            if let Some(budget) = self.policy.call_budget {
                if counters.window_calls >= budget {
                    return ItemProgress::Stopped {
                        done,
                        reason: StopReason::BudgetExhausted,
                    };
                }
            }

            let estimate = match self
                .fetcher
                .fetch_cell(&item.country, &item.segment, cell)
                .await
            {
                Ok(estimate) => estimate,
                Err(error) => {
                    return ItemProgress::Stopped {
                        done,
                        reason: StopReason::Failed(error),
                    }
                }
            };

            stats.calls_consumed += 1;
            counters.window_calls += 1;

            if let Err(error) = sink.record(&item.destination, &item.segment, cell, estimate) {
                return ItemProgress::Stopped {
                    done,
                    reason: StopReason::Failed(error),
                };
            }

            if !self.shutdown.sleep(call_delay).await {
                return ItemProgress::Stopped {
                    done: done + 1,
                    reason: StopReason::Interrupted,
                };
            }
        }
        ItemProgress::Done
    }
}
