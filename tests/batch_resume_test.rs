mod common;

use common::{users_for, Fault, ScriptedApi};
use mig_reach::core::lookup::Lookup;
use mig_reach::core::work_queue::WorkQueue;
use mig_reach::core::{AgeBucket, CountryCode, Gender, OriginCategory};
use mig_reach::domain::table::{AgeStructureSet, MigrationTable, TOTAL_POPULATION};
use mig_reach::utils::shutdown::ShutdownCoordinator;
use mig_reach::{BackoffPolicy, BatchRunner, BatchStatus, EtlError};

async fn targets(api: &ScriptedApi) -> (Vec<(String, CountryCode)>, Vec<OriginCategory>) {
    let lookup = Lookup::fetch(api).await.unwrap();
    let destinations = lookup
        .resolve_destinations(&["Spain".to_string(), "Germany".to_string()])
        .unwrap();
    let origins = lookup
        .resolve_origins(&["Italy".to_string(), "Peru".to_string()])
        .unwrap();
    (destinations, origins)
}

fn migration_table() -> MigrationTable {
    MigrationTable::new(
        vec!["Spain".to_string(), "Germany".to_string()],
        vec!["Italy".to_string(), "Peru".to_string()],
    )
}

async fn migration_queue(api: &ScriptedApi) -> WorkQueue {
    let (destinations, origins) = targets(api).await;
    WorkQueue::migration(&destinations, &origins, AgeBucket::closed(18, 65))
}

#[tokio::test]
async fn test_rate_limit_pauses_and_finishes_without_repeats() {
    let api = ScriptedApi::new().with_fault(2, Fault::RateLimited);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();

    let runner = BatchRunner::new(
        &api,
        BackoffPolicy::without_delays(),
        ShutdownCoordinator::shared(),
    );
    let outcome = runner.run(queue, &mut table).await;

    assert!(outcome.is_complete());
    assert!(outcome.error.is_none());
    assert_eq!(outcome.stats.pauses, 1);
    assert_eq!(outcome.stats.calls_consumed, 6);
    assert_eq!(api.estimate_attempts(), 7);
    assert_eq!(api.duplicate_successes(), 0);
    assert!(table.is_complete());
    assert!(table.total_population("Germany").is_some());
}

#[tokio::test]
async fn test_resume_after_fatal_error_skips_completed_pairs() {
    let api = ScriptedApi::new().with_fault(4, Fault::Invalid);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let runner = BatchRunner::new(
        &api,
        BackoffPolicy::without_delays(),
        ShutdownCoordinator::shared(),
    );

    let first = runner.run(queue, &mut table).await;
    assert_eq!(first.status, BatchStatus::Aborted);
    assert!(matches!(first.error, Some(EtlError::InvalidInput { .. })));
    assert_eq!(first.stats.calls_consumed, 4);

    // Spain 已完成；Germany 剩 Peru 與 Total Population
    assert_eq!(first.remaining.remaining_destinations(), vec!["Germany"]);
    assert_eq!(
        first.remaining.remaining_segments("Germany"),
        vec!["Peru", TOTAL_POPULATION]
    );
    assert!(table.get("Germany", "Italy").is_some());
    assert!(table.get("Germany", "Peru").is_none());

    let second = runner.run(first.remaining, &mut table).await;
    assert!(second.is_complete());
    assert_eq!(second.stats.calls_consumed, 2);
    assert_eq!(second.remaining.remaining_destinations().len(), 0);

    assert_eq!(api.successful_specs().len(), 6);
    assert_eq!(api.duplicate_successes(), 0);
    assert!(table.is_complete());
}

#[tokio::test]
async fn test_resume_inside_age_structure_pair() {
    let api = ScriptedApi::new().with_fault(2, Fault::Invalid);
    let (destinations, origins) = targets(&api).await;
    let buckets = vec![AgeBucket::closed(13, 14), AgeBucket::open(15)];
    let queue = WorkQueue::age_structure(&destinations[..1], &origins[..1], &buckets);
    assert_eq!(queue.remaining_calls(), 4);

    let mut set = AgeStructureSet::new(buckets);
    let runner = BatchRunner::new(
        &api,
        BackoffPolicy::without_delays(),
        ShutdownCoordinator::shared(),
    );

    // 同一組 (Spain, Italy) 做了兩格後失敗
    let first = runner.run(queue, &mut set).await;
    assert_eq!(first.status, BatchStatus::Aborted);
    assert_eq!(first.remaining.len(), 1);
    assert_eq!(first.remaining.remaining_calls(), 2);
    assert!(!set.get("Spain", "Italy").unwrap().is_complete());

    let second = runner.run(first.remaining, &mut set).await;
    assert!(second.is_complete());
    assert_eq!(second.stats.calls_consumed, 2);
    assert_eq!(api.successful_specs().len(), 4);
    assert_eq!(api.duplicate_successes(), 0);

    let table = set.get("Spain", "Italy").unwrap();
    assert!(table.is_complete());
    assert_eq!(table.get("15+", Gender::Female).unwrap().users(), 205_015);
}

#[tokio::test]
async fn test_transport_errors_are_retried_up_to_limit() {
    let api = ScriptedApi::new()
        .with_fault(0, Fault::Transport)
        .with_fault(1, Fault::Transport);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let runner = BatchRunner::new(
        &api,
        BackoffPolicy::without_delays(),
        ShutdownCoordinator::shared(),
    );

    let outcome = runner.run(queue, &mut table).await;
    assert!(outcome.is_complete());
    assert_eq!(outcome.stats.transport_retries, 2);
    assert_eq!(outcome.stats.pauses, 0);

    let failing = (0..4).fold(ScriptedApi::new(), |api, i| api.with_fault(i, Fault::Transport));
    let queue = migration_queue(&failing).await;
    let mut table = migration_table();
    let runner = BatchRunner::new(
        &failing,
        BackoffPolicy::without_delays(),
        ShutdownCoordinator::shared(),
    );

    let outcome = runner.run(queue, &mut table).await;
    assert_eq!(outcome.status, BatchStatus::Aborted);
    assert_eq!(outcome.stats.transport_retries, 3);
    assert_eq!(failing.estimate_attempts(), 4);
    assert!(matches!(outcome.error, Some(EtlError::TransportError { .. })));
    assert_eq!(outcome.remaining.remaining_calls(), 6);
}

#[tokio::test]
async fn test_legacy_mode_pauses_on_any_error() {
    let api = ScriptedApi::new().with_fault(1, Fault::Invalid);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let policy = BackoffPolicy {
        treat_all_errors_as_rate_limit: true,
        ..BackoffPolicy::without_delays()
    };
    let runner = BatchRunner::new(&api, policy, ShutdownCoordinator::shared());

    let outcome = runner.run(queue, &mut table).await;
    assert!(outcome.is_complete());
    assert_eq!(outcome.stats.pauses, 1);
}

#[tokio::test]
async fn test_max_pauses_without_progress_aborts() {
    let api = ScriptedApi::new()
        .with_fault(0, Fault::RateLimited)
        .with_fault(1, Fault::RateLimited);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let policy = BackoffPolicy {
        max_pauses: Some(1),
        ..BackoffPolicy::without_delays()
    };
    let runner = BatchRunner::new(&api, policy, ShutdownCoordinator::shared());

    let outcome = runner.run(queue, &mut table).await;
    assert_eq!(outcome.status, BatchStatus::Aborted);
    assert_eq!(outcome.stats.pauses, 1);
    assert!(matches!(outcome.error, Some(EtlError::RateLimited { .. })));
    assert_eq!(outcome.remaining.remaining_calls(), 6);
}

#[tokio::test]
async fn test_budget_abort_reports_budget_not_recovered_error() {
    // 第一次呼叫的傳輸錯誤已重試成功，之後因預算用完而放棄
    let api = ScriptedApi::new().with_fault(0, Fault::Transport);
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let policy = BackoffPolicy {
        call_budget: Some(1),
        max_pauses: Some(0),
        ..BackoffPolicy::without_delays()
    };
    let runner = BatchRunner::new(&api, policy, ShutdownCoordinator::shared());

    let outcome = runner.run(queue, &mut table).await;
    assert_eq!(outcome.status, BatchStatus::Aborted);
    assert_eq!(outcome.stats.transport_retries, 1);
    assert_eq!(outcome.stats.calls_consumed, 1);
    assert_eq!(outcome.stats.pauses, 0);
    match &outcome.error {
        Some(EtlError::RateLimited { code: None, message }) => {
            assert_eq!(message, "call budget exhausted");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(outcome.remaining.remaining_calls(), 5);
}

#[tokio::test]
async fn test_call_budget_pauses_each_window() {
    let api = ScriptedApi::new();
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let policy = BackoffPolicy {
        call_budget: Some(2),
        delay_increment: std::time::Duration::from_millis(1),
        ..BackoffPolicy::without_delays()
    };
    let runner = BatchRunner::new(&api, policy, ShutdownCoordinator::shared());

    let outcome = runner.run(queue, &mut table).await;
    assert!(outcome.is_complete());
    assert_eq!(outcome.stats.pauses, 2);
    assert_eq!(outcome.stats.final_call_delay_ms, 2);
    assert_eq!(api.estimate_attempts(), 6);
}

#[tokio::test]
async fn test_interrupt_returns_partial_table() {
    let shutdown = ShutdownCoordinator::shared();
    let api = ScriptedApi::new().interrupt_after(3, shutdown.clone());
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let runner = BatchRunner::new(&api, BackoffPolicy::without_delays(), shutdown);

    let outcome = runner.run(queue, &mut table).await;
    assert_eq!(outcome.status, BatchStatus::Interrupted);
    assert!(matches!(outcome.error, Some(EtlError::Interrupted)));
    assert_eq!(outcome.stats.calls_consumed, 3);
    assert_eq!(outcome.remaining.remaining_calls(), 3);

    // 第三個呼叫（Spain 的 Total Population）已記錄
    let spain_total = table.total_population("Spain").unwrap();
    let expected = api.successful_specs()[2].clone();
    assert_eq!(spain_total.users(), users_for(&expected));
    assert_eq!(outcome.remaining.remaining_destinations(), vec!["Germany"]);
}

#[tokio::test]
async fn test_interrupt_before_start_makes_no_calls() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let api = ScriptedApi::new();
    let queue = migration_queue(&api).await;
    let mut table = migration_table();
    let runner = BatchRunner::new(&api, BackoffPolicy::without_delays(), shutdown);

    let outcome = runner.run(queue.clone(), &mut table).await;
    assert_eq!(outcome.status, BatchStatus::Interrupted);
    assert_eq!(outcome.remaining, queue);
    assert_eq!(api.estimate_attempts(), 0);
    assert!(api.search_calls() > 0);
}
