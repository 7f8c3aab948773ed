//! Scheduler behavior: retries, completion semantics, backpressure,
//! timeouts and shutdown cancellation.

mod common;

use common::{fast_scheduler_config, test_context, MemoryDestination, MemorySource};
use dbferry::{Scheduler, SchedulerConfig, Task, TaskPayload, TaskStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn schema_task(name: &str, ddl: &str) -> Task {
    Task::new(name, TaskPayload::Schema { ddl: ddl.into() })
}

#[tokio::test]
async fn all_tasks_succeed() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ctx = test_context(source, destination.clone(), "sched_ok").await;

    let mut scheduler = Scheduler::new(fast_scheduler_config(), ctx);
    scheduler.run(5);
    for i in 0..5 {
        let ddl = format!("CREATE TABLE shop.t_{} (id INT)", i);
        scheduler.add_task(schema_task(&format!("shop.t_{}", i), &ddl)).await.unwrap();
    }
    let report = scheduler.finish().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 5);
    assert!(report.failed.is_empty());
    assert!(report.cancelled.is_empty());
    for task in &report.succeeded {
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.end_time.is_some());
        assert_eq!(task.retry_times, 1);
    }
    // each DDL reached the destination exactly once
    assert_eq!(destination.executed_count("CREATE TABLE shop.t_0 (id INT)"), 1);
}

#[tokio::test]
async fn failed_task_retries_then_succeeds() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ddl = "CREATE TABLE shop.orders (id INT)";
    destination.script.fail_times(ddl, 2);
    let ctx = test_context(source, destination.clone(), "sched_retry").await;

    let mut scheduler = Scheduler::new(fast_scheduler_config(), ctx);
    scheduler.run(1);
    scheduler.add_task(schema_task("shop.orders", ddl)).await.unwrap();
    let report = scheduler.finish().await.unwrap();

    assert_eq!(report.succeeded.len(), 1);
    // failed twice, succeeded on the third attempt
    assert_eq!(report.succeeded[0].retry_times, 3);
    assert_eq!(destination.executed_count(ddl), 3);
}

#[tokio::test]
async fn failed_task_exhausts_retry_budget() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ddl = "CREATE TABLE shop.broken (id INT)";
    destination.script.fail_times(ddl, 20);
    let ctx = test_context(source, destination.clone(), "sched_exhaust").await;

    let config = SchedulerConfig {
        task_retry: 2,
        ..fast_scheduler_config()
    };
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(1);
    scheduler.add_task(schema_task("shop.broken", ddl)).await.unwrap();
    let report = scheduler.finish().await.unwrap();

    assert_eq!(report.failed.len(), 1);
    let task = &report.failed[0];
    assert_eq!(task.status, TaskStatus::Failed);
    // task_retry + 1 executions in total
    assert_eq!(task.retry_times, 3);
    assert_eq!(destination.executed_count(ddl), 3);
    assert!(task.failure.as_deref().unwrap_or_default().contains("scripted failure"));
}

#[tokio::test]
async fn finish_waits_for_every_task() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    // stagger completion so workers retire out of order
    for i in 0..6 {
        let ddl = format!("CREATE TABLE shop.mix_{} (id INT)", i);
        destination
            .script
            .delay(&ddl, Duration::from_millis(10 * (6 - i as u64)));
    }
    let failing = "CREATE TABLE shop.mix_5 (id INT)";
    destination.script.fail_times(failing, 20);
    let ctx = test_context(source, destination.clone(), "sched_finish").await;

    let config = SchedulerConfig {
        max_workers: 3,
        task_retry: 1,
        ..fast_scheduler_config()
    };
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(6);
    for i in 0..6 {
        let ddl = format!("CREATE TABLE shop.mix_{} (id INT)", i);
        scheduler.add_task(schema_task(&format!("shop.mix_{}", i), &ddl)).await.unwrap();
    }
    let report = scheduler.finish().await.unwrap();

    assert_eq!(report.succeeded.len() + report.failed.len(), 6);
    assert_eq!(report.succeeded.len(), 5);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "shop.mix_5");
}

#[tokio::test]
async fn add_task_blocks_on_full_completion_queue() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ctx = test_context(source, destination, "sched_queue").await;

    // queue of one and a slow poller: the third add must wait for a drain
    let config = SchedulerConfig {
        max_workers: 2,
        queue_size: 1,
        poll_interval: Duration::from_millis(200),
        finish_poll_interval: Duration::from_millis(50),
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(3);

    let started = Instant::now();
    for i in 0..3 {
        let ddl = format!("CREATE TABLE shop.q_{} (id INT)", i);
        scheduler.add_task(schema_task(&format!("shop.q_{}", i), &ddl)).await.unwrap();
    }
    assert!(
        started.elapsed() >= Duration::from_millis(150),
        "adds should have blocked on the bounded queue, took {:?}",
        started.elapsed()
    );

    let report = scheduler.finish().await.unwrap();
    assert_eq!(report.succeeded.len(), 3);
}

#[tokio::test]
async fn task_timeout_fails_overrunning_task() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ddl = "CREATE TABLE shop.slow (id INT)";
    destination.script.delay(ddl, Duration::from_millis(200));
    let ctx = test_context(source, destination.clone(), "sched_timeout").await;

    let config = SchedulerConfig {
        task_timeout: Some(Duration::from_millis(30)),
        task_retry: 1,
        ..fast_scheduler_config()
    };
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(1);
    scheduler.add_task(schema_task("shop.slow", ddl)).await.unwrap();
    let report = scheduler.finish().await.unwrap();

    assert_eq!(report.failed.len(), 1);
    let task = &report.failed[0];
    assert_eq!(task.retry_times, 2);
    assert!(task.failure.as_deref().unwrap_or_default().contains("timeout"));
}

#[tokio::test]
async fn shutdown_cancels_only_unstarted_tasks() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let running_ddl = "CREATE TABLE shop.running (id INT)";
    destination.script.delay(running_ddl, Duration::from_millis(120));
    let ctx = test_context(source, destination.clone(), "sched_shutdown").await;

    let config = SchedulerConfig {
        max_workers: 1,
        ..fast_scheduler_config()
    };
    let mut scheduler = Scheduler::new(config, ctx);
    scheduler.run(3);
    scheduler.add_task(schema_task("shop.running", running_ddl)).await.unwrap();
    // give the first worker time to claim the only pool permit
    tokio::time::sleep(Duration::from_millis(30)).await;
    scheduler
        .add_task(schema_task("shop.pending_a", "CREATE TABLE shop.pending_a (id INT)"))
        .await
        .unwrap();
    scheduler
        .add_task(schema_task("shop.pending_b", "CREATE TABLE shop.pending_b (id INT)"))
        .await
        .unwrap();

    let report = scheduler.shutdown().await.unwrap();

    // the in-flight task ran to completion, the queued ones never started
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].name, "shop.running");
    assert_eq!(report.cancelled.len(), 2);
    for task in &report.cancelled {
        assert_eq!(task.status, TaskStatus::Cancelled);
    }
    assert_eq!(destination.executed_count("CREATE TABLE shop.pending_a (id INT)"), 0);
    assert_eq!(destination.executed_count("CREATE TABLE shop.pending_b (id INT)"), 0);
}

#[tokio::test]
async fn finish_with_no_tasks_returns_immediately() {
    let source = Arc::new(MemorySource::new());
    let destination = Arc::new(MemoryDestination::new());
    let ctx = test_context(source, destination, "sched_empty").await;

    let mut scheduler = Scheduler::new(fast_scheduler_config(), ctx);
    scheduler.run(0);
    let report = scheduler.finish().await.unwrap();
    assert!(report.is_success());
    assert!(report.succeeded.is_empty());
}
