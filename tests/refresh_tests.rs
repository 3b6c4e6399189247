mod common;

use std::sync::Arc;
use std::time::Duration;

use launch_indexer::config::IndexerSettings;
use launch_indexer::error::{RefreshError, StoreError};
use launch_indexer::jobs::refresh_scheduler::{RefreshOutcome, RefreshScheduler, SchedulerState};
use launch_indexer::models::launch::LaunchState;
use launch_indexer::services::launch_store::LaunchStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::{harness, launch_addr, settings, state, Harness};

async fn ingest(h: &Harness, n: u8, total_supply: Decimal, launch_state: LaunchState) {
    let event = h.chain.create_launch(launch_addr(n), n as u64, total_supply, launch_state);
    h.ingestor.ingest_creation(&event).await.unwrap();
}

fn scheduler(h: &Harness, settings: &IndexerSettings) -> Arc<RefreshScheduler> {
    Arc::new(RefreshScheduler::new(h.chain.clone(), h.store.clone(), settings))
}

#[tokio::test]
async fn test_refresh_updates_derived_fields() {
    let h = harness(100);
    ingest(&h, 1, dec!(1000000), state(dec!(0.001), dec!(100000), dec!(5), false)).await;
    let before = h.store.get(launch_addr(1)).unwrap();

    h.chain.set_state(launch_addr(1), state(dec!(0.004), dec!(400000), dec!(20), false));
    let report = scheduler(&h, &settings()).run_cycle().await;

    assert_eq!(report.active, 1);
    assert_eq!(report.refreshed, 1);
    let after = h.store.get(launch_addr(1)).unwrap();
    assert_eq!(after.current_price_native, dec!(0.004));
    assert_eq!(after.tokens_sold, dec!(400000));
    assert_eq!(after.native_raised, dec!(20));
    assert_eq!(after.liquidity_native, after.native_raised);
    assert_eq!(after.bonding_curve_progress_percent, dec!(40));
    assert_eq!(after.market_cap_estimate, dec!(4000));
    assert!(after.last_synced_at >= before.last_synced_at);
}

#[tokio::test]
async fn test_refresh_leaves_immutable_fields() {
    let source = harness(100);
    ingest(&source, 1, dec!(1000), state(dec!(0.1), dec!(100), dec!(1), false)).await;
    let mut seeded = source.store.get(launch_addr(1)).unwrap();
    seeded.verified = true;
    seeded.flagged = true;
    seeded.holders_count = 42;

    let h = harness(100);
    h.store.upsert_create(&seeded).await.unwrap();
    h.chain.add_launch(launch_addr(1), dec!(999999), state(dec!(0.2), dec!(500), dec!(2), false));

    scheduler(&h, &settings()).refresh_one(launch_addr(1)).await.unwrap();

    let record = h.store.get(launch_addr(1)).unwrap();
    assert!(record.verified);
    assert!(record.flagged);
    assert_eq!(record.holders_count, 42);
    assert_eq!(record.name, seeded.name);
    assert_eq!(record.symbol, seeded.symbol);
    assert_eq!(record.token_address, seeded.token_address);
    assert_eq!(record.creator_address, seeded.creator_address);
    assert_eq!(record.created_at_block_time, seeded.created_at_block_time);
    assert_eq!(record.logo_url, seeded.logo_url);
    // Supply is fixed at creation; derived values use the stored one
    assert_eq!(record.total_supply, dec!(1000));
    assert_eq!(record.bonding_curve_progress_percent, dec!(50));
    assert_eq!(record.market_cap_estimate, dec!(200));
}

#[tokio::test]
async fn test_launch_graduates_and_leaves_rotation() {
    let h = harness(100);
    ingest(&h, 1, dec!(100), state(dec!(0.5), dec!(50), dec!(10), false)).await;
    assert_eq!(h.store.get(launch_addr(1)).unwrap().bonding_curve_progress_percent, dec!(50));

    let scheduler = scheduler(&h, &settings());
    h.chain.set_state(launch_addr(1), state(dec!(1), dec!(100), dec!(24), true));
    let report = scheduler.run_cycle().await;

    assert_eq!(report.graduated, 1);
    let record = h.store.get(launch_addr(1)).unwrap();
    assert!(record.is_graduated);
    assert_eq!(record.bonding_curve_progress_percent, dec!(100));
    assert!(h.store.find_active().await.unwrap().is_empty());

    let calls = h.chain.state_calls();
    let report = scheduler.run_cycle().await;
    assert_eq!(report.active, 0);
    assert_eq!(h.chain.state_calls(), calls);
}

#[tokio::test]
async fn test_graduation_is_never_cleared() {
    let h = harness(100);
    ingest(&h, 1, dec!(100), state(dec!(1), dec!(100), dec!(24), true)).await;
    assert!(h.store.get(launch_addr(1)).unwrap().is_graduated);

    h.chain.set_state(launch_addr(1), state(dec!(0.9), dec!(90), dec!(20), false));
    let outcome = scheduler(&h, &settings()).refresh_one(launch_addr(1)).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Updated);
    let record = h.store.get(launch_addr(1)).unwrap();
    assert!(record.is_graduated);
    assert_eq!(record.tokens_sold, dec!(90));
}

#[tokio::test]
async fn test_failing_launch_does_not_block_others() {
    let h = harness(100);
    for n in 1..=3 {
        ingest(&h, n, dec!(1000), state(dec!(0.1), dec!(100), dec!(1), false)).await;
    }
    for n in 1..=3 {
        h.chain.set_state(launch_addr(n), state(dec!(0.2), dec!(300), dec!(4), false));
    }
    h.chain.fail_calls(launch_addr(1));

    let scheduler = scheduler(&h, &settings());
    let report = scheduler.run_cycle().await;

    assert_eq!(report.active, 3);
    assert_eq!(report.refreshed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(h.store.get(launch_addr(1)).unwrap().tokens_sold, dec!(100));
    assert_eq!(h.store.get(launch_addr(2)).unwrap().tokens_sold, dec!(300));
    assert_eq!(h.store.get(launch_addr(3)).unwrap().tokens_sold, dec!(300));
    assert_eq!(scheduler.stats().failed(), 1);
    assert_eq!(scheduler.stats().refreshed(), 2);
}

#[tokio::test]
async fn test_refresh_unknown_launch_is_not_found() {
    let h = harness(100);
    let err = scheduler(&h, &settings()).refresh_one(launch_addr(7)).await.unwrap_err();
    assert!(matches!(err, RefreshError::Store(StoreError::NotFound { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_cycle_concurrency_is_bounded() {
    let h = harness(100);
    for n in 1..=10 {
        ingest(&h, n, dec!(1000), state(dec!(0.1), dec!(100), dec!(1), false)).await;
    }
    h.chain.set_state_delay(Duration::from_millis(20));

    let mut settings = settings();
    settings.refresh_concurrency = 3;
    let report = scheduler(&h, &settings).run_cycle().await;

    assert_eq!(report.refreshed, 10);
    assert_eq!(h.chain.max_in_flight(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycles_never_overlap() {
    let h = harness(100);
    for n in 1..=3 {
        ingest(&h, n, dec!(1000), state(dec!(0.1), dec!(100), dec!(1), false)).await;
    }
    // Each cycle takes 360ms against a 50ms period
    h.chain.set_state_delay(Duration::from_millis(120));

    let mut settings = settings();
    settings.refresh_concurrency = 1;
    let handle = scheduler(&h, &settings).spawn();
    let stats = handle.stats();

    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.stop().await.unwrap();

    assert!(stats.cycles_started() >= 3);
    assert_eq!(stats.cycles_started(), stats.cycles_completed());
    assert_eq!(h.chain.max_in_flight(), 1);

    let timeline = h.chain.timeline();
    assert_eq!(timeline.len() % 2, 0);
    for pair in timeline.chunks(2) {
        assert_eq!(pair, ["start", "end"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_cycle_finish() {
    let h = harness(100);
    ingest(&h, 1, dec!(1000), state(dec!(0.1), dec!(100), dec!(1), false)).await;
    h.chain.set_state(launch_addr(1), state(dec!(0.3), dec!(600), dec!(9), false));
    h.chain.set_state_delay(Duration::from_millis(200));

    let handle = scheduler(&h, &settings()).spawn();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), SchedulerState::Running);

    let stats = handle.stats();
    handle.stop().await.unwrap();

    assert_eq!(stats.cycles_started(), 1);
    assert_eq!(stats.cycles_completed(), 1);
    assert_eq!(h.store.get(launch_addr(1)).unwrap().tokens_sold, dec!(600));
    // One read from ingestion, one from the drained cycle
    assert_eq!(h.chain.timeline(), vec!["start", "end", "start", "end"]);
}
