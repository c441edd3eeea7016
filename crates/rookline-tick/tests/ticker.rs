//! Ticker timing under paused tokio time.

use std::time::Duration;

use rookline_tick::{OverrunPolicy, Ticker, TickerConfig};

fn one_second() -> TickerConfig {
    TickerConfig::every(Duration::from_secs(1))
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_next_tick_fires_after_interval() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::new(one_second());

    let tick = ticker.next_tick().await;

    assert_eq!(tick.seq, 1);
    assert_eq!(tick.dt, Duration::from_secs(1));
    assert_eq!(tick.ticks_skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_numbered_monotonically() {
    let mut ticker = Ticker::new(one_second());
    for expected in 1..=4 {
        let tick = ticker.next_tick().await;
        ticker.finish_tick();
        assert_eq!(tick.seq, expected);
    }
    assert_eq!(ticker.seq(), 4);
    assert_eq!(ticker.metrics().total_ticks, 4);
    assert_eq!(ticker.metrics().total_overruns, 0);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_only_delays_first_tick() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::new(TickerConfig {
        initial_jitter: Duration::from_millis(100),
        ..one_second()
    });

    ticker.next_tick().await;
    let first = start.elapsed();
    assert!(first >= Duration::from_secs(1));
    assert!(first < Duration::from_millis(1_100));

    ticker.next_tick().await;
    assert_eq!(start.elapsed() - first, Duration::from_secs(1));
}

// =========================================================================
// Overruns
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_missed_ticks() {
    let mut ticker = Ticker::new(one_second());

    // Due at 1s; we arrive at 3.5s.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let tick = ticker.next_tick().await;

    assert_eq!(tick.ticks_skipped, 2);
    assert_eq!(tick.elapsed(), Duration::from_secs(3));
    assert_eq!(ticker.metrics().total_overruns, 1);
    assert_eq!(ticker.metrics().total_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reschedules_from_now() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::new(one_second());

    tokio::time::advance(Duration::from_millis(3_500)).await;
    ticker.next_tick().await;
    ticker.next_tick().await;

    assert_eq!(start.elapsed(), Duration::from_millis(4_500));
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_grid() {
    let start = tokio::time::Instant::now();
    let mut ticker = Ticker::new(TickerConfig {
        policy: OverrunPolicy::Drop,
        ..one_second()
    });

    tokio::time::advance(Duration::from_millis(3_500)).await;
    let tick = ticker.next_tick().await;
    assert_eq!(tick.ticks_skipped, 0);

    ticker.next_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_finish_tick_without_tick_is_noop() {
    let mut ticker = Ticker::new(one_second());
    ticker.finish_tick();
    assert_eq!(ticker.metrics().max_tick_time, Duration::ZERO);
}
