//! Engine integration tests against the port mocks.
//!
//! Exercises the full wiring: strategy init from a persisted state,
//! the polling loop, one-trade-in-flight sequencing, shutdown and
//! best-effort event publishing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

use anchorbot::application::Engine;
use anchorbot::domain::anchor::AnchorState;
use anchorbot::domain::gas_policy::GasPolicy;
use anchorbot::domain::persistence::StateStore;
use anchorbot::events::{EventBus, FeedEvent};
use anchorbot::ports::mocks::{MockChain, MockPriceFeed, MockSwapRouter};
use anchorbot::ports::models::{decimal_to_units, Balance, PriceSnapshot};
use anchorbot::ports::price::PriceError;
use anchorbot::strategy::{ReactiveStrategy, StrategyParams};

fn snapshot(token_usd: Decimal) -> PriceSnapshot {
    PriceSnapshot {
        token_usd,
        native_usd: dec!(1000),
        token_per_native: token_usd / dec!(1000),
        fetched_at: Utc::now(),
    }
}

fn params() -> StrategyParams {
    StrategyParams {
        sell_gain_pct: dec!(0.10),
        rebuy_drop_pct: dec!(0.10),
        reserve_usd: dec!(10),
        dust_token: dec!(0.000001),
        slippage_bps: 50,
        swap_gas_units: 200_000,
        receipt_timeout: Duration::from_secs(5),
        token_decimals: 18,
        paper: false,
    }
}

fn holding_balance() -> Balance {
    Balance::from_raw(
        decimal_to_units(dec!(1), 18),
        decimal_to_units(dec!(1000), 18),
        18,
    )
}

/// Persist a HOLD state with anchor $1.00 so init resumes from it.
fn seed_hold_state(dir: &TempDir) -> StateStore {
    let store = StateStore::new(dir.path());
    store
        .save_state(&AnchorState::inferred_holding(dec!(1.00)))
        .unwrap();
    store
}

async fn build_engine(
    chain: MockChain,
    router: MockSwapRouter,
    feed: MockPriceFeed,
    store: StateStore,
    bus: EventBus,
    tick: Duration,
) -> Engine {
    let chain = Arc::new(chain);
    let feed = Arc::new(feed);
    let strategy = ReactiveStrategy::init(
        chain.clone(),
        Arc::new(router),
        feed.clone(),
        GasPolicy::new(0, 0, u128::MAX, 0, dec!(1000)),
        store,
        params(),
    )
    .await
    .unwrap();

    Engine::new(strategy, chain, feed, bus, tick, Duration::from_secs(60))
}

#[tokio::test]
async fn slow_swaps_never_overlap() {
    let dir = tempdir().unwrap();
    let store = seed_hold_state(&dir);
    let router = MockSwapRouter::new().with_delay(Duration::from_millis(200));
    // Every attempt fails at the build stage, so the state stays HOLD
    // and each tick retries the sell.
    for _ in 0..50 {
        router.push_result(Err(
            anchorbot::ports::swap::SwapError::Build("no route".into()),
        ));
    }

    let engine = build_engine(
        MockChain::new(holding_balance()),
        router.clone(),
        MockPriceFeed::new().with_snapshot(snapshot(dec!(1.20))),
        store,
        EventBus::default(),
        Duration::from_millis(5),
    )
    .await;

    let (tx, shutdown) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown));
    tokio::time::sleep(Duration::from_millis(700)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    // With a 200ms swap and a 5ms tick, overlapping ticks would record
    // dozens of calls. Sequential ticks fit at most a handful.
    let count = router.swap_count();
    assert!(count >= 2, "expected repeated attempts, got {count}");
    assert!(count <= 5, "swaps overlapped: {count} calls in 700ms");
}

#[tokio::test]
async fn shutdown_lets_the_inflight_trade_finish() {
    let dir = tempdir().unwrap();
    let store = seed_hold_state(&dir);
    let router = MockSwapRouter::new().with_delay(Duration::from_millis(200));

    let engine = build_engine(
        MockChain::new(holding_balance()),
        router.clone(),
        MockPriceFeed::new().with_snapshot(snapshot(dec!(1.20))),
        store,
        EventBus::default(),
        Duration::from_millis(5),
    )
    .await;

    let (tx, shutdown) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown));

    // Signal shutdown while the first sell is still resolving.
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(router.swap_count(), 1);

    // The trade completed and was persisted before the engine stopped.
    let state = StateStore::new(dir.path()).load_state().unwrap().unwrap();
    assert!(!state.holding);
    assert_eq!(state.anchor_price_usd, dec!(1.20));
}

#[tokio::test]
async fn confirmed_trade_reaches_feed_subscribers() {
    let dir = tempdir().unwrap();
    let store = seed_hold_state(&dir);
    let bus = EventBus::default();
    let mut rx = bus.subscribe();

    let engine = build_engine(
        MockChain::new(holding_balance()),
        MockSwapRouter::new(),
        MockPriceFeed::new().with_snapshot(snapshot(dec!(1.20))),
        store,
        bus,
        Duration::from_millis(5),
    )
    .await;

    let (tx, shutdown) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown));

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no event within 2s")
        .unwrap();
    match event {
        FeedEvent::Trade {
            success, price_usd, ..
        } => {
            assert!(success);
            assert_eq!(price_usd, dec!(1.20));
        }
        other => panic!("expected trade event, got {other:?}"),
    }

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unavailable_price_keeps_the_engine_alive() {
    let dir = tempdir().unwrap();
    let store = seed_hold_state(&dir);
    let router = MockSwapRouter::new();
    let feed = MockPriceFeed::new().with_snapshot(snapshot(dec!(1.20)));

    // Queued failures take precedence over the sticky snapshot, so
    // every tick sees an unavailable feed.
    for _ in 0..100 {
        feed.push(Err(PriceError::Unavailable("feed down".into())));
    }

    let engine = build_engine(
        MockChain::new(holding_balance()),
        router.clone(),
        feed,
        store,
        EventBus::default(),
        Duration::from_millis(5),
    )
    .await;

    let (tx, shutdown) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown));
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(router.swap_count(), 0);
}
