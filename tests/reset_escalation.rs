//! Failure tallies, the reset flag and the coordinator working together.

use std::sync::Arc;
use std::time::Duration;

use radiovisor::devices::Device;
use radiovisor::events::EventKind;
use radiovisor::metrics::MemorySink;
use radiovisor::radio::{Operation, RadioManager, mock::MockFactory};
use radiovisor::{Config, Context, Coordinator, Poller, Supervisor};
use tokio_util::sync::CancellationToken;

const REFERENCE: [u8; 5] = [0xE8, 0x03, 0x32, 0x88, 0x13];

async fn context(factory: &MockFactory, sink: Arc<MemorySink>) -> Arc<Context> {
    factory.set_payloads(vec![REFERENCE.to_vec()]);
    let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
    Arc::new(Context::new(Config::default(), radio, sink))
}

fn kitchen() -> Device {
    Device::new("kitchen", "A4:C1:38:00:00:01")
}

fn bedroom() -> Device {
    Device::new("bedroom", "A4:C1:38:00:00:02")
}

#[tokio::test(start_paused = true)]
async fn escalation_raises_flag_once_and_spares_other_devices() {
    let factory = MockFactory::new();
    let ctx = context(&factory, Arc::new(MemorySink::new())).await;
    let mut events = ctx.bus().subscribe();
    let token = CancellationToken::new();

    let mut kitchen = Poller::new(kitchen(), Arc::clone(&ctx));
    let mut bedroom = Poller::new(bedroom(), Arc::clone(&ctx));

    factory.fail_next(Operation::Subscribe, 3);
    let outcome = kitchen.run_cycle(&token).await.unwrap();
    assert_eq!(outcome.failed_at, Some(Operation::Subscribe));
    assert_eq!(ctx.tracker().get("kitchen"), 3);
    assert!(ctx.reset_flag().is_requested());

    // a healthy neighbour leaves the failing tally alone
    let outcome = bedroom.run_cycle(&token).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(ctx.tracker().get("bedroom"), 0);
    assert_eq!(ctx.tracker().get("kitchen"), 3);

    // further failures while the flag is up do not raise it again
    factory.fail_next(Operation::Connect, 3);
    kitchen.run_cycle(&token).await.unwrap();
    assert_eq!(ctx.tracker().get("kitchen"), 6);
    assert_eq!(ctx.reset_flag().times_raised(), 1);

    let mut requested = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ResetRequested {
            assert_eq!(ev.device.as_deref(), Some("kitchen"));
            requested += 1;
        }
    }
    assert_eq!(requested, 1);
}

#[tokio::test(start_paused = true)]
async fn rebuild_zeroes_every_tally_and_allows_a_new_request() {
    let factory = MockFactory::new();
    let ctx = context(&factory, Arc::new(MemorySink::new())).await;
    let kitchen: Arc<str> = Arc::from("kitchen");
    let bedroom: Arc<str> = Arc::from("bedroom");

    for _ in 0..3 {
        ctx.tracker().increment(&kitchen);
    }
    ctx.tracker().increment(&bedroom);

    let generation = Coordinator::new(Arc::clone(&ctx)).rebuild().await.unwrap();
    assert_eq!(generation, 2);
    assert_eq!(ctx.tracker().get("kitchen"), 0);
    assert_eq!(ctx.tracker().get("bedroom"), 0);
    assert!(!ctx.reset_flag().is_requested());

    for _ in 0..3 {
        ctx.tracker().increment(&bedroom);
    }
    assert!(ctx.reset_flag().is_requested());
    assert_eq!(ctx.reset_flag().times_raised(), 2);
}

#[tokio::test(start_paused = true)]
async fn forced_reclaim_replaces_a_handle_held_by_a_stuck_poller() {
    let factory = MockFactory::new();
    // the poller hangs inside subscribe while holding the radio
    factory.set_delay(Operation::Subscribe, Duration::from_secs(120));
    let sink = Arc::new(MemorySink::new());
    factory.set_payloads(vec![REFERENCE.to_vec()]);
    let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
    let sup = Supervisor::new(Context::new(Config::default(), radio, sink), Vec::new());
    let ctx = Arc::clone(sup.context());
    let mut events = ctx.bus().subscribe();

    let token = CancellationToken::new();
    let run = tokio::spawn({
        let token = token.clone();
        async move { sup.run(vec![kitchen()], token).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(ctx.reset_flag().request());

    // poll at 5s, lock wait until 15s, then reclaim
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(!ctx.reset_flag().is_requested());
    assert_eq!(ctx.radio().generation(), 2);
    assert_eq!(factory.created(), 2);
    assert_eq!(factory.stopped(), 1);

    let fresh = ctx.radio().current().unwrap();
    let link = fresh.connect("A4:C1:38:00:00:02").await.unwrap();
    link.disconnect().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        kinds.push(ev.kind);
    }
    let reclaim = kinds.iter().position(|k| *k == EventKind::ForcedReclaim).unwrap();
    let completed = kinds.iter().position(|k| *k == EventKind::RebuildCompleted).unwrap();
    assert!(reclaim < completed);

    token.cancel();
    run.await.unwrap();
    assert_eq!(factory.open_links(), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_device_recovers_after_rebuild() {
    let factory = MockFactory::new();
    let sink = Arc::new(MemorySink::new());
    factory.set_payloads(vec![REFERENCE.to_vec()]);
    factory.fail_next(Operation::Connect, 3);
    let radio = RadioManager::new(Arc::new(factory.clone())).await.unwrap();
    let sup = Supervisor::new(Context::new(Config::default(), radio, sink.clone()), Vec::new());
    let ctx = Arc::clone(sup.context());

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        stop.cancel();
    });
    sup.run(vec![kitchen()], token).await;

    let snap = sink.snapshot("kitchen").unwrap();
    assert!(snap.reading.is_some());
    assert!(!snap.connection_failed);
    assert_eq!(factory.created(), 2);
    assert_eq!(ctx.reset_flag().times_raised(), 1);
    assert_eq!(ctx.tracker().get("kitchen"), 0);
}
