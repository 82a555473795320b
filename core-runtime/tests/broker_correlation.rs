//! End-to-end correlation behaviour of the broker.

use bridge_loopback::{pair, MemoryHost};
use bridge_traits::{
    CorrelationId, HostChannel, InboundMessage, InboundReply, OutboundMessage, Result as BridgeResult,
};
use core_runtime::{Broker, BrokerConfig, CallState, Deferred, Error, Fault};
use futures::future::join_all;
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mock! {
    pub Channel {}

    impl HostChannel for Channel {
        fn send(&self, message: OutboundMessage) -> BridgeResult<()>;
        fn is_open(&self) -> bool;
    }
}

fn accepting_channel(times: usize) -> Arc<MockChannel> {
    let mut channel = MockChannel::new();
    channel.expect_send().times(times).returning(|_| Ok(()));
    Arc::new(channel)
}

fn reply(id: u32, value: Value) -> InboundMessage {
    InboundReply::success(CorrelationId(id), value).into()
}

fn issue(broker: &Broker, count: u32) -> Vec<Deferred> {
    (1..=count)
        .map(|n| broker.call("/test/echo", vec![json!(n)]))
        .collect()
}

#[tokio::test]
async fn test_replies_out_of_order_reach_their_callers() {
    let broker = Broker::new(BrokerConfig::default(), accepting_channel(3)).unwrap();
    let handles = issue(&broker, 3);

    let ids: Vec<_> = handles.iter().map(|h| h.id().unwrap().get()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    for id in [3, 1, 2] {
        broker.dispatch(reply(id, json!(format!("payload-{id}")))).unwrap();
    }

    let results = join_all(handles).await;
    assert_eq!(
        results,
        vec![
            Ok(json!("payload-1")),
            Ok(json!("payload-2")),
            Ok(json!("payload-3")),
        ]
    );
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_reverse_and_shuffled_orders() {
    const N: u32 = 24;
    // Multiplying by 7 modulo 25 permutes 1..=24.
    let shuffled: Vec<u32> = (1..=N).map(|n| (n * 7) % 25).collect();
    let reversed: Vec<u32> = (1..=N).rev().collect();

    for order in [reversed, shuffled] {
        let broker = Broker::new(BrokerConfig::default(), accepting_channel(N as usize)).unwrap();
        let handles = issue(&broker, N);

        for id in &order {
            broker.dispatch(reply(*id, json!(id * 10))).unwrap();
        }

        let results = join_all(handles).await;
        for (n, result) in (1..=N).zip(results) {
            assert_eq!(result, Ok(json!(n * 10)));
        }
    }
}

#[tokio::test]
async fn test_validation_failure_sends_nothing() {
    let mut channel = MockChannel::new();
    channel.expect_send().never();
    let broker = Broker::new(BrokerConfig::default(), Arc::new(channel)).unwrap();

    let handle = broker.begin("/nuvola/storage/set-value", |_| {
        Err(Fault::LocalValidation("object values are not storable".into()))
    });

    assert!(matches!(handle.await, Err(Fault::LocalValidation(_))));
}

#[tokio::test]
async fn test_cancelled_pump_rejects_unanswered_calls() {
    let broker = Broker::new(BrokerConfig::default(), accepting_channel(2)).unwrap();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let pump = tokio::spawn(broker.clone().run(inbound_rx, cancel.clone()));

    let answered = broker.call("/a", vec![]);
    let mut lost = broker.call("/b", vec![]);
    inbound_tx.send(reply(1, json!("ok"))).unwrap();
    assert_eq!(answered.await, Ok(json!("ok")));
    assert_eq!(lost.try_state(), CallState::Pending);

    cancel.cancel();
    pump.await.unwrap();

    assert!(matches!(lost.await, Err(Fault::Transport(_))));
    assert!(broker.is_shut_down());
}

#[tokio::test]
async fn test_closed_inbound_stream_tears_down() {
    let broker = Broker::new(BrokerConfig::default(), accepting_channel(1)).unwrap();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
    let handle = broker.call("/never", vec![]);

    drop(inbound_tx);
    broker.clone().run(inbound_rx, CancellationToken::new()).await;

    assert!(matches!(handle.await, Err(Fault::Transport(_))));
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_unknown_reply_does_not_disturb_other_calls() {
    let broker = Broker::new(BrokerConfig::default(), accepting_channel(1)).unwrap();
    let handle = broker.call("/a", vec![]);

    assert!(matches!(broker.dispatch(reply(42, json!(0))), Err(Fault::Protocol(_))));
    broker.dispatch(reply(1, json!("fine"))).unwrap();
    assert_eq!(handle.await, Ok(json!("fine")));
}

#[tokio::test]
async fn test_counter_wraps_past_limit() {
    let config = BrokerConfig::builder().correlation_limit(3).build().unwrap();
    let broker = Broker::new(config, accepting_channel(5)).unwrap();

    let first = issue(&broker, 3);
    broker.dispatch(reply(1, json!(null))).unwrap();
    broker.dispatch(reply(3, json!(null))).unwrap();

    // Ids 1 and 3 are free again, 2 is still in flight.
    let a = broker.call("/wrap", vec![]);
    let b = broker.call("/wrap", vec![]);
    assert_eq!(a.id(), Some(CorrelationId(1)));
    assert_eq!(b.id(), Some(CorrelationId(3)));

    // Table is full: the next call is rejected without being sent.
    let mut c = broker.call("/wrap", vec![]);
    assert!(matches!(c.try_state(), CallState::Rejected(Fault::Transport(_))));

    drop(first);
}

#[test]
fn test_blocking_call_through_loopback_host() {
    let (channel, endpoint, inbound) = pair();
    let broker = Broker::new(BrokerConfig::default(), Arc::new(channel)).unwrap();
    let host = Arc::new(MemoryHost::new());
    let cancel = CancellationToken::new();

    let pump = {
        let broker = Arc::clone(&broker);
        let host = Arc::clone(&host);
        let cancel = cancel.clone();
        thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                tokio::spawn(host.serve(endpoint));
                broker.run(inbound, cancel).await;
            });
        })
    };

    broker
        .call_blocking("/nuvola/storage/set-value", vec![json!(1), json!("volume"), json!(0.5)])
        .unwrap();
    let value = broker
        .call_blocking("/nuvola/storage/get-value", vec![json!(1), json!("volume")])
        .unwrap();
    assert_eq!(value, json!(0.5));

    let err = broker
        .call_blocking("/nuvola/storage/get-value", vec![json!(1), json!("missing")])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Fault(Fault::Remote { ref code, .. }) if code == "key-not-found"
    ));

    cancel.cancel();
    pump.join().unwrap();
    assert!(broker.is_shut_down());
}

#[test]
fn test_blocking_call_released_by_teardown() {
    let broker = Broker::new(BrokerConfig::default(), accepting_channel(1)).unwrap();

    let killer = {
        let broker = Arc::clone(&broker);
        thread::spawn(move || {
            while broker.pending_count() == 0 {
                thread::sleep(Duration::from_millis(5));
            }
            broker.shutdown()
        })
    };

    let err = broker.call_blocking("/stuck", vec![]).unwrap_err();
    assert!(matches!(err, Error::Fault(Fault::Transport(_))));
    assert_eq!(killer.join().unwrap(), 1);
}
