use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use chat_dispatch::{
    application::{
        handlers::{
            message_dispatcher::{DispatchConfig, MessageDispatcher},
            orchestrator::{Orchestrator, RunMode},
        },
        services::{
            pacer::TokioPacer,
            readiness::ReadinessGate,
            transport::{TransportClient, TransportEvents, TransportSession},
        },
        usecases::{
            purge_sent::PurgeSentMessages,
            requeue_failed::{FailedMessagePolicy, RequeueFailedMessages},
        },
    },
    domain::{
        errors::TransportError,
        models::{MessageGroup, MessageStatus, NewMessage},
        repositories::MessageRepository,
        value_objects::ChatId,
    },
    infrastructure::repositories::in_memory::InMemoryMessageRepository,
};

/// Accepts everything except the chats listed in `reject`.
#[derive(Default)]
struct StubBridge {
    reject: Vec<&'static str>,
    delivered: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl TransportClient for StubBridge {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn initialize(&self, _events: TransportEvents) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, chat_id: &ChatId, text: &str) -> Result<(), TransportError> {
        if self.reject.contains(&chat_id.as_str()) {
            return Err(TransportError::Send("chat not found".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

async fn enqueue(store: &InMemoryMessageRepository, group: MessageGroup, seq: i32, recipient: &str) {
    store
        .insert(NewMessage {
            group,
            sequence_index: seq,
            recipient: recipient.to_string(),
            content: format!("{group} #{seq}"),
        })
        .await
        .unwrap();
}

fn orchestrator(
    store: Arc<InMemoryMessageRepository>,
    bridge: Arc<StubBridge>,
    gate: &ReadinessGate,
    delete_sent: bool,
    stopped: watch::Receiver<bool>,
) -> Orchestrator {
    let dispatcher = MessageDispatcher::new(
        store.clone(),
        TransportSession::new(bridge, gate.clone()),
        Arc::new(TokioPacer),
        PurgeSentMessages::new(store, delete_sent),
        DispatchConfig {
            pacing_delay: Duration::from_millis(1),
            chat_suffix: "@c.us".to_string(),
        },
    );
    Orchestrator::new(dispatcher, RunMode::Once, stopped)
}

#[tokio::test]
async fn drains_queue_in_group_then_sequence_order() {
    let store = Arc::new(InMemoryMessageRepository::new());
    enqueue(&store, MessageGroup::Nust, 2, "+92 300 0000002").await;
    enqueue(&store, MessageGroup::Fast, 1, "0300-0000001").await;
    enqueue(&store, MessageGroup::Nust, 1, "0300 0000003").await;
    enqueue(&store, MessageGroup::Nust, 3, "0300 0000004").await;

    let bridge = Arc::new(StubBridge {
        reject: vec!["923000000002@c.us"],
        ..StubBridge::default()
    });
    let gate = ReadinessGate::new(Duration::from_millis(5));
    gate.open();
    let (_stop, stopped) = watch::channel(false);

    let summary = orchestrator(store.clone(), bridge.clone(), &gate, false, stopped)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.sent, 3);
    assert_eq!(summary.failed, 1);

    let delivered = bridge.delivered.lock().unwrap().clone();
    assert_eq!(
        delivered,
        vec![
            ("03000000001@c.us".to_string(), "FAST #1".to_string()),
            ("03000000003@c.us".to_string(), "NUST #1".to_string()),
            ("03000000004@c.us".to_string(), "NUST #3".to_string()),
        ]
    );

    let counts = store.count_by_status().await.unwrap();
    assert_eq!((counts.pending, counts.sent, counts.failed), (0, 3, 1));
}

#[tokio::test]
async fn nothing_is_sent_while_transport_is_down() {
    let store = Arc::new(InMemoryMessageRepository::new());
    enqueue(&store, MessageGroup::Pieas, 1, "03001234567").await;

    let bridge = Arc::new(StubBridge::default());
    let gate = ReadinessGate::new(Duration::from_millis(5));
    let (stop, stopped) = watch::channel(false);

    let run = tokio::spawn({
        let orchestrator = orchestrator(store.clone(), bridge.clone(), &gate, false, stopped);
        async move { orchestrator.run().await }
    });

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(bridge.delivered.lock().unwrap().is_empty());
    assert_eq!(store.count_by_status().await.unwrap().pending, 1);

    stop.send_replace(true);
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.sent, 0);
    assert_eq!(store.count_by_status().await.unwrap().pending, 1);
}

#[tokio::test]
async fn retry_policy_and_retention_across_runs() {
    let store = Arc::new(InMemoryMessageRepository::new());
    enqueue(&store, MessageGroup::Nums, 1, "03001111111").await;
    enqueue(&store, MessageGroup::Nums, 2, "no digits here").await;

    let gate = ReadinessGate::new(Duration::from_millis(5));
    gate.open();

    let (_stop, stopped) = watch::channel(false);
    orchestrator(store.clone(), Arc::new(StubBridge::default()), &gate, true, stopped)
        .run()
        .await
        .unwrap();

    // Sent rows were purged; the undeliverable one stays failed.
    let counts = store.count_by_status().await.unwrap();
    assert_eq!((counts.pending, counts.sent, counts.failed), (0, 0, 1));

    let kept = RequeueFailedMessages::new(store.clone(), FailedMessagePolicy::Keep)
        .execute()
        .await
        .unwrap();
    assert_eq!(kept, 0);

    let requeued = RequeueFailedMessages::new(store.clone(), FailedMessagePolicy::RequeueOnStartup)
        .execute()
        .await
        .unwrap();
    assert_eq!(requeued, 1);

    let due = store.list_due().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].status, MessageStatus::Pending);
    assert_eq!(due[0].failure_reason, None);
}
