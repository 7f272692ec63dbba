use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    application::services::{
        change_feed::ChangeFeed,
        lifecycle::MessageLifecycle,
        observers::{ErrorObservers, PipelineError, TransitionError},
    },
    domain::{
        events::{ChangeEvent, ChangeKey, ChangeValue, RowImage, StatusChange},
        models::MessageStatus,
    },
};

/// Turns PENDING -> SENT change events into dispatches, one event at a time.
pub struct StatusTransitioner {
    lifecycle: Arc<dyn MessageLifecycle>,
    feed: Arc<dyn ChangeFeed>,
    observers: ErrorObservers,
    shutdown: CancellationToken,
    abort: CancellationToken,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl StatusTransitioner {
    pub fn new(
        lifecycle: Arc<dyn MessageLifecycle>,
        feed: Arc<dyn ChangeFeed>,
        observers: ErrorObservers,
    ) -> Self {
        Self {
            lifecycle,
            feed,
            observers,
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Reads and handles events until the feed ends or `stop` is called.
    pub async fn run(&self) {
        tracing::info!("status transitioner started");
        while !self.shutdown.is_cancelled() {
            // a read is never raced against shutdown: the feed may already
            // have acked the event, so it is handled once it is returned
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let ended = self.step().await;
            if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.drained.notify_waiters();
            }
            if ended {
                break;
            }
        }
        tracing::info!("status transitioner stopped");
    }

    /// Reads and handles one event. Returns `true` once the feed has ended.
    async fn step(&self) -> bool {
        let event = match self.feed.next().await {
            None => return true,
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                self.report(TransitionError::Read(err));
                return false;
            }
        };
        if let Err(err) = self.handle(event).await {
            self.report(err);
        }
        false
    }

    /// Closes the feed and waits for the pending read and the event being
    /// handled, if any.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        let closed = self.feed.close().await;
        self.wait_drained().await;
        closed
    }

    /// Like `stop`, but abandons an in-flight dispatch instead of waiting for it.
    pub async fn abort(&self) -> anyhow::Result<()> {
        self.abort.cancel();
        self.stop().await
    }

    /// Reads or dispatches currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn wait_drained(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            drained.await;
        }
    }

    async fn handle(&self, event: ChangeEvent) -> Result<(), TransitionError> {
        let key: ChangeKey =
            serde_json::from_slice(&event.key).map_err(TransitionError::MalformedKey)?;
        if key.id.is_empty() {
            return Err(TransitionError::MissingId);
        }
        let id = key.id;

        let value: ChangeValue = serde_json::from_slice(&event.value).map_err(|source| {
            TransitionError::MalformedValue {
                id: id.clone(),
                source,
            }
        })?;
        let change = StatusChange {
            before: parse_status(&id, "before", value.before)?,
            after: parse_status(&id, "after", value.after)?,
        };

        if !change.is_dispatch_trigger() {
            return Err(TransitionError::UnexpectedTransition {
                id,
                before: change.before,
                after: change.after,
            });
        }

        tracing::debug!(message_id = %id, "dispatching message after status change");
        tokio::select! {
            result = self.lifecycle.sent(&id) => result
                .map(|_| ())
                .map_err(|source| TransitionError::Dispatch { id, source }),
            _ = self.abort.cancelled() => Err(TransitionError::Cancelled { id }),
        }
    }

    fn report(&self, error: TransitionError) {
        self.observers.notify(PipelineError::Transitioner(error));
    }
}

fn parse_status(
    id: &str,
    image: &'static str,
    row: Option<RowImage>,
) -> Result<MessageStatus, TransitionError> {
    let value = row
        .and_then(|row| row.status)
        .ok_or_else(|| TransitionError::MissingStatus {
            id: id.to_string(),
            image,
        })?;
    MessageStatus::from_str(&value).ok_or_else(|| TransitionError::UnknownStatus {
        id: id.to_string(),
        image,
        value,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        application::services::{
            delivery::testing::RecordingGateway, lifecycle::MessageLifecycleService,
            observers::testing::RecordingObserver,
        },
        domain::{
            errors::DomainError,
            models::{Message, NewMessage, SentEligibility},
        },
        infrastructure::repositories::in_memory::{
            InMemoryDispatchReceiptRepository, InMemoryMessageRepository,
        },
    };

    /// Feed backed by a channel; closing it ends the stream.
    struct ChannelFeed {
        events: tokio::sync::Mutex<mpsc::UnboundedReceiver<anyhow::Result<ChangeEvent>>>,
        closed: CancellationToken,
    }

    impl ChannelFeed {
        fn new() -> (mpsc::UnboundedSender<anyhow::Result<ChangeEvent>>, Arc<Self>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let feed = Arc::new(Self {
                events: tokio::sync::Mutex::new(rx),
                closed: CancellationToken::new(),
            });
            (tx, feed)
        }
    }

    #[async_trait]
    impl ChangeFeed for ChannelFeed {
        async fn next(&self) -> Option<anyhow::Result<ChangeEvent>> {
            let mut events = self.events.lock().await;
            tokio::select! {
                _ = self.closed.cancelled() => None,
                event = events.recv() => event,
            }
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.closed.cancel();
            Ok(())
        }
    }

    #[derive(Default)]
    struct SpyLifecycle {
        sent: Mutex<Vec<String>>,
        delay: Duration,
        fail: bool,
        entered: Notify,
        completed: AtomicUsize,
    }

    impl SpyLifecycle {
        fn sent_ids(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageLifecycle for SpyLifecycle {
        async fn create(&self, _: NewMessage) -> Result<Message, DomainError> {
            unimplemented!()
        }

        async fn list_by_status(&self, _: &str) -> Result<Vec<Message>, DomainError> {
            unimplemented!()
        }

        async fn process(&self) -> Result<u64, DomainError> {
            unimplemented!()
        }

        async fn sent(&self, message_id: &str) -> Result<String, DomainError> {
            self.sent.lock().unwrap().push(message_id.to_string());
            self.entered.notify_one();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DomainError::NotFound(message_id.to_string()));
            }
            Ok("provider-id".to_string())
        }
    }

    fn event(id: &str, before: &str, after: &str) -> ChangeEvent {
        ChangeEvent::new(
            json!({ "id": id }).to_string(),
            json!({ "before": { "status": before }, "after": { "status": after } }).to_string(),
        )
    }

    struct Harness {
        lifecycle: Arc<SpyLifecycle>,
        observer: Arc<RecordingObserver>,
        events: mpsc::UnboundedSender<anyhow::Result<ChangeEvent>>,
        transitioner: Arc<StatusTransitioner>,
    }

    fn harness(lifecycle: SpyLifecycle) -> Harness {
        let lifecycle = Arc::new(lifecycle);
        let observer = Arc::new(RecordingObserver::default());
        let (events, feed) = ChannelFeed::new();
        let transitioner = Arc::new(StatusTransitioner::new(
            lifecycle.clone(),
            feed,
            ErrorObservers::new().subscribe(observer.clone()),
        ));
        Harness {
            lifecycle,
            observer,
            events,
            transitioner,
        }
    }

    fn spawn_run(transitioner: &Arc<StatusTransitioner>) -> tokio::task::JoinHandle<()> {
        let transitioner = transitioner.clone();
        tokio::spawn(async move { transitioner.run().await })
    }

    /// Feed that acks a single event on read and takes a while to hand it over.
    struct SlowHandoverFeed {
        event: Mutex<Option<ChangeEvent>>,
        acked: AtomicUsize,
        handover: Duration,
        closed: CancellationToken,
    }

    #[async_trait]
    impl ChangeFeed for SlowHandoverFeed {
        async fn next(&self) -> Option<anyhow::Result<ChangeEvent>> {
            if self.closed.is_cancelled() {
                return None;
            }
            let event = self.event.lock().unwrap().take();
            match event {
                Some(event) => {
                    self.acked.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(self.handover).await;
                    Some(Ok(event))
                }
                None => {
                    self.closed.cancelled().await;
                    None
                }
            }
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.closed.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn pending_to_sent_triggers_one_dispatch() {
        let h = harness(SpyLifecycle::default());
        let id = Uuid::new_v4().to_string();
        h.events.send(Ok(event(&id, "PENDING", "SENT"))).unwrap();
        drop(h.events);

        h.transitioner.run().await;

        assert_eq!(h.lifecycle.sent_ids(), vec![id]);
        assert!(h.observer.errors().is_empty());
    }

    #[tokio::test]
    async fn other_events_are_reported_and_skipped() {
        let h = harness(SpyLifecycle::default());
        let id = Uuid::new_v4().to_string();
        for event in [
            event(&id, "SENT", "SENT"),
            event(&id, "PENDING", "PENDING"),
            ChangeEvent::new("not json", json!({}).to_string()),
            ChangeEvent::new(json!({ "id": "" }).to_string(), json!({}).to_string()),
            ChangeEvent::new(json!({ "id": id }).to_string(), "not json"),
            ChangeEvent::new(
                json!({ "id": id }).to_string(),
                json!({ "before": null, "after": { "status": "SENT" } }).to_string(),
            ),
            event(&id, "PENDING", "DELIVERED"),
        ] {
            h.events.send(Ok(event)).unwrap();
        }
        h.events.send(Err(anyhow::anyhow!("broker hiccup"))).unwrap();
        drop(h.events);

        h.transitioner.run().await;

        assert!(h.lifecycle.sent_ids().is_empty());
        let errors = h.observer.errors();
        assert_eq!(errors.len(), 8);
        assert!(errors[0].contains("SENT -> SENT"));
        assert!(errors[2].contains("key is malformed"));
        assert!(errors[3].contains("no message id"));
        assert!(errors[4].contains("value for message"));
        assert!(errors[5].contains("no before status"));
        assert!(errors[6].contains("unknown after status"));
        assert!(errors[7].contains("broker hiccup"));
    }

    #[tokio::test]
    async fn dispatch_failures_do_not_halt_the_loop() {
        let h = harness(SpyLifecycle {
            fail: true,
            ..Default::default()
        });
        let first = Uuid::new_v4().to_string();
        let second = Uuid::new_v4().to_string();
        h.events.send(Ok(event(&first, "PENDING", "SENT"))).unwrap();
        h.events.send(Ok(event(&second, "PENDING", "SENT"))).unwrap();
        drop(h.events);

        h.transitioner.run().await;

        assert_eq!(h.lifecycle.sent_ids(), vec![first, second]);
        assert_eq!(h.observer.errors().len(), 2);
        assert!(h.observer.errors()[0].contains("failed to dispatch"));
        assert_eq!(h.transitioner.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_dispatch() {
        let messages = Arc::new(InMemoryMessageRepository::new());
        let receipts = Arc::new(InMemoryDispatchReceiptRepository::new());
        let gateway = Arc::new(
            RecordingGateway::accepting("provider-id").with_delay(Duration::from_secs(30)),
        );
        let lifecycle = Arc::new(MessageLifecycleService::new(
            messages.clone(),
            receipts.clone(),
            gateway.clone(),
            SentEligibility::AlreadySent,
        ));
        let now = chrono::Utc::now();
        let id = Uuid::new_v4();
        messages
            .insert(Message {
                id,
                created_at: now,
                updated_at: now,
                content: "This is a valid message content".to_string(),
                phone: "+905551234567".to_string(),
                status: MessageStatus::Sent,
            })
            .await;

        let observer = Arc::new(RecordingObserver::default());
        let (events, feed) = ChannelFeed::new();
        let transitioner = Arc::new(StatusTransitioner::new(
            lifecycle,
            feed,
            ErrorObservers::new().subscribe(observer.clone()),
        ));
        let runner = spawn_run(&transitioner);

        events
            .send(Ok(event(&id.to_string(), "PENDING", "SENT")))
            .unwrap();
        while gateway.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(receipts.len().await, 0);

        transitioner.stop().await.unwrap();

        assert_eq!(receipts.len().await, 1);
        assert!(receipts.get("provider-id").await.is_some());
        assert_eq!(transitioner.in_flight(), 0);
        runner.await.unwrap();
        assert!(observer.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn event_read_during_stop_is_still_handled() {
        let lifecycle = Arc::new(SpyLifecycle::default());
        let id = Uuid::new_v4().to_string();
        let feed = Arc::new(SlowHandoverFeed {
            event: Mutex::new(Some(event(&id, "PENDING", "SENT"))),
            acked: AtomicUsize::new(0),
            handover: Duration::from_millis(50),
            closed: CancellationToken::new(),
        });
        let transitioner = Arc::new(StatusTransitioner::new(
            lifecycle.clone(),
            feed.clone(),
            ErrorObservers::new(),
        ));
        let runner = spawn_run(&transitioner);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feed.acked.load(Ordering::SeqCst), 1);

        transitioner.stop().await.unwrap();

        assert_eq!(lifecycle.sent_ids(), vec![id]);
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_events_are_read_after_stop() {
        let h = harness(SpyLifecycle::default());
        let runner = spawn_run(&h.transitioner);

        h.transitioner.stop().await.unwrap();
        runner.await.unwrap();
        h.events
            .send(Ok(event(&Uuid::new_v4().to_string(), "PENDING", "SENT")))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.lifecycle.sent_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_abandons_in_flight_dispatch() {
        let h = harness(SpyLifecycle {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let runner = spawn_run(&h.transitioner);

        let id = Uuid::new_v4().to_string();
        h.events.send(Ok(event(&id, "PENDING", "SENT"))).unwrap();
        h.lifecycle.entered.notified().await;

        h.transitioner.abort().await.unwrap();
        runner.await.unwrap();

        assert_eq!(h.lifecycle.completed.load(Ordering::SeqCst), 0);
        assert_eq!(h.transitioner.in_flight(), 0);
        assert_eq!(
            h.observer.errors(),
            vec![format!(
                "status transition failed: dispatch of message {id} was cancelled"
            )]
        );
    }

    #[tokio::test]
    async fn stop_without_run_returns_immediately() {
        let h = harness(SpyLifecycle::default());
        h.transitioner.stop().await.unwrap();
        assert_eq!(h.transitioner.in_flight(), 0);
    }
}
