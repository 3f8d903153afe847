//! Dispatch tests with in-memory stand-ins for the three services.
//! No network access; every double records what it was asked.

use async_trait::async_trait;
use relay::channels::{ChannelHandle, InboundMessage};
use relay::dispatcher::{DispatchError, DispatchOptions, Dispatcher};
use relay::intent::{EntityCandidate, EntityValue, IntentResolver, IntentResult, WitError};
use relay::knowledge::{KnowledgeService, Units, WolframError};
use relay::reply::{FALLBACK_TEXT, GREETING_TEXT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct FakeResolver {
    result: Option<IntentResult>,
    seen: Mutex<Vec<String>>,
}

impl FakeResolver {
    fn returning(result: IntentResult) -> Arc<Self> {
        Arc::new(Self {
            result: Some(result),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl IntentResolver for FakeResolver {
    async fn resolve_intent(&self, text: &str) -> Result<IntentResult, WitError> {
        self.seen.lock().unwrap().push(text.to_string());
        self.result
            .clone()
            .ok_or_else(|| WitError::Api("503 Service Unavailable".to_string()))
    }
}

struct FakeKnowledge {
    answer: Option<String>,
    delay: Duration,
    calls: Mutex<Vec<(String, Units, usize)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeKnowledge {
    fn answering(answer: &str) -> Arc<Self> {
        Self::build(Some(answer.to_string()), Duration::ZERO)
    }

    fn failing() -> Arc<Self> {
        Self::build(None, Duration::ZERO)
    }

    fn build(answer: Option<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KnowledgeService for FakeKnowledge {
    async fn spoken_answer(
        &self,
        query: &str,
        units: Units,
        max_result_length: usize,
    ) -> Result<String, WolframError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), units, max_result_length));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.answer
            .clone()
            .ok_or_else(|| WolframError::Api("501 Not Implemented".to_string()))
    }
}

#[derive(Default)]
struct RecordingChannel {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    fn id(&self) -> &str {
        "test"
    }

    fn stop(&self) {}

    async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), String> {
        if self.fail {
            return Err("channel_not_found".to_string());
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), text.to_string()));
        Ok(())
    }
}

fn text(value: &str, confidence: f64) -> EntityCandidate {
    EntityCandidate::new(EntityValue::Text(value.to_string()), confidence)
}

fn message(sender: &str, body: &str) -> InboundMessage {
    InboundMessage {
        sender_id: sender.to_string(),
        channel_id: "D024BE91L".to_string(),
        text: body.to_string(),
    }
}

fn dispatcher(
    resolver: Arc<FakeResolver>,
    knowledge: Arc<FakeKnowledge>,
    channel: Arc<RecordingChannel>,
    options: DispatchOptions,
) -> Dispatcher {
    Dispatcher::new(resolver, knowledge, channel, options)
}

#[tokio::test]
async fn greeting_is_posted_to_sender() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "greetings",
        vec![text("hi", 0.9)],
    )]));
    let knowledge = FakeKnowledge::failing();
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver.clone(), knowledge.clone(), channel.clone(), DispatchOptions::default());

    let reply = d.handle_message(&message("U1", "hi there")).await.unwrap();

    assert_eq!(reply.text, GREETING_TEXT);
    assert_eq!(resolver.seen.lock().unwrap().as_slice(), ["hi there"]);
    assert_eq!(
        channel.sent.lock().unwrap().as_slice(),
        [("U1".to_string(), GREETING_TEXT.to_string())]
    );
    assert!(knowledge.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn knowledge_answer_is_posted_verbatim() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![text("distance to the moon", 0.7)],
    )]));
    let knowledge = FakeKnowledge::answering("238,900 miles");
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, knowledge.clone(), channel.clone(), DispatchOptions::default());

    d.handle_message(&message("U2", "how far is the moon")).await.unwrap();

    assert_eq!(
        knowledge.calls.lock().unwrap().as_slice(),
        [("distance to the moon".to_string(), Units::Metric, 1000)]
    );
    assert_eq!(
        channel.sent.lock().unwrap().as_slice(),
        [("U2".to_string(), "238,900 miles".to_string())]
    );
}

#[tokio::test]
async fn no_categories_posts_fallback() {
    let resolver = FakeResolver::returning(IntentResult::default());
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, FakeKnowledge::failing(), channel.clone(), DispatchOptions::default());

    d.handle_message(&message("U3", "")).await.unwrap();

    assert_eq!(
        channel.sent.lock().unwrap().as_slice(),
        [("U3".to_string(), FALLBACK_TEXT.to_string())]
    );
}

#[tokio::test]
async fn low_confidence_and_unknown_categories_post_fallback() {
    let cases = vec![
        IntentResult::from_entities(vec![("greetings", vec![text("hi", 0.5)])]),
        IntentResult::from_entities(vec![("weather", vec![text("rain", 0.99)])]),
    ];
    for result in cases {
        let channel = Arc::new(RecordingChannel::default());
        let d = dispatcher(
            FakeResolver::returning(result),
            FakeKnowledge::answering("unused"),
            channel.clone(),
            DispatchOptions::default(),
        );
        let reply = d.handle_message(&message("U4", "?")).await.unwrap();
        assert_eq!(reply.text, FALLBACK_TEXT);
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn knowledge_failure_sends_nothing_by_default() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![text("meaning of life", 0.8)],
    )]));
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, FakeKnowledge::failing(), channel.clone(), DispatchOptions::default());

    let err = d.handle_message(&message("U5", "meaning of life?")).await.unwrap_err();

    assert!(matches!(err, DispatchError::Knowledge(_)));
    assert!(channel.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn knowledge_failure_can_fall_back_when_enabled() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![text("meaning of life", 0.8)],
    )]));
    let channel = Arc::new(RecordingChannel::default());
    let options = DispatchOptions {
        fallback_on_knowledge_error: true,
        ..DispatchOptions::default()
    };
    let d = dispatcher(resolver, FakeKnowledge::failing(), channel.clone(), options);

    let reply = d.handle_message(&message("U5", "meaning of life?")).await.unwrap();

    assert_eq!(reply.text, FALLBACK_TEXT);
    assert_eq!(channel.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resolver_failure_aborts_without_reply() {
    let knowledge = FakeKnowledge::answering("unused");
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(FakeResolver::failing(), knowledge.clone(), channel.clone(), DispatchOptions::default());

    let err = d.handle_message(&message("U6", "hello")).await.unwrap_err();

    assert!(matches!(err, DispatchError::Resolver(_)));
    assert!(channel.sent.lock().unwrap().is_empty());
    assert!(knowledge.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn non_text_query_value_is_rejected() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![EntityCandidate::new(EntityValue::Number(42.0), 0.9)],
    )]));
    let knowledge = FakeKnowledge::answering("unused");
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, knowledge.clone(), channel.clone(), DispatchOptions::default());

    let err = d.handle_message(&message("U7", "42")).await.unwrap_err();

    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(knowledge.calls.lock().unwrap().is_empty());
    assert!(channel.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn post_failure_is_reported() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "greetings",
        vec![text("hi", 0.9)],
    )]));
    let channel = Arc::new(RecordingChannel {
        fail: true,
        ..RecordingChannel::default()
    });
    let d = dispatcher(resolver, FakeKnowledge::failing(), channel, DispatchOptions::default());

    let err = d.handle_message(&message("U8", "hi")).await.unwrap_err();
    assert!(matches!(err, DispatchError::Post(ref e) if e == "channel_not_found"));
}

#[tokio::test]
async fn run_handles_every_message_then_returns() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "greetings",
        vec![text("hi", 0.9)],
    )]));
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, FakeKnowledge::failing(), channel.clone(), DispatchOptions::default());

    let (tx, rx) = mpsc::channel(8);
    for sender in ["U1", "U2", "U3"] {
        tx.send(message(sender, "hello")).await.unwrap();
    }
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), d.run(rx))
        .await
        .expect("dispatcher did not finish");

    let mut recipients: Vec<String> = channel
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|(r, _)| r.clone())
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["U1", "U2", "U3"]);
}

#[tokio::test]
async fn max_in_flight_bounds_concurrent_work() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![text("pi", 0.9)],
    )]));
    let knowledge = FakeKnowledge::build(Some("3.14".to_string()), Duration::from_millis(20));
    let channel = Arc::new(RecordingChannel::default());
    let options = DispatchOptions {
        max_in_flight: Some(1),
        ..DispatchOptions::default()
    };
    let d = dispatcher(resolver, knowledge.clone(), channel.clone(), options);

    let (tx, rx) = mpsc::channel(8);
    for i in 0..4 {
        tx.send(message(&format!("U{}", i), "pi")).await.unwrap();
    }
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), d.run(rx))
        .await
        .expect("dispatcher did not finish");

    assert_eq!(knowledge.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(channel.sent.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn unbounded_dispatch_runs_messages_concurrently() {
    let resolver = FakeResolver::returning(IntentResult::from_entities(vec![(
        "wolfram_search_query",
        vec![text("pi", 0.9)],
    )]));
    let knowledge = FakeKnowledge::build(Some("3.14".to_string()), Duration::from_millis(100));
    let channel = Arc::new(RecordingChannel::default());
    let d = dispatcher(resolver, knowledge.clone(), channel.clone(), DispatchOptions::default());

    let (tx, rx) = mpsc::channel(8);
    for i in 0..4 {
        tx.send(message(&format!("U{}", i), "pi")).await.unwrap();
    }
    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), d.run(rx))
        .await
        .expect("dispatcher did not finish");

    assert!(knowledge.max_in_flight.load(Ordering::SeqCst) > 1);
    assert_eq!(channel.sent.lock().unwrap().len(), 4);
}
