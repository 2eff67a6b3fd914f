use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use job_queue_cell::*;
use shared_config::AppConfig;
use shared_database::{BookingStore, InMemoryStore};
use shared_models::{AppError, WebhookEnvelope, WebhookEventType, WebhookSubscription};
use shared_utils::test_utils::{monday_morning, TestConfig};
use shared_utils::{verify_signature, ManualClock, TracingErrorSink, SIGNATURE_HEADER};
use webhook_cell::*;

struct Harness {
    store: Arc<InMemoryStore>,
    jobs: Arc<InMemoryJobStore>,
    clock: ManualClock,
    config: Arc<AppConfig>,
    scheduler: Arc<JobScheduler>,
    dispatcher: WebhookDispatcher,
    registry: WebhookRegistry,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let jobs = Arc::new(InMemoryJobStore::default());
    let clock = ManualClock::new(monday_morning());
    let config = TestConfig::default().to_arc();
    let scheduler = Arc::new(JobScheduler::new(jobs.clone(), config.clone(), Arc::new(clock.clone())));

    let dispatcher = WebhookDispatcher::new(
        store.clone(),
        scheduler.clone(),
        Arc::new(clock.clone()),
        Arc::new(TracingErrorSink),
    );
    let registry = WebhookRegistry::new(store.clone(), scheduler.clone(), Arc::new(clock.clone()));

    Harness { store, jobs, clock, config, scheduler, dispatcher, registry }
}

impl Harness {
    fn worker(&self) -> JobWorkerService {
        let (_, shutdown) = watch::channel(false);
        JobWorkerService::new(
            QueueName::Webhooks,
            WorkerConfig { worker_id: "webhooks-test".to_string(), concurrency: 1, poll_interval_ms: 10, job_timeout_seconds: 5 },
            self.scheduler.options(QueueName::Webhooks),
            self.jobs.clone(),
            Arc::new(WebhookDeliveryProcessor::new(self.store.clone(), &self.config)),
            Arc::new(self.clock.clone()),
            shutdown,
        )
    }

    async fn subscription(&self, url: &str, events: &[WebhookEventType], secret: Option<&str>, active: bool) -> WebhookSubscription {
        let subscription = WebhookSubscription {
            id: Uuid::new_v4(),
            name: "crm sync".to_string(),
            url: url.to_string(),
            secret: secret.map(str::to_string),
            events: events.to_vec(),
            is_active: active,
            created_by: Uuid::new_v4(),
            created_at: monday_morning(),
            updated_at: monday_morning(),
        };
        self.store.insert_webhook(subscription.clone()).await;
        subscription
    }
}

#[tokio::test]
async fn test_dispatch_queues_one_job_per_matching_active_subscriber() {
    let h = harness();
    let first = h.subscription("https://a.example.com/hook", &[WebhookEventType::AppointmentCreated], None, true).await;
    let second = h.subscription("https://b.example.com/hook", &[WebhookEventType::AppointmentCreated, WebhookEventType::AppointmentCancelled], None, true).await;
    h.subscription("https://c.example.com/hook", &[WebhookEventType::AppointmentCreated], None, false).await;
    h.subscription("https://d.example.com/hook", &[WebhookEventType::ClientCreated], None, true).await;

    let envelope = h.dispatcher
        .dispatch(WebhookEventType::AppointmentCreated, json!({ "id": "apt-1" }))
        .await
        .unwrap()
        .unwrap();

    let mut keys = h.jobs.live_keys(QueueName::Webhooks).await;
    keys.sort();
    let mut expected = vec![webhook_key(first.id, envelope.id), webhook_key(second.id, envelope.id)];
    expected.sort();
    assert_eq!(keys, expected);
    assert_eq!(envelope.timestamp, monday_morning());
}

#[tokio::test]
async fn test_dispatch_without_subscribers_is_a_no_op() {
    let h = harness();

    let envelope = h.dispatcher
        .dispatch(WebhookEventType::AppointmentCompleted, json!({}))
        .await
        .unwrap();

    assert!(envelope.is_none());
    assert!(h.jobs.live_keys(QueueName::Webhooks).await.is_empty());
}

#[tokio::test]
async fn test_delivery_signs_exact_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Content-Type", "application/json"))
        .and(header_exists(SIGNATURE_HEADER))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness();
    h.subscription(&format!("{}/hook", mock_server.uri()), &[WebhookEventType::AppointmentUpdated], Some("whsec_test"), true).await;

    let envelope = h.dispatcher
        .dispatch(WebhookEventType::AppointmentUpdated, json!({ "status": "confirmed" }))
        .await
        .unwrap()
        .unwrap();

    assert!(h.worker().process_next().await.unwrap());
    assert!(h.jobs.live_keys(QueueName::Webhooks).await.is_empty());

    let requests = mock_server.received_requests().await.unwrap();
    let request = &requests[0];
    let signature = request.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
    assert!(verify_signature("whsec_test", &request.body, signature));

    let delivered: WebhookEnvelope = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(delivered, envelope);
}

#[tokio::test]
async fn test_unsigned_subscription_gets_no_signature_header() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let h = harness();
    h.subscription(&mock_server.uri(), &[WebhookEventType::AppointmentCreated], None, true).await;
    h.dispatcher.dispatch(WebhookEventType::AppointmentCreated, json!({})).await.unwrap();
    h.worker().process_next().await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn test_failing_endpoint_is_retried_then_deactivated() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&mock_server)
        .await;

    let h = harness();
    let subscription = h.subscription(&mock_server.uri(), &[WebhookEventType::AppointmentCancelled], Some("s3cret"), true).await;
    h.dispatcher.dispatch(WebhookEventType::AppointmentCancelled, json!({})).await.unwrap();

    let worker = h.worker();
    for attempt in 1..=5 {
        assert!(worker.process_next().await.unwrap(), "attempt {} not due", attempt);
        h.clock.advance(Duration::minutes(10));
    }

    assert!(h.jobs.live_keys(QueueName::Webhooks).await.is_empty());
    assert_eq!(h.jobs.failed(QueueName::Webhooks, 10).await.unwrap().len(), 1);

    let stored = h.store.find_webhook(subscription.id).await.unwrap().unwrap();
    assert!(!stored.is_active);

    // Later events no longer reach the dead endpoint
    h.dispatcher.dispatch(WebhookEventType::AppointmentCancelled, json!({})).await.unwrap();
    assert!(h.jobs.live_keys(QueueName::Webhooks).await.is_empty());
    assert!(!worker.process_next().await.unwrap());
}

#[tokio::test]
async fn test_inactive_subscription_is_skipped_without_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let h = harness();
    let subscription = h.subscription(&mock_server.uri(), &[WebhookEventType::AppointmentCreated], None, true).await;
    h.dispatcher.dispatch(WebhookEventType::AppointmentCreated, json!({})).await.unwrap();

    h.registry
        .update(subscription.id, UpdateWebhookRequest { is_active: Some(false), ..Default::default() })
        .await
        .unwrap();

    assert!(h.worker().process_next().await.unwrap());
    assert!(h.jobs.live_keys(QueueName::Webhooks).await.is_empty());
    assert!(h.jobs.failed(QueueName::Webhooks, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_validates_and_rejects_duplicate_url() {
    let h = harness();
    let request = RegisterWebhookRequest {
        name: "crm sync".to_string(),
        url: "https://hooks.example.com/agenda".to_string(),
        secret: Some("whsec_1".to_string()),
        events: vec!["appointment.created".to_string()],
    };

    let created = h.registry.register(request.clone(), Uuid::new_v4()).await.unwrap();
    assert!(created.is_active);
    assert_eq!(created.events, vec![WebhookEventType::AppointmentCreated]);

    assert_matches!(h.registry.register(request.clone(), Uuid::new_v4()).await, Err(AppError::Conflict(_)));

    let no_events = RegisterWebhookRequest { url: "https://other.example.com".to_string(), events: vec![], ..request.clone() };
    assert_matches!(h.registry.register(no_events, Uuid::new_v4()).await, Err(AppError::InvalidArgument(_)));

    let bad_url = RegisterWebhookRequest { url: "mailto:ops@example.com".to_string(), ..request };
    assert_matches!(h.registry.register(bad_url, Uuid::new_v4()).await, Err(AppError::InvalidArgument(_)));

    assert_eq!(h.registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_test_requires_active_subscription() {
    let h = harness();
    let subscription = h.subscription("https://hooks.example.com/t", &[WebhookEventType::AppointmentRescheduled], None, false).await;

    assert_matches!(h.registry.send_test(subscription.id).await, Err(AppError::PolicyViolation(_)));
    assert_matches!(h.registry.send_test(Uuid::new_v4()).await, Err(AppError::NotFound(_)));

    h.registry
        .update(subscription.id, UpdateWebhookRequest { is_active: Some(true), ..Default::default() })
        .await
        .unwrap();

    let delivery = h.registry.send_test(subscription.id).await.unwrap();
    assert_eq!(delivery.event, WebhookEventType::AppointmentRescheduled);
    assert_eq!(
        h.jobs.live_keys(QueueName::Webhooks).await,
        vec![webhook_key(subscription.id, delivery.envelope.id)]
    );
}
