//! Request lifecycle tests against a counting in-memory transport.
//!
//! Time is paused, so TTLs and transport latency are deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use http::{HeaderValue, StatusCode, header};
use pretty_assertions::assert_eq;
use restbox::{
    CacheStatus, Error, OutgoingRequest, RawResponse, RequestCacheOptions, RestClient,
    RestClientOptions, Transport, TransportError,
};
use serde_json::{Value, json};
use tokio::time::sleep;

const LATENCY: Duration = Duration::from_millis(100);

/// Transport that counts calls and answers `{"call": n}` after `LATENCY`.
#[derive(Clone)]
struct MockTransport {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<OutgoingRequest>>>,
    status: StatusCode,
    latency: Duration,
    refuse: bool,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
            status: StatusCode::OK,
            latency: LATENCY,
            refuse: false,
        }
    }

    fn with_status(self, status: StatusCode) -> Self {
        Self { status, ..self }
    }

    fn with_latency(self, latency: Duration) -> Self {
        Self { latency, ..self }
    }

    fn refusing(self) -> Self {
        Self {
            refuse: true,
            ..self
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> OutgoingRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(request);
        sleep(self.latency).await;

        if self.refuse {
            return Err(TransportError::connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(RawResponse::new(self.status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(json!({ "call": call }).to_string()))
    }
}

fn client(transport: &MockTransport) -> RestClient {
    client_with(transport, RestClientOptions::new())
}

fn client_with(transport: &MockTransport, options: RestClientOptions) -> RestClient {
    RestClient::builder()
        .transport(transport.clone())
        .options(options)
        .build()
        .unwrap()
}

fn ttl(millis: u64) -> RequestCacheOptions {
    RequestCacheOptions::new().with_expires_after_write(Duration::from_millis(millis))
}

async fn call_number(client: &RestClient, options: RequestCacheOptions) -> (u64, CacheStatus) {
    let response = client.get("/users/1").cache(options).send().await.unwrap();
    let body: Value = response.json().unwrap();
    (body["call"].as_u64().unwrap(), response.cache_status())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_call() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let results = join_all((0..3).map(|_| client.get("/users/1").cache(ttl(10_000)).send())).await;

    assert_eq!(transport.calls(), 1);
    let statuses: Vec<_> = results
        .iter()
        .map(|result| result.as_ref().unwrap().cache_status())
        .collect();
    assert_eq!(
        statuses,
        vec![CacheStatus::Miss, CacheStatus::FutureHit, CacheStatus::FutureHit]
    );
    for result in &results {
        let body: Value = result.as_ref().unwrap().json().unwrap();
        assert_eq!(body, json!({ "call": 1 }));
    }
    assert_eq!(client.cache().len(), 1);
    assert_eq!(client.cache().running_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_requests_without_options_are_not_coalesced() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let results = join_all((0..3).map(|_| client.get("/users/1").send())).await;

    assert_eq!(transport.calls(), 3);
    for result in results {
        assert_eq!(result.unwrap().cache_status(), CacheStatus::Bypass);
    }
    assert!(client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_write() {
    let transport = MockTransport::new();
    let client = client(&transport);

    assert_eq!(call_number(&client, ttl(4000)).await, (1, CacheStatus::Miss));
    sleep(Duration::from_millis(5000)).await;

    assert!(client.cache().is_empty());
    assert_eq!(call_number(&client, ttl(4000)).await, (2, CacheStatus::Miss));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_entry_served_before_expiry() {
    let transport = MockTransport::new();
    let client = client(&transport);

    call_number(&client, ttl(4000)).await;
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(call_number(&client, ttl(4000)).await, (1, CacheStatus::Hit));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_access_ttl_slides_on_hits_only() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let options = ttl(10_000).with_expires_after_access(Duration::from_millis(2000));

    call_number(&client, options.clone()).await;

    // The access TTL is not armed by the write itself.
    sleep(Duration::from_millis(3000)).await;
    assert_eq!(call_number(&client, options.clone()).await, (1, CacheStatus::Hit));

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(call_number(&client, options.clone()).await, (1, CacheStatus::Hit));

    // Two seconds after the last hit the entry is gone, long before the write TTL.
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(call_number(&client, options).await, (2, CacheStatus::Miss));
}

#[tokio::test(start_paused = true)]
async fn test_evict_all_before_always_reaches_network() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let options = ttl(10_000).with_evict_all_before(true);

    let results =
        join_all((0..3).map(|_| client.get("/users/1").cache(options.clone()).send())).await;

    assert_eq!(transport.calls(), 3);
    for result in results {
        assert_eq!(result.unwrap().cache_status(), CacheStatus::Miss);
    }
    // Only the last evicting request writes its response.
    assert_eq!(client.cache().len(), 1);
    assert_eq!(client.cache().timers_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_evict_before_refreshes_entry() {
    let transport = MockTransport::new();
    let client = client(&transport);

    assert_eq!(call_number(&client, ttl(10_000)).await, (1, CacheStatus::Miss));
    assert_eq!(
        call_number(&client, ttl(10_000).with_evict_before(true)).await,
        (2, CacheStatus::Miss)
    );
    assert_eq!(call_number(&client, ttl(10_000)).await, (2, CacheStatus::Hit));
}

#[tokio::test(start_paused = true)]
async fn test_evicting_request_splits_in_flight_waiters() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let plain = ttl(10_000);
    let evicting = ttl(10_000).with_evict_before(true);

    let order = [plain.clone(), plain.clone(), evicting, plain.clone()];
    let results = join_all(
        order
            .iter()
            .map(|options| client.get("/users/1").cache(options.clone()).send()),
    )
    .await;

    assert_eq!(transport.calls(), 2);
    let bodies: Vec<Value> = results
        .iter()
        .map(|result| result.as_ref().unwrap().json().unwrap())
        .collect();
    let statuses: Vec<_> = results
        .iter()
        .map(|result| result.as_ref().unwrap().cache_status())
        .collect();

    assert_eq!(
        statuses,
        vec![
            CacheStatus::Miss,
            CacheStatus::FutureHit,
            CacheStatus::Miss,
            CacheStatus::FutureHit
        ]
    );
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[2], bodies[3]);
    assert_ne!(bodies[0], bodies[2]);

    // The evicting request fired last, so its response is the cached one.
    let cached: Value = client
        .get("/users/1")
        .cache(plain)
        .send()
        .await
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(cached, bodies[2]);
}

#[tokio::test(start_paused = true)]
async fn test_only_cacheable_statuses_are_stored() {
    let transport = MockTransport::new().with_status(StatusCode::CREATED);
    let client = client(&transport);

    call_number(&client, ttl(10_000)).await;
    call_number(&client, ttl(10_000)).await;
    assert_eq!(transport.calls(), 2);
    assert!(client.cache().is_empty());

    let options = ttl(10_000).with_cached_status_codes([200, 201]);
    call_number(&client, options.clone()).await;
    assert_eq!(call_number(&client, options).await.1, CacheStatus::Hit);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_fans_out_to_every_waiter() {
    let transport = MockTransport::new().with_status(StatusCode::NOT_FOUND);
    let client = client(&transport);

    let results = join_all((0..3).map(|_| client.get("/missing").cache(ttl(10_000)).send())).await;

    assert_eq!(transport.calls(), 1);
    for result in results {
        match result {
            Err(Error::ClientStatus {
                status, response, ..
            }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(response.json::<Value>().unwrap(), json!({ "call": 1 }));
            }
            other => panic!("expected a 404 error, got {other:?}"),
        }
    }
    assert!(client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_server_error_maps_to_server_status() {
    let transport = MockTransport::new().with_status(StatusCode::BAD_GATEWAY);
    let client = client(&transport);

    let error = client.get("/users/1").send().await.unwrap_err();
    assert!(matches!(error, Error::ServerStatus { .. }));
    assert_eq!(error.status(), Some(StatusCode::BAD_GATEWAY));
    assert_eq!(error.response().unwrap().status_message(), "Bad Gateway");
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_fans_out_to_every_waiter() {
    let transport = MockTransport::new().refusing();
    let client = client(&transport);

    let results = join_all((0..3).map(|_| client.get("/users/1").cache(ttl(10_000)).send())).await;

    assert_eq!(transport.calls(), 1);
    for result in results {
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Connect(_)))
        ));
    }
    assert!(client.cache().is_empty());
    assert_eq!(client.cache().running_len(), 0);

    // A failure leaves nothing behind, the next request goes out again.
    assert!(client.get("/users/1").cache(ttl(10_000)).send().await.is_err());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reaches_coalesced_waiters() {
    let transport = MockTransport::new().with_latency(Duration::from_secs(5));
    let client = client_with(
        &transport,
        RestClientOptions::new().with_global_request_timeout(Duration::from_secs(1)),
    );

    let results = join_all((0..2).map(|_| client.get("/slow").cache(ttl(10_000)).send())).await;

    assert_eq!(transport.calls(), 1);
    for result in results {
        assert!(result.unwrap_err().is_timeout());
    }

    // A per-request timeout overrides the global one.
    let response = client
        .get("/slow")
        .timeout(Duration::from_secs(10))
        .send()
        .await;
    assert!(response.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_non_get_requests_bypass_cache() {
    let transport = MockTransport::new();
    let client = client(&transport);

    for _ in 0..2 {
        let response = client
            .post("/users")
            .cache(ttl(10_000))
            .json(&json!({ "name": "ada" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.cache_status(), CacheStatus::Bypass);
    }
    assert_eq!(transport.calls(), 2);
    assert!(client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_global_cache_options_and_no_cache() {
    let transport = MockTransport::new();
    let client = client_with(
        &transport,
        RestClientOptions::new().with_global_request_cache_options(ttl(10_000)),
    );

    assert_eq!(
        client.get("/users/1").send().await.unwrap().cache_status(),
        CacheStatus::Miss
    );
    assert_eq!(
        client.get("/users/1").send().await.unwrap().cache_status(),
        CacheStatus::Hit
    );
    assert_eq!(
        client
            .get("/users/1")
            .no_cache()
            .send()
            .await
            .unwrap()
            .cache_status(),
        CacheStatus::Bypass
    );
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_key_includes_headers() {
    let transport = MockTransport::new();
    let client = client(&transport);

    for tenant in ["a", "b", "a"] {
        client
            .get("/users/1")
            .header("x-tenant", tenant)
            .cache(ttl(10_000))
            .send()
            .await
            .unwrap();
    }
    assert_eq!(transport.calls(), 2);
    assert_eq!(client.cache().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_is_populated_before_sending() {
    let transport = MockTransport::new();
    let client = client_with(
        &transport,
        RestClientOptions::new()
            .with_base_url("http://api.local/")
            .with_global_header("x-api-key", "global")
            .with_global_header("x-client", "restbox"),
    );

    client
        .post("/users")
        .header("x-api-key", "local")
        .json(&json!({ "name": "ada" }))
        .send()
        .await
        .unwrap();

    let request = transport.last_request();
    assert_eq!(request.uri, "http://api.local/users");
    assert_eq!(request.headers["x-api-key"], "local");
    assert_eq!(request.headers.get_all("x-api-key").iter().count(), 1);
    assert_eq!(request.headers["x-client"], "restbox");
    assert_eq!(request.headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        request.headers[header::ACCEPT],
        "application/octet-stream,text/plain,application/json,\
         application/x-www-form-urlencoded,multipart/form-data,application/*+json,*/*"
    );
    assert_eq!(request.body, r#"{"name":"ada"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_strand_waiters() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.get("/users/1").cache(ttl(10_000)).send().await }
    });
    sleep(Duration::from_millis(10)).await;

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.get("/users/1").cache(ttl(10_000)).send().await }
    });
    sleep(Duration::from_millis(10)).await;

    first.abort();
    let response = second.await.unwrap().unwrap();

    assert_eq!(response.cache_status(), CacheStatus::FutureHit);
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.cache().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_fails_pending_and_later_requests() {
    let transport = MockTransport::new().with_latency(Duration::from_secs(1));
    let client = client(&transport);

    client
        .get("/cached")
        .cache(ttl(60_000))
        .send()
        .await
        .unwrap();
    assert_eq!(client.cache().timers_len(), 1);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.get("/users/1").cache(ttl(10_000)).send().await }
    });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(client.cache().running_len(), 1);

    client.close();

    assert!(matches!(pending.await.unwrap(), Err(Error::Closed)));
    assert!(client.is_closed());
    assert!(client.cache().is_empty());
    assert_eq!(client.cache().timers_len(), 0);
    assert!(matches!(client.get("/users/1").send().await, Err(Error::Closed)));

    // The abandoned network call finishing later must not repopulate the cache.
    sleep(Duration::from_secs(2)).await;
    assert!(client.cache().is_empty());
}
