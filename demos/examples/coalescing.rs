//! Example of request coalescing and response caching with restbox-reqwest.
//!
//! A local mock server answers slowly, so concurrent identical requests are
//! coalesced onto one network call and later requests are served from the
//! cache until the entry expires.
//!
//! Run with `RUST_LOG=restbox=debug` to see the cache decisions.

use std::time::Duration;

use futures::future::join_all;
use restbox::{RequestCacheOptions, RestClient, RestClientOptions};
use restbox_reqwest::ReqwestTransport;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restbox=debug".into()),
        )
        .init();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/restbox"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "name": "restbox", "stars": 42 }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let client = RestClient::builder()
        .transport(ReqwestTransport::new())
        .options(RestClientOptions::new().with_base_url(server.uri()))
        .build()?;

    let options = RequestCacheOptions::new()
        .with_expires_after_write(Duration::from_secs(2))
        .with_expires_after_access(Duration::from_secs(1));

    println!("=== Five concurrent requests ===");
    let responses = join_all(
        (0..5).map(|_| client.get("/repos/restbox").cache(options.clone()).send()),
    )
    .await;
    for response in responses {
        let response = response?;
        println!("{} {}", response.status(), response.cache_status().as_str());
    }

    println!("\n=== Request after 500ms (cache hit) ===");
    tokio::time::sleep(Duration::from_millis(500)).await;
    let response = client.get("/repos/restbox").cache(options.clone()).send().await?;
    let repo: serde_json::Value = response.json()?;
    println!("{} {}", response.cache_status().as_str(), repo);

    println!("\n=== Request after the access TTL elapsed (cache miss) ===");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let response = client.get("/repos/restbox").cache(options).send().await?;
    println!("{}", response.cache_status().as_str());

    let calls = server.received_requests().await.unwrap_or_default().len();
    println!("\nNetwork calls made: {calls}");

    client.close();
    Ok(())
}
