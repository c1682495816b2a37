//! Example of configuring a client from YAML.
//!
//! Global headers, the base URL, a default timeout and default cache options
//! are read from a configuration document. Requests inherit the cache options
//! unless they opt out with `no_cache()` or set their own.

use std::time::Duration;

use restbox::{Error, RequestCacheOptions, RestClient, RestClientOptions};
use restbox_reqwest::ReqwestTransport;
use serde::Deserialize;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct User {
    id: u32,
    name: String,
}

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
        .and(path("/users/1"))
        .and(header("x-api-key", "demo-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1, "name": "ada" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
        .mount(&server)
        .await;

    let config_yaml = format!(
        r#"
base_url: "{}"
global_headers:
  x-api-key: demo-key
  user-agent: restbox-example/1.0
global_request_timeout: 5s
global_request_cache_options:
  expires_after_write: 30s
  cached_status_codes: [200]
"#,
        server.uri()
    );
    let options: RestClientOptions = serde_saphyr::from_str(&config_yaml)?;

    let client = RestClient::builder()
        .transport(ReqwestTransport::new())
        .options(options)
        .build()?;

    println!("=== Inherited cache options ===");
    for _ in 0..2 {
        let response = client.get("/users/1").send().await?;
        let user: User = response.json()?;
        println!(
            "{} -> #{} {}",
            response.cache_status().as_str(),
            user.id,
            user.name
        );
    }

    println!("\n=== Opting out ===");
    let response = client.get("/users/1").no_cache().send().await?;
    println!("{}", response.cache_status().as_str());

    println!("\n=== Evicting the entry ===");
    let response = client
        .get("/users/1")
        .cache(
            RequestCacheOptions::new()
                .with_evict_before(true)
                .with_expires_after_write(Duration::from_secs(30)),
        )
        .send()
        .await?;
    println!("{}", response.cache_status().as_str());

    println!("\n=== Error statuses ===");
    match client.get("/users/2").send().await {
        Err(Error::ClientStatus { status, response, .. }) => {
            println!("{status}: {}", response.text()?);
        }
        other => println!("unexpected: {other:?}"),
    }

    Ok(())
}
