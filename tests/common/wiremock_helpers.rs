use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use banhammer::config::AppConfig;

pub const TOKEN: &str = "test-session";

/// Config pointing at the mock gateway, with no rate limit and millisecond backoff
pub fn gateway_config(server: &MockServer) -> AppConfig {
    let toml = format!(
        r#"
[api]
base_url = "{}"
session_token = "{}"
request_timeout_secs = 5

[rate_limit]
requests_per_second = 0
backoff_strategy = "linear"
max_retries = 2
backoff_base_delay_ms = 1
backoff_max_delay_ms = 5
max_flood_wait_secs = 1
"#,
        server.uri(),
        TOKEN
    );
    let config: AppConfig = toml::from_str(&toml).expect("test config should parse");
    config.validate().expect("test config should validate");
    config
}

/// Mount the channel lookup for channel 1001
pub async fn mock_channel(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/channels/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1001,
            "access_hash": 77,
            "title": "test group"
        })))
        .mount(server)
        .await;
}
