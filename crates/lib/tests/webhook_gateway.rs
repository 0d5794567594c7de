//! Integration tests: start the webhook gateway on a free port and drive it over HTTP.
//! Backend endpoints are mockito servers. Server tasks are left running when a test ends.

use mockito::Matcher;
use relay::config::Config;
use relay::gateway;
use serde_json::json;
use std::time::Duration;

const TAKEOVER: &str = "#takeover";
const RELEASE: &str = "#release";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn base_config(port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.messenger.verify_token = Some("verify-me".to_string());
    config
}

/// Spawn the gateway and wait until `GET /` answers. Returns the base URL.
async fn start(config: Config) -> String {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/", base)).send().await {
            Ok(resp) if resp.status().is_success() => return base,
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not come up within 5s; last error: {:?}", base, last_err);
}

async fn wait_matched(mock: &mockito::Mock) -> bool {
    for _ in 0..100 {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn post_webhook(base: &str, body: impl Into<reqwest::Body>) -> (u16, String) {
    let resp = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("POST /webhook");
    let status = resp.status().as_u16();
    (status, resp.text().await.expect("body"))
}

#[tokio::test]
async fn root_reports_running() {
    let base = start(base_config(free_port())).await;
    let resp = reqwest::get(format!("{}/", base)).await.expect("GET /");
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.expect("body"), gateway::RUNNING_TEXT);
}

#[tokio::test]
async fn verification_handshake() {
    let base = start(base_config(free_port())).await;
    let client = reqwest::Client::new();
    let verify = |mode: &'static str, token: &'static str| {
        client
            .get(format!("{}/webhook", base))
            .query(&[
                ("hub.mode", mode),
                ("hub.verify_token", token),
                ("hub.challenge", "1158201444"),
            ])
            .send()
    };

    for _ in 0..2 {
        let resp = verify("subscribe", "verify-me").await.expect("verify");
        assert_eq!(resp.status().as_u16(), 200);
        assert!(resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/plain")));
        assert_eq!(resp.text().await.expect("body"), "1158201444");
    }

    let resp = verify("subscribe", "wrong").await.expect("verify");
    assert_eq!(resp.status().as_u16(), 403);
    let resp = verify("unsubscribe", "verify-me").await.expect("verify");
    assert_eq!(resp.status().as_u16(), 403);
    let resp = client
        .get(format!("{}/webhook", base))
        .send()
        .await
        .expect("verify without params");
    assert_eq!(resp.status().as_u16(), 403);
    let resp = client
        .get(format!(
            "{}/webhook?hub.mode=subscribe&hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1",
            base
        ))
        .send()
        .await
        .expect("verify with repeated mode");
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn text_message_is_forwarded_and_acknowledged() {
    let mut backend = mockito::Server::new_async().await;
    let forward = backend
        .mock("POST", "/webhook/chat")
        .match_body(Matcher::Json(json!({ "chat_id": "U1", "user_input": "hello" })))
        .with_status(200)
        .create_async()
        .await;

    let mut config = base_config(free_port());
    config.backend.webhook_url = Some(format!("{}/webhook/chat", backend.url()));
    let base = start(config).await;

    let body = json!({
        "object": "page",
        "entry": [{ "messaging": [{ "sender": { "id": "U1" }, "message": { "text": "hello" } }] }]
    });
    let (status, text) = post_webhook(&base, body.to_string()).await;
    assert_eq!(status, 200);
    assert_eq!(text, gateway::ACK_TEXT);
    assert!(wait_matched(&forward).await, "backend forward was not called");
}

#[tokio::test]
async fn takeover_echo_calls_admin_endpoint_once() {
    let mut backend = mockito::Server::new_async().await;
    let takeover = backend
        .mock("POST", "/admin/conversations/takeover")
        .match_header("api-key", "admin-key")
        .match_body(Matcher::Json(json!({ "chat_id": "U2" })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let release = backend
        .mock("POST", "/admin/conversations/release")
        .expect(0)
        .create_async()
        .await;

    let mut config = base_config(free_port());
    config.backend.url_prefix = Some(backend.url());
    config.backend.admin_api_key = Some("admin-key".to_string());
    config.admin.takeover_marker = Some(TAKEOVER.to_string());
    config.admin.release_marker = Some(RELEASE.to_string());
    let base = start(config).await;

    let body = json!({
        "object": "page",
        "entry": [{ "messaging": [{
            "sender": { "id": "PAGE" },
            "recipient": { "id": "U2" },
            "message": { "is_echo": true, "text": format!("{} please hold {}", TAKEOVER, RELEASE) }
        }] }]
    });
    let (status, _) = post_webhook(&base, body.to_string()).await;
    assert_eq!(status, 200);
    assert!(wait_matched(&takeover).await, "takeover was not called");
    tokio::time::sleep(Duration::from_millis(100)).await;
    takeover.assert_async().await;
    release.assert_async().await;
}

#[tokio::test]
async fn anything_posted_is_acknowledged() {
    let mut backend = mockito::Server::new_async().await;
    let forward = backend
        .mock("POST", "/webhook/chat")
        .expect(0)
        .create_async()
        .await;

    let mut config = base_config(free_port());
    config.backend.webhook_url = Some(format!("{}/webhook/chat", backend.url()));
    let base = start(config).await;

    let not_page = json!({
        "object": "instagram",
        "entry": [{ "messaging": [{ "sender": { "id": "U1" }, "message": { "text": "hello" } }] }]
    });
    for body in [
        "{not json".to_string(),
        not_page.to_string(),
        json!({ "object": "page" }).to_string(),
        json!({ "object": "page", "entry": [{ "messaging": [42] }] }).to_string(),
    ] {
        let (status, text) = post_webhook(&base, body).await;
        assert_eq!(status, 200);
        assert_eq!(text, gateway::ACK_TEXT);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    forward.assert_async().await;
}
