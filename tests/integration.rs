use std::net::{SocketAddr, TcpListener};

use axum::http::StatusCode;
use tokio::task::JoinHandle;
use town_hub::{
    api::{build_router, AppState},
    config::Config,
};

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind: addr.to_string(),
        data_dir: tmp.path().to_path_buf(),
        max_upload_mb: 5,
        logging_enabled: false,
    };
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state);
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, tmp)
}

async fn register(
    client: &reqwest::Client,
    addr: SocketAddr,
    username: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&serde_json::json!({"username": username, "password": "secret1"}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn first_registered_user_is_admin() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = register(&client, addr, "ada").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let first: serde_json::Value = resp.json().await.unwrap();
    assert!(first["user"]["is_admin"].as_bool().unwrap());
    assert!(first["token"].as_str().is_some());

    let second: serde_json::Value = register(&client, addr, "bob").await.json().await.unwrap();
    assert!(!second["user"]["is_admin"].as_bool().unwrap());

    // reserved username gets the role even when registered later
    let reserved: serde_json::Value =
        register(&client, addr, "admin").await.json().await.unwrap();
    assert!(reserved["user"]["is_admin"].as_bool().unwrap());

    server.abort();
}

#[tokio::test]
async fn duplicate_username_conflicts_and_store_is_unchanged() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    assert_eq!(register(&client, addr, "ada").await.status(), StatusCode::CREATED);
    assert_eq!(register(&client, addr, "ada").await.status(), StatusCode::CONFLICT);

    let listed: serde_json::Value = client
        .get(format!("http://{}/api/characters", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    server.abort();
}

#[tokio::test]
async fn registration_validates_username_and_password() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&serde_json::json!({"username": "ab", "password": "secret1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("http://{}/api/auth/register", addr))
        .json(&serde_json::json!({"username": "alice", "password": "12345"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.abort();
}

#[tokio::test]
async fn login_me_and_verify() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    register(&client, addr, "ada").await;

    // bad password
    let resp = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&serde_json::json!({"username": "ada", "password": "wrong1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // unknown user
    let resp = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&serde_json::json!({"username": "ghost", "password": "secret1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // success
    let resp = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&serde_json::json!({"username": "ada", "password": "secret1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let me: serde_json::Value = client
        .get(format!("http://{}/api/auth/me", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], "ada");
    assert!(me.get("password_hash").is_none());

    let verify: serde_json::Value = client
        .get(format!("http://{}/api/auth/verify", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(verify["valid"].as_bool().unwrap());

    // missing and garbage tokens
    let resp = client
        .get(format!("http://{}/api/auth/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = client
        .get(format!("http://{}/api/auth/me", addr))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    server.abort();
}

#[tokio::test]
async fn repeated_login_attempts_are_rate_limited() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    register(&client, addr, "ada").await;

    for _ in 0..5 {
        let resp = client
            .post(format!("http://{}/api/auth/login", addr))
            .json(&serde_json::json!({"username": "ada", "password": "wrong1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&serde_json::json!({"username": "ada", "password": "wrong1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    server.abort();
}

#[tokio::test]
async fn own_character_updates_are_partial_and_sanitized() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let body: serde_json::Value = register(&client, addr, "ada").await.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let original_color = body["user"]["character"]["color"].as_str().unwrap().to_string();

    let updated: serde_json::Value = client
        .put(format!("http://{}/api/characters/me", addr))
        .bearer_auth(&token)
        .json(&serde_json::json!({"description": "<b>bold</b>"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        updated["character"]["description"],
        "&lt;b&gt;bold&lt;&#x2F;b&gt;"
    );
    assert_eq!(updated["character"]["color"], original_color.as_str());
    assert_eq!(updated["character"]["message"], "Hello!");
    assert!(updated["updated_at"].as_i64().is_some());

    server.abort();
}

#[tokio::test]
async fn directory_is_public_and_hides_credentials() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let body: serde_json::Value = register(&client, addr, "ada").await.json().await.unwrap();
    let id = body["user"]["id"].as_str().unwrap().to_string();

    let listed: serde_json::Value = client
        .get(format!("http://{}/api/characters", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = &listed.as_array().unwrap()[0];
    assert_eq!(entry["username"], "ada");
    assert!(entry.get("password_hash").is_none());
    assert!(entry["character"]["position"]["x"].as_f64().is_some());

    let one: serde_json::Value = client
        .get(format!("http://{}/api/characters/{}", addr, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["id"].as_str().unwrap(), id);

    let resp = client
        .get(format!(
            "http://{}/api/characters/00000000-0000-0000-0000-000000000000",
            addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    server.abort();
}
