//! End-to-end checks of the HTTP server over a real socket.

use rts_site::server::{CACHE_DEFAULT, CACHE_IMMUTABLE, router};
use serde_json::Value;
use tempfile::TempDir;

struct TestServer {
    base: String,
    _root: TempDir,
}

async fn start() -> TestServer {
    let root = TempDir::new().unwrap();
    let dir = root.path();
    std::fs::create_dir_all(dir.join("img")).unwrap();
    std::fs::create_dir_all(dir.join("css")).unwrap();
    std::fs::create_dir_all(dir.join("editions")).unwrap();
    std::fs::write(dir.join("index.html"), "<h1>Return to the Source</h1>").unwrap();
    std::fs::write(dir.join("editions/index.html"), "editions").unwrap();
    std::fs::write(dir.join("css/navigation.css"), ".nav{}").unwrap();
    std::fs::write(dir.join("img/hero.webp"), [0u8; 8]).unwrap();

    let app = router(dir.canonicalize().unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        _root: root,
    }
}

async fn get(server: &TestServer, path: &str) -> reqwest::Response {
    reqwest::get(format!("{}{}", server.base, path)).await.unwrap()
}

#[tokio::test]
async fn health_endpoints() {
    let server = start().await;

    let resp = get(&server, "/health").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"status": "ok"}));

    let body: Value = get(&server, "/api/health").await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "team-routes");
    let stamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
}

#[tokio::test]
async fn team_listing() {
    let server = start().await;
    let body: Value = get(&server, "/api/team").await.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Team data endpoint");
    assert_eq!(
        body["data"]["pillars"],
        serde_json::json!(["Theory", "Infrastructure", "Cinema", "Healing"])
    );
    assert_eq!(body["data"]["members"], 4);
    assert_eq!(body["data"]["established"], "2024");
}

#[tokio::test]
async fn pillar_lookup_is_case_insensitive_and_echoes() {
    let server = start().await;

    let resp = get(&server, "/api/team/CINEMA").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pillar"], "CINEMA");
    assert_eq!(body["message"], "CINEMA pillar data");

    let resp = get(&server, "/api/team/marketing").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"status": "error", "message": "Pillar not found"})
    );
}

#[tokio::test]
async fn static_files_with_cache_headers() {
    let server = start().await;

    let resp = get(&server, "/").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/html; charset=utf-8");
    assert_eq!(resp.text().await.unwrap(), "<h1>Return to the Source</h1>");

    let resp = get(&server, "/editions/").await;
    assert_eq!(resp.text().await.unwrap(), "editions");

    let resp = get(&server, "/img/hero.webp").await;
    assert_eq!(resp.headers()["cache-control"], CACHE_IMMUTABLE);

    let resp = get(&server, "/css/navigation.css").await;
    assert_eq!(resp.headers()["cache-control"], CACHE_DEFAULT);
}

#[tokio::test]
async fn missing_and_escaping_paths_are_404() {
    let server = start().await;
    assert_eq!(get(&server, "/nope.html").await.status(), 404);
    assert_eq!(get(&server, "/img/%2e%2e/%2e%2e/etc/passwd").await.status(), 404);
}
