use crate::fixtures::TestApp;

#[tokio::test]
async fn health_reports_worker_count_and_uptime() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("health request should succeed");
    assert!(resp.status().is_success());

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rooms"], 0);
    assert!(body["workers"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn turn_credentials_are_time_limited() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/turn-credentials"))
        .send()
        .await
        .expect("turn-credentials request should succeed");
    assert!(resp.status().is_success());

    let body: serde_json::Value = resp.json().await.unwrap();
    let username = body["username"].as_str().unwrap();
    assert!(username.ends_with(":meetuser"));
    assert!(!body["credential"].as_str().unwrap().is_empty());
}
