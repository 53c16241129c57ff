use anyhow::Result;
use intent_classifier::CatalogConfig;
use intent_encoder::{Embedder, ModelSpec, TextEncoder};
use intent_feedback::{FeedbackLog, TRAINING_LOG_REL_PATH};
use intent_server::{build_router, ServiceContext};
use std::path::Path;
use std::sync::Arc;

/// Bind the full route table on an ephemeral port, backed by the stub
/// encoder and a feedback log under `data_root`.
async fn spawn_service(data_root: &Path) -> Result<String> {
    let encoder: Arc<dyn Embedder> = Arc::new(TextEncoder::stub(ModelSpec::for_model(
        "all-MiniLM-L6-v2",
    )?));
    let context = Arc::new(
        ServiceContext::with_encoder(
            encoder,
            &CatalogConfig::default(),
            FeedbackLog::at_data_root(Some(data_root)),
        )
        .await?,
    );

    let app = build_router(context);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            eprintln!("test server failed: {err}");
        }
    });

    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn classify_answers_with_catalog_label_and_cors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    // The stub encoder is deterministic, so a seed phrase self-matches.
    let response = client
        .post(format!("{base}/classify"))
        .body(r#"{"transcript":"there's a bug"}"#)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["intent"], "log_issue");
    let confidence = body["confidence"].as_f64().expect("confidence is a number");
    assert!((confidence - 1.0).abs() < 1e-3, "confidence = {confidence}");
    Ok(())
}

#[tokio::test]
async fn classify_is_deterministic_across_requests() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    let mut answers = Vec::new();
    for _ in 0..2 {
        let response = client
            .post(format!("{base}/classify"))
            .body(r#"{"transcript":"show me all open issues"}"#)
            .send()
            .await?;
        answers.push(response.json::<serde_json::Value>().await?);
    }
    assert_eq!(answers[0], answers[1]);
    Ok(())
}

#[tokio::test]
async fn classify_rejects_missing_or_empty_transcript() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    for body in ["{}", r#"{"transcript":""}"#] {
        let response = client
            .post(format!("{base}/classify"))
            .body(body)
            .send()
            .await?;
        assert_eq!(response.status(), 400, "body = {body}");
        let error: serde_json::Value = response.json().await?;
        assert!(error["error"].is_string());
    }
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_descriptive_client_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/classify"))
        .body("{this is not json")
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let error: serde_json::Value = response.json().await?;
    assert!(
        error["error"]
            .as_str()
            .unwrap_or_default()
            .contains("Invalid request body"),
        "error = {error}"
    );
    Ok(())
}

#[tokio::test]
async fn unknown_routes_and_methods_are_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    let unknown = client.get(format!("{base}/nope")).send().await?;
    assert_eq!(unknown.status(), 404);

    let wrong_method_on_classify = client.get(format!("{base}/classify")).send().await?;
    assert_eq!(wrong_method_on_classify.status(), 404);

    let wrong_method_on_health = client
        .post(format!("{base}/health"))
        .body("{}")
        .send()
        .await?;
    assert_eq!(wrong_method_on_health.status(), 404);

    let error: serde_json::Value = unknown.json().await?;
    assert_eq!(error["error"], "Not found");
    Ok(())
}

#[tokio::test]
async fn health_reports_model_identity() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;

    let response = reqwest::get(format!("{base}/health")).await?;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "all-MiniLM-L6-v2");
    Ok(())
}

#[tokio::test]
async fn log_with_only_transcript_records_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/log"))
        .body(r#"{"transcript":"hello there"}"#)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["logged"], true);

    // Defaults: user_label and predicted both "unknown", so the sample
    // counts as correct.
    let stats: serde_json::Value = reqwest::get(format!("{base}/stats")).await?.json().await?;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["accuracy"], 1.0);
    assert_eq!(stats["by_intent"]["unknown"]["total"], 1);
    assert_eq!(stats["by_intent"]["unknown"]["correct"], 1);

    let raw = std::fs::read_to_string(dir.path().join(TRAINING_LOG_REL_PATH))?;
    let line: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap())?;
    assert_eq!(line["user_label"], "unknown");
    assert_eq!(line["predicted"], "unknown");
    assert_eq!(line["confidence"], 0.0);
    assert_eq!(line["was_overridden"], false);
    assert!(line["ts"].as_str().unwrap().ends_with('Z'));
    Ok(())
}

#[tokio::test]
async fn stats_track_corrections_by_user_label() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    let confirmed = serde_json::json!({
        "transcript": "there's a bug in checkout",
        "user_label": "log_issue",
        "predicted": "log_issue",
        "confidence": 0.91,
        "was_overridden": false,
    });
    let corrected = serde_json::json!({
        "transcript": "find my notes",
        "user_label": "search",
        "predicted": "ask_oracle",
        "confidence": 0.44,
        "was_overridden": true,
    });
    for body in [&confirmed, &corrected] {
        let response = client
            .post(format!("{base}/log"))
            .body(serde_json::to_string(body)?)
            .send()
            .await?;
        assert_eq!(response.status(), 200);
    }

    let stats: serde_json::Value = reqwest::get(format!("{base}/stats")).await?.json().await?;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["accuracy"], 0.5);
    assert_eq!(stats["by_intent"]["log_issue"]["correct"], 1);
    assert_eq!(stats["by_intent"]["search"]["total"], 1);
    assert_eq!(stats["by_intent"]["search"]["correct"], 0);
    Ok(())
}

#[tokio::test]
async fn stats_skip_corrupt_lines() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;
    let client = reqwest::Client::new();

    for transcript in ["one", "two", "three"] {
        client
            .post(format!("{base}/log"))
            .body(format!(r#"{{"transcript":"{transcript}"}}"#))
            .send()
            .await?;
    }

    // Corrupt the log in place; stats must still cover the valid lines.
    let log_path = dir.path().join(TRAINING_LOG_REL_PATH);
    let mut raw = std::fs::read_to_string(&log_path)?;
    raw.push_str("garbage line, not json\n");
    std::fs::write(&log_path, raw)?;

    let stats: serde_json::Value = reqwest::get(format!("{base}/stats")).await?.json().await?;
    assert_eq!(stats["total"], 3);
    Ok(())
}

#[tokio::test]
async fn empty_stats_before_any_feedback() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = spawn_service(dir.path()).await?;

    let response = reqwest::get(format!("{base}/stats")).await?;
    assert_eq!(response.status(), 200);
    let stats: serde_json::Value = response.json().await?;
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["accuracy"], 0.0);
    assert!(stats["by_intent"].as_object().unwrap().is_empty());
    Ok(())
}
