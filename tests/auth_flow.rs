mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde_json::json;

#[tokio::test]
async fn signup_login_and_me_round_trip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json(
            "/api/auth/signup",
            &json!({
                "name": "Casey Client",
                "email": "casey@example.com",
                "password": "clientpass",
                "role": "client",
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Duplicate email is rejected.
    let response = app
        .post_json(
            "/api/auth/signup",
            &json!({
                "name": "Casey Again",
                "email": "casey@example.com",
                "password": "clientpass",
                "role": "client",
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let token = app.login_token("casey@example.com", "clientpass").await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let me: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(me["name"], json!("Casey Client"));
    assert_eq!(me["role"], json!("client"));

    // Protected routes refuse missing and garbage tokens.
    let response = app.get("/api/projects", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.get("/api/projects", Some("not-a-token")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "casey@example.com", "password": "wrongpass" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}
