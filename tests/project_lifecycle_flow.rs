mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct ProjectInfo {
    id: Uuid,
    status: String,
    escrow_amount: f64,
    revision_count: i32,
    revision_notes: Option<String>,
    hold_reason: Option<String>,
    cancellation_reason: Option<String>,
    completed_at: Option<String>,
    cancelled_at: Option<String>,
}

#[derive(Deserialize)]
struct LifecycleBody {
    project: ProjectInfo,
    allowed_transitions: Vec<String>,
}

#[derive(Deserialize)]
struct MilestoneInfo {
    title: String,
    display_order: i32,
}

#[derive(Deserialize)]
struct AcceptBody {
    project: ProjectInfo,
    milestones: Vec<MilestoneInfo>,
    allowed_transitions: Vec<String>,
}

#[derive(Deserialize)]
struct ActivityEntry {
    activity_type: String,
    description: String,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

struct Engagement {
    client_token: String,
    editor_token: String,
    accepted: AcceptBody,
}

async fn start_engagement(app: &TestApp, price: f64) -> Result<Engagement> {
    let client_id = app
        .insert_user("Casey Client", "casey@example.com", "clientpass", "client")
        .await?;
    let editor_id = app
        .insert_user("Eddie Editor", "eddie@example.com", "editorpass", "editor")
        .await?;
    let job_id = app.insert_job(client_id, "Wedding highlight reel").await?;
    let proposal_id = app.insert_proposal(job_id, editor_id, price).await?;

    let client_token = app.login_token("casey@example.com", "clientpass").await?;
    let editor_token = app.login_token("eddie@example.com", "editorpass").await?;

    let response = app
        .post_empty(
            &format!("/api/projects/accept/{proposal_id}"),
            Some(&client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    let accepted: AcceptBody = serde_json::from_slice(&body)?;

    Ok(Engagement {
        client_token,
        editor_token,
        accepted,
    })
}

async fn lifecycle_call(
    app: &TestApp,
    project_id: Uuid,
    action: &str,
    payload: Option<serde_json::Value>,
    token: &str,
) -> Result<hyper::Response<axum::body::Body>> {
    let path = format!("/api/projects/{project_id}/{action}");
    match payload {
        Some(body) => app.post_json(&path, &body, Some(token)).await,
        None => app.post_empty(&path, Some(token)).await,
    }
}

#[tokio::test]
async fn full_review_cycle_completes_project() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 500.0).await?;
    let project_id = eng.accepted.project.id;

    assert_eq!(eng.accepted.project.status, "in_progress");
    assert_eq!(eng.accepted.project.escrow_amount, 500.0);
    assert_eq!(eng.accepted.milestones.len(), 5);
    assert_eq!(eng.accepted.milestones[0].title, "Project Kickoff");
    assert_eq!(eng.accepted.milestones[4].display_order, 5);
    assert_eq!(
        eng.accepted.allowed_transitions,
        vec!["under_review", "on_hold", "cancelled"]
    );

    // Editor delivers a first cut.
    let response = lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "under_review");

    // Client sends it back once.
    let response = lifecycle_call(
        &app,
        project_id,
        "request-revision",
        Some(json!({ "notes": "fix intro" })),
        &eng.client_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "revision_requested");
    assert_eq!(body.project.revision_count, 1);
    assert_eq!(body.project.revision_notes.as_deref(), Some("fix intro"));

    // Editor resubmits, client approves.
    let response = lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = lifecycle_call(
        &app,
        project_id,
        "complete",
        Some(json!({ "feedback": "great work" })),
        &eng.client_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "completed");
    assert!(body.project.completed_at.is_some());
    assert!(body.project.cancelled_at.is_none());
    assert!(body.allowed_transitions.is_empty());

    // Terminal: every further mutation is rejected loudly.
    let response = lifecycle_call(
        &app,
        project_id,
        "cancel",
        Some(json!({ "reason": "too late" })),
        &eng.client_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorBody = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert!(error.error.contains("completed"));

    let response = lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The audit trail recorded each step.
    let response = app
        .get(
            &format!("/api/projects/{project_id}/activity"),
            Some(&eng.client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let activity: Vec<ActivityEntry> =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let kinds: Vec<&str> = activity.iter().map(|a| a.activity_type.as_str()).collect();
    assert!(kinds.contains(&"project_created"));
    assert!(kinds.contains(&"status_changed"));
    assert!(kinds.contains(&"project_completed"));

    let revision_entry = activity
        .iter()
        .find(|a| a.description == "Revision requested")
        .expect("revision activity present");
    assert_eq!(revision_entry.metadata["notes"], json!("fix intro"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn complete_bypasses_review_reentry_but_generic_path_does_not() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 300.0).await?;
    let project_id = eng.accepted.project.id;

    lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token).await?;
    lifecycle_call(
        &app,
        project_id,
        "request-revision",
        Some(json!({ "notes": "tighten pacing" })),
        &eng.client_token,
    )
    .await?;

    // The generic entry point refuses revision_requested -> completed.
    let response = app
        .put_json(
            &format!("/api/projects/{project_id}/status"),
            &json!({ "status": "completed" }),
            Some(&eng.client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The dedicated completion endpoint allows it.
    let response =
        lifecycle_call(&app, project_id, "complete", None, &eng.client_token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "completed");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn cancellation_is_terminal_and_keeps_reason() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 250.0).await?;
    let project_id = eng.accepted.project.id;

    let response = lifecycle_call(
        &app,
        project_id,
        "cancel",
        Some(json!({ "reason": "scope change" })),
        &eng.editor_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "cancelled");
    assert_eq!(
        body.project.cancellation_reason.as_deref(),
        Some("scope change")
    );
    assert!(body.project.cancelled_at.is_some());
    assert!(body.allowed_transitions.is_empty());

    let response = lifecycle_call(&app, project_id, "resume", None, &eng.client_token).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(
            &format!("/api/projects/{project_id}/activity?type=project_cancelled"),
            Some(&eng.client_token),
        )
        .await?;
    let activity: Vec<ActivityEntry> =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].metadata["cancelled_by"], json!("editor"));
    assert_eq!(activity[0].metadata["from"], json!("in_progress"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn hold_and_resume_retains_hold_reason() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 400.0).await?;
    let project_id = eng.accepted.project.id;

    let response = lifecycle_call(
        &app,
        project_id,
        "hold",
        Some(json!({ "reason": "waiting on assets" })),
        &eng.client_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "on_hold");
    assert_eq!(body.allowed_transitions, vec!["in_progress", "cancelled"]);

    // Only resume or cancel leaves on_hold.
    let response = lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = lifecycle_call(&app, project_id, "resume", None, &eng.editor_token).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LifecycleBody =
        serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.project.status, "in_progress");
    assert_eq!(
        body.project.hold_reason.as_deref(),
        Some("waiting on assets")
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn lifecycle_operations_enforce_roles_and_membership() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 350.0).await?;
    let project_id = eng.accepted.project.id;

    // Wrong party for role-specific operations.
    let response = lifecycle_call(&app, project_id, "submit-for-review", None, &eng.client_token)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    lifecycle_call(&app, project_id, "submit-for-review", None, &eng.editor_token).await?;
    let response = lifecycle_call(
        &app,
        project_id,
        "request-revision",
        Some(json!({ "notes": "no" })),
        &eng.editor_token,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = lifecycle_call(&app, project_id, "complete", None, &eng.editor_token).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A third user is not a party at all.
    app.insert_user("Olive Outsider", "olive@example.com", "outsiderpass", "client")
        .await?;
    let outsider_token = app.login_token("olive@example.com", "outsiderpass").await?;
    let response = app
        .get(&format!("/api/projects/{project_id}"), Some(&outsider_token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response =
        lifecycle_call(&app, project_id, "cancel", None, &outsider_token).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown project and unknown status are rejected.
    let response = app
        .get(
            &format!("/api/projects/{}", Uuid::new_v4()),
            Some(&eng.client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .put_json(
            &format!("/api/projects/{project_id}/status"),
            &json!({ "status": "archived" }),
            Some(&eng.client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorBody = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert!(error.error.contains("archived"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn accept_proposal_requires_job_owner_and_pending_proposal() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let client_id = app
        .insert_user("Casey Client", "casey@example.com", "clientpass", "client")
        .await?;
    let editor_id = app
        .insert_user("Eddie Editor", "eddie@example.com", "editorpass", "editor")
        .await?;
    let job_id = app.insert_job(client_id, "Product teaser").await?;
    let proposal_id = app.insert_proposal(job_id, editor_id, 150.0).await?;

    let client_token = app.login_token("casey@example.com", "clientpass").await?;
    let editor_token = app.login_token("eddie@example.com", "editorpass").await?;

    // The editor cannot accept their own proposal.
    let response = app
        .post_empty(
            &format!("/api/projects/accept/{proposal_id}"),
            Some(&editor_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_empty(
            &format!("/api/projects/accept/{proposal_id}"),
            Some(&client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Re-accepting an already resolved proposal fails.
    let response = app
        .post_empty(
            &format!("/api/projects/accept/{proposal_id}"),
            Some(&client_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn project_detail_includes_progress_stats_and_transitions() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let eng = start_engagement(&app, 600.0).await?;
    let project_id = eng.accepted.project.id;

    #[derive(Deserialize)]
    struct Progress {
        total: i64,
        completed: i64,
        percentage: i64,
    }

    #[derive(Deserialize)]
    struct Stats {
        milestones: Progress,
        activity_count: i64,
    }

    #[derive(Deserialize)]
    struct DetailBody {
        project: ProjectInfo,
        progress: Progress,
        stats: Stats,
        allowed_transitions: Vec<String>,
    }

    let response = app
        .get(&format!("/api/projects/{project_id}"), Some(&eng.editor_token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: DetailBody = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;

    assert_eq!(body.project.id, project_id);
    assert_eq!(body.progress.total, 5);
    assert_eq!(body.progress.completed, 0);
    assert_eq!(body.progress.percentage, 0);
    assert_eq!(body.stats.milestones.total, 5);
    // project_created + milestone_added from acceptance.
    assert!(body.stats.activity_count >= 2);
    assert_eq!(
        body.allowed_transitions,
        vec!["under_review", "on_hold", "cancelled"]
    );

    app.cleanup().await?;
    Ok(())
}
