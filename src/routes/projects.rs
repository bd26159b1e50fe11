use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::dsl::count_star;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::lifecycle::{self, ProjectStatus, TransitionOutcome};
use crate::models::{Job, Milestone, NewProject, Project, Proposal};
use crate::schema::{jobs, project_activities, project_files, projects, proposals};
use crate::state::AppState;

use super::milestones::{project_progress, seed_default_milestones, ProgressResponse};

pub const PROPOSAL_ACCEPTED: &str = "accepted";
pub const PROPOSAL_PENDING: &str = "pending";
pub const PROPOSAL_REJECTED: &str = "rejected";

#[derive(Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub editor_id: Uuid,
    pub status: String,
    pub escrow_amount: f64,
    pub revision_count: i32,
    pub revision_notes: Option<String>,
    pub hold_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct LifecycleResponse {
    pub project: ProjectResponse,
    pub allowed_transitions: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ProjectListEntry {
    #[serde(flatten)]
    pub project: ProjectResponse,
    pub role: &'static str,
}

#[derive(Serialize)]
pub struct FileStats {
    pub total: i64,
    pub drafts: i64,
    pub finals: i64,
}

#[derive(Serialize)]
pub struct ProjectStats {
    pub milestones: ProgressResponse,
    pub files: FileStats,
    pub activity_count: i64,
}

#[derive(Serialize)]
pub struct ProjectDetailResponse {
    pub project: ProjectResponse,
    pub progress: ProgressResponse,
    pub stats: ProjectStats,
    pub allowed_transitions: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct AcceptProposalResponse {
    pub project: ProjectResponse,
    pub milestones: Vec<super::milestones::MilestoneResponse>,
    pub allowed_transitions: Vec<&'static str>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct RevisionRequest {
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CompleteRequest {
    pub feedback: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

pub async fn accept_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<AcceptProposalResponse>)> {
    let mut conn = state.db()?;

    let (project, seeded) = conn.transaction::<(Project, Vec<Milestone>), AppError, _>(|conn| {
        let proposal: Proposal = proposals::table
            .find(proposal_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("proposal not found"))?;

        let job: Job = jobs::table
            .find(proposal.job_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("job not found"))?;

        if job.client_id != user.user_id {
            return Err(AppError::forbidden("only the job owner can accept proposals"));
        }

        if proposal.status != PROPOSAL_PENDING {
            return Err(AppError::bad_request("proposal has already been resolved"));
        }

        let now = Utc::now().naive_utc();
        let new_project = NewProject {
            id: Uuid::new_v4(),
            job_id: job.id,
            client_id: job.client_id,
            editor_id: proposal.editor_id,
            status: ProjectStatus::InProgress.as_str().to_string(),
            escrow_amount: proposal.price,
        };

        diesel::insert_into(projects::table)
            .values(&new_project)
            .execute(conn)?;

        diesel::update(proposals::table.find(proposal.id))
            .set((
                proposals::status.eq(PROPOSAL_ACCEPTED),
                proposals::updated_at.eq(now),
            ))
            .execute(conn)?;

        diesel::update(
            proposals::table
                .filter(proposals::job_id.eq(job.id))
                .filter(proposals::id.ne(proposal.id))
                .filter(proposals::status.eq(PROPOSAL_PENDING)),
        )
        .set((
            proposals::status.eq(PROPOSAL_REJECTED),
            proposals::updated_at.eq(now),
        ))
        .execute(conn)?;

        let seeded = seed_default_milestones(conn, new_project.id)?;
        let project: Project = projects::table.find(new_project.id).first(conn)?;
        Ok((project, seeded))
    })?;

    activity::record(
        &mut conn,
        project.id,
        user.user_id,
        ActivityType::ProjectCreated,
        "Project created from accepted proposal",
        json!({
            "job_id": project.job_id,
            "proposal_id": proposal_id,
            "escrow_amount": project.escrow_amount,
        }),
    );
    activity::record(
        &mut conn,
        project.id,
        user.user_id,
        ActivityType::MilestoneAdded,
        "Default milestones added",
        json!({ "count": seeded.len() }),
    );

    let allowed = allowed_for(&project);
    Ok((
        StatusCode::CREATED,
        Json(AcceptProposalResponse {
            project: to_project_response(project),
            milestones: seeded
                .into_iter()
                .map(super::milestones::to_milestone_response)
                .collect(),
            allowed_transitions: allowed,
        }),
    ))
}

pub async fn list_my_projects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ProjectListEntry>>> {
    let mut conn = state.db()?;

    let rows: Vec<Project> = projects::table
        .filter(
            projects::client_id
                .eq(user.user_id)
                .or(projects::editor_id.eq(user.user_id)),
        )
        .order(projects::created_at.desc())
        .load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|project| {
            let role = if project.client_id == user.user_id {
                "client"
            } else {
                "editor"
            };
            ProjectListEntry {
                project: to_project_response(project),
                role,
            }
        })
        .collect();

    Ok(Json(response))
}

pub async fn get_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProjectDetailResponse>> {
    let mut conn = state.db()?;

    let project = load_project_for(&mut conn, id, &user)?;
    let progress = project_progress(&mut conn, id)?;
    let stats = load_project_stats(&mut conn, id, &progress)?;
    let allowed = allowed_for(&project);

    Ok(Json(ProjectDetailResponse {
        project: to_project_response(project),
        progress: progress.clone(),
        stats,
        allowed_transitions: allowed,
    }))
}

pub async fn get_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProgressResponse>> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, id, &user)?;
    let progress = project_progress(&mut conn, id)?;
    Ok(Json(progress))
}

pub async fn submit_for_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LifecycleResponse>> {
    let mut conn = state.db()?;
    let outcome = lifecycle::submit_for_review(&mut conn, id, user.user_id)?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::StatusChanged,
        "Project submitted for review",
        status_change_metadata(&outcome, None),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn request_revision(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RevisionRequest>,
) -> AppResult<Json<LifecycleResponse>> {
    let mut conn = state.db()?;
    let outcome = lifecycle::request_revision(&mut conn, id, user.user_id, payload.notes.as_deref())?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::StatusChanged,
        "Revision requested",
        status_change_metadata(&outcome, payload.notes.as_deref()),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn complete_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> AppResult<Json<LifecycleResponse>> {
    let feedback = payload.and_then(|Json(body)| body.feedback);
    let mut conn = state.db()?;
    let outcome = lifecycle::complete(&mut conn, id, user.user_id)?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::ProjectCompleted,
        "Project marked as completed",
        status_change_metadata(&outcome, feedback.as_deref()),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn cancel_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReasonRequest>>,
) -> AppResult<Json<LifecycleResponse>> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let mut conn = state.db()?;
    let outcome = lifecycle::cancel(&mut conn, id, user.user_id, reason.as_deref())?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::ProjectCancelled,
        "Project cancelled",
        json!({
            "from": outcome.previous.as_str(),
            "to": outcome.project.status,
            "reason": reason,
            "cancelled_by": outcome.actor_role.as_str(),
        }),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn put_on_hold(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReasonRequest>>,
) -> AppResult<Json<LifecycleResponse>> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let mut conn = state.db()?;
    let outcome = lifecycle::put_on_hold(&mut conn, id, user.user_id, reason.as_deref())?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::StatusChanged,
        "Project put on hold",
        status_change_metadata(&outcome, reason.as_deref()),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn resume_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LifecycleResponse>> {
    let mut conn = state.db()?;
    let outcome = lifecycle::resume(&mut conn, id, user.user_id)?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::StatusChanged,
        "Project resumed",
        status_change_metadata(&outcome, None),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<LifecycleResponse>> {
    let target = ProjectStatus::parse(&payload.status)
        .ok_or_else(|| AppError::bad_request(format!("invalid status: {}", payload.status)))?;

    let mut conn = state.db()?;
    let outcome =
        lifecycle::update_status(&mut conn, id, user.user_id, target, payload.notes.as_deref())?;

    activity::record(
        &mut conn,
        id,
        user.user_id,
        ActivityType::StatusChanged,
        format!(
            "Status changed from {} to {}",
            outcome.previous, outcome.project.status
        ),
        status_change_metadata(&outcome, payload.notes.as_deref()),
    );

    Ok(Json(to_lifecycle_response(outcome.project)))
}

pub(crate) fn load_project_for(
    conn: &mut PgConnection,
    project_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<Project> {
    let project: Project = projects::table
        .find(project_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    lifecycle::require_party(&project, user.user_id)?;
    Ok(project)
}

fn load_project_stats(
    conn: &mut PgConnection,
    project_id: Uuid,
    progress: &ProgressResponse,
) -> AppResult<ProjectStats> {
    let file_rows: Vec<(String, i64)> = project_files::table
        .filter(project_files::project_id.eq(project_id))
        .group_by(project_files::file_type)
        .select((project_files::file_type, count_star()))
        .load(conn)?;

    let mut files = FileStats {
        total: 0,
        drafts: 0,
        finals: 0,
    };
    for (file_type, count) in file_rows {
        files.total += count;
        match file_type.as_str() {
            "draft" => files.drafts = count,
            "final" => files.finals = count,
            _ => {}
        }
    }

    let activity_count: i64 = project_activities::table
        .filter(project_activities::project_id.eq(project_id))
        .select(count_star())
        .first(conn)?;

    Ok(ProjectStats {
        milestones: progress.clone(),
        files,
        activity_count,
    })
}

fn status_change_metadata(outcome: &TransitionOutcome, notes: Option<&str>) -> serde_json::Value {
    json!({
        "from": outcome.previous.as_str(),
        "to": outcome.project.status,
        "notes": notes,
    })
}

fn allowed_for(project: &Project) -> Vec<&'static str> {
    ProjectStatus::parse(&project.status)
        .map(lifecycle::allowed_transition_names)
        .unwrap_or_default()
}

pub(crate) fn to_lifecycle_response(project: Project) -> LifecycleResponse {
    let allowed = allowed_for(&project);
    LifecycleResponse {
        project: to_project_response(project),
        allowed_transitions: allowed,
    }
}

pub(crate) fn to_project_response(project: Project) -> ProjectResponse {
    ProjectResponse {
        id: project.id,
        job_id: project.job_id,
        client_id: project.client_id,
        editor_id: project.editor_id,
        status: project.status,
        escrow_amount: project.escrow_amount,
        revision_count: project.revision_count,
        revision_notes: project.revision_notes,
        hold_reason: project.hold_reason,
        cancellation_reason: project.cancellation_reason,
        completed_at: project.completed_at.map(to_iso),
        cancelled_at: project.cancelled_at.map(to_iso),
        created_at: to_iso(project.created_at),
        updated_at: to_iso(project.updated_at),
    }
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
