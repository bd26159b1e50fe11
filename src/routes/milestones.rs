use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::dsl::count_star;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Milestone, NewMilestone, Project};
use crate::schema::{milestones, projects};
use crate::state::AppState;

use super::projects::{load_project_for, to_iso};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

const MILESTONE_STATUSES: &[&str] = &[STATUS_PENDING, STATUS_IN_PROGRESS, STATUS_COMPLETED];

/// Fixed template seeded when a project is created, ordered by delivery phase.
const DEFAULT_MILESTONES: &[(&str, &str)] = &[
    (
        "Project Kickoff",
        "Initial project setup and requirements gathering",
    ),
    ("First Draft", "Initial draft delivery for review"),
    ("Revision Round 1", "Incorporate first round of feedback"),
    ("Final Delivery", "Final edited video delivery"),
    ("Project Approval", "Client approval and project completion"),
];

#[derive(Serialize)]
pub struct MilestoneResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub display_order: i32,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Clone)]
pub struct ProgressResponse {
    pub total: i64,
    pub completed: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub percentage: i64,
}

#[derive(Serialize)]
pub struct MilestoneListResponse {
    pub progress: ProgressResponse,
    pub count: usize,
    pub milestones: Vec<MilestoneResponse>,
}

#[derive(Deserialize)]
pub struct CreateMilestoneRequest {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub order: Option<i32>,
}

#[derive(Deserialize)]
pub struct UpdateMilestoneRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub order: Option<i32>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub orders: Vec<ReorderEntry>,
}

#[derive(Deserialize)]
pub struct ReorderEntry {
    pub id: Uuid,
    pub order: i32,
}

#[derive(Deserialize)]
pub struct UpcomingQuery {
    #[serde(default = "default_upcoming_days")]
    pub days: i64,
}

const fn default_upcoming_days() -> i64 {
    7
}

pub async fn list_project_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<MilestoneListResponse>> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, project_id, &user)?;

    let rows = load_ordered_milestones(&mut conn, project_id)?;
    let progress = project_progress(&mut conn, project_id)?;

    Ok(Json(MilestoneListResponse {
        progress,
        count: rows.len(),
        milestones: rows.into_iter().map(to_milestone_response).collect(),
    }))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateMilestoneRequest>,
) -> AppResult<(StatusCode, Json<MilestoneResponse>)> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut conn = state.db()?;
    load_project_for(&mut conn, project_id, &user)?;

    let new_milestone = NewMilestone {
        id: Uuid::new_v4(),
        project_id,
        title: title.to_string(),
        description: payload.description,
        status: STATUS_PENDING.to_string(),
        due_date: payload.due_date,
        display_order: payload.order.unwrap_or(0),
    };

    diesel::insert_into(milestones::table)
        .values(&new_milestone)
        .execute(&mut conn)?;

    let milestone: Milestone = milestones::table.find(new_milestone.id).first(&mut conn)?;

    activity::record(
        &mut conn,
        project_id,
        user.user_id,
        ActivityType::MilestoneAdded,
        format!("Milestone added: {}", milestone.title),
        json!({ "milestone_id": milestone.id, "title": milestone.title }),
    );

    Ok((StatusCode::CREATED, Json(to_milestone_response(milestone))))
}

pub async fn create_default_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<MilestoneListResponse>)> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, project_id, &user)?;

    let seeded = conn.transaction::<Vec<Milestone>, AppError, _>(|conn| {
        let existing: i64 = milestones::table
            .filter(milestones::project_id.eq(project_id))
            .select(count_star())
            .first(conn)?;
        if existing > 0 {
            return Err(AppError::conflict("project already has milestones"));
        }
        seed_default_milestones(conn, project_id)
    })?;

    activity::record(
        &mut conn,
        project_id,
        user.user_id,
        ActivityType::MilestoneAdded,
        "Default milestones added",
        json!({ "count": seeded.len() }),
    );

    let progress = project_progress(&mut conn, project_id)?;
    Ok((
        StatusCode::CREATED,
        Json(MilestoneListResponse {
            progress,
            count: seeded.len(),
            milestones: seeded.into_iter().map(to_milestone_response).collect(),
        }),
    ))
}

pub async fn reorder_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ReorderRequest>,
) -> AppResult<Json<MilestoneListResponse>> {
    if payload.orders.is_empty() {
        return Err(AppError::bad_request("orders must not be empty"));
    }

    let mut conn = state.db()?;
    load_project_for(&mut conn, project_id, &user)?;

    let now = Utc::now().naive_utc();
    conn.transaction::<(), AppError, _>(|conn| {
        for entry in &payload.orders {
            // The project filter pins every update to this project; entries
            // naming another project's milestones match zero rows.
            diesel::update(
                milestones::table
                    .find(entry.id)
                    .filter(milestones::project_id.eq(project_id)),
            )
            .set((
                milestones::display_order.eq(entry.order),
                milestones::updated_at.eq(now),
            ))
            .execute(conn)?;
        }
        Ok(())
    })?;

    let rows = load_ordered_milestones(&mut conn, project_id)?;
    let progress = project_progress(&mut conn, project_id)?;

    Ok(Json(MilestoneListResponse {
        progress,
        count: rows.len(),
        milestones: rows.into_iter().map(to_milestone_response).collect(),
    }))
}

pub async fn get_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MilestoneResponse>> {
    let mut conn = state.db()?;
    let milestone = load_milestone_for(&mut conn, id, &user)?;
    Ok(Json(to_milestone_response(milestone)))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMilestoneRequest>,
) -> AppResult<Json<MilestoneResponse>> {
    let mut conn = state.db()?;
    let existing = load_milestone_for(&mut conn, id, &user)?;

    if let Some(status) = payload.status.as_deref() {
        if !MILESTONE_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!(
                "invalid milestone status: {status}"
            )));
        }
    }

    let now = Utc::now().naive_utc();
    let status = payload.status.unwrap_or_else(|| existing.status.clone());
    // completed_at tracks the status: stamped on entry, cleared when a
    // completed milestone is reopened.
    let completed_at = if status == STATUS_COMPLETED {
        existing.completed_at.or(Some(now))
    } else {
        None
    };

    diesel::update(milestones::table.find(id))
        .set((
            milestones::title.eq(payload.title.unwrap_or(existing.title)),
            milestones::description.eq(payload.description.or(existing.description)),
            milestones::due_date.eq(payload.due_date.or(existing.due_date)),
            milestones::display_order.eq(payload.order.unwrap_or(existing.display_order)),
            milestones::status.eq(status),
            milestones::completed_at.eq(completed_at),
            milestones::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Milestone = milestones::table.find(id).first(&mut conn)?;
    Ok(Json(to_milestone_response(updated)))
}

#[derive(Serialize)]
pub struct CompleteMilestoneResponse {
    pub milestone: MilestoneResponse,
    pub project_progress: ProgressResponse,
}

pub async fn complete_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CompleteMilestoneResponse>> {
    let mut conn = state.db()?;
    let milestone = load_milestone_for(&mut conn, id, &user)?;

    let now = Utc::now().naive_utc();
    diesel::update(milestones::table.find(id))
        .set((
            milestones::status.eq(STATUS_COMPLETED),
            milestones::completed_at.eq(now),
            milestones::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Milestone = milestones::table.find(id).first(&mut conn)?;
    let progress = project_progress(&mut conn, milestone.project_id)?;

    activity::record(
        &mut conn,
        milestone.project_id,
        user.user_id,
        ActivityType::MilestoneCompleted,
        format!("Milestone completed: {}", milestone.title),
        json!({
            "milestone_id": id,
            "title": milestone.title,
            "progress": { "total": progress.total, "completed": progress.completed },
        }),
    );

    Ok(Json(CompleteMilestoneResponse {
        milestone: to_milestone_response(updated),
        project_progress: progress,
    }))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    load_milestone_for(&mut conn, id, &user)?;

    diesel::delete(milestones::table.find(id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn overdue_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MilestoneResponse>>> {
    let mut conn = state.db()?;
    let today = Utc::now().date_naive();

    let rows: Vec<Milestone> = milestones::table
        .inner_join(projects::table)
        .filter(
            projects::client_id
                .eq(user.user_id)
                .or(projects::editor_id.eq(user.user_id)),
        )
        .filter(milestones::status.ne(STATUS_COMPLETED))
        .filter(milestones::due_date.lt(today))
        .select(milestones::all_columns)
        .order(milestones::due_date.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_milestone_response).collect()))
}

pub async fn upcoming_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UpcomingQuery>,
) -> AppResult<Json<Vec<MilestoneResponse>>> {
    if query.days < 0 {
        return Err(AppError::bad_request("days must not be negative"));
    }

    let mut conn = state.db()?;
    let today = Utc::now().date_naive();
    let horizon = today + chrono::Duration::days(query.days);

    let rows: Vec<Milestone> = milestones::table
        .inner_join(projects::table)
        .filter(
            projects::client_id
                .eq(user.user_id)
                .or(projects::editor_id.eq(user.user_id)),
        )
        .filter(milestones::status.ne(STATUS_COMPLETED))
        .filter(milestones::due_date.ge(today))
        .filter(milestones::due_date.le(horizon))
        .select(milestones::all_columns)
        .order(milestones::due_date.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_milestone_response).collect()))
}

pub(crate) fn seed_default_milestones(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> AppResult<Vec<Milestone>> {
    let rows: Vec<NewMilestone> = DEFAULT_MILESTONES
        .iter()
        .enumerate()
        .map(|(index, (title, description))| NewMilestone {
            id: Uuid::new_v4(),
            project_id,
            title: (*title).to_string(),
            description: Some((*description).to_string()),
            status: STATUS_PENDING.to_string(),
            due_date: None,
            display_order: index as i32 + 1,
        })
        .collect();

    diesel::insert_into(milestones::table)
        .values(&rows)
        .execute(conn)?;

    load_ordered_milestones(conn, project_id)
}

pub(crate) fn project_progress(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> AppResult<ProgressResponse> {
    let rows: Vec<(String, i64)> = milestones::table
        .filter(milestones::project_id.eq(project_id))
        .group_by(milestones::status)
        .select((milestones::status, count_star()))
        .load(conn)?;

    let mut progress = ProgressResponse {
        total: 0,
        completed: 0,
        in_progress: 0,
        pending: 0,
        percentage: 0,
    };
    for (status, count) in rows {
        progress.total += count;
        match status.as_str() {
            STATUS_COMPLETED => progress.completed = count,
            STATUS_IN_PROGRESS => progress.in_progress = count,
            STATUS_PENDING => progress.pending = count,
            _ => {}
        }
    }

    if progress.total > 0 {
        progress.percentage =
            ((progress.completed as f64 / progress.total as f64) * 100.0).round() as i64;
    }

    Ok(progress)
}

fn load_ordered_milestones(conn: &mut PgConnection, project_id: Uuid) -> AppResult<Vec<Milestone>> {
    let rows: Vec<Milestone> = milestones::table
        .filter(milestones::project_id.eq(project_id))
        .order((milestones::display_order.asc(), milestones::due_date.asc()))
        .load(conn)?;
    Ok(rows)
}

fn load_milestone_for(
    conn: &mut PgConnection,
    milestone_id: Uuid,
    user: &AuthenticatedUser,
) -> AppResult<Milestone> {
    let milestone: Milestone = milestones::table
        .find(milestone_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("milestone not found"))?;

    let project: Project = projects::table.find(milestone.project_id).first(conn)?;
    crate::lifecycle::require_party(&project, user.user_id)?;

    Ok(milestone)
}

pub(crate) fn to_milestone_response(milestone: Milestone) -> MilestoneResponse {
    MilestoneResponse {
        id: milestone.id,
        project_id: milestone.project_id,
        title: milestone.title,
        description: milestone.description,
        status: milestone.status,
        due_date: milestone.due_date,
        display_order: milestone.display_order,
        completed_at: milestone.completed_at.map(to_iso),
        created_at: to_iso(milestone.created_at),
        updated_at: to_iso(milestone.updated_at),
    }
}
