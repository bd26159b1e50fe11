use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDateTime;
use diesel::dsl::{count_star, max};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityType;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::ProjectActivity;
use crate::schema::{project_activities, projects, users};
use crate::state::AppState;

use super::projects::{load_project_for, to_iso};

#[derive(Deserialize)]
pub struct ActivityListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
}

#[derive(Deserialize)]
pub struct RecentActivityQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub activity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct ActivitySummaryEntry {
    pub activity_type: String,
    pub count: i64,
    pub last_activity: Option<String>,
}

pub async fn project_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ActivityListQuery>,
) -> AppResult<Json<Vec<ActivityResponse>>> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, id, &user)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut sql = project_activities::table
        .inner_join(users::table)
        .filter(project_activities::project_id.eq(id))
        .select((project_activities::all_columns, users::name))
        .into_boxed();

    if let Some(raw) = query.activity_type.as_deref() {
        let ty = ActivityType::parse(raw)
            .ok_or_else(|| AppError::bad_request(format!("unknown activity type: {raw}")))?;
        sql = sql.filter(project_activities::activity_type.eq(ty.as_str()));
    }

    let rows: Vec<(ProjectActivity, String)> = sql
        .order(project_activities::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(entry, user_name)| to_activity_response(entry, user_name))
            .collect(),
    ))
}

pub async fn project_activity_summary(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ActivitySummaryEntry>>> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, id, &user)?;

    let rows: Vec<(String, i64, Option<NaiveDateTime>)> = project_activities::table
        .filter(project_activities::project_id.eq(id))
        .group_by(project_activities::activity_type)
        .select((
            project_activities::activity_type,
            count_star(),
            max(project_activities::created_at),
        ))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(activity_type, count, last)| ActivitySummaryEntry {
                activity_type,
                count,
                last_activity: last.map(to_iso),
            })
            .collect(),
    ))
}

pub async fn my_recent_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RecentActivityQuery>,
) -> AppResult<Json<Vec<ActivityResponse>>> {
    let mut conn = state.db()?;

    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let my_projects = projects::table
        .filter(
            projects::client_id
                .eq(user.user_id)
                .or(projects::editor_id.eq(user.user_id)),
        )
        .select(projects::id);

    let rows: Vec<(ProjectActivity, String)> = project_activities::table
        .inner_join(users::table)
        .filter(project_activities::project_id.eq_any(my_projects))
        .select((project_activities::all_columns, users::name))
        .order(project_activities::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(entry, user_name)| to_activity_response(entry, user_name))
            .collect(),
    ))
}

fn to_activity_response(entry: ProjectActivity, user_name: String) -> ActivityResponse {
    ActivityResponse {
        id: entry.id,
        project_id: entry.project_id,
        user_id: entry.user_id,
        user_name,
        activity_type: entry.activity_type,
        description: entry.description,
        metadata: entry.metadata,
        created_at: to_iso(entry.created_at),
    }
}
