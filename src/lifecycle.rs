use std::fmt;

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Project;
use crate::schema::projects;

/// Project status flow:
/// in_progress → under_review → revision_requested → under_review → completed,
/// with on_hold reachable from active work and cancellation possible from any
/// non-terminal status. `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    InProgress,
    UnderReview,
    RevisionRequested,
    OnHold,
    Completed,
    Cancelled,
}

pub const ALL_STATUSES: [ProjectStatus; 6] = [
    ProjectStatus::InProgress,
    ProjectStatus::UnderReview,
    ProjectStatus::RevisionRequested,
    ProjectStatus::OnHold,
    ProjectStatus::Completed,
    ProjectStatus::Cancelled,
];

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::UnderReview => "under_review",
            ProjectStatus::RevisionRequested => "revision_requested",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(ProjectStatus::InProgress),
            "under_review" => Some(ProjectStatus::UnderReview),
            "revision_requested" => Some(ProjectStatus::RevisionRequested),
            "on_hold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    /// The transition table. Terminal states have no outgoing edges.
    pub fn allowed_transitions(self) -> &'static [ProjectStatus] {
        match self {
            ProjectStatus::InProgress => &[
                ProjectStatus::UnderReview,
                ProjectStatus::OnHold,
                ProjectStatus::Cancelled,
            ],
            ProjectStatus::UnderReview => &[
                ProjectStatus::RevisionRequested,
                ProjectStatus::Completed,
                ProjectStatus::Cancelled,
            ],
            ProjectStatus::RevisionRequested => &[
                ProjectStatus::UnderReview,
                ProjectStatus::OnHold,
                ProjectStatus::Cancelled,
            ],
            ProjectStatus::OnHold => &[ProjectStatus::InProgress, ProjectStatus::Cancelled],
            ProjectStatus::Completed | ProjectStatus::Cancelled => &[],
        }
    }

    pub fn can_transition(self, target: ProjectStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn allowed_transition_names(status: ProjectStatus) -> Vec<&'static str> {
    status
        .allowed_transitions()
        .iter()
        .map(|s| s.as_str())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRole {
    Client,
    Editor,
}

impl ProjectRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRole::Client => "client",
            ProjectRole::Editor => "editor",
        }
    }
}

pub fn party_role(project: &Project, user_id: Uuid) -> Option<ProjectRole> {
    if project.client_id == user_id {
        Some(ProjectRole::Client)
    } else if project.editor_id == user_id {
        Some(ProjectRole::Editor)
    } else {
        None
    }
}

pub fn require_party(project: &Project, user_id: Uuid) -> AppResult<ProjectRole> {
    party_role(project, user_id)
        .ok_or_else(|| AppError::forbidden("you do not have access to this project"))
}

/// A committed status change: the project row after the update plus the
/// status it moved away from, for activity logging.
pub struct TransitionOutcome {
    pub project: Project,
    pub previous: ProjectStatus,
    pub actor_role: ProjectRole,
}

pub fn submit_for_review(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::UnderReview,
        None,
        Some(ProjectRole::Editor),
        &[ProjectStatus::InProgress, ProjectStatus::RevisionRequested],
    )
}

pub fn request_revision(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
    notes: Option<&str>,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::RevisionRequested,
        notes,
        Some(ProjectRole::Client),
        &[ProjectStatus::UnderReview],
    )
}

/// Completion accepts `revision_requested` directly, bypassing the
/// `under_review` re-entry the generic table would require. The original
/// product depends on this edge, so it lives only here and not in
/// `update_status`.
pub fn complete(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::Completed,
        None,
        Some(ProjectRole::Client),
        &[ProjectStatus::UnderReview, ProjectStatus::RevisionRequested],
    )
}

pub fn cancel(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
    reason: Option<&str>,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::Cancelled,
        reason,
        None,
        &[
            ProjectStatus::InProgress,
            ProjectStatus::UnderReview,
            ProjectStatus::RevisionRequested,
            ProjectStatus::OnHold,
        ],
    )
}

pub fn put_on_hold(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
    reason: Option<&str>,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::OnHold,
        reason,
        None,
        &[ProjectStatus::InProgress, ProjectStatus::RevisionRequested],
    )
}

pub fn resume(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
) -> AppResult<TransitionOutcome> {
    perform_transition(
        conn,
        project_id,
        actor_id,
        ProjectStatus::InProgress,
        None,
        None,
        &[ProjectStatus::OnHold],
    )
}

/// Generic entry point. Strictly table-checked: the completion bypass does
/// not apply here.
pub fn update_status(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
    target: ProjectStatus,
    notes: Option<&str>,
) -> AppResult<TransitionOutcome> {
    let allowed_from: Vec<ProjectStatus> = ALL_STATUSES
        .iter()
        .copied()
        .filter(|from| from.can_transition(target))
        .collect();

    perform_transition(conn, project_id, actor_id, target, notes, None, &allowed_from)
}

/// Single validation-and-mutation path shared by every public entry point.
/// Runs in its own transaction and re-reads the row under `FOR UPDATE`, so
/// two racing transitions against the same project serialize and the loser
/// fails the status check instead of clobbering the winner.
fn perform_transition(
    conn: &mut PgConnection,
    project_id: Uuid,
    actor_id: Uuid,
    target: ProjectStatus,
    notes: Option<&str>,
    required_role: Option<ProjectRole>,
    allowed_from: &[ProjectStatus],
) -> AppResult<TransitionOutcome> {
    conn.transaction::<TransitionOutcome, AppError, _>(|conn| {
        let project: Project = projects::table
            .find(project_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("project not found"))?;

        let actor_role = require_party(&project, actor_id)?;
        if let Some(required) = required_role {
            if actor_role != required {
                return Err(AppError::forbidden(format!(
                    "only the project's {} can perform this action",
                    required.as_str()
                )));
            }
        }

        let current = ProjectStatus::parse(&project.status).ok_or_else(|| {
            AppError::internal(format!("project has unrecognized status: {}", project.status))
        })?;

        if current.is_terminal() {
            return Err(AppError::bad_request(format!(
                "project is {current} and accepts no further status changes"
            )));
        }

        if !allowed_from.contains(&current) {
            return Err(AppError::bad_request(format!(
                "cannot transition project from {current} to {target}"
            )));
        }

        let now = Utc::now().naive_utc();
        let row = projects::table.find(project_id);
        match target {
            ProjectStatus::InProgress | ProjectStatus::UnderReview => {
                diesel::update(row)
                    .set((
                        projects::status.eq(target.as_str()),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
            ProjectStatus::RevisionRequested => {
                diesel::update(row)
                    .set((
                        projects::status.eq(target.as_str()),
                        projects::revision_notes.eq(notes),
                        projects::revision_count.eq(projects::revision_count + 1),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
            ProjectStatus::OnHold => {
                diesel::update(row)
                    .set((
                        projects::status.eq(target.as_str()),
                        projects::hold_reason.eq(notes),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
            ProjectStatus::Completed => {
                diesel::update(row)
                    .set((
                        projects::status.eq(target.as_str()),
                        projects::completed_at.eq(now),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
            ProjectStatus::Cancelled => {
                diesel::update(row)
                    .set((
                        projects::status.eq(target.as_str()),
                        projects::cancellation_reason.eq(notes),
                        projects::cancelled_at.eq(now),
                        projects::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }
        }

        let updated: Project = projects::table.find(project_id).first(conn)?;
        Ok(TransitionOutcome {
            project: updated,
            previous: current,
            actor_role,
        })
    })
}
