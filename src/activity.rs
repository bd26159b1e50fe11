use std::fmt;

use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::models::NewProjectActivity;
use crate::schema::project_activities;

/// Closed set of audit-event kinds. Kept as an enum so a typo cannot create
/// an activity type that `find_by_type` filtering would silently miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    ProjectCreated,
    StatusChanged,
    MilestoneAdded,
    MilestoneCompleted,
    FileUploaded,
    FileApproved,
    MessageSent,
    PaymentMade,
    ReviewSubmitted,
    ProjectCompleted,
    ProjectCancelled,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::ProjectCreated => "project_created",
            ActivityType::StatusChanged => "status_changed",
            ActivityType::MilestoneAdded => "milestone_added",
            ActivityType::MilestoneCompleted => "milestone_completed",
            ActivityType::FileUploaded => "file_uploaded",
            ActivityType::FileApproved => "file_approved",
            ActivityType::MessageSent => "message_sent",
            ActivityType::PaymentMade => "payment_made",
            ActivityType::ReviewSubmitted => "review_submitted",
            ActivityType::ProjectCompleted => "project_completed",
            ActivityType::ProjectCancelled => "project_cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "project_created" => Some(ActivityType::ProjectCreated),
            "status_changed" => Some(ActivityType::StatusChanged),
            "milestone_added" => Some(ActivityType::MilestoneAdded),
            "milestone_completed" => Some(ActivityType::MilestoneCompleted),
            "file_uploaded" => Some(ActivityType::FileUploaded),
            "file_approved" => Some(ActivityType::FileApproved),
            "message_sent" => Some(ActivityType::MessageSent),
            "payment_made" => Some(ActivityType::PaymentMade),
            "review_submitted" => Some(ActivityType::ReviewSubmitted),
            "project_completed" => Some(ActivityType::ProjectCompleted),
            "project_cancelled" => Some(ActivityType::ProjectCancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append an audit record. Best-effort by design: the primary mutation has
/// already committed, so a failed insert is reported to the operational log
/// and otherwise swallowed. Callers must not depend on the record existing.
pub fn record(
    conn: &mut PgConnection,
    project_id: Uuid,
    user_id: Uuid,
    activity_type: ActivityType,
    description: impl Into<String>,
    metadata: serde_json::Value,
) {
    let entry = NewProjectActivity {
        id: Uuid::new_v4(),
        project_id,
        user_id,
        activity_type: activity_type.as_str().to_string(),
        description: description.into(),
        metadata,
    };

    if let Err(err) = diesel::insert_into(project_activities::table)
        .values(&entry)
        .execute(conn)
    {
        tracing::warn!(
            project_id = %project_id,
            activity_type = %activity_type,
            "failed to record project activity: {err}"
        );
    }
}
