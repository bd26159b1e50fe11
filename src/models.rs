use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub duration_minutes: Option<i32>,
    pub budget_min: Option<i32>,
    pub budget_max: Option<i32>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub duration_minutes: Option<i32>,
    pub budget_min: Option<i32>,
    pub budget_max: Option<i32>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = proposals)]
#[diesel(belongs_to(Job))]
pub struct Proposal {
    pub id: Uuid,
    pub job_id: Uuid,
    pub editor_id: Uuid,
    pub price: f64,
    pub estimated_days: Option<i32>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proposals)]
pub struct NewProposal {
    pub id: Uuid,
    pub job_id: Uuid,
    pub editor_id: Uuid,
    pub price: f64,
    pub estimated_days: Option<i32>,
    pub message: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = projects)]
#[diesel(belongs_to(Job))]
pub struct Project {
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
    pub completed_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: Uuid,
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub editor_id: Uuid,
    pub status: String,
    pub escrow_amount: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = milestones)]
#[diesel(belongs_to(Project))]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub display_order: i32,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = milestones)]
pub struct NewMilestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub display_order: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_activities)]
#[diesel(belongs_to(Project))]
pub struct ProjectActivity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_activities)]
pub struct NewProjectActivity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub activity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = project_files)]
#[diesel(belongs_to(Project))]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_type: String,
    pub file_name: String,
    pub file_path: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = project_files)]
pub struct NewProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_type: String,
    pub file_name: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: String,
    pub project_id: Option<Uuid>,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    pub status: String,
    pub payment_method: Option<String>,
    pub processed_at: Option<NaiveDateTime>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub transaction_id: String,
    pub project_id: Option<Uuid>,
    pub payer_id: Uuid,
    pub payee_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = wallets)]
#[diesel(belongs_to(User))]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: f64,
    pub currency: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wallets)]
pub struct NewWallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = wallet_transactions)]
#[diesel(belongs_to(Wallet))]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub entry_type: String,
    pub amount: f64,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wallet_transactions)]
pub struct NewWalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub entry_type: String,
    pub amount: f64,
    pub description: Option<String>,
}
