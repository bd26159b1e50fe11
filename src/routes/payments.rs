use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::dsl::{count_star, sum};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::gateway::{GatewayError, PAYMENT_METHODS};
use crate::models::{NewPayment, NewWallet, NewWalletTransaction, Payment, Wallet, WalletTransaction};
use crate::schema::{payments, wallet_transactions, wallets};
use crate::state::AppState;

use super::projects::{load_project_for, to_iso};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_REFUNDED: &str = "refunded";

const PAYMENT_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_COMPLETED,
    STATUS_FAILED,
    STATUS_REFUNDED,
];

pub const ENTRY_CREDIT: &str = "credit";
pub const ENTRY_DEBIT: &str = "debit";

const MAX_DEMO_TOP_UP: f64 = 10_000.0;

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub project_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ProcessPaymentRequest {
    pub payment_method: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct RefundPaymentRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct MyPaymentsQuery {
    pub role: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct AddFundsRequest {
    pub amount: f64,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
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
    pub processed_at: Option<String>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct SettlementResponse {
    pub success: bool,
    pub status: String,
    pub transaction_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub balance: f64,
    pub currency: String,
}

#[derive(Serialize)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub entry_type: String,
    pub amount: f64,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct PaymentStatsResponse {
    pub total_paid: f64,
    pub total_received: f64,
    pub payments_made: i64,
    pub payments_received: i64,
    pub pending_payments: i64,
}

pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentResponse>)> {
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(AppError::bad_request("amount must be greater than 0"));
    }

    let mut conn = state.db()?;
    let project = load_project_for(&mut conn, payload.project_id, &user)?;
    if project.client_id != user.user_id {
        return Err(AppError::forbidden(
            "only the client can create payments for this project",
        ));
    }

    let new_payment = NewPayment {
        id: Uuid::new_v4(),
        transaction_id: new_transaction_id(),
        project_id: Some(project.id),
        payer_id: project.client_id,
        payee_id: project.editor_id,
        amount: payload.amount,
        currency: "USD".to_string(),
        description: payload
            .description
            .or_else(|| Some(format!("Payment for project {}", project.id))),
        status: STATUS_PENDING.to_string(),
    };

    diesel::insert_into(payments::table)
        .values(&new_payment)
        .execute(&mut conn)?;

    let payment: Payment = payments::table.find(new_payment.id).first(&mut conn)?;
    tracing::info!(transaction_id = %payment.transaction_id, project_id = %project.id, "payment created");

    Ok((StatusCode::CREATED, Json(to_payment_response(payment))))
}

pub async fn process_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ProcessPaymentRequest>>,
) -> AppResult<Json<SettlementResponse>> {
    let method = payload
        .and_then(|Json(body)| body.payment_method)
        .unwrap_or_else(|| "demo_card".to_string());
    if !PAYMENT_METHODS.contains(&method.as_str()) {
        return Err(AppError::bad_request(format!(
            "unknown payment method: {method}"
        )));
    }

    let mut conn = state.db()?;
    let payment: Payment = payments::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("payment not found"))?;

    if payment.payer_id != user.user_id {
        return Err(AppError::forbidden("only the payer can process this payment"));
    }
    if payment.status != STATUS_PENDING {
        return Err(AppError::bad_request("payment already processed"));
    }

    match state.gateway.charge(&payment, &method).await {
        Ok(()) => {
            let settled = settle_payment(&mut conn, payment.id, &method)?;

            if let Some(project_id) = settled.project_id {
                activity::record(
                    &mut conn,
                    project_id,
                    user.user_id,
                    ActivityType::PaymentMade,
                    format!("Payment of ${:.2} processed", settled.amount),
                    json!({
                        "payment_id": settled.id,
                        "transaction_id": settled.transaction_id,
                        "amount": settled.amount,
                    }),
                );
            }

            tracing::info!(transaction_id = %settled.transaction_id, "payment processed");
            Ok(Json(SettlementResponse {
                success: true,
                status: settled.status,
                transaction_id: settled.transaction_id,
                message: "Payment processed successfully".to_string(),
            }))
        }
        Err(GatewayError::Declined(reason)) => {
            let now = Utc::now().naive_utc();
            diesel::update(
                payments::table
                    .find(payment.id)
                    .filter(payments::status.eq(STATUS_PENDING)),
            )
            .set((
                payments::status.eq(STATUS_FAILED),
                payments::payment_method.eq(Some(method)),
                payments::processed_at.eq(now),
                payments::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

            tracing::warn!(transaction_id = %payment.transaction_id, %reason, "payment declined");
            Ok(Json(SettlementResponse {
                success: false,
                status: STATUS_FAILED.to_string(),
                transaction_id: payment.transaction_id,
                message: reason,
            }))
        }
        Err(err @ GatewayError::Unavailable(_)) => Err(AppError::internal(err)),
    }
}

pub async fn refund_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RefundPaymentRequest>>,
) -> AppResult<Json<SettlementResponse>> {
    let reason = payload.and_then(|Json(body)| body.reason);

    let mut conn = state.db()?;
    let payment: Payment = payments::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("payment not found"))?;

    if payment.payer_id != user.user_id {
        return Err(AppError::forbidden("only the payer can request a refund"));
    }

    let refunded = conn.transaction::<Payment, AppError, _>(|conn| {
        let locked: Payment = payments::table.find(id).for_update().first(conn)?;
        if locked.status != STATUS_COMPLETED {
            return Err(AppError::bad_request(
                "only completed payments can be refunded",
            ));
        }

        let now = Utc::now().naive_utc();
        diesel::update(payments::table.find(id))
            .set((
                payments::status.eq(STATUS_REFUNDED),
                payments::refund_reason.eq(reason.as_deref()),
                payments::refunded_at.eq(now),
                payments::updated_at.eq(now),
            ))
            .execute(conn)?;

        apply_wallet_entry(conn, locked.payee_id, locked.amount, ENTRY_DEBIT, "Payment refunded")?;
        apply_wallet_entry(conn, locked.payer_id, locked.amount, ENTRY_CREDIT, "Refund received")?;

        let refreshed: Payment = payments::table.find(id).first(conn)?;
        Ok(refreshed)
    })?;

    tracing::info!(transaction_id = %refunded.transaction_id, "payment refunded");
    Ok(Json(SettlementResponse {
        success: true,
        status: refunded.status,
        transaction_id: refunded.transaction_id,
        message: "Payment refunded successfully".to_string(),
    }))
}

pub async fn my_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<MyPaymentsQuery>,
) -> AppResult<Json<Vec<PaymentResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = state.db()?;
    let mut sql = payments::table.into_boxed();
    match query.role.as_deref() {
        None | Some("all") => {
            sql = sql.filter(
                payments::payer_id
                    .eq(user.user_id)
                    .or(payments::payee_id.eq(user.user_id)),
            );
        }
        Some("payer") => sql = sql.filter(payments::payer_id.eq(user.user_id)),
        Some("payee") => sql = sql.filter(payments::payee_id.eq(user.user_id)),
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "role must be all, payer or payee, got {other}"
            )));
        }
    }

    if let Some(status) = query.status.as_deref() {
        if !PAYMENT_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!(
                "unknown payment status: {status}"
            )));
        }
        sql = sql.filter(payments::status.eq(status.to_string()));
    }

    let rows: Vec<Payment> = sql
        .order(payments::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_payment_response).collect()))
}

pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentResponse>> {
    let mut conn = state.db()?;
    let payment: Payment = payments::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("payment not found"))?;

    if payment.payer_id != user.user_id && payment.payee_id != user.user_id {
        return Err(AppError::forbidden("not authorized to view this payment"));
    }

    Ok(Json(to_payment_response(payment)))
}

pub async fn project_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<PaymentResponse>>> {
    let mut conn = state.db()?;
    load_project_for(&mut conn, project_id, &user)?;

    let rows: Vec<Payment> = payments::table
        .filter(payments::project_id.eq(project_id))
        .order(payments::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_payment_response).collect()))
}

pub async fn wallet_balance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<WalletResponse>> {
    let mut conn = state.db()?;
    let wallet = get_or_create_wallet(&mut conn, user.user_id)?;

    Ok(Json(WalletResponse {
        balance: wallet.balance,
        currency: wallet.currency,
    }))
}

pub async fn wallet_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<WalletTransactionResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = state.db()?;
    let rows: Vec<WalletTransaction> = wallet_transactions::table
        .inner_join(wallets::table)
        .filter(wallets::user_id.eq(user.user_id))
        .select(wallet_transactions::all_columns)
        .order(wallet_transactions::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|tx| WalletTransactionResponse {
                id: tx.id,
                entry_type: tx.entry_type,
                amount: tx.amount,
                description: tx.description,
                created_at: to_iso(tx.created_at),
            })
            .collect(),
    ))
}

pub async fn add_funds(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<AddFundsRequest>,
) -> AppResult<Json<WalletResponse>> {
    if !payload.amount.is_finite() || payload.amount <= 0.0 {
        return Err(AppError::bad_request("amount must be greater than 0"));
    }
    if payload.amount > MAX_DEMO_TOP_UP {
        return Err(AppError::bad_request(
            "maximum amount is 10000 per top-up",
        ));
    }

    let mut conn = state.db()?;
    let balance = conn.transaction::<f64, AppError, _>(|conn| {
        apply_wallet_entry(
            conn,
            user.user_id,
            payload.amount,
            ENTRY_CREDIT,
            "Demo funds added",
        )
    })?;

    Ok(Json(WalletResponse {
        balance,
        currency: "USD".to_string(),
    }))
}

pub async fn payment_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PaymentStatsResponse>> {
    let mut conn = state.db()?;

    let total_paid: Option<f64> = payments::table
        .filter(payments::payer_id.eq(user.user_id))
        .filter(payments::status.eq(STATUS_COMPLETED))
        .select(sum(payments::amount))
        .first(&mut conn)?;

    let total_received: Option<f64> = payments::table
        .filter(payments::payee_id.eq(user.user_id))
        .filter(payments::status.eq(STATUS_COMPLETED))
        .select(sum(payments::amount))
        .first(&mut conn)?;

    let payments_made: i64 = payments::table
        .filter(payments::payer_id.eq(user.user_id))
        .filter(payments::status.eq(STATUS_COMPLETED))
        .select(count_star())
        .first(&mut conn)?;

    let payments_received: i64 = payments::table
        .filter(payments::payee_id.eq(user.user_id))
        .filter(payments::status.eq(STATUS_COMPLETED))
        .select(count_star())
        .first(&mut conn)?;

    let pending_payments: i64 = payments::table
        .filter(
            payments::payer_id
                .eq(user.user_id)
                .or(payments::payee_id.eq(user.user_id)),
        )
        .filter(payments::status.eq(STATUS_PENDING))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(PaymentStatsResponse {
        total_paid: total_paid.unwrap_or(0.0),
        total_received: total_received.unwrap_or(0.0),
        payments_made,
        payments_received,
        pending_payments,
    }))
}

/// Marks the payment completed and applies the paired wallet mutations in a
/// single transaction. The status re-check under `FOR UPDATE` keeps a racing
/// second `process` call from settling twice.
fn settle_payment(conn: &mut PgConnection, payment_id: Uuid, method: &str) -> AppResult<Payment> {
    conn.transaction::<Payment, AppError, _>(|conn| {
        let locked: Payment = payments::table
            .find(payment_id)
            .for_update()
            .first(conn)?;
        if locked.status != STATUS_PENDING {
            return Err(AppError::bad_request("payment already processed"));
        }

        let now = Utc::now().naive_utc();
        diesel::update(payments::table.find(payment_id))
            .set((
                payments::status.eq(STATUS_COMPLETED),
                payments::payment_method.eq(Some(method.to_string())),
                payments::processed_at.eq(now),
                payments::updated_at.eq(now),
            ))
            .execute(conn)?;

        apply_wallet_entry(conn, locked.payee_id, locked.amount, ENTRY_CREDIT, "Payment received")?;
        apply_wallet_entry(conn, locked.payer_id, locked.amount, ENTRY_DEBIT, "Payment sent")?;

        let refreshed: Payment = payments::table.find(payment_id).first(conn)?;
        Ok(refreshed)
    })
}

/// Adjusts the cached balance and writes the matching ledger row. Must be
/// called inside a transaction; the wallet row is taken `FOR UPDATE` so the
/// two legs of a settlement cannot interleave with another mutation.
fn apply_wallet_entry(
    conn: &mut PgConnection,
    user_id: Uuid,
    amount: f64,
    entry_type: &str,
    description: &str,
) -> AppResult<f64> {
    let wallet = lock_or_create_wallet(conn, user_id)?;

    let new_balance = match entry_type {
        ENTRY_CREDIT => wallet.balance + amount,
        _ => wallet.balance - amount,
    };

    let now = Utc::now().naive_utc();
    diesel::update(wallets::table.find(wallet.id))
        .set((
            wallets::balance.eq(new_balance),
            wallets::updated_at.eq(now),
        ))
        .execute(conn)?;

    let entry = NewWalletTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        entry_type: entry_type.to_string(),
        amount,
        description: Some(description.to_string()),
    };
    diesel::insert_into(wallet_transactions::table)
        .values(&entry)
        .execute(conn)?;

    Ok(new_balance)
}

fn lock_or_create_wallet(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Wallet> {
    let existing: Option<Wallet> = wallets::table
        .filter(wallets::user_id.eq(user_id))
        .for_update()
        .first(conn)
        .optional()?;

    if let Some(wallet) = existing {
        return Ok(wallet);
    }

    let new_wallet = NewWallet {
        id: Uuid::new_v4(),
        user_id,
        balance: 0.0,
        currency: "USD".to_string(),
    };
    diesel::insert_into(wallets::table)
        .values(&new_wallet)
        .execute(conn)?;

    let wallet: Wallet = wallets::table
        .filter(wallets::user_id.eq(user_id))
        .for_update()
        .first(conn)?;
    Ok(wallet)
}

fn get_or_create_wallet(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Wallet> {
    let existing: Option<Wallet> = wallets::table
        .filter(wallets::user_id.eq(user_id))
        .first(conn)
        .optional()?;

    if let Some(wallet) = existing {
        return Ok(wallet);
    }

    let new_wallet = NewWallet {
        id: Uuid::new_v4(),
        user_id,
        balance: 0.0,
        currency: "USD".to_string(),
    };
    diesel::insert_into(wallets::table)
        .values(&new_wallet)
        .execute(conn)?;

    let wallet: Wallet = wallets::table
        .filter(wallets::user_id.eq(user_id))
        .first(conn)?;
    Ok(wallet)
}

fn new_transaction_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("PAY-{}", raw[..8].to_uppercase())
}

fn to_payment_response(payment: Payment) -> PaymentResponse {
    PaymentResponse {
        id: payment.id,
        transaction_id: payment.transaction_id,
        project_id: payment.project_id,
        payer_id: payment.payer_id,
        payee_id: payment.payee_id,
        amount: payment.amount,
        currency: payment.currency,
        description: payment.description,
        status: payment.status,
        payment_method: payment.payment_method,
        refund_reason: payment.refund_reason,
        processed_at: payment.processed_at.map(to_iso),
        refunded_at: payment.refunded_at.map(to_iso),
        created_at: to_iso(payment.created_at),
    }
}
