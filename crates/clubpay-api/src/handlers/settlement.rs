//! Settlement handlers
//!
//! HTTP handlers for the settlement lifecycle: creation, payment tracking,
//! amount overrides, completion, deletion and the shareable message.

use crate::dto::settlement::{
    CreateSettlementRequest, CreatedSettlement, SettlementResponse, SnapshotResponse,
    UpdateAmountRequest,
};
use crate::dto::{ApiResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use clubpay_core::models::{MeetingId, MemberId, SettlementId};
use clubpay_core::AppError;
use clubpay_services::SettlementLedger;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Create a settlement
///
/// POST /api/v1/settlements
#[instrument(skip(ledger, req))]
pub async fn create_settlement(
    ledger: web::Data<SettlementLedger>,
    req: web::Json<CreateSettlementRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Settlement creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let request = req.into_inner().into_request();
    debug!(
        meeting_id = request.meeting_id,
        members = request.member_ids.len(),
        "Creating settlement"
    );

    let id = ledger.create_settlement(request).await?;

    info!(settlement_id = id, "Settlement created");
    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        CreatedSettlement { id },
        "Settlement created successfully",
    )))
}

/// Run an allocation without storing it
///
/// POST /api/v1/settlements/preview
#[instrument(skip(ledger, req))]
pub async fn preview_settlement(
    ledger: web::Data<SettlementLedger>,
    req: web::Json<CreateSettlementRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Preview validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let allocation = ledger.preview(&req.into_inner().into_request())?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(allocation)))
}

/// List settlements, newest first
///
/// GET /api/v1/settlements
#[instrument(skip(ledger))]
pub async fn list_settlements(
    ledger: web::Data<SettlementLedger>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (settlements, total) = ledger.list(&query.to_pagination()).await?;
    let data: Vec<SettlementResponse> = settlements.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(query.paginate(data, total)))
}

/// Get a settlement with its member rows
///
/// GET /api/v1/settlements/{id}
#[instrument(skip(ledger))]
pub async fn get_settlement(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<SettlementId>,
) -> Result<HttpResponse, AppError> {
    let snapshot = ledger.snapshot(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SnapshotResponse::from(snapshot)))
}

/// Latest settlement for a meeting
///
/// GET /api/v1/meetings/{id}/settlement
#[instrument(skip(ledger))]
pub async fn get_meeting_settlement(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<MeetingId>,
) -> Result<HttpResponse, AppError> {
    let meeting_id = path.into_inner();
    let snapshot = ledger
        .latest_for_meeting(meeting_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No settlement for meeting {}", meeting_id))
        })?;

    Ok(HttpResponse::Ok().json(SnapshotResponse::from(snapshot)))
}

/// POST /api/v1/settlements/{id}/members/{member_id}/paid
#[instrument(skip(ledger))]
pub async fn mark_paid(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<(SettlementId, MemberId)>,
) -> Result<HttpResponse, AppError> {
    let (settlement_id, member_id) = path.into_inner();
    ledger.mark_member_paid(settlement_id, member_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/v1/settlements/{id}/members/{member_id}/paid
#[instrument(skip(ledger))]
pub async fn mark_unpaid(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<(SettlementId, MemberId)>,
) -> Result<HttpResponse, AppError> {
    let (settlement_id, member_id) = path.into_inner();
    ledger.mark_member_unpaid(settlement_id, member_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Override one member's amount
///
/// PUT /api/v1/settlements/{id}/members/{member_id}/amount
#[instrument(skip(ledger, req))]
pub async fn update_amount(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<(SettlementId, MemberId)>,
    req: web::Json<UpdateAmountRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Amount validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let (settlement_id, member_id) = path.into_inner();
    ledger
        .update_member_amount(settlement_id, member_id, req.amount)
        .await?;

    let snapshot = ledger.snapshot(settlement_id).await?;
    Ok(HttpResponse::Ok().json(SnapshotResponse::from(snapshot)))
}

/// POST /api/v1/settlements/{id}/complete
#[instrument(skip(ledger))]
pub async fn complete_settlement(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<SettlementId>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    ledger.complete_settlement(id).await?;

    let snapshot = ledger.snapshot(id).await?;
    Ok(HttpResponse::Ok().json(SnapshotResponse::from(snapshot)))
}

/// DELETE /api/v1/settlements/{id}
#[instrument(skip(ledger))]
pub async fn delete_settlement(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<SettlementId>,
) -> Result<HttpResponse, AppError> {
    ledger.delete_settlement(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Billing message as plain text
///
/// GET /api/v1/settlements/{id}/message
#[instrument(skip(ledger))]
pub async fn get_billing_message(
    ledger: web::Data<SettlementLedger>,
    path: web::Path<SettlementId>,
) -> Result<HttpResponse, AppError> {
    let message = ledger.billing_message(path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(message))
}

/// Configure settlement routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/settlements")
            .route("", web::get().to(list_settlements))
            .route("", web::post().to(create_settlement))
            .route("/preview", web::post().to(preview_settlement))
            .route("/{id}", web::get().to(get_settlement))
            .route("/{id}", web::delete().to(delete_settlement))
            .route("/{id}/complete", web::post().to(complete_settlement))
            .route("/{id}/message", web::get().to(get_billing_message))
            .route("/{id}/members/{member_id}/paid", web::post().to(mark_paid))
            .route("/{id}/members/{member_id}/paid", web::delete().to(mark_unpaid))
            .route(
                "/{id}/members/{member_id}/amount",
                web::put().to(update_amount),
            ),
    )
    .route(
        "/meetings/{id}/settlement",
        web::get().to(get_meeting_settlement),
    );
}
