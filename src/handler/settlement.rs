use std::sync::Arc;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::settlementdb::SettlementExt,
    dtos::settlementdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    service::error::ServiceError,
    utils::money::dollars_to_cents,
    AppState,
};

pub fn settlement_handler() -> Router {
    Router::new()
        // Job routes
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/start", put(start_job))
        .route("/jobs/:job_id/complete", put(complete_job))
        .route("/jobs/:job_id/cancel", put(cancel_job))
        // Bid routes
        .route("/jobs/:job_id/bids", post(submit_bid))
        .route("/jobs/:job_id/bids", get(list_bids))
        .route("/jobs/:job_id/bids/:bid_id/accept", put(accept_bid))
        .route("/bids/:bid_id/withdraw", put(withdraw_bid))
        // Offer routes
        .route("/offers", post(send_offer))
        .route("/offers/:offer_id", get(get_offer))
        .route("/offers/:offer_id/respond", put(respond_to_offer))
        .route("/offers/:offer_id/counter/accept", put(accept_counter))
        .route("/offers/:offer_id/cancel", put(cancel_offer))
        .route("/offers/:offer_id/complete", put(mark_offer_completed))
        // Escrow routes
        .route("/holds/:hold_id", get(get_hold))
        .route("/holds/:hold_id/release", post(release_hold))
        .route("/holds/:hold_id/refund", post(refund_hold))
        .route("/holds/:hold_id/dispute", post(dispute_hold))
}

// Job handlers

pub async fn create_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateJobDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let job = app_state
        .bid_service
        .create_job(auth.user_id, body.title, body.category)
        .await?;

    Ok(Json(ApiResponse::success("Job created successfully", job)))
}

pub async fn get_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state.bid_service.get_job(job_id).await?;

    Ok(Json(ApiResponse::success("Job retrieved successfully", job)))
}

pub async fn start_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state.bid_service.start_job(job_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Job started", job)))
}

pub async fn complete_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state
        .bid_service
        .complete_job(job_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Job marked complete", job)))
}

pub async fn cancel_job(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let job = app_state.bid_service.cancel_job(job_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success("Job cancelled", job)))
}

// Bid handlers

pub async fn submit_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<SubmitBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .submit_bid(job_id, auth.user_id, dollars_to_cents(body.amount))
        .await?;

    Ok(Json(ApiResponse::success("Bid submitted successfully", bid)))
}

pub async fn list_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state.bid_service.list_bids(job_id).await?;

    Ok(Json(ApiResponse::success("Bids retrieved successfully", bids)))
}

pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((job_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state
        .bid_service
        .accept_bid(job_id, bid_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Bid accepted and escrow captured",
        result,
    )))
}

pub async fn withdraw_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .bid_service
        .withdraw_bid(bid_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Bid withdrawn", bid)))
}

// Offer handlers

pub async fn send_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<SendOfferDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let offer = app_state
        .offer_service
        .send_offer(
            auth.user_id,
            body.contractor_id,
            dollars_to_cents(body.amount),
            body.ttl_hours,
        )
        .await?;

    Ok(Json(ApiResponse::success("Offer sent successfully", offer)))
}

pub async fn get_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offer = app_state.offer_service.get_offer(offer_id).await?;

    Ok(Json(ApiResponse::success("Offer retrieved successfully", offer)))
}

pub async fn respond_to_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(offer_id): Path<Uuid>,
    Json(body): Json<RespondToOfferDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .offer_service
        .respond(
            offer_id,
            auth.user_id,
            body.action,
            body.counter_amount.map(dollars_to_cents),
        )
        .await?;

    Ok(Json(ApiResponse::success("Offer response recorded", result)))
}

pub async fn accept_counter(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state
        .offer_service
        .accept_counter(offer_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Counter accepted and escrow captured",
        result,
    )))
}

pub async fn cancel_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offer = app_state
        .offer_service
        .cancel(offer_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Offer cancelled", offer)))
}

pub async fn mark_offer_completed(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(offer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offer = app_state
        .offer_service
        .mark_completed(offer_id, auth.user_id)
        .await?;

    Ok(Json(ApiResponse::success("Offer marked complete", offer)))
}

// Escrow handlers

pub async fn get_hold(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(hold_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let hold = app_state
        .db_client
        .get_hold_by_id(hold_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found(format!("Escrow hold {} not found", hold_id)))?;

    Ok(Json(ApiResponse::success(
        "Escrow hold retrieved successfully",
        HoldResponseDto::from_hold(&hold),
    )))
}

pub async fn release_hold(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(hold_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let hold = app_state.escrow_service.release(hold_id).await?;

    Ok(Json(ApiResponse::success(
        "Escrow released",
        HoldResponseDto::from_hold(&hold),
    )))
}

pub async fn refund_hold(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(hold_id): Path<Uuid>,
    Json(body): Json<RefundHoldDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let hold = app_state
        .escrow_service
        .refund(hold_id, &body.reason)
        .await?;

    Ok(Json(ApiResponse::success(
        "Escrow refunded",
        HoldResponseDto::from_hold(&hold),
    )))
}

pub async fn dispute_hold(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(hold_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let hold = app_state.escrow_service.mark_disputed(hold_id).await?;

    Ok(Json(ApiResponse::success(
        "Escrow frozen pending dispute resolution",
        HoldResponseDto::from_hold(&hold),
    )))
}

// Processor webhook handler. Public route: authentication is the HMAC
// signature, and dedup happens against the processor_events inbox before
// any settlement side effect runs.
pub async fn processor_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get("x-processor-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            HttpError::new(
                "Missing or invalid processor signature".to_string(),
                StatusCode::BAD_REQUEST,
            )
        })?;

    if !app_state.processor.verify_signature(&body, signature) {
        tracing::warn!("Invalid processor webhook signature received");
        return Err(ServiceError::SignatureInvalid.into());
    }

    let event = app_state.processor.normalize_event(&body)?;

    let first_delivery = app_state
        .db_client
        .record_processor_event(&event.event_id, &event.processor_reference, event.kind.as_str())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !first_delivery {
        tracing::info!("Duplicate processor event {} ignored", event.event_id);
        return Ok(Json(serde_json::json!({
            "status": "success",
            "message": "duplicate event ignored"
        })));
    }

    // A failed side effect must stay retryable: drop the inbox row so the
    // processor's redelivery is processed instead of hitting the dedup.
    if let Err(e) = app_state.escrow_service.apply_event(&event).await {
        tracing::warn!(
            "Processing event {} failed ({}); clearing inbox row for redelivery",
            event.event_id,
            e
        );
        app_state
            .db_client
            .remove_processor_event(&event.event_id)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
        return Err(e.into());
    }

    Ok(Json(serde_json::json!({"status": "success"})))
}
