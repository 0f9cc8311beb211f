use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{error::HttpError, models::settlementmodels::*};

#[derive(Error, Debug)]
pub enum ServiceError {
    // Conflict errors: expected under concurrency, safe to surface as
    // "someone else already acted", never retried automatically.
    #[error("Job {0} is not accepting bids (status {1:?})")]
    JobNotBiddable(Uuid, JobStatus),

    #[error("Bid {0} has already been resolved")]
    BidAlreadyResolved(Uuid),

    #[error("Bid {0} is not pending")]
    BidNotPending(Uuid),

    #[error("Offer {0} is not in a state that allows this action (status {1:?})")]
    OfferNotPending(Uuid, OfferStatus),

    #[error("Offer {0} has expired")]
    OfferExpired(Uuid),

    #[error("Escrow hold {0} has already been resolved")]
    AlreadyResolved(Uuid),

    #[error("Job for hold {0} has not been marked complete")]
    JobNotComplete(Uuid),

    #[error("Job {0} cannot transition from {1:?} to {2:?}")]
    InvalidJobTransition(Uuid, JobStatus, JobStatus),

    // Validation errors: caller mistake, not retried.
    #[error("Counter amount must be positive")]
    InvalidCounterAmount,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("User {0} is not the owner of job {1}")]
    NotJobOwner(Uuid, Uuid),

    #[error("User {0} is not a party to offer {1}")]
    NotOfferParty(Uuid, Uuid),

    #[error("User {0} did not place bid {1}")]
    NotBidOwner(Uuid, Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    // Not found
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Bid {0} not found")]
    BidNotFound(Uuid),

    #[error("Offer {0} not found")]
    OfferNotFound(Uuid),

    #[error("Escrow hold {0} not found")]
    HoldNotFound(Uuid),

    // Dependency errors: transient, retried by the caller with the same
    // idempotency key.
    #[error("Payment capture failed: {0}")]
    CaptureFailed(String),

    #[error("Payment processor unavailable: {0}")]
    ProcessorUnavailable(String),

    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::JobNotBiddable(_, _)
            | ServiceError::BidAlreadyResolved(_)
            | ServiceError::BidNotPending(_)
            | ServiceError::OfferNotPending(_, _)
            | ServiceError::OfferExpired(_)
            | ServiceError::AlreadyResolved(_)
            | ServiceError::JobNotComplete(_)
            | ServiceError::InvalidJobTransition(_, _, _) => StatusCode::CONFLICT,

            ServiceError::InvalidCounterAmount
            | ServiceError::InvalidAmount
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::NotJobOwner(_, _)
            | ServiceError::NotOfferParty(_, _)
            | ServiceError::NotBidOwner(_, _) => StatusCode::FORBIDDEN,

            ServiceError::JobNotFound(_)
            | ServiceError::BidNotFound(_)
            | ServiceError::OfferNotFound(_)
            | ServiceError::HoldNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::CaptureFailed(_) | ServiceError::ProcessorUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }

            ServiceError::SignatureInvalid => StatusCode::UNAUTHORIZED,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        HttpError::new(error.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_losers_get_conflict() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServiceError::BidAlreadyResolved(id).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::OfferExpired(id).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::AlreadyResolved(id).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn processor_failures_get_bad_gateway() {
        assert_eq!(
            ServiceError::CaptureFailed("declined".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::ProcessorUnavailable("timeout".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn bad_webhook_signature_gets_unauthorized() {
        assert_eq!(
            ServiceError::SignatureInvalid.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn ownership_failures_get_forbidden() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ServiceError::NotJobOwner(a, b).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotOfferParty(a, b).status_code(), StatusCode::FORBIDDEN);
    }
}
