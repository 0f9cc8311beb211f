use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::settlementmodels::*;

// Job DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateJobDto {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 50, message = "Category must be between 1 and 50 characters"))]
    pub category: String,
}

// Bid DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitBidDto {
    #[validate(range(min = 0.01, message = "Bid amount must be positive"))]
    pub amount: f64,
}

// Offer DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SendOfferDto {
    pub contractor_id: Uuid,

    #[validate(range(min = 0.01, message = "Offer amount must be positive"))]
    pub amount: f64,

    #[validate(range(min = 1, max = 720, message = "Offer lifetime must be between 1 and 720 hours"))]
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RespondToOfferDto {
    pub action: OfferAction,

    #[validate(range(min = 0.01, message = "Counter amount must be positive"))]
    pub counter_amount: Option<f64>,
}

// Escrow DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefundHoldDto {
    #[validate(length(min = 1, max = 500, message = "Reason must be between 1 and 500 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct HoldResponseDto {
    pub id: Uuid,
    pub source_type: HoldSource,
    pub source_id: Uuid,
    pub captured_amount_cents: i64,
    pub platform_fee_cents: i64,
    pub contractor_payout_cents: i64,
    pub status: HoldStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl HoldResponseDto {
    pub fn from_hold(hold: &EscrowHold) -> Self {
        let (fee, payout) = crate::utils::money::split_payment(
            hold.captured_amount_cents,
            hold.fee_rate_bps,
        );
        Self {
            id: hold.id,
            source_type: hold.source_type,
            source_id: hold.source_id,
            captured_amount_cents: hold.captured_amount_cents,
            platform_fee_cents: fee,
            contractor_payout_cents: payout,
            status: hold.status,
            created_at: hold.created_at,
            released_at: hold.released_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn hold_response_carries_the_split_and_nullable_timestamps() {
        let now = Utc::now();
        let hold = EscrowHold {
            id: uuid::Uuid::new_v4(),
            source_type: HoldSource::Bid,
            source_id: uuid::Uuid::new_v4(),
            captured_amount_cents: 45_000,
            fee_rate_bps: 1_000,
            status: HoldStatus::Captured,
            processor_reference: Some("hold_ref".to_string()),
            created_at: Some(now),
            released_at: None,
        };

        let dto = HoldResponseDto::from_hold(&hold);
        assert_eq!(dto.platform_fee_cents, 4_500);
        assert_eq!(dto.contractor_payout_cents, 40_500);
        assert_eq!(
            dto.platform_fee_cents + dto.contractor_payout_cents,
            dto.captured_amount_cents
        );
        assert_eq!(dto.created_at, Some(now));
        assert_eq!(dto.released_at, None);
    }
}
