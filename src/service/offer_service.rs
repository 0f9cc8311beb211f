// service/offer_service.rs
use std::sync::Arc;
use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{db::DBClient, settlementdb::SettlementExt},
    models::settlementmodels::*,
    service::{error::ServiceError, escrow_service::EscrowSettlementService},
};

/// Drives the homeowner-to-contractor negotiation loop:
///
/// ```text
/// pending --accept--------------> agreement_reached
/// pending --reject--------------> rejected
/// pending --counter(amount)-----> counter_bid
/// pending --cancel (homeowner)--> cancelled
/// pending --timeout-------------> expired
/// counter_bid --homeowner accepts counter--> agreement_reached
/// counter_bid --homeowner cancels----------> cancelled
/// counter_bid --timeout--------------------> expired
/// ```
///
/// Expiry is evaluated lazily against the persisted expires_at on every
/// mutating call, so a stale status can never let a late accept through.
#[derive(Debug, Clone)]
pub struct OfferNegotiationService {
    db_client: Arc<DBClient>,
    escrow_service: Arc<EscrowSettlementService>,
    platform_fee_bps: i32,
    default_ttl_hours: i64,
}

impl OfferNegotiationService {
    pub fn new(
        db_client: Arc<DBClient>,
        escrow_service: Arc<EscrowSettlementService>,
        platform_fee_bps: i32,
        default_ttl_hours: i64,
    ) -> Self {
        Self {
            db_client,
            escrow_service,
            platform_fee_bps,
            default_ttl_hours,
        }
    }

    pub async fn send_offer(
        &self,
        homeowner_id: Uuid,
        contractor_id: Uuid,
        amount_cents: i64,
        ttl_hours: Option<i64>,
    ) -> Result<DirectOffer, ServiceError> {
        if amount_cents <= 0 {
            return Err(ServiceError::InvalidAmount);
        }
        if homeowner_id == contractor_id {
            return Err(ServiceError::Validation(
                "Cannot send an offer to yourself".to_string(),
            ));
        }

        let ttl = ttl_hours.unwrap_or(self.default_ttl_hours);
        if ttl <= 0 {
            return Err(ServiceError::Validation(
                "Offer lifetime must be positive".to_string(),
            ));
        }

        let expires_at = Utc::now() + Duration::hours(ttl);
        let offer = self
            .db_client
            .create_offer(homeowner_id, contractor_id, amount_cents, expires_at)
            .await?;

        tracing::info!(
            "Homeowner {} offered {} cents to contractor {} (offer {})",
            homeowner_id,
            amount_cents,
            contractor_id,
            offer.id
        );

        Ok(offer)
    }

    pub async fn get_offer(&self, offer_id: Uuid) -> Result<DirectOffer, ServiceError> {
        self.db_client
            .get_offer_by_id(offer_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(offer_id))
    }

    /// Contractor response: accept, reject, or counter with a new amount.
    /// Accepting a pending offer reaches agreement and captures escrow at
    /// the offered amount inside the same transaction.
    pub async fn respond(
        &self,
        offer_id: Uuid,
        contractor_id: Uuid,
        action: OfferAction,
        counter_amount_cents: Option<i64>,
    ) -> Result<OfferResponseResult, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let offer = self
            .db_client
            .get_offer_for_update(&mut tx, offer_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(offer_id))?;

        if offer.contractor_id != contractor_id {
            return Err(ServiceError::NotOfferParty(contractor_id, offer_id));
        }

        if offer.is_expired(Utc::now()) {
            // Lazily persist the flip, then refuse the action.
            self.db_client
                .update_offer_status_tx(&mut tx, offer_id, OfferStatus::Expired, None)
                .await?;
            tx.commit().await?;
            return Err(ServiceError::OfferExpired(offer_id));
        }

        if !offer.status.allows_action(action) {
            return Err(ServiceError::OfferNotPending(offer_id, offer.status));
        }

        match action {
            OfferAction::Accept => {
                let updated = self
                    .db_client
                    .update_offer_status_tx(&mut tx, offer_id, OfferStatus::AgreementReached, None)
                    .await?;

                let escrow = self
                    .escrow_service
                    .capture_in_tx(
                        &mut tx,
                        HoldSource::Offer,
                        offer_id,
                        updated.offered_amount_cents,
                        self.platform_fee_bps,
                        updated.homeowner_id,
                    )
                    .await?;

                tx.commit().await?;
                tracing::info!("Offer {} accepted at the offered amount", offer_id);

                Ok(OfferResponseResult {
                    offer: updated,
                    escrow: Some(escrow),
                })
            }
            OfferAction::Reject => {
                let updated = self
                    .db_client
                    .update_offer_status_tx(&mut tx, offer_id, OfferStatus::Rejected, None)
                    .await?;
                tx.commit().await?;
                tracing::info!("Offer {} rejected by contractor", offer_id);

                Ok(OfferResponseResult {
                    offer: updated,
                    escrow: None,
                })
            }
            OfferAction::Counter => {
                let counter = counter_amount_cents.filter(|amount| *amount > 0);
                let Some(counter) = counter else {
                    return Err(ServiceError::InvalidCounterAmount);
                };

                let updated = self
                    .db_client
                    .update_offer_status_tx(&mut tx, offer_id, OfferStatus::CounterBid, Some(counter))
                    .await?;
                tx.commit().await?;
                tracing::info!("Offer {} countered at {} cents", offer_id, counter);

                Ok(OfferResponseResult {
                    offer: updated,
                    escrow: None,
                })
            }
        }
    }

    /// Homeowner accepts the contractor's counter. Same re-check-under-lock
    /// pattern as bid acceptance: the offer may have been cancelled or
    /// expired since the homeowner last looked.
    pub async fn accept_counter(
        &self,
        offer_id: Uuid,
        homeowner_id: Uuid,
    ) -> Result<OfferResponseResult, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let offer = self
            .db_client
            .get_offer_for_update(&mut tx, offer_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(offer_id))?;

        if offer.homeowner_id != homeowner_id {
            return Err(ServiceError::NotOfferParty(homeowner_id, offer_id));
        }

        if offer.is_expired(Utc::now()) {
            self.db_client
                .update_offer_status_tx(&mut tx, offer_id, OfferStatus::Expired, None)
                .await?;
            tx.commit().await?;
            return Err(ServiceError::OfferExpired(offer_id));
        }

        if offer.status != OfferStatus::CounterBid {
            return Err(ServiceError::OfferNotPending(offer_id, offer.status));
        }

        let updated = self
            .db_client
            .update_offer_status_tx(&mut tx, offer_id, OfferStatus::AgreementReached, None)
            .await?;

        let escrow = self
            .escrow_service
            .capture_in_tx(
                &mut tx,
                HoldSource::Offer,
                offer_id,
                updated.agreed_amount_cents(),
                self.platform_fee_bps,
                updated.homeowner_id,
            )
            .await?;

        tx.commit().await?;
        tracing::info!(
            "Offer {} agreement reached at countered amount {} cents",
            offer_id,
            updated.agreed_amount_cents()
        );

        Ok(OfferResponseResult {
            offer: updated,
            escrow: Some(escrow),
        })
    }

    /// Homeowner cancellation. Idempotent: cancelling an offer that already
    /// reached a terminal state (including one that just expired under a
    /// racing sweep) is a no-op success, because UI calls race with expiry.
    pub async fn cancel(
        &self,
        offer_id: Uuid,
        homeowner_id: Uuid,
    ) -> Result<DirectOffer, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let offer = self
            .db_client
            .get_offer_for_update(&mut tx, offer_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(offer_id))?;

        if offer.homeowner_id != homeowner_id {
            return Err(ServiceError::NotOfferParty(homeowner_id, offer_id));
        }

        if offer.status.is_terminal() {
            tx.commit().await?;
            return Ok(offer);
        }

        if offer.is_expired(Utc::now()) {
            let expired = self
                .db_client
                .update_offer_status_tx(&mut tx, offer_id, OfferStatus::Expired, None)
                .await?;
            tx.commit().await?;
            return Ok(expired);
        }

        if !offer.status.is_cancellable() {
            return Err(ServiceError::OfferNotPending(offer_id, offer.status));
        }

        let cancelled = self
            .db_client
            .update_offer_status_tx(&mut tx, offer_id, OfferStatus::Cancelled, None)
            .await?;
        tx.commit().await?;

        tracing::info!("Offer {} cancelled by homeowner", offer_id);
        Ok(cancelled)
    }

    /// Record the external completion signal for an agreed offer, which is
    /// what allows its escrow hold to be released.
    pub async fn mark_completed(
        &self,
        offer_id: Uuid,
        homeowner_id: Uuid,
    ) -> Result<DirectOffer, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let offer = self
            .db_client
            .get_offer_for_update(&mut tx, offer_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(offer_id))?;

        if offer.homeowner_id != homeowner_id {
            return Err(ServiceError::NotOfferParty(homeowner_id, offer_id));
        }

        if offer.status != OfferStatus::AgreementReached {
            return Err(ServiceError::OfferNotPending(offer_id, offer.status));
        }

        let completed = self.db_client.mark_offer_completed_tx(&mut tx, offer_id).await?;
        tx.commit().await?;

        tracing::info!("Offer {} marked complete", offer_id);
        Ok(completed)
    }
}

#[derive(Debug, Serialize)]
pub struct OfferResponseResult {
    pub offer: DirectOffer,
    pub escrow: Option<EscrowHold>,
}
