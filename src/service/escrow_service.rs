// service/escrow_service.rs
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{db::DBClient, settlementdb::SettlementExt},
    models::settlementmodels::*,
    service::{
        error::ServiceError,
        payment_processor::{EventKind, NormalizedEvent, PaymentProcessorService},
    },
    utils::money::split_payment,
};

type PgTx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Captures funds when a bid or offer is finalized, holds them, and closes
/// each hold exactly once: released as a platform-fee/contractor-payout
/// split, refunded, or frozen as disputed.
#[derive(Debug, Clone)]
pub struct EscrowSettlementService {
    db_client: Arc<DBClient>,
    processor: Arc<PaymentProcessorService>,
}

impl EscrowSettlementService {
    pub fn new(db_client: Arc<DBClient>, processor: Arc<PaymentProcessorService>) -> Self {
        Self { db_client, processor }
    }

    /// Open a hold inside the caller's transaction. The processor call is
    /// awaited before the caller commits; if it fails the caller rolls the
    /// whole transaction back and no hold row survives.
    pub async fn capture_in_tx(
        &self,
        tx: &mut PgTx<'_>,
        source_type: HoldSource,
        source_id: Uuid,
        amount_cents: i64,
        fee_rate_bps: i32,
        payer_ref: Uuid,
    ) -> Result<EscrowHold, ServiceError> {
        if amount_cents <= 0 {
            return Err(ServiceError::InvalidAmount);
        }

        let hold = self
            .db_client
            .insert_hold_tx(tx, source_type, source_id, amount_cents, fee_rate_bps)
            .await?;

        let reference = self
            .processor
            .hold_funds(hold.id, amount_cents, payer_ref)
            .await?;

        let hold = self
            .db_client
            .set_hold_processor_reference_tx(tx, hold.id, reference)
            .await?;

        tracing::info!(
            "Captured escrow hold {} for {:?} {} ({} cents at {} bps)",
            hold.id,
            source_type,
            source_id,
            amount_cents,
            fee_rate_bps
        );

        Ok(hold)
    }

    /// Release a captured hold as platform fee + contractor payout. The fee
    /// is computed from the rate frozen at capture, and the two parts sum to
    /// the captured amount exactly. Repeated calls for an already-released
    /// hold are a no-op success; any other resolved state is a conflict.
    pub async fn release(&self, hold_id: Uuid) -> Result<EscrowHold, ServiceError> {
        let hold = self
            .db_client
            .get_hold_by_id(hold_id)
            .await?
            .ok_or(ServiceError::HoldNotFound(hold_id))?;

        match hold.status {
            HoldStatus::Released => return Ok(hold),
            HoldStatus::Captured => {}
            _ => return Err(ServiceError::AlreadyResolved(hold_id)),
        }

        let payee_ref = self.require_completion_signal(&hold).await?;

        let (fee_cents, payout_cents) = split_payment(hold.captured_amount_cents, hold.fee_rate_bps);

        let reference = hold
            .processor_reference
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("Hold has no processor reference".to_string()))?;

        // The adapter call happens outside any row lock; the idempotency key
        // makes a retried call settle to the first outcome.
        self.processor
            .release_split(hold.id, reference, fee_cents, payout_cents, payee_ref)
            .await?;

        match self
            .db_client
            .close_hold_if_captured(hold_id, HoldStatus::Released)
            .await?
        {
            Some(released) => {
                tracing::info!(
                    "Released hold {}: fee {} cents, payout {} cents",
                    hold_id,
                    fee_cents,
                    payout_cents
                );
                Ok(released)
            }
            // Lost the close race: a concurrent release already won (fine,
            // same idempotency key) or the hold went to refund/dispute.
            None => {
                let current = self
                    .db_client
                    .get_hold_by_id(hold_id)
                    .await?
                    .ok_or(ServiceError::HoldNotFound(hold_id))?;
                if current.status == HoldStatus::Released {
                    Ok(current)
                } else {
                    Err(ServiceError::AlreadyResolved(hold_id))
                }
            }
        }
    }

    /// Return the full captured amount to the homeowner. Mutually exclusive
    /// with release; repeated refunds are a no-op success.
    pub async fn refund(&self, hold_id: Uuid, reason: &str) -> Result<EscrowHold, ServiceError> {
        let hold = self
            .db_client
            .get_hold_by_id(hold_id)
            .await?
            .ok_or(ServiceError::HoldNotFound(hold_id))?;

        match hold.status {
            HoldStatus::Refunded => return Ok(hold),
            HoldStatus::Captured => {}
            _ => return Err(ServiceError::AlreadyResolved(hold_id)),
        }

        let reference = hold
            .processor_reference
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("Hold has no processor reference".to_string()))?;

        self.processor.reverse(hold.id, reference).await?;

        match self
            .db_client
            .close_hold_if_captured(hold_id, HoldStatus::Refunded)
            .await?
        {
            Some(refunded) => {
                tracing::info!("Refunded hold {}: {}", hold_id, reason);
                Ok(refunded)
            }
            None => {
                let current = self
                    .db_client
                    .get_hold_by_id(hold_id)
                    .await?
                    .ok_or(ServiceError::HoldNotFound(hold_id))?;
                if current.status == HoldStatus::Refunded {
                    Ok(current)
                } else {
                    Err(ServiceError::AlreadyResolved(hold_id))
                }
            }
        }
    }

    /// Freeze a captured hold. Disputed is terminal for this engine;
    /// resolution is handed to an external arbitration process.
    pub async fn mark_disputed(&self, hold_id: Uuid) -> Result<EscrowHold, ServiceError> {
        let disputed = self
            .db_client
            .close_hold_if_captured(hold_id, HoldStatus::Disputed)
            .await?
            .ok_or(ServiceError::AlreadyResolved(hold_id))?;

        // Flag the source job as disputed too, when there is one and it has
        // not already reached a terminal state.
        if disputed.source_type == HoldSource::Bid {
            if let Some(bid) = self.db_client.get_bid_by_id(disputed.source_id).await? {
                let mut tx = self.db_client.pool.begin().await?;
                if let Some(job) = self.db_client.get_job_for_update(&mut tx, bid.job_id).await? {
                    if job.status.can_transition_to(JobStatus::Disputed) {
                        self.db_client
                            .update_job_status_tx(&mut tx, job.id, JobStatus::Disputed, None)
                            .await?;
                    }
                }
                tx.commit().await?;
            }
        }

        tracing::warn!("Hold {} frozen as disputed", hold_id);
        Ok(disputed)
    }

    /// Feed a normalized, deduplicated processor event back into settlement.
    /// Release/refund are idempotent, so a confirmation for work this engine
    /// already finished settles to a no-op.
    pub async fn apply_event(&self, event: &NormalizedEvent) -> Result<(), ServiceError> {
        let hold = self
            .db_client
            .get_hold_by_processor_reference(&event.processor_reference)
            .await?;

        let Some(hold) = hold else {
            tracing::warn!(
                "Processor event {} references unknown hold {}",
                event.event_id,
                event.processor_reference
            );
            return Ok(());
        };

        match event.kind {
            EventKind::ReleaseSucceeded => {
                self.release(hold.id).await?;
            }
            EventKind::RefundSucceeded => {
                self.refund(hold.id, "confirmed by processor").await?;
            }
            EventKind::HoldFailed => {
                tracing::error!(
                    "Processor reported a failed hold for {} (event {})",
                    hold.id,
                    event.event_id
                );
            }
            EventKind::Unknown => {
                tracing::info!("Ignoring unhandled processor event {}", event.event_id);
            }
        }

        Ok(())
    }

    /// The hold's source must have received its completion signal before any
    /// payout. Returns the contractor to pay.
    async fn require_completion_signal(&self, hold: &EscrowHold) -> Result<Uuid, ServiceError> {
        match hold.source_type {
            HoldSource::Bid => {
                let bid = self
                    .db_client
                    .get_bid_by_id(hold.source_id)
                    .await?
                    .ok_or(ServiceError::BidNotFound(hold.source_id))?;
                let job = self
                    .db_client
                    .get_job_by_id(bid.job_id)
                    .await?
                    .ok_or(ServiceError::JobNotFound(bid.job_id))?;
                if job.status != JobStatus::Completed {
                    return Err(ServiceError::JobNotComplete(hold.id));
                }
                Ok(bid.contractor_id)
            }
            HoldSource::Offer => {
                let offer = self
                    .db_client
                    .get_offer_by_id(hold.source_id)
                    .await?
                    .ok_or(ServiceError::OfferNotFound(hold.source_id))?;
                if offer.status != OfferStatus::AgreementReached || offer.completed_at.is_none() {
                    return Err(ServiceError::JobNotComplete(hold.id));
                }
                Ok(offer.contractor_id)
            }
        }
    }
}
