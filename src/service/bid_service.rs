// service/bid_service.rs
use std::sync::Arc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{db::DBClient, settlementdb::SettlementExt},
    models::settlementmodels::*,
    service::{error::ServiceError, escrow_service::EscrowSettlementService},
};

/// Arbitrates competitive bids on a job. Acceptance is a single transaction
/// serialized on the job row lock, so exactly one bid can win per job no
/// matter how many homeowner clicks or contractor submissions race.
#[derive(Debug, Clone)]
pub struct BidArbitrationService {
    db_client: Arc<DBClient>,
    escrow_service: Arc<EscrowSettlementService>,
    platform_fee_bps: i32,
}

impl BidArbitrationService {
    pub fn new(
        db_client: Arc<DBClient>,
        escrow_service: Arc<EscrowSettlementService>,
        platform_fee_bps: i32,
    ) -> Self {
        Self {
            db_client,
            escrow_service,
            platform_fee_bps,
        }
    }

    pub async fn submit_bid(
        &self,
        job_id: Uuid,
        contractor_id: Uuid,
        amount_cents: i64,
    ) -> Result<Bid, ServiceError> {
        if amount_cents <= 0 {
            return Err(ServiceError::InvalidAmount);
        }

        let mut tx = self.db_client.pool.begin().await?;

        let job = self
            .db_client
            .get_job_for_update(&mut tx, job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if !job.status.is_biddable() {
            return Err(ServiceError::JobNotBiddable(job_id, job.status));
        }

        if job.homeowner_id == contractor_id {
            return Err(ServiceError::Validation(
                "Homeowner cannot bid on their own job".to_string(),
            ));
        }

        // First bid moves the job out of Open.
        if job.status == JobStatus::Open {
            self.db_client
                .update_job_status_tx(&mut tx, job_id, JobStatus::Bidding, None)
                .await?;
        }

        let bid = self
            .db_client
            .create_bid_tx(&mut tx, job_id, contractor_id, amount_cents)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Contractor {} bid {} cents on job {}",
            contractor_id,
            amount_cents,
            job_id
        );

        Ok(bid)
    }

    /// Accept one bid, reject all pending siblings, move the job to
    /// BidAccepted and open an escrow hold, all-or-nothing. The job row lock
    /// totally orders concurrent accepts: the loser re-reads the bid under
    /// the lock and observes it already resolved.
    pub async fn accept_bid(
        &self,
        job_id: Uuid,
        bid_id: Uuid,
        caller_id: Uuid,
    ) -> Result<BidAcceptanceResult, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let job = self
            .db_client
            .get_job_for_update(&mut tx, job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if job.homeowner_id != caller_id {
            return Err(ServiceError::NotJobOwner(caller_id, job_id));
        }

        if !job.status.is_biddable() {
            return Err(ServiceError::JobNotBiddable(job_id, job.status));
        }

        // Re-read the target bid under the job lock. This is the race guard:
        // a concurrent accept that already committed left it non-pending.
        let bid = self
            .db_client
            .get_bid_for_update(&mut tx, bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        if bid.job_id != job_id {
            return Err(ServiceError::Validation(
                "Bid does not belong to this job".to_string(),
            ));
        }

        if bid.status != BidStatus::Pending {
            return Err(ServiceError::BidAlreadyResolved(bid_id));
        }

        let accepted_bid = self
            .db_client
            .update_bid_status_tx(&mut tx, bid_id, BidStatus::Accepted)
            .await?;

        let rejected = self
            .db_client
            .reject_pending_sibling_bids_tx(&mut tx, job_id, bid_id)
            .await?;

        let updated_job = self
            .db_client
            .update_job_status_tx(
                &mut tx,
                job_id,
                JobStatus::BidAccepted,
                Some(accepted_bid.amount_cents),
            )
            .await?;

        // Capture is awaited before commit; a processor failure rolls back
        // every write above, leaving no accepted bid and no hold.
        let escrow = self
            .escrow_service
            .capture_in_tx(
                &mut tx,
                HoldSource::Bid,
                bid_id,
                accepted_bid.amount_cents,
                self.platform_fee_bps,
                job.homeowner_id,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Accepted bid {} on job {} ({} sibling bids rejected)",
            bid_id,
            job_id,
            rejected
        );

        Ok(BidAcceptanceResult {
            job: updated_job,
            bid: accepted_bid,
            escrow,
        })
    }

    pub async fn withdraw_bid(
        &self,
        bid_id: Uuid,
        contractor_id: Uuid,
    ) -> Result<Bid, ServiceError> {
        if let Some(bid) = self.db_client.withdraw_bid(bid_id, contractor_id).await? {
            return Ok(bid);
        }

        // The compare-and-set missed; report why.
        let bid = self
            .db_client
            .get_bid_by_id(bid_id)
            .await?
            .ok_or(ServiceError::BidNotFound(bid_id))?;

        if bid.contractor_id != contractor_id {
            return Err(ServiceError::NotBidOwner(contractor_id, bid_id));
        }

        Err(ServiceError::BidNotPending(bid_id))
    }

    pub async fn list_bids(&self, job_id: Uuid) -> Result<Vec<Bid>, ServiceError> {
        self.db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        Ok(self.db_client.get_bids_for_job(job_id).await?)
    }

    // Job lifecycle signals. Posting, scheduling and completion verification
    // live outside this engine; these entry points record their outcomes
    // against the transition graph.

    pub async fn create_job(
        &self,
        homeowner_id: Uuid,
        title: String,
        category: String,
    ) -> Result<Job, ServiceError> {
        Ok(self.db_client.create_job(homeowner_id, title, category).await?)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, ServiceError> {
        self.db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))
    }

    pub async fn start_job(&self, job_id: Uuid, caller_id: Uuid) -> Result<Job, ServiceError> {
        self.transition_job(job_id, caller_id, JobStatus::InProgress).await
    }

    pub async fn complete_job(&self, job_id: Uuid, caller_id: Uuid) -> Result<Job, ServiceError> {
        self.transition_job(job_id, caller_id, JobStatus::Completed).await
    }

    pub async fn cancel_job(&self, job_id: Uuid, caller_id: Uuid) -> Result<Job, ServiceError> {
        self.transition_job(job_id, caller_id, JobStatus::Cancelled).await
    }

    async fn transition_job(
        &self,
        job_id: Uuid,
        caller_id: Uuid,
        to: JobStatus,
    ) -> Result<Job, ServiceError> {
        let mut tx = self.db_client.pool.begin().await?;

        let job = self
            .db_client
            .get_job_for_update(&mut tx, job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if job.homeowner_id != caller_id {
            return Err(ServiceError::NotJobOwner(caller_id, job_id));
        }

        if !job.status.can_transition_to(to) {
            return Err(ServiceError::InvalidJobTransition(job_id, job.status, to));
        }

        let updated = self
            .db_client
            .update_job_status_tx(&mut tx, job_id, to, None)
            .await?;

        tx.commit().await?;

        tracing::info!("Job {} moved to {:?}", job_id, to);
        Ok(updated)
    }
}

#[derive(Debug, Serialize)]
pub struct BidAcceptanceResult {
    pub job: Job,
    pub bid: Bid,
    pub escrow: EscrowHold,
}
