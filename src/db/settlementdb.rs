// db/settlementdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::settlementmodels::*;

type PgTx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// All settlement SQL lives behind this trait. Mutations that arbitrate a
/// race (bid acceptance, counter acceptance, hold closure) lock the owning
/// row with FOR UPDATE inside the caller's transaction and re-read state
/// under that lock before writing.
#[async_trait]
pub trait SettlementExt {
    // Job management
    async fn create_job(
        &self,
        homeowner_id: Uuid,
        title: String,
        category: String,
    ) -> Result<Job, Error>;

    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error>;

    async fn get_job_for_update(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
    ) -> Result<Option<Job>, Error>;

    async fn update_job_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        status: JobStatus,
        final_price_cents: Option<i64>,
    ) -> Result<Job, Error>;

    // Bid management
    async fn create_bid_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        contractor_id: Uuid,
        amount_cents: i64,
    ) -> Result<Bid, Error>;

    async fn get_bid_by_id(&self, bid_id: Uuid) -> Result<Option<Bid>, Error>;

    async fn get_bids_for_job(&self, job_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn get_bid_for_update(
        &self,
        tx: &mut PgTx<'_>,
        bid_id: Uuid,
    ) -> Result<Option<Bid>, Error>;

    async fn update_bid_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        bid_id: Uuid,
        status: BidStatus,
    ) -> Result<Bid, Error>;

    /// Deterministically reject every still-pending sibling of the winning
    /// bid. Returns the number of rows rejected.
    async fn reject_pending_sibling_bids_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        winning_bid_id: Uuid,
    ) -> Result<u64, Error>;

    /// Compare-and-set withdraw: only succeeds while the bid is still
    /// pending and owned by the contractor.
    async fn withdraw_bid(
        &self,
        bid_id: Uuid,
        contractor_id: Uuid,
    ) -> Result<Option<Bid>, Error>;

    // Direct offer management
    async fn create_offer(
        &self,
        homeowner_id: Uuid,
        contractor_id: Uuid,
        offered_amount_cents: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<DirectOffer, Error>;

    async fn get_offer_by_id(&self, offer_id: Uuid) -> Result<Option<DirectOffer>, Error>;

    async fn get_offer_for_update(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
    ) -> Result<Option<DirectOffer>, Error>;

    async fn update_offer_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
        status: OfferStatus,
        counter_amount_cents: Option<i64>,
    ) -> Result<DirectOffer, Error>;

    async fn mark_offer_completed_tx(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
    ) -> Result<DirectOffer, Error>;

    /// Eagerly flip long-expired pending/counter_bid offers. Correctness does
    /// not depend on this; expiry is re-derived from expires_at at every
    /// mutating entry point.
    async fn expire_stale_offers(&self) -> Result<u64, Error>;

    // Escrow holds
    async fn insert_hold_tx(
        &self,
        tx: &mut PgTx<'_>,
        source_type: HoldSource,
        source_id: Uuid,
        captured_amount_cents: i64,
        fee_rate_bps: i32,
    ) -> Result<EscrowHold, Error>;

    async fn set_hold_processor_reference_tx(
        &self,
        tx: &mut PgTx<'_>,
        hold_id: Uuid,
        processor_reference: String,
    ) -> Result<EscrowHold, Error>;

    async fn get_hold_by_id(&self, hold_id: Uuid) -> Result<Option<EscrowHold>, Error>;

    async fn get_hold_by_processor_reference(
        &self,
        processor_reference: &str,
    ) -> Result<Option<EscrowHold>, Error>;

    /// Compare-and-set closure: captured -> released/refunded/disputed.
    /// Returns None when the hold was no longer captured, which callers map
    /// to AlreadyResolved (or a no-op for idempotent retries).
    async fn close_hold_if_captured(
        &self,
        hold_id: Uuid,
        to_status: HoldStatus,
    ) -> Result<Option<EscrowHold>, Error>;

    // Processor webhook inbox
    /// Insert-or-ignore on the event id. Returns true when the event was new,
    /// false when it was a redelivery.
    async fn record_processor_event(
        &self,
        event_id: &str,
        processor_reference: &str,
        kind: &str,
    ) -> Result<bool, Error>;

    /// Drop an inbox row so a redelivery is processed again. Used when the
    /// settlement side effect for a freshly recorded event fails.
    async fn remove_processor_event(&self, event_id: &str) -> Result<(), Error>;
}

#[async_trait]
impl SettlementExt for DBClient {
    async fn create_job(
        &self,
        homeowner_id: Uuid,
        title: String,
        category: String,
    ) -> Result<Job, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (homeowner_id, title, category)
            VALUES ($1, $2, $3)
            RETURNING id, homeowner_id, title, category, status,
            final_price_cents, created_at, updated_at
            "#,
        )
        .bind(homeowner_id)
        .bind(title)
        .bind(category)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_job_by_id(&self, job_id: Uuid) -> Result<Option<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, homeowner_id, title, category, status,
            final_price_cents, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_job_for_update(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
    ) -> Result<Option<Job>, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, homeowner_id, title, category, status,
            final_price_cents, created_at, updated_at
            FROM jobs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn update_job_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        status: JobStatus,
        final_price_cents: Option<i64>,
    ) -> Result<Job, Error> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2,
                final_price_cents = COALESCE($3, final_price_cents),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, homeowner_id, title, category, status,
            final_price_cents, created_at, updated_at
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(final_price_cents)
        .fetch_one(&mut **tx)
        .await
    }

    async fn create_bid_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        contractor_id: Uuid,
        amount_cents: i64,
    ) -> Result<Bid, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            INSERT INTO bids (job_id, contractor_id, amount_cents)
            VALUES ($1, $2, $3)
            RETURNING id, job_id, contractor_id, amount_cents, status, created_at
            "#,
        )
        .bind(job_id)
        .bind(contractor_id)
        .bind(amount_cents)
        .fetch_one(&mut **tx)
        .await
    }

    async fn get_bid_by_id(&self, bid_id: Uuid) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, contractor_id, amount_cents, status, created_at
            FROM bids
            WHERE id = $1
            "#,
        )
        .bind(bid_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_bids_for_job(&self, job_id: Uuid) -> Result<Vec<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, contractor_id, amount_cents, status, created_at
            FROM bids
            WHERE job_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_bid_for_update(
        &self,
        tx: &mut PgTx<'_>,
        bid_id: Uuid,
    ) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            SELECT id, job_id, contractor_id, amount_cents, status, created_at
            FROM bids
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(bid_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn update_bid_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        bid_id: Uuid,
        status: BidStatus,
    ) -> Result<Bid, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids
            SET status = $2
            WHERE id = $1
            RETURNING id, job_id, contractor_id, amount_cents, status, created_at
            "#,
        )
        .bind(bid_id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
    }

    async fn reject_pending_sibling_bids_tx(
        &self,
        tx: &mut PgTx<'_>,
        job_id: Uuid,
        winning_bid_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET status = 'rejected'::bid_status
            WHERE job_id = $1 AND id <> $2 AND status = 'pending'::bid_status
            "#,
        )
        .bind(job_id)
        .bind(winning_bid_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn withdraw_bid(
        &self,
        bid_id: Uuid,
        contractor_id: Uuid,
    ) -> Result<Option<Bid>, Error> {
        sqlx::query_as::<_, Bid>(
            r#"
            UPDATE bids
            SET status = 'withdrawn'::bid_status
            WHERE id = $1 AND contractor_id = $2 AND status = 'pending'::bid_status
            RETURNING id, job_id, contractor_id, amount_cents, status, created_at
            "#,
        )
        .bind(bid_id)
        .bind(contractor_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_offer(
        &self,
        homeowner_id: Uuid,
        contractor_id: Uuid,
        offered_amount_cents: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<DirectOffer, Error> {
        sqlx::query_as::<_, DirectOffer>(
            r#"
            INSERT INTO direct_offers (homeowner_id, contractor_id, offered_amount_cents, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, homeowner_id, contractor_id, offered_amount_cents,
            counter_amount_cents, status, expires_at, completed_at, created_at, updated_at
            "#,
        )
        .bind(homeowner_id)
        .bind(contractor_id)
        .bind(offered_amount_cents)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_offer_by_id(&self, offer_id: Uuid) -> Result<Option<DirectOffer>, Error> {
        sqlx::query_as::<_, DirectOffer>(
            r#"
            SELECT id, homeowner_id, contractor_id, offered_amount_cents,
            counter_amount_cents, status, expires_at, completed_at, created_at, updated_at
            FROM direct_offers
            WHERE id = $1
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_offer_for_update(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
    ) -> Result<Option<DirectOffer>, Error> {
        sqlx::query_as::<_, DirectOffer>(
            r#"
            SELECT id, homeowner_id, contractor_id, offered_amount_cents,
            counter_amount_cents, status, expires_at, completed_at, created_at, updated_at
            FROM direct_offers
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&mut **tx)
        .await
    }

    async fn update_offer_status_tx(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
        status: OfferStatus,
        counter_amount_cents: Option<i64>,
    ) -> Result<DirectOffer, Error> {
        sqlx::query_as::<_, DirectOffer>(
            r#"
            UPDATE direct_offers
            SET status = $2,
                counter_amount_cents = COALESCE($3, counter_amount_cents),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, homeowner_id, contractor_id, offered_amount_cents,
            counter_amount_cents, status, expires_at, completed_at, created_at, updated_at
            "#,
        )
        .bind(offer_id)
        .bind(status)
        .bind(counter_amount_cents)
        .fetch_one(&mut **tx)
        .await
    }

    async fn mark_offer_completed_tx(
        &self,
        tx: &mut PgTx<'_>,
        offer_id: Uuid,
    ) -> Result<DirectOffer, Error> {
        sqlx::query_as::<_, DirectOffer>(
            r#"
            UPDATE direct_offers
            SET completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, homeowner_id, contractor_id, offered_amount_cents,
            counter_amount_cents, status, expires_at, completed_at, created_at, updated_at
            "#,
        )
        .bind(offer_id)
        .fetch_one(&mut **tx)
        .await
    }

    async fn expire_stale_offers(&self) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE direct_offers
            SET status = 'expired'::offer_status, updated_at = NOW()
            WHERE status IN ('pending'::offer_status, 'counter_bid'::offer_status)
            AND expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_hold_tx(
        &self,
        tx: &mut PgTx<'_>,
        source_type: HoldSource,
        source_id: Uuid,
        captured_amount_cents: i64,
        fee_rate_bps: i32,
    ) -> Result<EscrowHold, Error> {
        sqlx::query_as::<_, EscrowHold>(
            r#"
            INSERT INTO escrow_holds (source_type, source_id, captured_amount_cents, fee_rate_bps)
            VALUES ($1, $2, $3, $4)
            RETURNING id, source_type, source_id, captured_amount_cents,
            fee_rate_bps, status, processor_reference, created_at, released_at
            "#,
        )
        .bind(source_type)
        .bind(source_id)
        .bind(captured_amount_cents)
        .bind(fee_rate_bps)
        .fetch_one(&mut **tx)
        .await
    }

    async fn set_hold_processor_reference_tx(
        &self,
        tx: &mut PgTx<'_>,
        hold_id: Uuid,
        processor_reference: String,
    ) -> Result<EscrowHold, Error> {
        sqlx::query_as::<_, EscrowHold>(
            r#"
            UPDATE escrow_holds
            SET processor_reference = $2
            WHERE id = $1
            RETURNING id, source_type, source_id, captured_amount_cents,
            fee_rate_bps, status, processor_reference, created_at, released_at
            "#,
        )
        .bind(hold_id)
        .bind(processor_reference)
        .fetch_one(&mut **tx)
        .await
    }

    async fn get_hold_by_id(&self, hold_id: Uuid) -> Result<Option<EscrowHold>, Error> {
        sqlx::query_as::<_, EscrowHold>(
            r#"
            SELECT id, source_type, source_id, captured_amount_cents,
            fee_rate_bps, status, processor_reference, created_at, released_at
            FROM escrow_holds
            WHERE id = $1
            "#,
        )
        .bind(hold_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_hold_by_processor_reference(
        &self,
        processor_reference: &str,
    ) -> Result<Option<EscrowHold>, Error> {
        sqlx::query_as::<_, EscrowHold>(
            r#"
            SELECT id, source_type, source_id, captured_amount_cents,
            fee_rate_bps, status, processor_reference, created_at, released_at
            FROM escrow_holds
            WHERE processor_reference = $1
            "#,
        )
        .bind(processor_reference)
        .fetch_optional(&self.pool)
        .await
    }

    async fn close_hold_if_captured(
        &self,
        hold_id: Uuid,
        to_status: HoldStatus,
    ) -> Result<Option<EscrowHold>, Error> {
        sqlx::query_as::<_, EscrowHold>(
            r#"
            UPDATE escrow_holds
            SET status = $2,
                released_at = CASE WHEN $2 = 'released'::hold_status THEN NOW() ELSE released_at END
            WHERE id = $1 AND status = 'captured'::hold_status
            RETURNING id, source_type, source_id, captured_amount_cents,
            fee_rate_bps, status, processor_reference, created_at, released_at
            "#,
        )
        .bind(hold_id)
        .bind(to_status)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_processor_event(
        &self,
        event_id: &str,
        processor_reference: &str,
        kind: &str,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO processor_events (event_id, processor_reference, kind)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(processor_reference)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_processor_event(&self, event_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            DELETE FROM processor_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
