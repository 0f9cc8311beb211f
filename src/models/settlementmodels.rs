use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Bidding,
    BidAccepted,
    InProgress,
    Completed,
    Cancelled,
    Disputed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Disputed)
    }

    pub fn is_biddable(&self) -> bool {
        matches!(self, JobStatus::Open | JobStatus::Bidding)
    }

    /// Forward-only transition graph. Cancelled and Disputed are reachable
    /// from any non-terminal state.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (JobStatus::Open, JobStatus::Bidding) => true,
            (JobStatus::Open, JobStatus::BidAccepted) => true,
            (JobStatus::Bidding, JobStatus::BidAccepted) => true,
            (JobStatus::BidAccepted, JobStatus::InProgress) => true,
            (JobStatus::InProgress, JobStatus::Completed) => true,
            (_, JobStatus::Cancelled) => true,
            (_, JobStatus::Disputed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "offer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Rejected,
    CounterBid,
    AgreementReached,
    Cancelled,
    Expired,
}

/// Contractor-side actions on a pending offer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OfferAction {
    Accept,
    Reject,
    Counter,
}

impl OfferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Rejected
                | OfferStatus::AgreementReached
                | OfferStatus::Cancelled
                | OfferStatus::Expired
        )
    }

    /// Valid contractor edges out of the current state.
    pub fn allows_action(&self, action: OfferAction) -> bool {
        match (self, action) {
            (OfferStatus::Pending, OfferAction::Accept) => true,
            (OfferStatus::Pending, OfferAction::Reject) => true,
            (OfferStatus::Pending, OfferAction::Counter) => true,
            _ => false,
        }
    }

    /// States from which the homeowner may cancel.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::CounterBid)
    }

    /// States subject to lazy expiry against `expires_at`.
    pub fn is_expirable(&self) -> bool {
        matches!(self, OfferStatus::Pending | OfferStatus::CounterBid)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "hold_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Captured,
    Released,
    Refunded,
    Disputed,
}

impl HoldStatus {
    /// A hold moves from Captured to exactly one closing state, never back.
    pub fn can_transition_to(&self, to: HoldStatus) -> bool {
        matches!(
            (self, to),
            (HoldStatus::Captured, HoldStatus::Released)
                | (HoldStatus::Captured, HoldStatus::Refunded)
                | (HoldStatus::Captured, HoldStatus::Disputed)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "hold_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HoldSource {
    Bid,
    Offer,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub homeowner_id: Uuid,
    pub title: String,
    pub category: String,
    pub status: JobStatus,
    pub final_price_cents: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: Uuid,
    pub job_id: Uuid,
    pub contractor_id: Uuid,
    pub amount_cents: i64,
    pub status: BidStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DirectOffer {
    pub id: Uuid,
    pub homeowner_id: Uuid,
    pub contractor_id: Uuid,
    pub offered_amount_cents: i64,
    pub counter_amount_cents: Option<i64>,
    pub status: OfferStatus,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DirectOffer {
    /// Expiry is derived from the persisted deadline, never from a separately
    /// mutated flag, so a stale status can never let a late accept through.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_expirable() && now > self.expires_at
    }

    /// The amount an agreement settles at: the counter if one was made,
    /// otherwise the original offer.
    pub fn agreed_amount_cents(&self) -> i64 {
        self.counter_amount_cents.unwrap_or(self.offered_amount_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EscrowHold {
    pub id: Uuid,
    pub source_type: HoldSource,
    pub source_id: Uuid,
    pub captured_amount_cents: i64,
    pub fee_rate_bps: i32,
    pub status: HoldStatus,
    pub processor_reference: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn job_transitions_follow_the_graph() {
        assert!(JobStatus::Open.can_transition_to(JobStatus::Bidding));
        assert!(JobStatus::Bidding.can_transition_to(JobStatus::BidAccepted));
        assert!(JobStatus::BidAccepted.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Completed));

        // No going backwards or skipping to completion.
        assert!(!JobStatus::Bidding.can_transition_to(JobStatus::Open));
        assert!(!JobStatus::Open.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::BidAccepted.can_transition_to(JobStatus::Bidding));
    }

    #[test]
    fn cancel_and_dispute_reachable_from_any_non_terminal_state() {
        for status in [
            JobStatus::Open,
            JobStatus::Bidding,
            JobStatus::BidAccepted,
            JobStatus::InProgress,
        ] {
            assert!(status.can_transition_to(JobStatus::Cancelled));
            assert!(status.can_transition_to(JobStatus::Disputed));
        }
        for status in [JobStatus::Completed, JobStatus::Cancelled, JobStatus::Disputed] {
            assert!(!status.can_transition_to(JobStatus::Cancelled));
            assert!(!status.can_transition_to(JobStatus::Disputed));
        }
    }

    #[test]
    fn offer_actions_only_valid_from_pending() {
        assert!(OfferStatus::Pending.allows_action(OfferAction::Accept));
        assert!(OfferStatus::Pending.allows_action(OfferAction::Counter));
        assert!(!OfferStatus::CounterBid.allows_action(OfferAction::Accept));
        assert!(!OfferStatus::Rejected.allows_action(OfferAction::Accept));
        assert!(!OfferStatus::AgreementReached.allows_action(OfferAction::Counter));
    }

    #[test]
    fn offer_cancel_and_expiry_states() {
        assert!(OfferStatus::Pending.is_cancellable());
        assert!(OfferStatus::CounterBid.is_cancellable());
        assert!(!OfferStatus::Expired.is_cancellable());
        assert!(OfferStatus::CounterBid.is_expirable());
        assert!(!OfferStatus::AgreementReached.is_expirable());
    }

    #[test]
    fn hold_closes_exactly_once() {
        assert!(HoldStatus::Captured.can_transition_to(HoldStatus::Released));
        assert!(HoldStatus::Captured.can_transition_to(HoldStatus::Refunded));
        assert!(HoldStatus::Captured.can_transition_to(HoldStatus::Disputed));
        assert!(!HoldStatus::Released.can_transition_to(HoldStatus::Refunded));
        assert!(!HoldStatus::Refunded.can_transition_to(HoldStatus::Released));
        assert!(!HoldStatus::Disputed.can_transition_to(HoldStatus::Released));
    }

    #[test]
    fn expiry_is_derived_from_the_deadline_not_the_status() {
        let now = Utc::now();
        let offer = DirectOffer {
            id: Uuid::new_v4(),
            homeowner_id: Uuid::new_v4(),
            contractor_id: Uuid::new_v4(),
            offered_amount_cents: 30_000,
            counter_amount_cents: None,
            status: OfferStatus::Pending,
            expires_at: now - Duration::seconds(1),
            completed_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        assert!(offer.is_expired(now));

        let live = DirectOffer {
            expires_at: now + Duration::hours(1),
            ..offer.clone()
        };
        assert!(!live.is_expired(now));
    }

    #[test]
    fn agreed_amount_prefers_the_counter() {
        let now = Utc::now();
        let offer = DirectOffer {
            id: Uuid::new_v4(),
            homeowner_id: Uuid::new_v4(),
            contractor_id: Uuid::new_v4(),
            offered_amount_cents: 30_000,
            counter_amount_cents: Some(35_000),
            status: OfferStatus::CounterBid,
            expires_at: now + Duration::hours(1),
            completed_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        assert_eq!(offer.agreed_amount_cents(), 35_000);
        assert_eq!(
            DirectOffer { counter_amount_cents: None, ..offer }.agreed_amount_cents(),
            30_000
        );
    }
}
