pub mod background_jobs;
pub mod bid_service;
pub mod error;
pub mod escrow_service;
pub mod offer_service;
pub mod payment_processor;
