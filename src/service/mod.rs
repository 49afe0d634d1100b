pub mod error;
pub mod webhook_verifier;
pub mod ranking;
pub mod payout_provider;
pub mod settlement;
pub mod notifier;
pub mod payment_pipeline;
pub mod background_jobs;
