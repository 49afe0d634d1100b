mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use config::Config;
use db::db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use service::{
    background_jobs::{audit_ranks, start_commission_retry_job},
    notifier::notifier_from_config,
    payment_pipeline::PaymentPipeline,
    payout_provider::CoinbaseWalletPayout,
    webhook_verifier::WebhookVerifier,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub webhook_verifier: WebhookVerifier,
    pub pipeline: Arc<PaymentPipeline>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = match Config::init() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);
    if let Err(err) = db_client.migrate().await {
        tracing::error!("Failed to run migrations: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = audit_ranks(&db_client).await {
        tracing::warn!("Rank audit could not run: {}", err);
    }

    let payout = match CoinbaseWalletPayout::new(&config) {
        Ok(payout) => payout,
        Err(err) => {
            tracing::error!("Failed to build payout client: {}", err);
            std::process::exit(1);
        }
    };
    if config.coinbase_wallet_api_key.is_empty() {
        tracing::warn!("COINBASE_WALLET_API_KEY not set - referral commissions will stay unpaid");
    }

    let notifier = match notifier_from_config(&config) {
        Ok(notifier) => notifier,
        Err(err) => {
            tracing::error!("Failed to build notifier: {}", err);
            std::process::exit(1);
        }
    };

    let pipeline = PaymentPipeline::new(Arc::new(db_client), Arc::new(payout), notifier, &config);

    let app_state = Arc::new(AppState {
        env: config.clone(),
        webhook_verifier: WebhookVerifier::new(config.webhook_secret.clone()),
        pipeline: Arc::new(pipeline),
    });

    tokio::spawn(start_commission_retry_job(app_state.clone()));

    let app = create_router(app_state);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
        std::process::exit(1);
    }
}
