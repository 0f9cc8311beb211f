mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use crate::db::db::DBClient;
use service::{
    bid_service::BidArbitrationService,
    escrow_service::EscrowSettlementService,
    offer_service::OfferNegotiationService,
    payment_processor::PaymentProcessorService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    // Services
    pub bid_service: Arc<BidArbitrationService>,
    pub offer_service: Arc<OfferNegotiationService>,
    pub escrow_service: Arc<EscrowSettlementService>,
    pub processor: Arc<PaymentProcessorService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client_arc = Arc::new(db_client);

        let processor = Arc::new(PaymentProcessorService::new(&config));

        let escrow_service = Arc::new(EscrowSettlementService::new(
            db_client_arc.clone(),
            processor.clone(),
        ));

        let bid_service = Arc::new(BidArbitrationService::new(
            db_client_arc.clone(),
            escrow_service.clone(),
            config.platform_fee_bps,
        ));

        let offer_service = Arc::new(OfferNegotiationService::new(
            db_client_arc.clone(),
            escrow_service.clone(),
            config.platform_fee_bps,
            config.offer_ttl_hours,
        ));

        Self {
            env: config,
            db_client: db_client_arc,
            bid_service,
            offer_service,
            escrow_service,
            processor,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");

            // Monitor pool health in the background
            let pool_for_monitoring = pool.clone();
            tokio::spawn(async move {
                let max_connections = 20;
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    let size = pool_for_monitoring.size();
                    let idle = pool_for_monitoring.num_idle();
                    tracing::debug!(
                        "Pool status - active: {}, idle: {}, total: {}",
                        size - idle as u32,
                        idle,
                        size
                    );

                    if size >= max_connections * 8 / 10 {
                        tracing::warn!("Connection pool at 80% capacity");
                    }
                }
            });

            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    let allowed_origins = vec![
        "http://localhost:5173".parse::<HeaderValue>().unwrap(),
        "http://localhost:8000".parse::<HeaderValue>().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    let app = create_router(app_state.clone()).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    // Start background jobs
    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_offer_expiry_job(app_state_clone).await;
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .unwrap();

    axum::serve(listener, app).await.unwrap();
}
