// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    // Payment processor configuration
    pub processor_base_url: String,
    pub processor_secret_key: String,
    pub processor_webhook_secret: String,
    // Platform fee charged on escrow release, in basis points (1000 = 10%).
    // Frozen onto each hold at capture time; changing it never touches open holds.
    pub platform_fee_bps: i32,
    // Default direct-offer lifetime in hours
    pub offer_ttl_hours: i64,
    // Interval for the lazy-expiry sweep, in seconds
    pub offer_sweep_interval_secs: u64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");

        // Payment processor configuration (with defaults for local runs)
        let processor_base_url = std::env::var("PROCESSOR_BASE_URL")
            .unwrap_or_else(|_| "https://api.processor.example.com".to_string());
        let processor_secret_key = std::env::var("PROCESSOR_SECRET_KEY")
            .unwrap_or_else(|_| "test_secret_key".to_string());
        let processor_webhook_secret = std::env::var("PROCESSOR_WEBHOOK_SECRET")
            .unwrap_or_else(|_| "test_webhook_secret".to_string());

        let platform_fee_bps = std::env::var("PLATFORM_FEE_BPS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<i32>()
            .expect("PLATFORM_FEE_BPS must be an integer");

        let offer_ttl_hours = std::env::var("OFFER_TTL_HOURS")
            .unwrap_or_else(|_| "72".to_string())
            .parse::<i64>()
            .expect("OFFER_TTL_HOURS must be an integer");

        let offer_sweep_interval_secs = std::env::var("OFFER_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .expect("OFFER_SWEEP_INTERVAL_SECS must be an integer");

        Config {
            database_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port: 8000,
            processor_base_url,
            processor_secret_key,
            processor_webhook_secret,
            platform_fee_bps,
            offer_ttl_hours,
            offer_sweep_interval_secs,
        }
    }
}
