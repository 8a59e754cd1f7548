use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub booking_platform: String,
    /// Overrides the selected platform's production base URL.
    pub platform_base_url: Option<String>,
    pub vagaro_client_id: String,
    pub vagaro_client_secret: String,
    pub mindbody_api_key: String,
    pub mindbody_site_id: String,
    pub mindbody_username: Option<String>,
    pub mindbody_password: Option<String>,
    pub phorest_client_id: String,
    pub phorest_client_secret: String,
    pub phorest_branch_id: Option<String>,
    /// Empty = only require the signature header to be present.
    pub webhook_secret: Option<String>,
    /// Public origin the platforms deliver webhooks to. Defaults to
    /// `http://localhost:{port}`.
    pub public_base_url: Option<String>,
    pub salon_name: String,
    pub templates_path: Option<String>,
    pub max_suggestions: usize,
    pub suggestion_days_ahead: i64,
    pub request_timeout_secs: u64,
    pub delivery_interval_secs: u64,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "salon.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            booking_platform: env::var("BOOKING_PLATFORM").unwrap_or_else(|_| "vagaro".to_string()),
            platform_base_url: optional("PLATFORM_BASE_URL"),
            vagaro_client_id: env::var("VAGARO_CLIENT_ID").unwrap_or_default(),
            vagaro_client_secret: env::var("VAGARO_CLIENT_SECRET").unwrap_or_default(),
            mindbody_api_key: env::var("MINDBODY_API_KEY").unwrap_or_default(),
            mindbody_site_id: env::var("MINDBODY_SITE_ID").unwrap_or_default(),
            mindbody_username: optional("MINDBODY_USERNAME"),
            mindbody_password: optional("MINDBODY_PASSWORD"),
            phorest_client_id: env::var("PHOREST_CLIENT_ID").unwrap_or_default(),
            phorest_client_secret: env::var("PHOREST_CLIENT_SECRET").unwrap_or_default(),
            phorest_branch_id: optional("PHOREST_BRANCH_ID"),
            webhook_secret: optional("WEBHOOK_SECRET"),
            public_base_url: optional("PUBLIC_BASE_URL"),
            salon_name: env::var("SALON_NAME").unwrap_or_else(|_| "Our Salon".to_string()),
            templates_path: optional("TEMPLATES_PATH"),
            max_suggestions: parsed("MAX_SUGGESTIONS", 3),
            suggestion_days_ahead: parsed("SUGGESTION_DAYS_AHEAD", 14),
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", 10),
            delivery_interval_secs: parsed("DELIVERY_INTERVAL_SECS", 60),
        }
    }
}
