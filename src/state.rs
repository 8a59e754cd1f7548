use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::models::SalonProfile;
use crate::services::events::{BookingEventDispatcher, EventContext};
use crate::services::messaging::templates::TemplateCatalog;
use crate::services::messaging::MessageSender;
use crate::services::monitoring::IntegrationMonitor;
use crate::services::platforms::BookingPlatform;
use crate::services::rebooking::RebookingService;
use crate::services::webhooks::WebhookRegistry;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub platform: Arc<dyn BookingPlatform>,
    pub sender: Arc<dyn MessageSender>,
    pub catalog: Arc<TemplateCatalog>,
    pub rebooking: Arc<RebookingService>,
    pub dispatcher: BookingEventDispatcher,
    pub monitor: Arc<IntegrationMonitor>,
    pub webhooks: WebhookRegistry,
}

impl AppState {
    /// Wires the rebooking engine and the event dispatcher around the given
    /// platform, store and sender. `monitor` should be the one the platform
    /// adapter reports to.
    pub fn new(
        config: AppConfig,
        conn: Connection,
        platform: Arc<dyn BookingPlatform>,
        sender: Arc<dyn MessageSender>,
        catalog: TemplateCatalog,
        monitor: Arc<IntegrationMonitor>,
    ) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let catalog = Arc::new(catalog);
        let rebooking = Arc::new(RebookingService::new(platform.clone()));
        let dispatcher = BookingEventDispatcher::with_defaults(EventContext {
            platform: platform.clone(),
            rebooking: rebooking.clone(),
            db: db.clone(),
            catalog: catalog.clone(),
            salon: SalonProfile {
                name: config.salon_name.clone(),
            },
            max_suggestions: config.max_suggestions,
            days_ahead: config.suggestion_days_ahead,
            rng: Mutex::new(StdRng::from_entropy()),
        });

        Self {
            db,
            config,
            platform,
            sender,
            catalog,
            rebooking,
            dispatcher,
            monitor,
            webhooks: WebhookRegistry::default(),
        }
    }

    /// Origin used for webhook URLs when a registration names none.
    pub fn public_base_url(&self) -> String {
        self.config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.config.port))
    }
}
