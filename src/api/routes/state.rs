use crate::auth::AuthKeys;
use crate::config::{Config, SchoolConfig};
use crate::database::Database;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthKeys,
    /// Check-in window defaults used until an admin stores one
    pub school: SchoolConfig,
}

impl AppState {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            auth: AuthKeys::from_config(&config.auth),
            school: config.school.clone(),
        }
    }
}
