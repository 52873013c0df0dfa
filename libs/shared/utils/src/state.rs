use shared_config::AppConfig;

use crate::guards::SlotGuards;

/// Shared application state handed to every router. Carries the environment
/// configuration plus the per-slot exclusion registry, so the critical
/// sections of reservation and schedule updates are scoped explicitly rather
/// than through process-global storage.
pub struct AppState {
    pub config: AppConfig,
    pub slot_guards: SlotGuards,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            slot_guards: SlotGuards::new(),
        }
    }
}
