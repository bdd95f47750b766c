//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::backend::TextStreamBackend;
use crate::config::AppConfig;
use crate::generation::Generator;
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub generator: Arc<Generator>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<dyn TextStreamBackend>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let generator = Arc::new(Generator::new(
            backend,
            Arc::clone(&registry),
            &config.generation.fence_language,
        ));
        Self {
            config: Arc::new(config),
            registry,
            generator,
        }
    }
}
