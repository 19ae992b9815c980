use crate::config::AppConfig;
use crate::credentials::CredentialResolver;
use crate::transport::HttpTransport;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub credentials: CredentialResolver,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let credentials = CredentialResolver::new(config.server.secret_key_file.clone());
        Self {
            config,
            transport,
            credentials,
        }
    }
}
