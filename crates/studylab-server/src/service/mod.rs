//! Application state and dependency injection.

mod config;

use std::sync::Arc;

use studylab_rig::ChatService;

pub use crate::service::config::{ServiceConfig, ServiceConfigBuilder, ServiceConfigBuilderError};
use crate::utility::TRACING_TARGET_SERVICE;
pub use crate::{Error, Result};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    pub chat: ChatService,
    pub config: Arc<ServiceConfig>,
}

impl ServiceState {
    /// Initializes application state from configuration.
    ///
    /// Builds the chat service against the configured OpenAI-compatible API.
    pub async fn new(service_config: ServiceConfig) -> Result<Self> {
        let chat = ChatService::from_config(&service_config.chat).await?;

        tracing::info!(
            target: TRACING_TARGET_SERVICE,
            model = chat.model_id(),
            web_search = chat.has_tool("web_search"),
            weather = chat.has_tool("get_weather"),
            "chat service ready"
        );

        Ok(Self::with_chat(service_config, chat))
    }

    /// Assembles state around an already built chat service.
    pub fn with_chat(service_config: ServiceConfig, chat: ChatService) -> Self {
        Self {
            chat,
            config: Arc::new(service_config),
        }
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(chat: ChatService);
impl_di!(config: Arc<ServiceConfig>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let result = ServiceState::new(ServiceConfig::default()).await;
        let error = result.err().map(|e| e.kind());
        assert_eq!(error, Some(ErrorKind::Config));
    }
}
