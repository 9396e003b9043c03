#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use studylab_rig::ChatConfig;

/// Default values for configuration options.
mod defaults {
    /// Application name reported by the monitor endpoints.
    pub const APP_NAME: &str = "LC-StudyLab";

    /// Application version reported by the monitor endpoints.
    pub const APP_VERSION: &str = "0.1.0";
}

/// App [`state`] configuration.
///
/// [`state`]: crate::service::ServiceState
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct ServiceConfig {
    /// Application name.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "APP_NAME", default_value = defaults::APP_NAME)
    )]
    #[builder(default = "defaults::APP_NAME.to_owned()")]
    pub app_name: String,

    /// Application version.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "APP_VERSION", default_value = defaults::APP_VERSION)
    )]
    #[builder(default = "defaults::APP_VERSION.to_owned()")]
    pub app_version: String,

    /// Enables debug mode.
    #[cfg_attr(feature = "config", arg(long, env = "DEBUG", default_value_t = false))]
    #[builder(default)]
    pub debug: bool,

    /// Chat service configuration.
    #[cfg_attr(feature = "config", command(flatten))]
    #[builder(default)]
    pub chat: ChatConfig,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_name: defaults::APP_NAME.to_owned(),
            app_version: defaults::APP_VERSION.to_owned(),
            debug: false,
            chat: ChatConfig::default(),
        }
    }
}

impl ServiceConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(app_name) = &self.app_name
            && app_name.trim().is_empty()
        {
            return Err("application name cannot be empty".to_owned());
        }

        if let Some(chat) = &self.chat {
            chat.validate().map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use studylab_rig::provider::ProviderConfig;

    use super::*;

    #[test]
    fn builder_defaults() -> anyhow::Result<()> {
        let config = ServiceConfig::builder()
            .with_chat(ChatConfig::new(ProviderConfig::new("sk-test")))
            .build()?;

        assert_eq!(config.app_name, "LC-StudyLab");
        assert_eq!(config.app_version, "0.1.0");
        assert!(!config.debug);
        Ok(())
    }

    #[test]
    fn builder_rejects_invalid_chat_config() {
        let result = ServiceConfig::builder()
            .with_chat(ChatConfig::new(ProviderConfig::new("")))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_blank_name() {
        let result = ServiceConfig::builder()
            .with_app_name("  ")
            .with_chat(ChatConfig::new(ProviderConfig::new("sk-test")))
            .build();

        assert!(result.is_err());
    }
}
