use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ProviderInfoConfig;

use super::Eip1193Provider;

pub const ANNOUNCE_PROVIDER_EVENT: &str = "eip6963:announceProvider";
pub const REQUEST_PROVIDER_EVENT: &str = "eip6963:requestProvider";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

impl ProviderInfo {
    /// A fresh v4 uuid per page session.
    pub fn from_config(config: &ProviderInfoConfig) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            name: config.name.clone(),
            icon: config.icon.clone(),
            rdns: config.rdns.clone(),
        }
    }
}

/// Detail of an `eip6963:announceProvider` event.
#[derive(Clone)]
pub struct AnnounceProviderEvent {
    pub info: ProviderInfo,
    pub provider: Arc<dyn Eip1193Provider>,
}

impl AnnounceProviderEvent {
    pub fn name(&self) -> &'static str {
        ANNOUNCE_PROVIDER_EVENT
    }
}

type Dispatch = Arc<dyn Fn(AnnounceProviderEvent) + Send + Sync>;

/// Announces the wallet on load and again for every discovery request.
pub struct Eip6963Announcer {
    info: ProviderInfo,
    provider: Arc<dyn Eip1193Provider>,
    dispatch: Dispatch,
}

impl Eip6963Announcer {
    /// `provider` should be the live indirection (the router), so late
    /// listeners see whichever provider is currently chosen.
    pub fn new(
        info: ProviderInfo,
        provider: Arc<dyn Eip1193Provider>,
        dispatch: impl Fn(AnnounceProviderEvent) + Send + Sync + 'static,
    ) -> Self {
        Self {
            info,
            provider,
            dispatch: Arc::new(dispatch),
        }
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    pub fn announce(&self) {
        debug!(uuid = %self.info.uuid, rdns = %self.info.rdns, "announcing provider");
        (self.dispatch)(AnnounceProviderEvent {
            info: self.info.clone(),
            provider: Arc::clone(&self.provider),
        });
    }

    /// Feed every window event name here; only discovery requests trigger
    /// a re-announcement.
    pub fn on_window_event(&self, name: &str) -> bool {
        if name != REQUEST_PROVIDER_EVENT {
            return false;
        }
        self.announce();
        true
    }
}
