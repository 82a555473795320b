//! # Page API
//!
//! The objects an integration script talks to: the launcher, media keys,
//! notifications and the config/session stores. Each is an
//! [`Instance`](core_runtime::Instance) of a prototype whose operations
//! package their arguments and hand them to the shared
//! [`Broker`](core_runtime::Broker); the typed structs in this crate are thin
//! handles over those instances.
//!
//! [`PageApi`] wires everything to one host channel. Hand its handles to the
//! code that needs them; [`PageApi::install`] exists only for the outermost
//! layer that must reach the API from a free function.
//!
//! ## Example
//!
//! ```no_run
//! use bridge_loopback::{pair, MemoryHost};
//! use core_service::{ApiConfig, PageApi};
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> core_service::Result<()> {
//! let (channel, endpoint, inbound) = pair();
//! tokio::spawn(Arc::new(MemoryHost::new()).serve(endpoint));
//!
//! let api = PageApi::new(ApiConfig::builder().channel(Arc::new(channel)).build()?)?;
//! tokio::spawn(api.clone().serve(inbound, CancellationToken::new()));
//!
//! api.launcher().set_tooltip("Nuvola")?;
//! api.session().set_async("position", json!(42)).await?;
//! assert_eq!(api.session().get_async("position").await?, json!(42));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod media_keys;
pub mod notification;
pub mod operations;
pub mod storage;
pub mod utils;

pub use config::{ApiConfig, ApiConfigBuilder};
pub use error::{Result, ServiceError};
pub use launcher::Launcher;
pub use media_keys::{MediaKey, MediaKeys};
pub use notification::{Notification, Notifications};
pub use storage::{ConfigStorage, KeyValueStorage};
pub use utils::HostVersion;

use bridge_traits::InboundMessage;
use core_runtime::{Broker, Instance, Prototype};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::info;

static GLOBAL: OnceLock<PageApi> = OnceLock::new();

/// The wired page API. Cheap to clone; clones share one broker.
#[derive(Debug, Clone)]
pub struct PageApi {
    config: ApiConfig,
    broker: Arc<Broker>,
    storage_prototype: Arc<Prototype>,
    launcher: Launcher,
    media_keys: MediaKeys,
    notifications: Notifications,
    config_storage: ConfigStorage,
    session: KeyValueStorage,
}

impl PageApi {
    /// Build the prototypes and the singleton instances over a fresh broker.
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;
        let broker = Broker::new(config.broker.clone(), Arc::clone(&config.channel))?;

        let launcher = Launcher::new(&launcher::prototype(&broker)?)?;
        let media_keys = MediaKeys::new(&media_keys::prototype()?, &broker)?;
        let notifications = Notifications::new(
            &notification::notifications_prototype(&broker)?,
            &notification::notification_prototype(&broker)?,
        )?;

        let storage_prototype = storage::key_value_prototype(&broker)?;
        let config_storage =
            ConfigStorage::new(&storage::config_prototype(&storage_prototype)?, &broker)?;
        let session = KeyValueStorage::from_instance(Instance::new(
            &storage::session_prototype(&storage_prototype)?,
            &[],
        )?);

        info!(host_version = %config.host_version, "page API ready");
        Ok(Self {
            config,
            broker,
            storage_prototype,
            launcher,
            media_keys,
            notifications,
            config_storage,
            session,
        })
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn host_version(&self) -> HostVersion {
        self.config.host_version
    }

    /// Whether the host is at least `major.minor.micro`.
    pub fn check_version(&self, major: u32, minor: u32, micro: u32) -> bool {
        utils::check_version(self.config.host_version, major, minor, micro)
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub fn media_keys(&self) -> &MediaKeys {
        &self.media_keys
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Persistent configuration (storage index 0).
    pub fn config(&self) -> &ConfigStorage {
        &self.config_storage
    }

    /// Session storage (index 1).
    pub fn session(&self) -> &KeyValueStorage {
        &self.session
    }

    /// Another store at `index`, sharing this API's broker.
    pub fn storage(&self, index: u64) -> Result<KeyValueStorage> {
        KeyValueStorage::new(&self.storage_prototype, index)
    }

    /// Pump host replies and events until `inbound` closes or `cancel`
    /// fires, then tear the broker down.
    pub async fn serve(self, inbound: UnboundedReceiver<InboundMessage>, cancel: CancellationToken) {
        Arc::clone(&self.broker).run(inbound, cancel).await;
    }

    /// Reject every call still waiting for the host.
    pub fn shutdown(&self) -> usize {
        self.broker.shutdown()
    }

    /// Publish `api` process-wide. Only the first install succeeds.
    pub fn install(api: PageApi) -> Result<&'static PageApi> {
        if GLOBAL.set(api).is_err() {
            return Err(ServiceError::InitializationFailed(
                "a page API is already installed".to_string(),
            ));
        }
        GLOBAL.get().ok_or_else(|| {
            ServiceError::InitializationFailed("page API registry is empty after install".to_string())
        })
    }

    pub fn global() -> Option<&'static PageApi> {
        GLOBAL.get()
    }
}
