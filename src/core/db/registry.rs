/// Client Registry Module
///
/// Keeps one [`ConnectionManager`] per (config locator, profile name) for the
/// life of the process.

use crate::config::{ConfigSource, FileConfigSource};
use crate::core::db::connection::ConnectionManager;
use crate::core::db::driver::Driver;
use crate::core::Result;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Registry key: where the configuration came from and which profile.
///
/// Locators are compared verbatim; `./db.toml` and `db.toml` are different
/// identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub config_locator: String,
    pub profile_name: String,
}

impl ClientIdentity {
    pub fn new(config_locator: impl Into<String>, profile_name: impl Into<String>) -> Self {
        ClientIdentity {
            config_locator: config_locator.into(),
            profile_name: profile_name.into(),
        }
    }
}

/// Process-wide registry instance
static GLOBAL_REGISTRY: OnceCell<ClientRegistry> = OnceCell::new();

/// Map from identity to its single manager.
///
/// One mutex guards the whole map and is held across the factory call, so
/// concurrent first access for an identity constructs exactly once. Entries
/// are never evicted.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientIdentity, Arc<ConnectionManager>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static ClientRegistry {
        GLOBAL_REGISTRY.get_or_init(ClientRegistry::new)
    }

    /// Returns the manager for `identity`, building it with `factory` on first use.
    ///
    /// The factory runs with the registry locked and must not call back into
    /// the same registry.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error; nothing is registered and a later call
    /// retries construction.
    pub fn get_or_create<F>(&self, identity: ClientIdentity, factory: F) -> Result<Arc<ConnectionManager>>
    where
        F: FnOnce() -> Result<ConnectionManager>,
    {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = clients.get(&identity) {
            return Ok(Arc::clone(existing));
        }

        let manager = Arc::new(factory()?);
        debug!(
            config = %identity.config_locator,
            profile = %identity.profile_name,
            "Registered database client"
        );
        clients.insert(identity, Arc::clone(&manager));
        Ok(manager)
    }

    /// Checks whether a manager exists for `identity`.
    pub fn contains(&self, identity: &ClientIdentity) -> bool {
        self.lock().contains_key(identity)
    }

    /// Number of registered managers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ClientIdentity, Arc<ConnectionManager>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens (or reuses) the client for `profile_name` in the file at `config_path`.
///
/// # Errors
///
/// Configuration and connection errors from the first construction.
pub fn open_client<P: AsRef<Path>>(
    config_path: P,
    profile_name: &str,
    driver: Arc<dyn Driver>,
) -> Result<Arc<ConnectionManager>> {
    let source = FileConfigSource::new(config_path);
    let identity = ClientIdentity::new(source.locator(), profile_name);
    ClientRegistry::global().get_or_create(identity, || {
        ConnectionManager::from_config(&source, profile_name, driver)
    })
}
