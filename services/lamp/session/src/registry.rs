//! Per-address registry of connection managers.

use crate::manager::ConnectionManager;
use crate::session::{SessionConfig, SessionEvent, SessionHandle};
use crate::transport::BleTransport;
use lamp_wire::Command;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

/// Owns at most one [`ConnectionManager`] per device address.
///
/// Addresses are compared case-insensitively. All managers report to the
/// event channel returned by [`DeviceRegistry::new`].
pub struct DeviceRegistry<T: BleTransport> {
    transport: Arc<T>,
    config: SessionConfig,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    managers: RwLock<HashMap<String, Arc<ConnectionManager<T>>>>,
}

/// Canonical form of a device address
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

impl<T: BleTransport> DeviceRegistry<T> {
    /// Create an empty registry sharing `transport` across managers
    pub fn new(transport: Arc<T>, config: SessionConfig) -> (Self, SessionHandle) {
        let (event_tx, events) = mpsc::unbounded_channel();
        (
            Self {
                transport,
                config,
                event_tx,
                managers: RwLock::new(HashMap::new()),
            },
            SessionHandle { events },
        )
    }

    /// Return the manager for `address`, creating and starting it if needed
    pub async fn get_or_create(&self, address: &str) -> Arc<ConnectionManager<T>> {
        let key = normalize_address(address);
        if let Some(manager) = self.managers.read().await.get(&key) {
            return Arc::clone(manager);
        }

        let mut managers = self.managers.write().await;
        let manager = managers.entry(key.clone()).or_insert_with(|| {
            info!("Creating connection manager for {}", key);
            Arc::new(ConnectionManager::new(
                key.clone(),
                Arc::clone(&self.transport),
                self.config.clone(),
                self.event_tx.clone(),
            ))
        });
        manager.start();
        Arc::clone(manager)
    }

    /// Existing manager for `address`
    pub async fn get(&self, address: &str) -> Option<Arc<ConnectionManager<T>>> {
        self.managers
            .read()
            .await
            .get(&normalize_address(address))
            .cloned()
    }

    /// Queue a command for `address`, creating its manager if needed
    pub async fn send(&self, address: &str, command: Command) {
        self.get_or_create(address).await.send(command);
    }

    /// Registered addresses, sorted
    pub async fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.managers.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Shut down and forget the manager for `address`
    pub async fn remove(&self, address: &str) -> bool {
        let removed = self
            .managers
            .write()
            .await
            .remove(&normalize_address(address));
        match removed {
            Some(manager) => {
                manager.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Shut down every manager
    pub async fn shutdown_all(&self) {
        let managers: Vec<_> = self.managers.write().await.drain().collect();
        for (address, manager) in managers {
            info!("Shutting down session for {}", address);
            manager.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_addresses_are_case_insensitive() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _events) = DeviceRegistry::new(transport, SessionConfig::default());

        let a = registry.get_or_create("aa:bb:cc:dd:ee:ff").await;
        let b = registry.get_or_create(" AA:BB:CC:DD:EE:FF").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.address(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(registry.addresses().await, vec!["AA:BB:CC:DD:EE:FF"]);
        assert!(a.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_shutdown_all() {
        let transport = Arc::new(MockTransport::new());
        let (registry, _events) = DeviceRegistry::new(transport, SessionConfig::default());

        registry.get_or_create("11:11:11:11:11:11").await;
        registry.get_or_create("22:22:22:22:22:22").await;

        assert!(registry.remove("11:11:11:11:11:11").await);
        assert!(!registry.remove("11:11:11:11:11:11").await);
        assert!(registry.get("11:11:11:11:11:11").await.is_none());

        let remaining = registry.get("22:22:22:22:22:22").await.unwrap();
        registry.shutdown_all().await;
        assert!(!remaining.is_running());
        assert!(registry.addresses().await.is_empty());
    }
}
