//! Process-wide registry of management beans
//!
//! Beans are registered under object names of the form
//! `domain:key=value[,key=value]*` and expose named operations that take a
//! single string argument.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ManagementError;
use crate::registry::OrchestratorManager;

/// Object name the orchestrator bean is registered under
pub const ORCHESTRATOR_OBJECT_NAME: &str = "org.mule.orchestrator:type=basic,name=orchestrator";

pub const OWN_SCHEDULER_OPERATION: &str = "ownScheduler";

/// Something an operator can invoke operations on at runtime.
pub trait ManagedBean: Send + Sync {
    fn operations(&self) -> &'static [&'static str];

    fn invoke(&self, operation: &str, argument: &str) -> Result<Value, ManagementError>;
}

/// Proof of a registration, required to unregister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    name: String,
    id: u64,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct RegisteredBean {
    id: u64,
    bean: Arc<dyn ManagedBean>,
}

#[derive(Default)]
pub struct ManagementServer {
    beans: DashMap<String, RegisteredBean>,
    next_id: AtomicU64,
}

impl ManagementServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server shared by the whole process
    pub fn platform() -> Arc<ManagementServer> {
        static PLATFORM: OnceLock<Arc<ManagementServer>> = OnceLock::new();
        PLATFORM.get_or_init(|| Arc::new(ManagementServer::new())).clone()
    }

    pub fn register(
        &self,
        name: &str,
        bean: Arc<dyn ManagedBean>,
    ) -> Result<Registration, ManagementError> {
        validate_object_name(name)?;

        match self.beans.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ManagementError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(RegisteredBean { id, bean });
                info!(object_name = %name, "Registered management bean");
                Ok(Registration {
                    name: name.to_string(),
                    id,
                })
            }
        }
    }

    /// Remove the bean if it is still the one `registration` refers to.
    pub fn unregister(&self, registration: &Registration) -> bool {
        let removed = self
            .beans
            .remove_if(&registration.name, |_, registered| registered.id == registration.id)
            .is_some();
        if removed {
            debug!(object_name = %registration.name, "Unregistered management bean");
        }
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.beans.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.beans.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn invoke(
        &self,
        name: &str,
        operation: &str,
        argument: &str,
    ) -> Result<Value, ManagementError> {
        // Release the map shard before running the operation.
        let bean = self
            .beans
            .get(name)
            .map(|registered| registered.bean.clone())
            .ok_or_else(|| ManagementError::NotFound(name.to_string()))?;

        if !bean.operations().iter().any(|supported| *supported == operation) {
            return Err(ManagementError::UnknownOperation {
                name: name.to_string(),
                operation: operation.to_string(),
            });
        }
        bean.invoke(operation, argument)
    }
}

fn validate_object_name(name: &str) -> Result<(), ManagementError> {
    let malformed = || ManagementError::MalformedObjectName(name.to_string());

    let (domain, properties) = name.split_once(':').ok_or_else(malformed)?;
    if domain.is_empty() || properties.is_empty() {
        return Err(malformed());
    }
    for property in properties.split(',') {
        match property.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {}
            _ => return Err(malformed()),
        }
    }
    Ok(())
}

/// Exposes `ownScheduler` for the orchestrators of one strategy.
pub struct OrchestratorBean {
    manager: Weak<OrchestratorManager>,
}

impl OrchestratorBean {
    pub fn new(manager: Weak<OrchestratorManager>) -> Self {
        Self { manager }
    }
}

impl ManagedBean for OrchestratorBean {
    fn operations(&self) -> &'static [&'static str] {
        &[OWN_SCHEDULER_OPERATION]
    }

    fn invoke(&self, operation: &str, argument: &str) -> Result<Value, ManagementError> {
        if operation != OWN_SCHEDULER_OPERATION {
            return Err(ManagementError::UnknownOperation {
                name: ORCHESTRATOR_OBJECT_NAME.to_string(),
                operation: operation.to_string(),
            });
        }

        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| ManagementError::NotFound(ORCHESTRATOR_OBJECT_NAME.to_string()))?;
        let pool = manager
            .own_scheduler(argument)
            .map_err(|e| ManagementError::OperationFailed(e.to_string()))?;

        Ok(json!({
            "component": argument,
            "reassigned": pool.is_some(),
            "pool": pool,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoBean;

    impl ManagedBean for EchoBean {
        fn operations(&self) -> &'static [&'static str] {
            &["echo"]
        }

        fn invoke(&self, _operation: &str, argument: &str) -> Result<Value, ManagementError> {
            Ok(json!(argument))
        }
    }

    #[test]
    fn test_object_name_validation() {
        assert!(validate_object_name(ORCHESTRATOR_OBJECT_NAME).is_ok());
        assert!(validate_object_name("domain:key=value").is_ok());
        for bad in ["", "no-colon", ":type=basic", "domain:", "domain:type", "domain:=x", "d:a=b,"] {
            assert!(validate_object_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let server = ManagementServer::new();
        let registration = server.register("test:name=echo", Arc::new(EchoBean)).unwrap();
        assert!(matches!(
            server.register("test:name=echo", Arc::new(EchoBean)),
            Err(ManagementError::AlreadyRegistered(_))
        ));

        assert_eq!(server.invoke("test:name=echo", "echo", "hi").unwrap(), json!("hi"));
        assert!(matches!(
            server.invoke("test:name=echo", "other", ""),
            Err(ManagementError::UnknownOperation { .. })
        ));

        assert!(server.unregister(&registration));
        assert!(!server.is_registered("test:name=echo"));
    }

    #[test]
    fn test_stale_registration_cannot_remove_newer_bean() {
        let server = ManagementServer::new();
        let first = server.register("test:name=echo", Arc::new(EchoBean)).unwrap();
        assert!(server.unregister(&first));
        let _second = server.register("test:name=echo", Arc::new(EchoBean)).unwrap();

        assert!(!server.unregister(&first));
        assert!(server.is_registered("test:name=echo"));
    }
}
