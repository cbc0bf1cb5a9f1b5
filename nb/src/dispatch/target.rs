//! Backend address resolution

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Registration {
    url: String,
    registered_at: DateTime<Utc>,
}

/// Where outbound requests are sent
///
/// A backend may announce its own callback address at runtime; that address
/// takes precedence over the one from the config file.
#[derive(Debug, Default)]
pub struct BackendTarget {
    configured: Option<String>,
    registered: RwLock<Option<Registration>>,
}

impl BackendTarget {
    pub fn new(configured: Option<String>) -> Self {
        let configured = configured.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        debug!(?configured, "BackendTarget::new: called");
        Self {
            configured,
            registered: RwLock::new(None),
        }
    }

    /// Record an address announced by the backend, replacing any earlier one
    pub fn register(&self, url: impl Into<String>) {
        let url = url.into();
        info!(%url, "Backend registered callback address");
        match self.registered.write() {
            Ok(mut slot) => {
                *slot = Some(Registration {
                    url,
                    registered_at: Utc::now(),
                });
            }
            Err(e) => warn!(error = %e, "BackendTarget::register: lock poisoned"),
        }
    }

    /// The address to POST to, if any
    pub fn current(&self) -> Option<String> {
        let registered = self
            .registered
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|r| r.url.clone()));
        registered.or_else(|| self.configured.clone())
    }

    /// When the runtime address was announced, if one was
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|r| r.registered_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_address() {
        let target = BackendTarget::new(None);
        assert_eq!(target.current(), None);
        assert_eq!(BackendTarget::new(Some("  ".to_string())).current(), None);
    }

    #[test]
    fn test_configured_address() {
        let target = BackendTarget::new(Some("http://agent:8000/hook".to_string()));
        assert_eq!(target.current().as_deref(), Some("http://agent:8000/hook"));
        assert!(target.registered_at().is_none());
    }

    #[test]
    fn test_registered_address_wins() {
        let target = BackendTarget::new(Some("http://configured/hook".to_string()));
        target.register("http://announced/hook");
        assert_eq!(target.current().as_deref(), Some("http://announced/hook"));
        assert!(target.registered_at().is_some());

        target.register("http://announced-again/hook");
        assert_eq!(target.current().as_deref(), Some("http://announced-again/hook"));
    }
}
