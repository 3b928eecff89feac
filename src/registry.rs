//! Endpoint registry.
//!
//! Maps endpoint identifiers to handlers. Registration replaces any existing
//! entry for the same identifier. The table sits behind a read-write lock so
//! endpoints can be added while connections are being dispatched; lookups
//! clone the handler out and release the lock before the handler runs.

use crate::codec::EndpointId;
use crate::handler::Handler;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Initial dispatch table handed to the server builder
pub type EndpointMap = HashMap<EndpointId, Arc<dyn Handler>>;

/// Thread-safe endpoint-to-handler table
#[derive(Default)]
pub struct EndpointRegistry {
    routes: RwLock<EndpointMap>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(routes: EndpointMap) -> Self {
        Self {
            routes: RwLock::new(routes),
        }
    }

    // A writer can't leave the map half-updated, so a poisoned lock is still
    // safe to use.
    fn read(&self) -> RwLockReadGuard<'_, EndpointMap> {
        self.routes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EndpointMap> {
        self.routes.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Install or replace the handler for `endpoint`, returning the handler
    /// it replaced.
    pub fn insert(&self, endpoint: EndpointId, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        let previous = self.write().insert(endpoint, handler);
        if previous.is_some() {
            debug!(endpoint, "Replaced endpoint handler");
        } else {
            debug!(endpoint, "Registered endpoint handler");
        }
        previous
    }

    /// Look up the handler for `endpoint`
    pub fn resolve(&self, endpoint: EndpointId) -> Option<Arc<dyn Handler>> {
        self.read().get(&endpoint).cloned()
    }

    pub fn contains(&self, endpoint: EndpointId) -> bool {
        self.read().contains_key(&endpoint)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered endpoint identifiers in ascending order
    pub fn endpoints(&self) -> Vec<EndpointId> {
        let mut endpoints: Vec<EndpointId> = self.read().keys().copied().collect();
        endpoints.sort_unstable();
        endpoints
    }
}

impl fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.endpoints())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TcpHeader;
    use crate::handler::HandlerFuture;
    use bytes::Bytes;
    use tokio::net::TcpStream;

    struct Named(&'static str);

    impl Handler for Named {
        fn handle<'a>(
            &'a self,
            _conn: &'a mut TcpStream,
            _header: &'a TcpHeader,
            _payload: Bytes,
        ) -> HandlerFuture<'a> {
            Box::pin(async move { Ok(self.0.to_string()) })
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = EndpointRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(1).is_none());
    }

    #[test]
    fn test_insert_and_resolve() {
        let registry = EndpointRegistry::new();
        let handler: Arc<dyn Handler> = Arc::new(Named("first"));

        assert!(registry.insert(1, Arc::clone(&handler)).is_none());
        assert!(registry.contains(1));
        assert!(!registry.contains(2));

        let resolved = registry.resolve(1).unwrap();
        assert!(Arc::ptr_eq(&resolved, &handler));
        assert!(registry.resolve(2).is_none());
    }

    #[test]
    fn test_insert_overwrites() {
        let registry = EndpointRegistry::new();
        let first: Arc<dyn Handler> = Arc::new(Named("first"));
        let second: Arc<dyn Handler> = Arc::new(Named("second"));

        registry.insert(7, Arc::clone(&first));
        let replaced = registry.insert(7, Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(&registry.resolve(7).unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_map() {
        let mut map = EndpointMap::new();
        map.insert(3, Arc::new(Named("c")) as Arc<dyn Handler>);
        map.insert(-1, Arc::new(Named("a")) as Arc<dyn Handler>);
        map.insert(0, Arc::new(Named("b")) as Arc<dyn Handler>);

        let registry = EndpointRegistry::from_map(map);
        assert_eq!(registry.endpoints(), vec![-1, 0, 3]);
    }

    #[test]
    fn test_concurrent_registration_and_lookup() {
        let registry = Arc::new(EndpointRegistry::new());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.insert(t * 100 + i, Arc::new(Named("x")));
                        let _ = registry.resolve(i);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
