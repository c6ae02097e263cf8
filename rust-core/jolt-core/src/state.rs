//! # Application State
//!
//! Type-keyed containers:
//!
//! - [`AppState`]: values shared by every request. Filled while the app is
//!   being built and read-only afterwards, so lookups need no lock.
//! - [`Extensions`]: per-request scratch space that hooks use to hand data
//!   to later hooks and to the handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared application state, one value per type
#[derive(Clone, Default)]
pub struct AppState {
    data: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl AppState {
    /// Create an empty state container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value; replaces any previous value of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Shared handle to the value of type `T`
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Check if a value of type `T` exists
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.data.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if state is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("len", &self.len()).finish()
    }
}

/// Per-request typed values
#[derive(Default)]
pub struct Extensions {
    data: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one of that type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.data
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrow the value of type `T`
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Remove and return the value of type `T`
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct DbUrl(String);

    #[test]
    fn test_app_state_insert_get() {
        let mut state = AppState::new();
        state.insert(42i32);
        state.insert(DbUrl("sqlite::memory:".to_string()));

        assert_eq!(state.get::<i32>().as_deref(), Some(&42));
        assert_eq!(
            state.get::<DbUrl>().as_deref(),
            Some(&DbUrl("sqlite::memory:".to_string()))
        );
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_app_state_missing_and_overwrite() {
        let mut state = AppState::new();
        assert!(state.get::<u8>().is_none());
        assert!(state.is_empty());

        state.insert(1u8);
        state.insert(2u8);
        assert_eq!(state.get::<u8>().as_deref(), Some(&2));
        assert!(state.contains::<u8>());
    }

    #[test]
    fn test_app_state_shared_across_threads() {
        let mut state = AppState::new();
        state.insert("shared".to_string());
        let state = Arc::new(state);

        let clone = Arc::clone(&state);
        let handle = std::thread::spawn(move || clone.get::<String>().map(|s| s.len()));
        assert_eq!(handle.join().unwrap(), Some(6));
    }

    #[test]
    fn test_extensions() {
        let mut ext = Extensions::new();
        assert_eq!(ext.insert(5u32), None);
        assert_eq!(ext.insert(6u32), Some(5));
        assert_eq!(ext.get::<u32>(), Some(&6));
        assert_eq!(ext.remove::<u32>(), Some(6));
        assert!(ext.get::<u32>().is_none());
    }
}
