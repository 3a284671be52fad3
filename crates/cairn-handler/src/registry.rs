//! Per-session handle registry.
//!
//! Handles are keyed by name, compared ASCII case-insensitively. The
//! registry is owned by one session and needs no locking of its own.

use std::collections::HashMap;

use cairn_common::constants::MAX_HANDLE_NAME_LEN;
use cairn_common::error::{CairnError, CairnResult};
use cairn_common::types::TablePattern;
use cairn_table::{MdlContext, TableCache};

use crate::descriptor::HandleDescriptor;

/// Mapping from handle name to descriptor.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: HashMap<String, HandleDescriptor>,
}

fn registry_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl HandleRegistry {
    /// Creates an empty registry with room for `capacity` handles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: HashMap::with_capacity(capacity),
        }
    }

    /// Checks that `name` can be used as a handle name.
    pub fn validate_name(name: &str) -> CairnResult<()> {
        if name.is_empty() || name.len() > MAX_HANDLE_NAME_LEN {
            return Err(CairnError::invalid_argument(format!(
                "handle name must be 1 to {MAX_HANDLE_NAME_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Registers a descriptor under its name.
    ///
    /// Fails with `AlreadyExists` if the name is taken, whether the
    /// existing handle is open or closed.
    pub fn register(&mut self, descriptor: HandleDescriptor) -> CairnResult<()> {
        let key = registry_key(descriptor.name());
        if self.handles.contains_key(&key) {
            return Err(CairnError::AlreadyExists {
                name: descriptor.name().to_string(),
            });
        }
        self.handles.insert(key, descriptor);
        Ok(())
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(&registry_key(name))
    }

    /// Looks up a descriptor.
    pub fn lookup(&self, name: &str) -> Option<&HandleDescriptor> {
        self.handles.get(&registry_key(name))
    }

    /// Looks up a descriptor mutably.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut HandleDescriptor> {
        self.handles.get_mut(&registry_key(name))
    }

    /// Closes the descriptor if open, then removes it.
    ///
    /// Returns false if no such handle was registered.
    pub fn remove(&mut self, name: &str, cache: &TableCache, mdl: &mut MdlContext) -> bool {
        match self.handles.remove(&registry_key(name)) {
            Some(mut descriptor) => {
                descriptor.close(cache, mdl);
                true
            }
            None => false,
        }
    }

    /// Closes and removes every handle whose target matches one of
    /// `patterns`. Returns the number removed.
    pub fn remove_matching(
        &mut self,
        patterns: &[TablePattern],
        cache: &TableCache,
        mdl: &mut MdlContext,
    ) -> usize {
        let doomed: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, d)| patterns.iter().any(|p| p.matches(&d.target().table)))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            if let Some(mut descriptor) = self.handles.remove(key) {
                descriptor.close(cache, mdl);
            }
        }
        doomed.len()
    }

    /// Closes and removes every handle. Returns the number removed.
    pub fn clear(&mut self, cache: &TableCache, mdl: &mut MdlContext) -> usize {
        let removed = self.handles.len();
        for (_, mut descriptor) in self.handles.drain() {
            descriptor.close(cache, mdl);
        }
        removed
    }

    /// Iterates over open descriptors. Entries may be closed while iterating.
    pub fn for_each_open(&mut self) -> impl Iterator<Item = &mut HandleDescriptor> {
        self.handles.values_mut().filter(|d| d.is_open())
    }

    /// Iterates over all descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &HandleDescriptor> {
        self.handles.values()
    }

    /// Returns the number of registered handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HandleTarget;
    use cairn_common::types::TableIdent;

    fn descriptor(name: &str, table: &str) -> HandleDescriptor {
        HandleDescriptor::new(name, HandleTarget::new(TableIdent::new("test", table)))
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut registry = HandleRegistry::with_capacity(4);
        registry.register(descriptor("H1", "t1")).unwrap();

        assert!(registry.contains("h1"));
        assert_eq!(registry.lookup("h1").unwrap().name(), "H1");

        let err = registry.register(descriptor("h1", "t2")).unwrap_err();
        assert!(matches!(err, CairnError::AlreadyExists { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_name() {
        assert!(HandleRegistry::validate_name("h1").is_ok());
        assert!(HandleRegistry::validate_name("").is_err());
        assert!(HandleRegistry::validate_name(&"x".repeat(MAX_HANDLE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_for_each_open_skips_closed() {
        let mut registry = HandleRegistry::default();
        registry.register(descriptor("a", "t1")).unwrap();
        registry.register(descriptor("b", "t2")).unwrap();
        assert_eq!(registry.for_each_open().count(), 0);
        assert_eq!(registry.iter().count(), 2);
    }
}
