//! Role resolution from session-scoped context
//!
//! The entry screen stores the chosen user name in session-scoped storage.
//! The controller reads it once on startup and clears it on teardown.

use parking_lot::Mutex;

use crate::call::Role;
use crate::client::config::RoleNames;

/// Session-scoped storage holding the current user name
pub trait RoleStore: Send + Sync {
    /// Read the stored user name, if any
    fn current_user(&self) -> Option<String>;

    /// Forget the stored user name
    fn clear(&self);
}

/// In-process role store
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    user: Mutex<Option<String>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a user already selected
    pub fn with_user(user: impl Into<String>) -> Self {
        Self {
            user: Mutex::new(Some(user.into())),
        }
    }
}

impl RoleStore for MemoryRoleStore {
    fn current_user(&self) -> Option<String> {
        self.user.lock().clone()
    }

    fn clear(&self) {
        self.user.lock().take();
    }
}

/// Map a stored user name onto a role.
///
/// Absent and unrecognised names both resolve to `None`, which sends the
/// user back to the entry screen.
pub fn resolve_role(names: &RoleNames, user: Option<&str>) -> Option<Role> {
    match user {
        Some(u) if u == names.caller => Some(Role::Caller),
        Some(u) if u == names.callee => Some(Role::Callee),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_role() {
        let names = RoleNames::default();
        assert_eq!(resolve_role(&names, Some(names.caller.as_str())), Some(Role::Caller));
        assert_eq!(resolve_role(&names, Some(names.callee.as_str())), Some(Role::Callee));
        assert_eq!(resolve_role(&names, Some("mallory")), None);
        assert_eq!(resolve_role(&names, Some("")), None);
        assert_eq!(resolve_role(&names, None), None);
    }

    #[test]
    fn test_memory_store_clear() {
        let store = MemoryRoleStore::with_user("admin");
        assert_eq!(store.current_user().as_deref(), Some("admin"));
        store.clear();
        assert_eq!(store.current_user(), None);
        store.clear();
        assert_eq!(store.current_user(), None);
    }
}
