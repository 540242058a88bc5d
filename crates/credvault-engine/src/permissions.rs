//! Access checks against stored permission entries

use credvault_core::types::{CallerContext, CredentialName, PermissionEntry, PermissionOperation};
use credvault_core::{Error, Result};
use credvault_store::{ChangeSet, CredentialStore};
use tracing::debug;

/// Decides whether a caller may perform an operation on a name
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionPolicy {
    enforce: bool,
}

impl PermissionPolicy {
    pub fn new(enforce: bool) -> Self {
        Self { enforce }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Whether `caller` holds `operation` on `name`.
    ///
    /// A name nobody holds entries for and that has no versions is open, so
    /// the first writer can create it.
    pub async fn allows(
        &self,
        store: &dyn CredentialStore,
        caller: &CallerContext,
        name: &CredentialName,
        operation: PermissionOperation,
    ) -> Result<bool> {
        if !self.enforce {
            return Ok(true);
        }

        let entries = store.permissions(name).await?;
        if entries.is_empty() && store.most_recent(name).await?.is_none() {
            return Ok(true);
        }

        let allowed = entries
            .iter()
            .any(|entry| entry.actor == caller.actor && entry.allows(operation));
        if !allowed {
            debug!(
                actor = %caller.actor,
                name = %name,
                operation = %operation,
                "Permission denied"
            );
        }
        Ok(allowed)
    }

    /// Fail with the not-found message when the caller lacks `operation`
    pub async fn require(
        &self,
        store: &dyn CredentialStore,
        caller: &CallerContext,
        name: &CredentialName,
        operation: PermissionOperation,
    ) -> Result<()> {
        if self.allows(store, caller, name, operation).await? {
            Ok(())
        } else {
            Err(Error::credential_not_found())
        }
    }

    /// Stage an owner entry for the writer of a new credential
    pub async fn grant_owner(
        &self,
        store: &dyn CredentialStore,
        caller: &CallerContext,
        name: &CredentialName,
        changes: ChangeSet,
    ) -> Result<ChangeSet> {
        if !self.enforce {
            return Ok(changes);
        }
        let entries = store.permissions(name).await?;
        if entries.iter().any(|entry| entry.actor == caller.actor) {
            return Ok(changes);
        }
        Ok(changes.put_permission(PermissionEntry::owner(caller.actor.clone(), name.clone())))
    }
}
