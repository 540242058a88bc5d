//! One audit record per request, committed with the request's changes
//!
//! An action stages its mutations instead of writing them. On success the
//! mutations and the success records are committed together; on any failure
//! only a failure record is committed.

use credvault_core::types::{AuditRecord, CallerContext, OperationCode};
use credvault_core::{Error, Result};
use credvault_store::{ChangeSet, CredentialStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Result of an action: the response plus the changes to commit
#[derive(Debug)]
pub struct Staged<T> {
    pub response: T,
    pub changes: ChangeSet,
    /// Audit targets when one request touches several names
    pub targets: Vec<String>,
}

impl<T> Staged<T> {
    pub fn new(response: T, changes: ChangeSet) -> Self {
        Self {
            response,
            changes,
            targets: Vec::new(),
        }
    }

    pub fn read_only(response: T) -> Self {
        Self::new(response, ChangeSet::new())
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}

#[derive(Clone)]
pub struct AuditedTransaction {
    store: Arc<dyn CredentialStore>,
}

impl AuditedTransaction {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Run `action` and audit it under `operation`.
    ///
    /// The operation code is fixed by the caller before the action runs. A
    /// failed commit discards the action's changes and is audited as a 500.
    pub async fn perform<T, F, Fut>(
        &self,
        operation: OperationCode,
        target: &str,
        caller: &CallerContext,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Staged<T>>>,
    {
        let Staged {
            response,
            changes,
            targets,
        } = match action().await {
            Ok(staged) => staged,
            Err(err) => {
                self.record_failure(operation, target, caller, err.status_code())
                    .await?;
                return Err(err);
            }
        };

        let targets = if targets.is_empty() {
            vec![target.to_string()]
        } else {
            targets
        };
        let records: Vec<AuditRecord> = targets
            .iter()
            .map(|t| AuditRecord::new(operation, t.as_str(), caller, 200))
            .collect();

        match self.store.commit(changes.with_audit(records.clone())).await {
            Ok(()) => {
                records.iter().for_each(AuditRecord::log);
                Ok(response)
            }
            Err(err) => {
                warn!(operation = %operation, name = %target, "Commit failed: {}", err);
                self.record_failure(operation, target, caller, 500).await?;
                Err(err)
            }
        }
    }

    async fn record_failure(
        &self,
        operation: OperationCode,
        target: &str,
        caller: &CallerContext,
        status_code: u16,
    ) -> Result<()> {
        let record = AuditRecord::new(operation, target, caller, status_code);
        match self.store.commit(ChangeSet::audit_only(vec![record.clone()])).await {
            Ok(()) => {
                record.log();
                Ok(())
            }
            Err(err) => {
                error!(operation = %operation, name = %target, "Failed to write audit record: {}", err);
                Err(Error::AuditFailure(format!(
                    "Failed to record {} on {}: {}",
                    operation, target, err
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_core::types::CredentialName;
    use credvault_store::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, AuditedTransaction) {
        let store = Arc::new(MemoryStore::new());
        let tx = AuditedTransaction::new(store.clone());
        (store, tx)
    }

    #[tokio::test]
    async fn test_success_commits_changes_with_one_record() {
        let (store, tx) = setup();
        let caller = CallerContext::new("alice").with_requester_ip("10.0.0.1");
        let name = CredentialName::parse("/acl").unwrap();

        let response = tx
            .perform(OperationCode::AclUpdate, "/acl", &caller, || async {
                Ok(Staged::new(
                    "ok",
                    ChangeSet::new().put_permission(
                        credvault_core::types::PermissionEntry::owner("alice", name.clone()),
                    ),
                ))
            })
            .await
            .unwrap();
        assert_eq!(response, "ok");

        assert_eq!(store.permissions(&name).await.unwrap().len(), 1);
        let records = store.audit_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status_code, 200);
        assert_eq!(records[0].requester_ip.as_deref(), Some("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_failure_is_audited_with_its_status() {
        let (store, tx) = setup();
        let caller = CallerContext::new("alice");

        let err = tx
            .perform::<(), _, _>(OperationCode::CredentialAccess, "/missing", &caller, || async {
                Err(Error::credential_not_found())
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let records = store.audit_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status_code, 404);
        assert!(!records[0].success);
        assert_eq!(records[0].target, "/missing");
    }

    #[tokio::test]
    async fn test_multiple_targets() {
        let (store, tx) = setup();
        let caller = CallerContext::new("alice");

        tx.perform(OperationCode::CredentialFind, "db", &caller, || async {
            Ok(Staged::read_only(()).with_targets(vec!["/a/db".into(), "/b/db".into()]))
        })
        .await
        .unwrap();

        let targets: Vec<_> = store
            .audit_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.target)
            .collect();
        assert_eq!(targets, vec!["/a/db", "/b/db"]);
    }
}
