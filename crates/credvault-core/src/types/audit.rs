//! Audit trail types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Operation recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCode {
    CredentialAccess,
    CredentialUpdate,
    CredentialDelete,
    CredentialFind,
    AclAccess,
    AclUpdate,
    AclDelete,
    /// Reads of root certificates and other certificate authorities
    CaAccess,
    /// Writes of root certificates and other certificate authorities
    CaUpdate,
}

impl OperationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationCode::CredentialAccess => "credential_access",
            OperationCode::CredentialUpdate => "credential_update",
            OperationCode::CredentialDelete => "credential_delete",
            OperationCode::CredentialFind => "credential_find",
            OperationCode::AclAccess => "acl_access",
            OperationCode::AclUpdate => "acl_update",
            OperationCode::AclDelete => "acl_delete",
            OperationCode::CaAccess => "ca_access",
            OperationCode::CaUpdate => "ca_update",
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and request metadata supplied by the transport layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// Opaque actor identifier (already authenticated)
    pub actor: String,
    /// Scopes granted to the actor
    pub scopes: Vec<String>,
    /// Address the request originated from
    pub requester_ip: Option<String>,
    /// Value of the forwarding chain header, if any
    pub forwarded_for: Option<String>,
}

impl CallerContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Default::default()
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_requester_ip(mut self, ip: impl Into<String>) -> Self {
        self.requester_ip = Some(ip.into());
        self
    }

    pub fn with_forwarded_for(mut self, chain: impl Into<String>) -> Self {
        self.forwarded_for = Some(chain.into());
        self
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub operation: OperationCode,
    /// Credential name or search term the request targeted
    pub target: String,
    pub actor: String,
    pub status_code: u16,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub requester_ip: Option<String>,
    pub forwarded_for: Option<String>,
    /// Comma-joined scopes of the caller
    pub scope: String,
}

impl AuditRecord {
    pub fn new(
        operation: OperationCode,
        target: impl Into<String>,
        caller: &CallerContext,
        status_code: u16,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            target: target.into(),
            actor: caller.actor.clone(),
            status_code,
            success: (200..300).contains(&status_code),
            timestamp: Utc::now(),
            requester_ip: caller.requester_ip.clone(),
            forwarded_for: caller.forwarded_for.clone(),
            scope: caller.scopes.join(","),
        }
    }

    /// Emit the record as a structured log event (never includes values)
    pub fn log(&self) {
        if self.success {
            tracing::info!(
                audit_id = %self.id,
                operation = %self.operation,
                target = %self.target,
                actor = %self.actor,
                status = self.status_code,
                requester_ip = ?self.requester_ip,
                "Credential operation audited"
            );
        } else {
            tracing::warn!(
                audit_id = %self.id,
                operation = %self.operation,
                target = %self.target,
                actor = %self.actor,
                status = self.status_code,
                requester_ip = ?self.requester_ip,
                "Credential operation failed"
            );
        }
    }
}
