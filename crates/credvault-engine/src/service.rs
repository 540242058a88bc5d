//! Credential operations exposed to transports
//!
//! Every public operation runs inside an [`AuditedTransaction`], so each call
//! produces exactly one audit record per target, whether it succeeds or not.

use crate::codec;
use crate::credential::{Credential, GenerationParameters};
use crate::generate::{CredentialGenerator, ResolvedCa};
use crate::permissions::PermissionPolicy;
use crate::request::{parse_store_request, StoreMode, StoreRequest};
use crate::transaction::{AuditedTransaction, Staged};
use chrono::{DateTime, Utc};
use credvault_core::types::{
    CallerContext, CredentialKind, CredentialName, OperationCode, PermissionEntry,
    PermissionOperation,
};
use credvault_core::{CredvaultConfig, Error, Result};
use credvault_crypto::certificate::CA_NOT_FOUND;
use credvault_crypto::{
    is_certificate_authority, CanaryStore, CertificateAuthority, ConfiguredKey, EncryptionProvider, KeyRegistry,
    SoftwareKeyProvider,
};
use credvault_store::{ChangeSet, CredentialStore, CredentialVersion, NameSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const TYPE_MISMATCH: &str = "The credential type cannot be modified. Please delete the credential if you wish to create it with a different type.";
pub const CANNOT_REGENERATE_PASSWORD: &str = "The password could not be regenerated because the value was statically set. Only generated passwords may be regenerated.";
pub const CANNOT_REGENERATE: &str = "The credential could not be regenerated because the value was statically set. Only generated credentials may be regenerated.";
pub const INVALID_PERMISSION: &str = "Each permission must include an actor and at least one operation. Please validate your input and retry your request.";

/// One credential version as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredCredential {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub version_created_at: DateTime<Utc>,
    pub value: Value,
}

impl StoredCredential {
    fn from_decoded(version: &CredentialVersion, credential: &Credential) -> Self {
        Self {
            id: version.id,
            name: version.name.to_string(),
            kind: version.kind,
            version_created_at: version.created_at,
            value: credential.to_json(),
        }
    }
}

/// Operations granted to one actor by `add_permissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub actor: String,
    pub operations: Vec<PermissionOperation>,
}

/// Build the key registry described by `config`, verifying every key
pub async fn registry_from_config(
    config: &CredvaultConfig,
    canaries: &dyn CanaryStore,
) -> Result<KeyRegistry> {
    let mut keys = Vec::with_capacity(config.encryption.keys.len());
    for key in &config.encryption.keys {
        let provider: Arc<dyn EncryptionProvider> =
            Arc::new(SoftwareKeyProvider::from_material(&key.material()?)?);
        keys.push(ConfiguredKey::new(provider, key.active));
    }
    KeyRegistry::initialize(keys, canaries).await
}

/// Facade over the store, key registry and generators
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    registry: Arc<KeyRegistry>,
    policy: PermissionPolicy,
    generator: CredentialGenerator,
    transaction: AuditedTransaction,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        registry: Arc<KeyRegistry>,
        policy: PermissionPolicy,
    ) -> Self {
        Self {
            transaction: AuditedTransaction::new(store.clone()),
            store,
            registry,
            policy,
            generator: CredentialGenerator::new(),
        }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Set, generate, overwrite or regenerate a credential from a request body.
    ///
    /// Storing an existing name without `overwrite` returns the current
    /// version unchanged and is audited as an access.
    pub async fn store(&self, caller: &CallerContext, body: &Value) -> Result<StoredCredential> {
        let parsed = parse_store_request(body);

        let (target, operation) = match &parsed {
            Ok(request) => {
                let existing = self.store.most_recent(&request.name).await.ok().flatten();
                let authority = request_is_authority(request)
                    || existing.as_ref().is_some_and(is_authority);
                let operation = if request.will_write(existing.is_some()) {
                    update_code(authority)
                } else {
                    access_code(authority)
                };
                (request.name.to_string(), operation)
            }
            Err(_) => (
                body.get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                OperationCode::CredentialUpdate,
            ),
        };

        self.transaction
            .perform(operation, &target, caller, || async move {
                let request = parsed?;
                self.stage_store(caller, request).await
            })
            .await
    }

    /// Regenerate an existing generated credential with its stored parameters
    pub async fn regenerate(&self, caller: &CallerContext, name: &str) -> Result<StoredCredential> {
        self.store(caller, &json!({ "name": name, "regenerate": true }))
            .await
    }

    pub async fn fetch_by_name(
        &self,
        caller: &CallerContext,
        name: &str,
    ) -> Result<StoredCredential> {
        let operation = self.access_code_for_name(name).await;
        self.transaction
            .perform(operation, name, caller, || async move {
                let name = CredentialName::parse(name)?;
                self.policy
                    .require(&*self.store, caller, &name, PermissionOperation::Read)
                    .await?;
                let version = self
                    .store
                    .most_recent(&name)
                    .await?
                    .ok_or_else(Error::credential_not_found)?;
                Ok(Staged::read_only(self.present(&version)?))
            })
            .await
    }

    pub async fn fetch_by_id(&self, caller: &CallerContext, id: &str) -> Result<StoredCredential> {
        let authority = match Uuid::parse_str(id) {
            Ok(id) => self
                .store
                .by_id(id)
                .await
                .ok()
                .flatten()
                .is_some_and(|version| is_authority(&version)),
            Err(_) => false,
        };
        self.transaction
            .perform(access_code(authority), id, caller, || async move {
                let id = Uuid::parse_str(id).map_err(|_| Error::credential_not_found())?;
                let version = self
                    .store
                    .by_id(id)
                    .await?
                    .ok_or_else(Error::credential_not_found)?;
                self.policy
                    .require(&*self.store, caller, &version.name, PermissionOperation::Read)
                    .await?;
                Ok(Staged::read_only(self.present(&version)?))
            })
            .await
    }

    /// Every version of a name, newest first
    pub async fn fetch_history(
        &self,
        caller: &CallerContext,
        name: &str,
    ) -> Result<Vec<StoredCredential>> {
        let operation = self.access_code_for_name(name).await;
        self.transaction
            .perform(operation, name, caller, || async move {
                let name = CredentialName::parse(name)?;
                self.policy
                    .require(&*self.store, caller, &name, PermissionOperation::Read)
                    .await?;
                let versions = self.store.all_versions(&name).await?;
                if versions.is_empty() {
                    return Err(Error::credential_not_found());
                }
                let history = versions
                    .iter()
                    .map(|version| self.present(version))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Staged::read_only(history))
            })
            .await
    }

    /// Remove every version of a name along with its permission entries
    pub async fn delete(&self, caller: &CallerContext, name: &str) -> Result<()> {
        self.transaction
            .perform(OperationCode::CredentialDelete, name, caller, || async move {
                let name = CredentialName::parse(name)?;
                self.policy
                    .require(&*self.store, caller, &name, PermissionOperation::Delete)
                    .await?;
                if self.store.most_recent(&name).await?.is_none() {
                    return Err(Error::credential_not_found());
                }
                info!(name = %name, actor = %caller.actor, "Deleting credential");
                Ok(Staged::new((), ChangeSet::new().delete_all(name)))
            })
            .await
    }

    /// Every hierarchical path holding at least one visible credential
    pub async fn find_paths(&self, caller: &CallerContext) -> Result<Vec<String>> {
        self.transaction
            .perform(OperationCode::CredentialFind, "/", caller, || async move {
                if !self.policy.is_enforced() {
                    return Ok(Staged::read_only(self.store.list_all_paths().await?));
                }
                let visible = self
                    .readable(caller, self.store.find_names_starting_with("/").await?)
                    .await?;
                let mut paths = BTreeSet::new();
                for summary in &visible {
                    paths.extend(CredentialName::parse(&summary.name)?.hierarchy());
                }
                Ok(Staged::read_only(paths.into_iter().collect()))
            })
            .await
    }

    /// Names containing `fragment`, case-insensitively, newest first
    pub async fn find_names_like(
        &self,
        caller: &CallerContext,
        fragment: &str,
    ) -> Result<Vec<NameSummary>> {
        self.transaction
            .perform(OperationCode::CredentialFind, fragment, caller, || async move {
                let found = self.store.find_names_containing(fragment).await?;
                self.found(caller, found).await
            })
            .await
    }

    /// Names under the directory `prefix`, case-insensitively, newest first
    pub async fn find_names_under_prefix(
        &self,
        caller: &CallerContext,
        prefix: &str,
    ) -> Result<Vec<NameSummary>> {
        let directory = &directory_prefix(prefix);
        self.transaction
            .perform(OperationCode::CredentialFind, directory, caller, || async move {
                let found = self.store.find_names_starting_with(directory).await?;
                self.found(caller, found).await
            })
            .await
    }

    pub async fn permissions(
        &self,
        caller: &CallerContext,
        name: &str,
    ) -> Result<Vec<PermissionEntry>> {
        self.transaction
            .perform(OperationCode::AclAccess, name, caller, || async move {
                let name = self
                    .existing_for_acl(caller, name, PermissionOperation::ReadAcl)
                    .await?;
                Ok(Staged::read_only(self.store.permissions(&name).await?))
            })
            .await
    }

    /// Grant operations to actors; existing grants are extended, never reduced
    pub async fn add_permissions(
        &self,
        caller: &CallerContext,
        name: &str,
        grants: Vec<PermissionGrant>,
    ) -> Result<Vec<PermissionEntry>> {
        self.transaction
            .perform(OperationCode::AclUpdate, name, caller, || async move {
                if grants.is_empty()
                    || grants
                        .iter()
                        .any(|g| g.actor.trim().is_empty() || g.operations.is_empty())
                {
                    return Err(Error::validation(INVALID_PERMISSION));
                }
                let name = self
                    .existing_for_acl(caller, name, PermissionOperation::WriteAcl)
                    .await?;

                let mut entries = self.store.permissions(&name).await?;
                let mut changes = ChangeSet::new();
                for grant in grants {
                    let merged = match entries.iter_mut().find(|e| e.actor == grant.actor) {
                        Some(entry) => {
                            entry.operations.extend(grant.operations);
                            entry.clone()
                        }
                        None => {
                            let entry =
                                PermissionEntry::new(grant.actor, name.clone(), grant.operations);
                            entries.push(entry.clone());
                            entry
                        }
                    };
                    changes = changes.put_permission(merged);
                }
                Ok(Staged::new(entries, changes))
            })
            .await
    }

    pub async fn delete_permission(
        &self,
        caller: &CallerContext,
        name: &str,
        actor: &str,
    ) -> Result<()> {
        self.transaction
            .perform(OperationCode::AclDelete, name, caller, || async move {
                let name = self
                    .existing_for_acl(caller, name, PermissionOperation::WriteAcl)
                    .await?;
                let entries = self.store.permissions(&name).await?;
                if !entries.iter().any(|e| e.actor == actor) {
                    return Err(Error::credential_not_found());
                }
                Ok(Staged::new((), ChangeSet::new().delete_permission(name, actor)))
            })
            .await
    }

    /// Best-effort lookup; an unreadable or missing name is audited as a
    /// plain credential access
    async fn access_code_for_name(&self, raw: &str) -> OperationCode {
        let authority = match CredentialName::parse(raw) {
            Ok(name) => self
                .store
                .most_recent(&name)
                .await
                .ok()
                .flatten()
                .is_some_and(|version| is_authority(&version)),
            Err(_) => false,
        };
        access_code(authority)
    }

    async fn stage_store(
        &self,
        caller: &CallerContext,
        request: StoreRequest,
    ) -> Result<Staged<StoredCredential>> {
        let existing = self.store.most_recent(&request.name).await?;
        let writes = request.will_write(existing.is_some());
        let needed = if writes {
            PermissionOperation::Write
        } else {
            PermissionOperation::Read
        };
        self.policy
            .require(&*self.store, caller, &request.name, needed)
            .await?;

        if let (Some(kind), Some(current)) = (request.kind, &existing) {
            if current.kind != kind {
                return Err(Error::validation(TYPE_MISMATCH));
            }
        }

        if !writes {
            let current = existing.ok_or_else(Error::credential_not_found)?;
            debug!(name = %current.name, "Existing credential kept without overwrite");
            return Ok(Staged::read_only(self.present(&current)?));
        }

        let (credential, parameters) = match request.mode {
            StoreMode::Set(credential) => (credential, None),
            StoreMode::Generate(parameters) => {
                let ca = self.signing_ca(caller, &parameters).await?;
                let credential = self
                    .generator
                    .generate(&parameters, ca.as_ref(), None)?;
                (credential, Some(parameters))
            }
            StoreMode::Regenerate => {
                let current = existing.as_ref().ok_or_else(Error::credential_not_found)?;
                let parameters = self.regeneration_parameters(current)?;
                let username = match codec::decode(current, &self.registry)? {
                    Credential::User(user) => user.username.clone(),
                    _ => None,
                };
                let ca = self.signing_ca(caller, &parameters).await?;
                let credential =
                    self.generator
                        .generate(&parameters, ca.as_ref(), username.as_deref())?;
                (credential, Some(parameters))
            }
        };

        let reuse = match (&parameters, &existing) {
            (Some(parameters), Some(current)) => self.reusable_parameters(current, parameters)?,
            _ => None,
        };
        let (clear, envelope) =
            codec::encode(&credential, parameters.as_ref(), reuse, &self.registry)?;

        let name = existing
            .as_ref()
            .map(|current| current.name.clone())
            .unwrap_or(request.name);
        let version = CredentialVersion::new(name.clone(), credential.kind(), clear, envelope);
        let response = StoredCredential::from_decoded(&version, &credential);

        let mut changes = ChangeSet::new().create_version(version);
        if existing.is_none() {
            changes = self
                .policy
                .grant_owner(&*self.store, caller, &name, changes)
                .await?;
        }
        info!(
            name = %name,
            kind = %credential.kind(),
            actor = %caller.actor,
            "Staged new credential version"
        );
        Ok(Staged::new(response, changes))
    }

    /// The stored parameters, or kind defaults where a value may be
    /// regenerated without them
    fn regeneration_parameters(&self, current: &CredentialVersion) -> Result<GenerationParameters> {
        if let Some(parameters) = codec::decode_parameters(current, &self.registry)? {
            return Ok(parameters);
        }
        match current.kind {
            CredentialKind::Password | CredentialKind::User => {
                Err(Error::validation(CANNOT_REGENERATE_PASSWORD))
            }
            kind => GenerationParameters::defaults_for(kind)
                .ok_or_else(|| Error::validation(CANNOT_REGENERATE)),
        }
    }

    /// The current parameter ciphertext when it is sealed under the active
    /// key and decrypts to the same parameters
    fn reusable_parameters(
        &self,
        current: &CredentialVersion,
        parameters: &GenerationParameters,
    ) -> Result<Option<credvault_crypto::EncryptedValue>> {
        if current.key_id() != self.registry.active_key_id() {
            return Ok(None);
        }
        let Some(sealed) = &current.envelope.parameters else {
            return Ok(None);
        };
        let unchanged = codec::decode_parameters(current, &self.registry)?.as_ref() == Some(parameters);
        Ok(unchanged.then(|| sealed.clone()))
    }

    async fn signing_ca(
        &self,
        caller: &CallerContext,
        parameters: &GenerationParameters,
    ) -> Result<Option<ResolvedCa>> {
        let GenerationParameters::Certificate(params) = parameters else {
            return Ok(None);
        };
        match params.ca.as_deref().filter(|ca| !ca.trim().is_empty()) {
            Some(ca) => Ok(Some(self.resolve_ca(caller, ca).await?)),
            None => Ok(None),
        }
    }

    /// Load a stored root or certificate that can sign others
    async fn resolve_ca(&self, caller: &CallerContext, raw: &str) -> Result<ResolvedCa> {
        let name = CredentialName::parse(raw)?;
        if !self
            .policy
            .allows(&*self.store, caller, &name, PermissionOperation::Read)
            .await?
        {
            return Err(Error::not_found(CA_NOT_FOUND));
        }

        let version = self
            .store
            .most_recent(&name)
            .await?
            .filter(|version| version.kind.is_certificate())
            .ok_or_else(|| Error::not_found(CA_NOT_FOUND))?;

        let authority = match codec::decode(&version, &self.registry)? {
            Credential::Root(root) => {
                CertificateAuthority::new(root.certificate.clone(), root.private_key.expose())?
            }
            Credential::Certificate(cert) => {
                CertificateAuthority::new(cert.certificate.clone(), cert.private_key.expose())?
            }
            _ => return Err(Error::not_found(CA_NOT_FOUND)),
        };

        Ok(ResolvedCa {
            name: version.name.to_string(),
            authority,
        })
    }

    fn present(&self, version: &CredentialVersion) -> Result<StoredCredential> {
        let credential = codec::decode(version, &self.registry)?;
        Ok(StoredCredential::from_decoded(version, &credential))
    }

    async fn readable(
        &self,
        caller: &CallerContext,
        summaries: Vec<NameSummary>,
    ) -> Result<Vec<NameSummary>> {
        if !self.policy.is_enforced() {
            return Ok(summaries);
        }
        let mut visible = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let name = CredentialName::parse(&summary.name)?;
            if self
                .policy
                .allows(&*self.store, caller, &name, PermissionOperation::Read)
                .await?
            {
                visible.push(summary);
            }
        }
        Ok(visible)
    }

    /// Audit one record per match, or one for the query when nothing matched
    async fn found(
        &self,
        caller: &CallerContext,
        found: Vec<NameSummary>,
    ) -> Result<Staged<Vec<NameSummary>>> {
        let visible = self.readable(caller, found).await?;
        let targets = visible.iter().map(|s| s.name.clone()).collect();
        Ok(Staged::read_only(visible).with_targets(targets))
    }

    async fn existing_for_acl(
        &self,
        caller: &CallerContext,
        raw: &str,
        operation: PermissionOperation,
    ) -> Result<CredentialName> {
        let name = CredentialName::parse(raw)?;
        self.policy
            .require(&*self.store, caller, &name, operation)
            .await?;
        match self.store.most_recent(&name).await? {
            Some(version) => Ok(version.name),
            None => Err(Error::credential_not_found()),
        }
    }
}

/// Roots and certificates carrying the CA basic constraint
fn is_authority(version: &CredentialVersion) -> bool {
    match version.kind {
        CredentialKind::Root => true,
        CredentialKind::Certificate => version
            .clear
            .get("certificate")
            .and_then(Value::as_str)
            .is_some_and(is_certificate_authority),
        _ => false,
    }
}

fn request_is_authority(request: &StoreRequest) -> bool {
    if request.kind == Some(CredentialKind::Root) {
        return true;
    }
    match &request.mode {
        StoreMode::Generate(GenerationParameters::Certificate(params)) => params.is_ca,
        StoreMode::Set(Credential::Certificate(cert)) => {
            is_certificate_authority(&cert.certificate)
        }
        _ => false,
    }
}

fn access_code(authority: bool) -> OperationCode {
    if authority {
        OperationCode::CaAccess
    } else {
        OperationCode::CredentialAccess
    }
}

fn update_code(authority: bool) -> OperationCode {
    if authority {
        OperationCode::CaUpdate
    } else {
        OperationCode::CredentialUpdate
    }
}

/// Normalize a search prefix to a directory with leading and trailing slash
fn directory_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_prefix() {
        assert_eq!(directory_prefix("app"), "/app/");
        assert_eq!(directory_prefix("/app/"), "/app/");
        assert_eq!(directory_prefix("/a/b"), "/a/b/");
        assert_eq!(directory_prefix(""), "/");
    }

    #[test]
    fn test_stored_credential_serializes_type_field() {
        let stored = StoredCredential {
            id: Uuid::nil(),
            name: "/x".into(),
            kind: CredentialKind::Password,
            version_created_at: Utc::now(),
            value: json!("secret"),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["type"], "password");
        assert_eq!(json["name"], "/x");
    }
}
