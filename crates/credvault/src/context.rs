//! Request-scoped context: who is calling, and what the call touched.
//!
//! The vault never persists audit data. It reports the credentials, versions
//! and permission rows a request touched to an [`AuditSink`]; what happens to
//! them afterwards is up to the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use credvault_core::{CredentialId, PermissionData, VersionId};
use credvault_perms::ActorContext;

/// Receives the resources a request touched.
///
/// Calls are fire-and-forget: a sink cannot fail the request.
pub trait AuditSink: Send + Sync {
    /// Replace the recorded resources with this one.
    fn set_resource(&self, name: &str, id: CredentialId);

    /// Replace the recorded versions with this one.
    fn set_version(&self, id: VersionId);

    fn add_resource(&self, name: &str, id: CredentialId);

    fn add_version(&self, id: VersionId);

    fn add_permission(&self, permission: &PermissionData);
}

/// A credential touched by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditedResource {
    pub name: String,
    pub id: CredentialId,
}

#[derive(Debug, Default)]
struct AuditRecord {
    resources: Vec<AuditedResource>,
    versions: Vec<VersionId>,
    permissions: Vec<PermissionData>,
}

/// In-memory [`AuditSink`] collecting one request's audit data.
#[derive(Debug, Default)]
pub struct RequestAudit {
    record: Mutex<AuditRecord>,
}

impl RequestAudit {
    pub fn new() -> Self {
        Self::default()
    }

    // Recovers from a poisoned lock
    fn record(&self) -> MutexGuard<'_, AuditRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resources(&self) -> Vec<AuditedResource> {
        self.record().resources.clone()
    }

    pub fn versions(&self) -> Vec<VersionId> {
        self.record().versions.clone()
    }

    pub fn permissions(&self) -> Vec<PermissionData> {
        self.record().permissions.clone()
    }
}

impl AuditSink for RequestAudit {
    fn set_resource(&self, name: &str, id: CredentialId) {
        let mut record = self.record();
        record.resources.clear();
        record.resources.push(AuditedResource {
            name: name.to_string(),
            id,
        });
    }

    fn set_version(&self, id: VersionId) {
        let mut record = self.record();
        record.versions.clear();
        record.versions.push(id);
    }

    fn add_resource(&self, name: &str, id: CredentialId) {
        self.record().resources.push(AuditedResource {
            name: name.to_string(),
            id,
        });
    }

    fn add_version(&self, id: VersionId) {
        self.record().versions.push(id);
    }

    fn add_permission(&self, permission: &PermissionData) {
        self.record().permissions.push(permission.clone());
    }
}

/// Everything one request carries into the vault.
#[derive(Clone)]
pub struct RequestContext {
    actor: ActorContext,
    audit: Arc<dyn AuditSink>,
}

impl RequestContext {
    /// A context for `actor` with a fresh [`RequestAudit`].
    pub fn new(actor: ActorContext) -> Self {
        Self::with_audit(actor, Arc::new(RequestAudit::new()))
    }

    /// A context for an authenticated actor.
    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self::new(ActorContext::new(actor))
    }

    pub fn with_audit(actor: ActorContext, audit: Arc<dyn AuditSink>) -> Self {
        Self { actor, audit }
    }

    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}
