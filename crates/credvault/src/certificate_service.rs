//! Certificate-specific operations: versions, transitional rotation and
//! bulk regeneration of everything a CA signed.

use std::collections::{HashSet, VecDeque};

use credvault_core::{
    normalize_name, CertificateValue, Credential, CredentialId, CredentialValue,
    CredentialVersion, CertificateVersion, InvalidAccess, PermissionOperation, ValidationError,
    VersionId,
};

use crate::certificate_authority::find_active_version;
use crate::context::RequestContext;
use crate::credential_service::CredentialService;
use crate::error::{Result, VaultError, TOO_MANY_TRANSITIONAL_VERSIONS};

/// Permission-checked certificate operations.
///
/// Certificates are addressed by credential id here, not by name.
#[derive(Clone)]
pub struct CertificateService {
    credentials: CredentialService,
}

impl CertificateService {
    pub fn new(credentials: CredentialService) -> Self {
        Self { credentials }
    }

    /// Every certificate credential the caller may read.
    pub async fn get_all_certificates(&self, ctx: &RequestContext) -> Result<Vec<Credential>> {
        let all = self.credentials.store().find_all_certificates().await?;
        let mut visible = Vec::with_capacity(all.len());
        for credential in all {
            if self
                .credentials
                .checker()
                .has_permission(ctx.actor(), &credential.name, PermissionOperation::Read)
                .await?
            {
                ctx.audit().add_resource(&credential.name, credential.id);
                visible.push(credential);
            }
        }
        Ok(visible)
    }

    /// The certificate credential called `name`. Requires `read`.
    pub async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<Credential> {
        let name = normalize_name(name);
        self.credentials
            .checker()
            .check(ctx.actor(), &name, PermissionOperation::Read)
            .await?;

        let credential = self
            .credentials
            .store()
            .find_credential(&name)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        self.versions_of(&credential).await?;
        ctx.audit().set_resource(&credential.name, credential.id);
        Ok(credential)
    }

    /// Versions of a certificate, newest first.
    ///
    /// With `current_only` just the active version and the transitional one,
    /// if any. Requires `read`.
    pub async fn get_versions(
        &self,
        ctx: &RequestContext,
        id: &CredentialId,
        current_only: bool,
    ) -> Result<Vec<CertificateVersion>> {
        let credential = self
            .authorized(ctx, id, PermissionOperation::Read)
            .await?;
        let versions = self.versions_of(&credential).await?;
        let versions = if current_only {
            current(versions)
        } else {
            versions
        };

        ctx.audit().set_resource(&credential.name, credential.id);
        for version in &versions {
            ctx.audit().add_version(version.meta.id);
        }
        Ok(versions)
    }

    /// Delete one version. Requires `delete`.
    ///
    /// The last remaining version cannot be deleted.
    pub async fn delete_version(
        &self,
        ctx: &RequestContext,
        id: &CredentialId,
        version_id: &VersionId,
    ) -> Result<CertificateVersion> {
        let credential = self
            .authorized(ctx, id, PermissionOperation::Delete)
            .await?;
        let versions = self.versions_of(&credential).await?;
        let target = versions
            .iter()
            .find(|v| v.meta.id == *version_id)
            .cloned()
            .ok_or(VaultError::NotFoundOrForbidden)?;
        if versions.len() == 1 {
            return Err(
                ValidationError::new("error.credential.cannot_delete_last_version").into(),
            );
        }

        self.credentials.store().delete_version(version_id).await?;
        ctx.audit().set_resource(&credential.name, credential.id);
        ctx.audit().set_version(target.meta.id);
        tracing::info!(name = %credential.name, version = %version_id, "deleted certificate version");
        Ok(target)
    }

    /// Add a caller-supplied version. Requires `write`.
    ///
    /// At most one version may be transitional.
    pub async fn create_version(
        &self,
        ctx: &RequestContext,
        id: &CredentialId,
        mut value: CertificateValue,
        transitional: bool,
    ) -> Result<CertificateVersion> {
        let credential = self
            .authorized(ctx, id, PermissionOperation::Write)
            .await?;
        let versions = self.versions_of(&credential).await?;
        if transitional && versions.iter().any(|v| v.transitional) {
            return Err(VaultError::Conflict(TOO_MANY_TRANSITIONAL_VERSIONS.to_string()));
        }

        value.transitional = transitional;
        self.credentials.attach_ca(ctx, &mut value).await?;
        let value = CredentialValue::Certificate(value);
        value.validate()?;

        let previous = versions
            .into_iter()
            .next()
            .map(CredentialVersion::Certificate);
        let version = CredentialVersion::create_new(
            &credential.name,
            previous.as_ref(),
            value,
            None,
            self.credentials.encryptor(),
        )?;
        let version = self.credentials.persist(ctx, version, false).await?;
        into_certificate(version)
    }

    /// Mark `version_id` as the transitional version, or clear the flag with
    /// `None`. Requires `write`.
    ///
    /// Returns the current versions afterwards.
    pub async fn update_transitional_version(
        &self,
        ctx: &RequestContext,
        id: &CredentialId,
        version_id: Option<&VersionId>,
    ) -> Result<Vec<CertificateVersion>> {
        let credential = self
            .authorized(ctx, id, PermissionOperation::Write)
            .await?;
        let mut versions = self.versions_of(&credential).await?;

        if let Some(version_id) = version_id {
            if !versions.iter().any(|v| v.meta.id == *version_id) {
                return Err(ValidationError::with_detail(
                    "error.version_not_in_credential",
                    version_id,
                )
                .into());
            }
            if versions
                .iter()
                .any(|v| v.transitional && v.meta.id != *version_id)
            {
                return Err(VaultError::Conflict(TOO_MANY_TRANSITIONAL_VERSIONS.to_string()));
            }
        }

        for version in &mut versions {
            let wanted = Some(&version.meta.id) == version_id;
            if version.transitional != wanted {
                version.transitional = wanted;
                let record = CredentialVersion::Certificate(version.clone()).to_record();
                self.credentials.store().save(&record).await?;
                ctx.audit().add_version(version.meta.id);
            }
        }

        ctx.audit().set_resource(&credential.name, credential.id);
        tracing::info!(
            name = %credential.name,
            transitional = ?version_id,
            "updated transitional version"
        );
        Ok(current(versions))
    }

    /// Regenerate the certificate called `name`, optionally as the
    /// transitional version. Requires `write`.
    pub async fn regenerate(
        &self,
        ctx: &RequestContext,
        name: &str,
        set_as_transitional: bool,
    ) -> Result<CertificateVersion> {
        let name = normalize_name(name);
        self.credentials
            .checker()
            .check(ctx.actor(), &name, PermissionOperation::Write)
            .await?;
        let credential = self
            .credentials
            .store()
            .find_credential(&name)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        let versions = self.versions_of(&credential).await?;
        if set_as_transitional && versions.iter().any(|v| v.transitional) {
            return Err(VaultError::Conflict(TOO_MANY_TRANSITIONAL_VERSIONS.to_string()));
        }

        let version = self
            .credentials
            .regenerate_as(ctx, &credential.name, set_as_transitional)
            .await?;
        into_certificate(version)
    }

    /// Regenerate every certificate whose active version `signed_by` signed,
    /// then everything the regenerated CAs signed, and so on.
    ///
    /// Requires `read` on `signed_by` and `write` on every certificate it
    /// signed; the whole level is authorized before anything is written.
    /// Returns the regenerated names in order.
    pub async fn bulk_regenerate(
        &self,
        ctx: &RequestContext,
        signed_by: &str,
    ) -> Result<Vec<String>> {
        let mut regenerated = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = VecDeque::from([normalize_name(signed_by)]);

        while let Some(ca_name) = pending.pop_front() {
            if !visited.insert(ca_name.clone()) {
                continue;
            }
            self.credentials
                .authority()
                .find_active_version(ctx.actor(), &ca_name)
                .await?;

            let signed = self.signed_by(&ca_name).await?;
            for name in &signed {
                self.credentials
                    .checker()
                    .check(ctx.actor(), name, PermissionOperation::Write)
                    .await?;
            }

            for name in signed {
                let version = self.credentials.regenerate_as(ctx, &name, false).await?;
                let is_ca = version
                    .as_certificate()
                    .is_some_and(|c| c.certificate_authority);
                ctx.audit().add_resource(version.name(), version.credential().id);
                regenerated.push(name.clone());
                if is_ca {
                    pending.push_back(name);
                }
            }
        }

        tracing::info!(
            signed_by = %normalize_name(signed_by),
            count = regenerated.len(),
            "bulk regenerated certificates"
        );
        Ok(regenerated)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// The credential `id`, if the caller may perform `op` on it.
    async fn authorized(
        &self,
        ctx: &RequestContext,
        id: &CredentialId,
        op: PermissionOperation,
    ) -> Result<Credential> {
        let credential = self
            .credentials
            .store()
            .find_credential_by_id(id)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        self.credentials
            .checker()
            .check(ctx.actor(), &credential.name, op)
            .await?;
        Ok(credential)
    }

    /// Every version of a certificate credential, newest first.
    ///
    /// A credential of another type is reported as missing.
    async fn versions_of(&self, credential: &Credential) -> Result<Vec<CertificateVersion>> {
        let records = self
            .credentials
            .store()
            .find_all_by_credential_id(&credential.id)
            .await?;
        records
            .into_iter()
            .map(|record| into_certificate(CredentialVersion::decode(record)?))
            .collect()
    }

    /// Names of certificates whose active version names `ca_name` as CA.
    async fn signed_by(&self, ca_name: &str) -> Result<Vec<String>> {
        let store = self.credentials.store();
        let candidates = store.find_all_certificates_by_ca_name(ca_name).await?;
        let mut names = Vec::with_capacity(candidates.len());
        for credential in candidates {
            if credential.name == ca_name {
                continue;
            }
            let active = find_active_version(store.as_ref(), &credential.name).await?;
            let signed = active
                .as_ref()
                .and_then(CredentialVersion::as_certificate)
                .is_some_and(|c| c.ca_name.as_deref() == Some(ca_name));
            if signed {
                names.push(credential.name);
            }
        }
        Ok(names)
    }
}

/// The active version and the transitional one, newest first.
fn current(versions: Vec<CertificateVersion>) -> Vec<CertificateVersion> {
    let active = versions.iter().position(|v| !v.transitional);
    let transitional = versions.iter().position(|v| v.transitional);
    versions
        .into_iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) == active || Some(*i) == transitional)
        .map(|(_, v)| v)
        .collect()
}

fn into_certificate(version: CredentialVersion) -> Result<CertificateVersion> {
    match version {
        CredentialVersion::Certificate(certificate) => Ok(certificate),
        _ => Err(InvalidAccess.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_core::{SimpleVersion, VersionMeta};
    use credvault_crypto::EncryptedValue;

    fn version(transitional: bool) -> CertificateVersion {
        CertificateVersion {
            meta: VersionMeta {
                id: VersionId::new(),
                credential: Credential::new("/c"),
                created_at: 0,
            },
            ca: None,
            ca_name: None,
            certificate: String::new(),
            encrypted_private_key: EncryptedValue::empty(),
            transitional,
            certificate_authority: false,
            self_signed: true,
            generated: true,
            expiry_date: None,
        }
    }

    #[test]
    fn test_current_keeps_active_and_transitional() {
        let versions = vec![version(false), version(true), version(false)];
        let ids: Vec<_> = versions.iter().map(|v| v.meta.id).collect();

        let kept: Vec<_> = current(versions).iter().map(|v| v.meta.id).collect();
        assert_eq!(kept, vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_current_active_behind_transitional() {
        let versions = vec![version(true), version(false), version(false)];
        let ids: Vec<_> = versions.iter().map(|v| v.meta.id).collect();

        let kept: Vec<_> = current(versions).iter().map(|v| v.meta.id).collect();
        assert_eq!(kept, vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_non_certificate_is_invalid_access() {
        let value = CredentialVersion::Value(SimpleVersion {
            meta: version(false).meta,
            encrypted_value: EncryptedValue::empty(),
        });
        assert!(matches!(
            into_certificate(value),
            Err(VaultError::NotFoundOrForbidden)
        ));
    }
}
