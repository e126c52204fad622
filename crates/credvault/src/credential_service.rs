//! Credential lifecycle: find, set, generate, regenerate, delete.
//!
//! ## Overview
//!
//! [`CredentialService`] is the permission-checked front of the credential
//! store. Every operation authorizes first, then reads or writes, then reports
//! what it touched to the request's audit sink.
//!
//! ## Write modes
//!
//! `generate` against an existing credential consults the request's
//! [`WriteMode`]: `overwrite` always mints, `no-overwrite` never does, and
//! `converge` mints only when the stored version was generated with
//! different parameters (or, for a CA-signed certificate, when its CA has
//! since been rotated).

use std::sync::Arc;

use credvault_core::{
    normalize_name, CertificateValue, CredentialType, CredentialValue,
    CredentialVersion, GenerationParameters, InvalidAccess, PasswordParameters,
    PermissionOperation, RsaParameters, SshParameters, UserParameters, ValidationError, VersionId,
};
use credvault_crypto::Encryptor;
use credvault_perms::{PermissionChecker, PermissionService};
use credvault_pki::{validate_duration, validate_key_length};
use credvault_store::{CredentialStore, CredentialSummary};

use crate::certificate_authority::{find_active_version, CertificateAuthorityService};
use crate::context::RequestContext;
use crate::error::{Result, VaultError};
use crate::generator::CredentialGenerator;
use crate::request::{GenerateRequest, SetRequest, WriteMode};

/// Derives the parameters a regeneration reuses from the version it replaces.
type Regenerator = fn(&CredentialVersion, &Encryptor) -> Result<GenerationParameters>;

/// Types that can be regenerated. Anything absent is rejected.
const REGENERATORS: &[(CredentialType, Regenerator)] = &[
    (CredentialType::Password, stored_parameters),
    (CredentialType::User, stored_parameters),
    (CredentialType::Ssh, stored_parameters),
    (CredentialType::Rsa, stored_parameters),
    (CredentialType::Certificate, certificate_parameters),
];

/// Permission-checked credential operations.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    permissions: PermissionService,
    encryptor: Encryptor,
    authority: CertificateAuthorityService,
    generator: CredentialGenerator,
    default_password_length: u32,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        permissions: PermissionService,
        encryptor: Encryptor,
        default_password_length: u32,
    ) -> Self {
        let authority = CertificateAuthorityService::new(
            store.clone(),
            permissions.checker().clone(),
            encryptor.clone(),
        );
        Self {
            store,
            permissions,
            encryptor,
            generator: CredentialGenerator::new(authority.clone()),
            authority,
            default_password_length,
        }
    }

    pub fn authority(&self) -> &CertificateAuthorityService {
        &self.authority
    }

    pub(crate) fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub(crate) fn checker(&self) -> &PermissionChecker {
        self.permissions.checker()
    }

    pub(crate) fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Versions of `name`, newest first.
    ///
    /// `versions` caps how many are returned. Requires `read`.
    pub async fn find_by_name(
        &self,
        ctx: &RequestContext,
        name: &str,
        versions: Option<usize>,
    ) -> Result<Vec<CredentialVersion>> {
        let name = normalize_name(name);
        self.checker()
            .check(ctx.actor(), &name, PermissionOperation::Read)
            .await?;

        let records = self.store.find_all_by_name(&name).await?;
        if records.is_empty() {
            return Err(InvalidAccess.into());
        }
        let limit = versions.unwrap_or(records.len());
        let found = records
            .into_iter()
            .take(limit)
            .map(CredentialVersion::decode)
            .collect::<credvault_core::Result<Vec<_>>>()?;

        if let Some(first) = found.first() {
            ctx.audit()
                .set_resource(first.name(), first.credential().id);
        }
        for version in &found {
            ctx.audit().add_version(version.id());
        }
        Ok(found)
    }

    /// The newest version of `name`. Requires `read`.
    pub async fn find_most_recent(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<CredentialVersion> {
        self.find_by_name(ctx, name, Some(1))
            .await?
            .pop()
            .ok_or(VaultError::NotFoundOrForbidden)
    }

    /// One version by id. Requires `read` on its credential.
    pub async fn find_by_id(&self, ctx: &RequestContext, id: &VersionId) -> Result<CredentialVersion> {
        let record = self
            .store
            .find_by_uuid(id)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        self.checker()
            .check(ctx.actor(), &record.credential.name, PermissionOperation::Read)
            .await?;

        let version = CredentialVersion::decode(record)?;
        ctx.audit()
            .set_resource(version.name(), version.credential().id);
        ctx.audit().set_version(version.id());
        Ok(version)
    }

    /// Decrypt a version the caller already holds.
    pub fn reveal(&self, version: &CredentialVersion) -> Result<CredentialValue> {
        Ok(version.value(&self.encryptor)?)
    }

    /// Names under `path`, newest first, limited to what the caller may read.
    pub async fn find_paths(&self, ctx: &RequestContext, path: &str) -> Result<Vec<CredentialSummary>> {
        let mut prefix = normalize_name(path);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let found = self.store.find_names_starting_with(&prefix).await?;
        self.readable(ctx, found).await
    }

    /// Names containing `fragment`, limited to what the caller may read.
    pub async fn find_containing(
        &self,
        ctx: &RequestContext,
        fragment: &str,
    ) -> Result<Vec<CredentialSummary>> {
        let found = self.store.find_names_containing(fragment).await?;
        self.readable(ctx, found).await
    }

    async fn readable(
        &self,
        ctx: &RequestContext,
        found: Vec<CredentialSummary>,
    ) -> Result<Vec<CredentialSummary>> {
        let mut visible = Vec::with_capacity(found.len());
        for summary in found {
            if self
                .checker()
                .has_permission(ctx.actor(), &summary.name, PermissionOperation::Read)
                .await?
            {
                visible.push(summary);
            }
        }
        Ok(visible)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a caller-supplied value as a new version. Requires `write`.
    ///
    /// A certificate naming a CA gets the CA's current certificate filled in
    /// and must have been signed by it. A set certificate is never
    /// transitional; only `update_transitional_version` marks one.
    pub async fn set(&self, ctx: &RequestContext, request: SetRequest) -> Result<CredentialVersion> {
        let SetRequest { name, mut value } = request;
        self.checker()
            .check(ctx.actor(), &name, PermissionOperation::Write)
            .await?;

        if let CredentialValue::Certificate(certificate) = &mut value {
            certificate.transitional = false;
            self.attach_ca(ctx, certificate).await?;
        }

        let existing = self.most_recent(&name).await?;
        let version = CredentialVersion::create_new(
            &name,
            existing.as_ref(),
            value,
            None,
            &self.encryptor,
        )?;
        self.persist(ctx, version, existing.is_none()).await
    }

    /// Generate a value. Requires `write`.
    ///
    /// Returns the existing version when the write mode keeps it.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        request: GenerateRequest,
    ) -> Result<CredentialVersion> {
        let GenerateRequest {
            name,
            credential_type,
            mode,
            parameters,
        } = request;
        self.checker()
            .check(ctx.actor(), &name, PermissionOperation::Write)
            .await?;

        let existing = self.most_recent(&name).await?;
        if let Some(existing) = &existing {
            if existing.credential_type() != credential_type {
                return Err(ValidationError::new("error.type_mismatch").into());
            }
            let keep = match mode {
                WriteMode::Overwrite => false,
                WriteMode::NoOverwrite => true,
                WriteMode::Converge => self.converged(ctx, existing, parameters.as_ref()).await?,
            };
            if keep {
                tracing::debug!(name = %name, ?mode, "kept existing version");
                ctx.audit()
                    .set_resource(existing.name(), existing.credential().id);
                ctx.audit().set_version(existing.id());
                return Ok(existing.clone());
            }
        }

        let parameters = self.resolve_parameters(credential_type, parameters)?;
        self.mint(ctx, &name, existing.as_ref(), parameters, false)
            .await
    }

    /// Generate a new version with the parameters of the current one.
    /// Requires `write`.
    pub async fn regenerate(&self, ctx: &RequestContext, name: &str) -> Result<CredentialVersion> {
        self.regenerate_as(ctx, name, false).await
    }

    pub(crate) async fn regenerate_as(
        &self,
        ctx: &RequestContext,
        name: &str,
        transitional: bool,
    ) -> Result<CredentialVersion> {
        let name = normalize_name(name);
        self.checker()
            .check(ctx.actor(), &name, PermissionOperation::Write)
            .await?;

        let base = find_active_version(self.store.as_ref(), &name)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        let parameters = regeneration_parameters(&base, &self.encryptor)?;
        self.mint(ctx, &name, Some(&base), parameters, transitional)
            .await
    }

    /// Delete a credential with every version and permission row.
    /// Requires `delete`.
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        let name = normalize_name(name);
        self.checker()
            .check(ctx.actor(), &name, PermissionOperation::Delete)
            .await?;

        let credential = self
            .store
            .find_credential(&name)
            .await?
            .ok_or(VaultError::NotFoundOrForbidden)?;
        self.store.delete_credential(&name).await?;
        let revoked = self.permissions.delete_for_path(&name).await?;

        ctx.audit().set_resource(&credential.name, credential.id);
        tracing::info!(name = %name, id = %credential.id, revoked, "deleted credential");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared with the certificate service
    // ─────────────────────────────────────────────────────────────────────────

    /// Fill in `ca` from the named CA's active version, then re-check the
    /// value.
    pub(crate) async fn attach_ca(
        &self,
        ctx: &RequestContext,
        certificate: &mut CertificateValue,
    ) -> Result<()> {
        let Some(ca_name) = certificate.ca_name.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(());
        };
        let ca = self
            .authority
            .find_active_version(ctx.actor(), ca_name)
            .await?;
        certificate.ca_name = Some(ca.meta.credential.name.clone());
        certificate.ca = Some(ca.certificate);
        CredentialValue::Certificate(certificate.clone()).validate()?;
        Ok(())
    }

    /// Save a version and report it.
    ///
    /// A version that creates its credential grants the caller everything
    /// on it.
    pub(crate) async fn persist(
        &self,
        ctx: &RequestContext,
        version: CredentialVersion,
        created: bool,
    ) -> Result<CredentialVersion> {
        self.store.save(&version.to_record()).await?;
        if created {
            self.permissions
                .grant_creator(ctx.actor(), version.name())
                .await?;
        }

        ctx.audit()
            .set_resource(version.name(), version.credential().id);
        ctx.audit().set_version(version.id());
        tracing::info!(
            name = version.name(),
            version = %version.id(),
            credential_type = %version.credential_type(),
            created,
            "saved credential version"
        );
        Ok(version)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn most_recent(&self, name: &str) -> Result<Option<CredentialVersion>> {
        let record = self.store.find_most_recent(name).await?;
        Ok(record.map(CredentialVersion::decode).transpose()?)
    }

    async fn converged(
        &self,
        ctx: &RequestContext,
        existing: &CredentialVersion,
        parameters: Option<&GenerationParameters>,
    ) -> Result<bool> {
        if !existing.matches_generation_parameters(parameters, &self.encryptor)? {
            return Ok(false);
        }

        let Some(certificate) = existing.as_certificate() else {
            return Ok(true);
        };
        let Some(ca_name) = certificate.ca_name.as_deref() else {
            return Ok(true);
        };
        let ca = self
            .authority
            .find_active_version(ctx.actor(), ca_name)
            .await?;
        let ca_reader = ca.reader()?;
        let reader = certificate.reader()?;
        Ok(reader.authority_key_identifier() == ca_reader.subject_key_identifier())
    }

    fn resolve_parameters(
        &self,
        credential_type: CredentialType,
        parameters: Option<GenerationParameters>,
    ) -> Result<GenerationParameters> {
        if let Some(parameters) = parameters {
            return Ok(parameters);
        }
        let password = PasswordParameters::with_length(self.default_password_length);
        let parameters = match credential_type {
            CredentialType::Password => GenerationParameters::Password(password),
            CredentialType::User => GenerationParameters::User(UserParameters {
                username: None,
                password,
            }),
            CredentialType::Ssh => GenerationParameters::Ssh(SshParameters::default()),
            CredentialType::Rsa => GenerationParameters::Rsa(RsaParameters::default()),
            CredentialType::Certificate => {
                return Err(ValidationError::new("error.missing_certificate_parameters").into())
            }
            CredentialType::Value | CredentialType::Json => {
                return Err(ValidationError::with_detail("error.invalid_type", credential_type).into())
            }
        };
        Ok(parameters)
    }

    async fn mint(
        &self,
        ctx: &RequestContext,
        name: &str,
        previous: Option<&CredentialVersion>,
        parameters: GenerationParameters,
        transitional: bool,
    ) -> Result<CredentialVersion> {
        let mut value = self.generator.generate(ctx.actor(), &parameters).await?;
        if let CredentialValue::Certificate(certificate) = &mut value {
            certificate.transitional = transitional;
        }
        let version = CredentialVersion::create_new(
            name,
            previous,
            value,
            Some(&parameters),
            &self.encryptor,
        )?;
        self.persist(ctx, version, previous.is_none()).await
    }
}

fn regeneration_parameters(
    version: &CredentialVersion,
    encryptor: &Encryptor,
) -> Result<GenerationParameters> {
    let regenerator = REGENERATORS
        .iter()
        .find(|(credential_type, _)| *credential_type == version.credential_type())
        .map(|(_, regenerator)| *regenerator)
        .ok_or_else(not_regeneratable)?;
    let parameters = regenerator(version, encryptor)?;
    check_key_parameters(&parameters)?;
    Ok(parameters)
}

/// Parameters read back from a stored key or certificate must still be
/// ones a generate request would accept.
fn check_key_parameters(parameters: &GenerationParameters) -> Result<()> {
    match parameters {
        GenerationParameters::Certificate(p) => {
            validate_key_length(p.key_length)?;
            validate_duration(p.duration)?;
        }
        GenerationParameters::Ssh(SshParameters { key_length, .. })
        | GenerationParameters::Rsa(RsaParameters { key_length }) => {
            validate_key_length(*key_length)?;
        }
        GenerationParameters::Password(_) | GenerationParameters::User(_) => {}
    }
    Ok(())
}

fn stored_parameters(version: &CredentialVersion, encryptor: &Encryptor) -> Result<GenerationParameters> {
    version
        .generation_parameters(encryptor)?
        .ok_or_else(not_regeneratable)
}

fn certificate_parameters(
    version: &CredentialVersion,
    encryptor: &Encryptor,
) -> Result<GenerationParameters> {
    if let Some(certificate) = version.as_certificate() {
        if !certificate.self_signed && certificate.ca_name.is_none() {
            return Err(
                ValidationError::new("error.cannot_regenerate_non_generated_certificate").into(),
            );
        }
    }
    stored_parameters(version, encryptor)
}

fn not_regeneratable() -> VaultError {
    ValidationError::new("error.cannot_regenerate_non_generated_credential").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use credvault_crypto::{EncryptionKey, EncryptionKeyId, KeySet};
    use credvault_pki::{CertificateGenerationParameters, CertificateSigner};

    fn encryptor() -> Encryptor {
        Encryptor::internal(KeySet::single(EncryptionKey::generate(EncryptionKeyId::new())))
    }

    fn imported(params: &CertificateGenerationParameters, encryptor: &Encryptor) -> CredentialVersion {
        let generated = CertificateSigner::new().generate(params, None).unwrap();
        let value = CertificateValue {
            ca: None,
            ca_name: None,
            certificate: generated.certificate,
            private_key: Some(generated.private_key),
            transitional: false,
            generated: false,
        };
        CredentialVersion::create_new(
            "/imported",
            None,
            CredentialValue::Certificate(value),
            None,
            encryptor,
        )
        .unwrap()
    }

    #[test]
    fn test_regenerate_rejects_overlong_duration() {
        let encryptor = encryptor();
        let mut params = CertificateGenerationParameters::self_signed_ca("long-lived");
        params.duration = 4000;
        let version = imported(&params, &encryptor);

        let err = regeneration_parameters(&version, &encryptor).unwrap_err();
        assert!(matches!(err, VaultError::Validation(v) if v.code == "error.invalid_duration"));
    }

    #[test]
    fn test_regenerate_rejects_short_key() {
        let encryptor = encryptor();
        let mut params = CertificateGenerationParameters::self_signed_ca("weak");
        params.key_length = 1024;
        let version = imported(&params, &encryptor);

        let err = regeneration_parameters(&version, &encryptor).unwrap_err();
        assert!(matches!(err, VaultError::Validation(v) if v.code == "error.invalid_key_length"));
    }

    #[test]
    fn test_regenerate_accepts_default_certificate() {
        let encryptor = encryptor();
        let params = CertificateGenerationParameters::self_signed_ca("fine");
        let version = imported(&params, &encryptor);

        let parameters = regeneration_parameters(&version, &encryptor).unwrap();
        assert!(matches!(
            parameters,
            GenerationParameters::Certificate(p) if p.duration == params.duration && p.key_length == params.key_length
        ));
    }
}
