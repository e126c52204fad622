//! Certificate authority lookup.

use std::sync::Arc;

use credvault_core::{
    normalize_name, CertificateVersion, CredentialVersion, InvalidAccess, PermissionOperation,
    ValidationError,
};
use credvault_crypto::Encryptor;
use credvault_perms::{ActorContext, PermissionChecker};
use credvault_store::CredentialStore;

use crate::error::{Result, VaultError};

/// The certificate and key a CA signs with.
#[derive(Clone)]
pub struct SigningMaterial {
    /// The CA's canonical name.
    pub ca_name: String,
    pub certificate: String,
    pub private_key: String,
}

impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("ca_name", &self.ca_name)
            .finish_non_exhaustive()
    }
}

/// Resolves a CA name to the version that currently signs for it.
#[derive(Clone)]
pub struct CertificateAuthorityService {
    store: Arc<dyn CredentialStore>,
    checker: PermissionChecker,
    encryptor: Encryptor,
}

impl CertificateAuthorityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        checker: PermissionChecker,
        encryptor: Encryptor,
    ) -> Self {
        Self {
            store,
            checker,
            encryptor,
        }
    }

    /// The active version of the CA called `ca_name`.
    ///
    /// Requires `read` on the CA. A missing credential, a non-certificate and
    /// a certificate without the CA flag are all [`VaultError::NotFoundOrForbidden`].
    pub async fn find_active_version(
        &self,
        ctx: &ActorContext,
        ca_name: &str,
    ) -> Result<CertificateVersion> {
        let name = normalize_name(ca_name);
        self.checker
            .check(ctx, &name, PermissionOperation::Read)
            .await?;

        let version = match find_active_version(self.store.as_ref(), &name).await? {
            Some(CredentialVersion::Certificate(version)) => version,
            _ => return Err(InvalidAccess.into()),
        };
        if !version.reader()?.is_ca() {
            tracing::debug!(ca = %name, "named credential is not a certificate authority");
            return Err(InvalidAccess.into());
        }
        Ok(version)
    }

    /// The active CA certificate and its decrypted private key.
    pub async fn signing_material(
        &self,
        ctx: &ActorContext,
        ca_name: &str,
    ) -> Result<SigningMaterial> {
        let version = self.find_active_version(ctx, ca_name).await?;
        let private_key = version.private_key(&self.encryptor)?.ok_or_else(|| {
            VaultError::Validation(ValidationError::with_detail(
                "error.ca_missing_private_key",
                version.meta.credential.name.as_str(),
            ))
        })?;
        Ok(SigningMaterial {
            ca_name: version.meta.credential.name.clone(),
            certificate: version.certificate,
            private_key,
        })
    }
}

/// The newest version of `name` that is not transitional.
///
/// Only certificate versions can be transitional, so for every other type
/// this is simply the most recent version.
pub(crate) async fn find_active_version(
    store: &dyn CredentialStore,
    name: &str,
) -> Result<Option<CredentialVersion>> {
    let records = store.find_all_by_name(name).await?;
    let active = records.into_iter().find(|r| !r.transitional);
    Ok(active.map(CredentialVersion::decode).transpose()?)
}
