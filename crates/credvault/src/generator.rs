//! Value generation for the generatable credential types.
//!
//! Key and certificate generation is CPU-bound and runs on the blocking pool.

use credvault_core::{
    normalize_name, CertificateValue, CredentialValue, GenerationParameters, KeyPairValue,
    PasswordParameters, RsaParameters, SshParameters, UserParameters, UserValue,
};
use credvault_perms::ActorContext;
use credvault_pki::{
    CertificateAuthority, CertificateGenerationParameters, CertificateReader, CertificateSigner,
    RsaKeyPair,
};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::certificate_authority::{CertificateAuthorityService, SigningMaterial};
use crate::error::Result;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const HEX: &[u8] = b"0123456789abcdef";

/// Length of a generated username.
pub const USERNAME_LENGTH: usize = 20;

/// Produces plaintext values from generation parameters.
#[derive(Clone)]
pub struct CredentialGenerator {
    authority: CertificateAuthorityService,
    signer: CertificateSigner,
}

impl CredentialGenerator {
    pub fn new(authority: CertificateAuthorityService) -> Self {
        Self {
            authority,
            signer: CertificateSigner::new(),
        }
    }

    /// Generate a value for `params`.
    ///
    /// A CA-signed certificate needs `read` on its CA.
    pub async fn generate(
        &self,
        ctx: &ActorContext,
        params: &GenerationParameters,
    ) -> Result<CredentialValue> {
        let value = match params {
            GenerationParameters::Password(p) => CredentialValue::Password(generate_password(p)),
            GenerationParameters::User(p) => CredentialValue::User(generate_user(p)),
            GenerationParameters::Ssh(p) => CredentialValue::Ssh(generate_ssh(p.clone()).await?),
            GenerationParameters::Rsa(p) => CredentialValue::Rsa(generate_rsa(p.clone()).await?),
            GenerationParameters::Certificate(p) => {
                CredentialValue::Certificate(self.generate_certificate(ctx, p).await?)
            }
        };
        Ok(value)
    }

    async fn generate_certificate(
        &self,
        ctx: &ActorContext,
        params: &CertificateGenerationParameters,
    ) -> Result<CertificateValue> {
        let signer = self.signer;
        let owned = params.clone();

        let value = match params.ca_name.as_deref() {
            Some(ca_name) if !params.self_signed => {
                let SigningMaterial {
                    ca_name,
                    certificate: issuer,
                    private_key,
                } = self.authority.signing_material(ctx, ca_name).await?;
                let issuer_pem = issuer.clone();
                let generated = tokio::task::spawn_blocking(move || {
                    signer.generate(
                        &owned,
                        Some(&CertificateAuthority {
                            certificate: &issuer_pem,
                            private_key: &private_key,
                        }),
                    )
                })
                .await??;
                CertificateValue {
                    ca: Some(issuer),
                    ca_name: Some(normalize_name(&ca_name)),
                    certificate: generated.certificate,
                    private_key: Some(generated.private_key),
                    transitional: false,
                    generated: true,
                }
            }
            _ => {
                let generated =
                    tokio::task::spawn_blocking(move || signer.generate(&owned, None)).await??;
                CertificateValue {
                    ca: None,
                    ca_name: None,
                    certificate: generated.certificate,
                    private_key: Some(generated.private_key),
                    transitional: false,
                    generated: true,
                }
            }
        };

        if let Ok(reader) = CertificateReader::from_pem(&value.certificate) {
            tracing::info!(
                subject = %params.subject,
                serial = %hex::encode(reader.serial()),
                ca = ?value.ca_name,
                is_ca = params.is_ca,
                "issued certificate"
            );
        }
        Ok(value)
    }
}

/// Generate a random password.
///
/// Every included character class contributes at least one character.
pub fn generate_password(params: &PasswordParameters) -> String {
    let classes: Vec<&[u8]> = if params.only_hex {
        vec![HEX]
    } else {
        let mut classes = Vec::with_capacity(4);
        if !params.exclude_upper {
            classes.push(UPPER);
        }
        if !params.exclude_lower {
            classes.push(LOWER);
        }
        if !params.exclude_number {
            classes.push(DIGITS);
        }
        if params.include_special {
            classes.push(SPECIAL);
        }
        classes
    };
    let alphabet: Vec<u8> = classes.concat();
    if alphabet.is_empty() {
        return String::new();
    }

    let mut rng = rand::thread_rng();
    let length = params.length as usize;
    let mut chars: Vec<u8> = classes
        .iter()
        .take(length)
        .filter_map(|class| class.choose(&mut rng).copied())
        .collect();
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// Generate a random username of letters only.
pub fn generate_username() -> String {
    let letters = [UPPER, LOWER].concat();
    let mut rng = rand::thread_rng();
    (0..USERNAME_LENGTH)
        .map(|_| char::from(letters[rng.gen_range(0..letters.len())]))
        .collect()
}

fn generate_user(params: &UserParameters) -> UserValue {
    UserValue {
        username: Some(
            params
                .username
                .clone()
                .unwrap_or_else(generate_username),
        ),
        password: generate_password(&params.password),
        salt: None,
    }
}

async fn generate_ssh(params: SshParameters) -> Result<KeyPairValue> {
    let pair = tokio::task::spawn_blocking(move || -> credvault_pki::Result<KeyPairValue> {
        let key = RsaKeyPair::generate(params.key_length)?;
        Ok(KeyPairValue {
            public_key: Some(key.ssh_public_key(params.comment())),
            private_key: Some(key.private_key_pem()?),
        })
    })
    .await??;
    Ok(pair)
}

async fn generate_rsa(params: RsaParameters) -> Result<KeyPairValue> {
    let pair = tokio::task::spawn_blocking(move || -> credvault_pki::Result<KeyPairValue> {
        let key = RsaKeyPair::generate(params.key_length)?;
        Ok(KeyPairValue {
            public_key: Some(key.public_key_pem()?),
            private_key: Some(key.private_key_pem()?),
        })
    })
    .await??;
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_in(password: &str, class: &[u8]) -> usize {
        password.bytes().filter(|b| class.contains(b)).count()
    }

    #[test]
    fn test_password_default_classes() {
        let password = generate_password(&PasswordParameters::default());
        assert_eq!(password.len(), 30);
        assert!(count_in(&password, UPPER) > 0);
        assert!(count_in(&password, LOWER) > 0);
        assert!(count_in(&password, DIGITS) > 0);
        assert_eq!(count_in(&password, SPECIAL), 0);
    }

    #[test]
    fn test_password_every_class_present_at_minimum_length() {
        let params = PasswordParameters {
            length: 4,
            include_special: true,
            ..Default::default()
        };
        for _ in 0..50 {
            let password = generate_password(&params);
            assert_eq!(password.len(), 4);
            assert_eq!(count_in(&password, UPPER), 1);
            assert_eq!(count_in(&password, LOWER), 1);
            assert_eq!(count_in(&password, DIGITS), 1);
            assert_eq!(count_in(&password, SPECIAL), 1);
        }
    }

    #[test]
    fn test_password_exclusions() {
        let params = PasswordParameters {
            length: 64,
            exclude_upper: true,
            exclude_number: true,
            ..Default::default()
        };
        let password = generate_password(&params);
        assert_eq!(count_in(&password, LOWER), 64);
    }

    #[test]
    fn test_password_only_hex() {
        let params = PasswordParameters {
            length: 40,
            only_hex: true,
            include_special: true,
            ..Default::default()
        };
        let password = generate_password(&params);
        assert!(password.bytes().all(|b| HEX.contains(&b)));
    }

    #[test]
    fn test_username() {
        let name = generate_username();
        assert_eq!(name.len(), USERNAME_LENGTH);
        assert!(name.chars().all(|c| c.is_ascii_alphabetic()));
        assert_ne!(name, generate_username());
    }

    #[test]
    fn test_user_keeps_given_username() {
        let params = UserParameters {
            username: Some("admin".into()),
            password: PasswordParameters::with_length(12),
        };
        let user = generate_user(&params);
        assert_eq!(user.username.as_deref(), Some("admin"));
        assert_eq!(user.password.len(), 12);
        assert!(user.salt.is_none());
    }

    #[tokio::test]
    async fn test_ssh_comment() {
        let params = SshParameters {
            key_length: 2048,
            ssh_comment: Some("me@host".into()),
        };
        let pair = generate_ssh(params).await.unwrap();
        let public = pair.public_key.unwrap();
        assert!(public.starts_with("ssh-rsa "));
        assert!(public.ends_with(" me@host"));
        assert!(pair.private_key.unwrap().contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn test_rsa_pem() {
        let pair = generate_rsa(RsaParameters::default()).await.unwrap();
        assert!(pair.public_key.unwrap().contains("BEGIN PUBLIC KEY"));
    }
}
