//! RSA key pairs and their SSH encodings.
//!
//! Private keys are emitted as PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`), public
//! keys as SubjectPublicKeyInfo PEM (`BEGIN PUBLIC KEY`) or as an OpenSSH
//! `ssh-rsa` line.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{PkiError, Result};

const SSH_RSA: &str = "ssh-rsa";

/// An RSA key pair.
#[derive(Clone)]
pub struct RsaKeyPair {
    private: RsaPrivateKey,
}

impl RsaKeyPair {
    /// Generate a fresh key pair with a modulus of `bits` bits.
    ///
    /// This is CPU-heavy; async callers should run it on a blocking thread.
    pub fn generate(bits: u32) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits as usize)
            .map_err(|e| PkiError::KeyGeneration(e.to_string()))?;
        tracing::debug!(bits, "generated rsa key pair");
        Ok(Self { private })
    }

    /// Parse a PKCS#1 or PKCS#8 private key PEM.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| PkiError::InvalidKey(e.to_string()))?;
        Ok(Self { private })
    }

    /// Modulus length in bits.
    pub fn key_length(&self) -> u32 {
        self.private.n().bits() as u32
    }

    /// Big-endian modulus bytes, without leading zeros.
    pub fn modulus(&self) -> Vec<u8> {
        self.private.n().to_bytes_be()
    }

    /// The private key as PKCS#1 PEM.
    pub fn private_key_pem(&self) -> Result<String> {
        let pem = self
            .private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| PkiError::Encoding(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// The private key as PKCS#8 PEM.
    pub(crate) fn private_key_pkcs8_pem(&self) -> Result<String> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PkiError::Encoding(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// The public key as SubjectPublicKeyInfo PEM.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PkiError::Encoding(e.to_string()))
    }

    /// The PKCS#1 `RSAPublicKey` DER, i.e. the subjectPublicKey bit string
    /// of a certificate carrying this key.
    pub fn public_key_pkcs1_der(&self) -> Result<Vec<u8>> {
        let der = self
            .public_key()
            .to_pkcs1_der()
            .map_err(|e| PkiError::Encoding(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }

    /// The public key as an OpenSSH `ssh-rsa` line.
    pub fn ssh_public_key(&self, comment: Option<&str>) -> String {
        let public = self.public_key();
        let mut blob = Vec::new();
        write_ssh_string(&mut blob, SSH_RSA.as_bytes());
        write_ssh_mpint(&mut blob, &public.e().to_bytes_be());
        write_ssh_mpint(&mut blob, &public.n().to_bytes_be());

        let encoded = STANDARD.encode(blob);
        match comment.filter(|c| !c.is_empty()) {
            Some(comment) => format!("{} {} {}", SSH_RSA, encoded, comment),
            None => format!("{} {}", SSH_RSA, encoded),
        }
    }

    pub(crate) fn to_rcgen(&self) -> Result<rcgen::KeyPair> {
        let pem = self.private_key_pkcs8_pem()?;
        rcgen::KeyPair::from_pem(&pem).map_err(|e| PkiError::InvalidKey(e.to_string()))
    }

    fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("key_length", &self.key_length())
            .finish_non_exhaustive()
    }
}

/// Modulus length of a SubjectPublicKeyInfo PEM public key.
pub fn rsa_public_key_length(pem: &str) -> Result<u32> {
    let public =
        RsaPublicKey::from_public_key_pem(pem).map_err(|e| PkiError::InvalidKey(e.to_string()))?;
    Ok(public.n().bits() as u32)
}

/// Modulus length of an OpenSSH `ssh-rsa` public key line.
pub fn ssh_key_length(public_key: &str) -> Result<u32> {
    let blob = ssh_blob(public_key)?;
    let mut reader = SshReader { data: &blob };

    let key_type = reader.read_string()?;
    if key_type != SSH_RSA.as_bytes() {
        return Err(PkiError::InvalidKey("not an ssh-rsa key".into()));
    }
    let _exponent = reader.read_string()?;
    let modulus = reader.read_string()?;

    let modulus = strip_leading_zeros(modulus);
    let Some(first) = modulus.first() else {
        return Err(PkiError::InvalidKey("empty ssh-rsa modulus".into()));
    };
    Ok((modulus.len() as u32 - 1) * 8 + (8 - first.leading_zeros()))
}

/// SHA-256 fingerprint of an OpenSSH public key, as OpenSSH prints it.
pub fn ssh_fingerprint(public_key: &str) -> Result<String> {
    let blob = ssh_blob(public_key)?;
    Ok(format!(
        "SHA256:{}",
        STANDARD_NO_PAD.encode(Sha256::digest(&blob))
    ))
}

fn ssh_blob(public_key: &str) -> Result<Vec<u8>> {
    let mut parts = public_key.split_whitespace();
    let (Some(kind), Some(body)) = (parts.next(), parts.next()) else {
        return Err(PkiError::InvalidKey("malformed ssh public key".into()));
    };
    if kind != SSH_RSA {
        return Err(PkiError::InvalidKey(format!("unsupported ssh key type {}", kind)));
    }
    STANDARD
        .decode(body)
        .map_err(|e| PkiError::InvalidKey(e.to_string()))
}

pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn write_ssh_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn write_ssh_mpint(out: &mut Vec<u8>, value: &[u8]) {
    let value = strip_leading_zeros(value);
    if value.first().is_some_and(|b| b & 0x80 != 0) {
        out.extend_from_slice(&(value.len() as u32 + 1).to_be_bytes());
        out.push(0);
        out.extend_from_slice(value);
    } else {
        write_ssh_string(out, value);
    }
}

struct SshReader<'a> {
    data: &'a [u8],
}

impl<'a> SshReader<'a> {
    fn read_string(&mut self) -> Result<&'a [u8]> {
        if self.data.len() < 4 {
            return Err(PkiError::InvalidKey("truncated ssh key".into()));
        }
        let (len, rest) = self.data.split_at(4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if rest.len() < len {
            return Err(PkiError::InvalidKey("truncated ssh key".into()));
        }
        let (value, rest) = rest.split_at(len);
        self.data = rest;
        Ok(value)
    }
}
