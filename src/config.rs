//! Credential and region source for a service client.

use std::sync::Arc;

use md5::{Digest, Md5};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;

use crate::Result;
use crate::error::Error;

pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Supplies everything a client needs to address and sign requests.
///
/// Accessors are called on every signed request, so an implementation backed by
/// a refreshable store sees rotated credentials without rebuilding the client.
pub trait ConfigurationProvider: Send + Sync {
    fn region(&self) -> Result<String>;

    fn tenancy_ocid(&self) -> Result<String>;

    fn user_ocid(&self) -> Result<String>;

    fn key_fingerprint(&self) -> Result<String>;

    /// `keyId` placed in the `Authorization` header.
    fn key_id(&self) -> Result<String> {
        Ok(format!(
            "{}/{}/{}",
            self.tenancy_ocid()?,
            self.user_ocid()?,
            self.key_fingerprint()?
        ))
    }

    fn private_key(&self) -> Result<Arc<RsaPrivateKey>>;

    /// Delegation (on-behalf-of) token, sent and signed as `opc-obo-token`.
    fn delegation_token(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct Credential {
    tenancy_ocid: String,
    user_ocid: String,
    fingerprint: String,
    private_key: Arc<RsaPrivateKey>,
    delegation_token: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("tenancy_ocid", &self.tenancy_ocid)
            .field("user_ocid", &self.user_ocid)
            .field("fingerprint", &self.fingerprint)
            .field("private_key", &"<redacted>")
            .field(
                "delegation_token",
                &self.delegation_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credential {
    /// Builds a credential from a PKCS#1 or PKCS#8 PEM private key.
    ///
    /// The fingerprint is derived from the key's public half.
    pub fn from_pem(
        tenancy_ocid: impl Into<String>,
        user_ocid: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<Self> {
        let private_key = parse_private_key_pem(private_key_pem)?;
        let fingerprint = key_fingerprint_of(&private_key)?;
        Ok(Self {
            tenancy_ocid: tenancy_ocid.into(),
            user_ocid: user_ocid.into(),
            fingerprint,
            private_key: Arc::new(private_key),
            delegation_token: None,
        })
    }

    pub fn from_key(
        tenancy_ocid: impl Into<String>,
        user_ocid: impl Into<String>,
        private_key: RsaPrivateKey,
    ) -> Result<Self> {
        ensure_key_size(&private_key)?;
        let fingerprint = key_fingerprint_of(&private_key)?;
        Ok(Self {
            tenancy_ocid: tenancy_ocid.into(),
            user_ocid: user_ocid.into(),
            fingerprint,
            private_key: Arc::new(private_key),
            delegation_token: None,
        })
    }

    /// Overrides the computed fingerprint, e.g. with the one shown in the console.
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn delegation_token(mut self, token: impl Into<String>) -> Self {
        self.delegation_token = Some(token.into());
        self
    }
}

/// In-memory provider for a fixed credential and region.
#[derive(Clone, Debug)]
pub struct StaticConfigurationProvider {
    region: String,
    credential: Credential,
}

impl StaticConfigurationProvider {
    pub fn new(region: impl Into<String>, credential: Credential) -> Self {
        Self {
            region: region.into(),
            credential,
        }
    }

    pub fn from_pem(
        region: impl Into<String>,
        tenancy_ocid: impl Into<String>,
        user_ocid: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<Self> {
        let credential = Credential::from_pem(tenancy_ocid, user_ocid, private_key_pem)?;
        Ok(Self::new(region, credential))
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

impl ConfigurationProvider for StaticConfigurationProvider {
    fn region(&self) -> Result<String> {
        Ok(self.region.clone())
    }

    fn tenancy_ocid(&self) -> Result<String> {
        Ok(self.credential.tenancy_ocid.clone())
    }

    fn user_ocid(&self) -> Result<String> {
        Ok(self.credential.user_ocid.clone())
    }

    fn key_fingerprint(&self) -> Result<String> {
        Ok(self.credential.fingerprint.clone())
    }

    fn private_key(&self) -> Result<Arc<RsaPrivateKey>> {
        Ok(Arc::clone(&self.credential.private_key))
    }

    fn delegation_token(&self) -> Result<Option<String>> {
        Ok(self.credential.delegation_token.clone())
    }
}

/// Checks that every accessor answers and the material is usable for signing.
pub fn validate_provider(provider: &dyn ConfigurationProvider) -> Result<()> {
    let region = provider.region().map_err(invalid_from)?;
    require_non_empty("region", &region)?;
    let key_id = provider.key_id().map_err(invalid_from)?;
    require_non_empty("key id", &key_id)?;
    // Components only matter when the key id is composed from them.
    if let (Ok(tenancy), Ok(user), Ok(fingerprint)) = (
        provider.tenancy_ocid(),
        provider.user_ocid(),
        provider.key_fingerprint(),
    ) && key_id == format!("{tenancy}/{user}/{fingerprint}")
    {
        require_non_empty("tenancy", &tenancy)?;
        require_non_empty("user", &user)?;
        require_non_empty("fingerprint", &fingerprint)?;
    }
    let private_key = provider.private_key().map_err(invalid_from)?;
    ensure_key_size(&private_key)?;
    provider.delegation_token().map_err(invalid_from)?;
    Ok(())
}

pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|source| Error::ConfigurationInvalid {
            message: format!("private key is not a PKCS#1 or PKCS#8 RSA PEM: {source}"),
        })?;
    ensure_key_size(&key)?;
    Ok(key)
}

/// MD5 fingerprint of the DER-encoded public key, as colon-separated hex.
pub fn key_fingerprint_of(private_key: &RsaPrivateKey) -> Result<String> {
    let der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|source| Error::ConfigurationInvalid {
            message: format!("cannot encode public key: {source}"),
        })?;
    let digest = Md5::digest(der.as_bytes());
    Ok(digest
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}

fn ensure_key_size(key: &RsaPrivateKey) -> Result<()> {
    let bits = key.size() * 8;
    if bits < MIN_RSA_KEY_BITS {
        return Err(Error::ConfigurationInvalid {
            message: format!("RSA key has {bits} bits; at least {MIN_RSA_KEY_BITS} are required"),
        });
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::ConfigurationInvalid {
            message: format!("{field} is empty"),
        });
    }
    Ok(())
}

fn invalid_from(error: Error) -> Error {
    match error {
        Error::ConfigurationInvalid { .. } => error,
        other => Error::ConfigurationInvalid {
            message: other.to_string(),
        },
    }
}
