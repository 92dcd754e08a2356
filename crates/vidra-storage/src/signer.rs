//! Signed URL issuance
//!
//! Two strategies, selected by configuration:
//!
//! - **HMAC platform signing**: appends `exp` and an HMAC-SHA256 `sig` query
//!   parameter over the URL path and expiry (and client ip when bound).
//! - **Policy signing**: builds a JSON policy
//!   `{"Resource": url, "Condition": {"DateLessThan": ..., ["IpAddress": ...]}}`,
//!   URL-safe base64-encodes it, signs the canonical policy bytes with the
//!   configured RSA private key (PKCS#1 v1.5 over SHA-256), and attaches
//!   `Policy`, `Signature`, and `Key-Pair-Id` query parameters.
//!
//! Signing is pure and stateless: a function of (key material, policy, time).
//! Safe under concurrent invocation without locking.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::json;

use crate::traits::{StorageError, StorageResult};
use vidra_core::{Config, SigningStrategy};

type HmacSha256 = Hmac<Sha256>;

/// Options for a single signing operation.
#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    pub expires_in: Duration,
    /// When set, the signature binds the URL to this client address.
    pub ip: Option<String>,
}

impl SignedUrlOptions {
    pub fn expiring_in(expires_in: Duration) -> Self {
        Self {
            expires_in,
            ip: None,
        }
    }
}

/// URL signer, dispatching to the configured strategy.
#[derive(Clone)]
pub enum UrlSigner {
    Hmac(HmacUrlSigner),
    Policy(PolicyUrlSigner),
}

impl UrlSigner {
    pub fn from_config(config: &Config) -> StorageResult<Self> {
        match config.signing_strategy {
            SigningStrategy::Hmac => {
                let secret = config.signing_hmac_secret.clone().ok_or_else(|| {
                    StorageError::ConfigError("missing HMAC signing secret".into())
                })?;
                Ok(UrlSigner::Hmac(HmacUrlSigner::new(secret)))
            }
            SigningStrategy::Policy => {
                let pem = config.signing_private_key_pem.as_deref().ok_or_else(|| {
                    StorageError::ConfigError("missing signing private key".into())
                })?;
                let key_pair_id = config.signing_key_pair_id.clone().ok_or_else(|| {
                    StorageError::ConfigError("missing signing key pair id".into())
                })?;
                Ok(UrlSigner::Policy(PolicyUrlSigner::from_pem(
                    pem,
                    key_pair_id,
                )?))
            }
        }
    }

    pub fn sign(&self, url: &str, opts: &SignedUrlOptions) -> StorageResult<String> {
        match self {
            UrlSigner::Hmac(signer) => signer.sign(url, opts),
            UrlSigner::Policy(signer) => signer.sign(url, opts),
        }
    }
}

/// HMAC-SHA256 platform signer.
/// Format: `{url}?exp={epoch}[&ip={ip}]&sig={hmac_hex}`.
#[derive(Clone)]
pub struct HmacUrlSigner {
    secret: String,
}

impl HmacUrlSigner {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn sign(&self, url: &str, opts: &SignedUrlOptions) -> StorageResult<String> {
        let expires_at = epoch_now()? + opts.expires_in.as_secs();
        self.sign_with_expiry(url, expires_at, opts.ip.as_deref())
    }

    fn sign_with_expiry(
        &self,
        url: &str,
        expires_at: u64,
        ip: Option<&str>,
    ) -> StorageResult<String> {
        let payload = match ip {
            Some(ip) => format!("{}:{}:{}", url, expires_at, ip),
            None => format!("{}:{}", url, expires_at),
        };
        let signature = self.compute_signature(&payload)?;

        let mut signed = format!("{}?exp={}", url, expires_at);
        if let Some(ip) = ip {
            signed.push_str(&format!("&ip={}", ip));
        }
        signed.push_str(&format!("&sig={}", signature));
        Ok(signed)
    }

    /// Verify signature and expiry against an explicit clock value.
    /// Accepted strictly while `now < exp`.
    pub fn verify_at(&self, signed_url: &str, now_epoch: u64) -> StorageResult<()> {
        let parsed = url::Url::parse(signed_url)
            .map_err(|e| StorageError::InvalidKey(format!("Invalid URL: {}", e)))?;

        let exp = query_param(&parsed, "exp")
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| StorageError::InvalidKey("Missing or invalid exp parameter".into()))?;
        let provided_sig = query_param(&parsed, "sig")
            .ok_or_else(|| StorageError::InvalidKey("Missing sig parameter".into()))?;
        let ip = query_param(&parsed, "ip");

        if now_epoch >= exp {
            return Err(StorageError::InvalidKey("URL expired".into()));
        }

        let mut base = parsed.clone();
        base.set_query(None);
        let payload = match ip.as_deref() {
            Some(ip) => format!("{}:{}:{}", base, exp, ip),
            None => format!("{}:{}", base, exp),
        };
        let expected_sig = self.compute_signature(&payload)?;

        if provided_sig != expected_sig {
            return Err(StorageError::InvalidKey("Invalid signature".into()));
        }
        Ok(())
    }

    pub fn verify(&self, signed_url: &str) -> StorageResult<()> {
        self.verify_at(signed_url, epoch_now()?)
    }

    fn compute_signature(&self, payload: &str) -> StorageResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StorageError::ConfigError(format!("HMAC error: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Public/private-key policy signer.
///
/// Uses SHA-256 as the policy digest. The upstream scheme this mirrors
/// historically used SHA-1; SHA-256 is accepted by current CDN key groups
/// and avoids shipping a weak digest.
#[derive(Clone)]
pub struct PolicyUrlSigner {
    private_key: RsaPrivateKey,
    key_pair_id: String,
}

impl PolicyUrlSigner {
    pub fn new(private_key: RsaPrivateKey, key_pair_id: String) -> Self {
        Self {
            private_key,
            key_pair_id,
        }
    }

    /// Parse a PKCS#8 or PKCS#1 PEM-encoded RSA private key.
    pub fn from_pem(pem: &str, key_pair_id: String) -> StorageResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| {
                StorageError::ConfigError(format!("invalid signing private key: {}", e))
            })?;
        Ok(Self::new(private_key, key_pair_id))
    }

    pub fn sign(&self, url: &str, opts: &SignedUrlOptions) -> StorageResult<String> {
        let expires_at = epoch_now()? + opts.expires_in.as_secs();
        self.sign_with_expiry(url, expires_at, opts.ip.as_deref())
    }

    fn sign_with_expiry(
        &self,
        url: &str,
        expires_at: u64,
        ip: Option<&str>,
    ) -> StorageResult<String> {
        let policy = build_policy(url, expires_at, ip);
        let policy_bytes = serde_json::to_vec(&policy)
            .map_err(|e| StorageError::ConfigError(format!("policy serialization: {}", e)))?;

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(&policy_bytes);

        let encoded_policy = URL_SAFE_NO_PAD.encode(&policy_bytes);
        let encoded_signature = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!(
            "{}?Policy={}&Signature={}&Key-Pair-Id={}",
            url, encoded_policy, encoded_signature, self.key_pair_id
        ))
    }
}

/// Canonical JSON policy for a signed URL.
fn build_policy(url: &str, expires_at: u64, ip: Option<&str>) -> serde_json::Value {
    let mut condition = json!({
        "DateLessThan": { "AWS:EpochTime": expires_at }
    });
    if let Some(ip) = ip {
        condition["IpAddress"] = json!({ "AWS:SourceIp": ip });
    }
    json!({
        "Resource": url,
        "Condition": condition,
    })
}

fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

fn epoch_now() -> StorageResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| StorageError::ConfigError(format!("system clock error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::VerifyingKey;
    use rsa::signature::Verifier;
    use rsa::RsaPublicKey;

    fn hmac_signer() -> HmacUrlSigner {
        HmacUrlSigner::new("test-secret-key".into())
    }

    #[test]
    fn hmac_sign_url_format() {
        let signer = hmac_signer();
        let url = signer
            .sign(
                "https://cdn.vidra.local/videos/abc/720p/720p.mp4",
                &SignedUrlOptions::expiring_in(Duration::from_secs(3600)),
            )
            .unwrap();
        assert!(url.starts_with("https://cdn.vidra.local/videos/abc/720p/720p.mp4?exp="));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn hmac_accepts_before_expiry_rejects_at_and_after() {
        let signer = hmac_signer();
        let base = "https://cdn.vidra.local/videos/abc/source";
        let issue = 1_700_000_000u64;
        let url = signer.sign_with_expiry(base, issue + 60, None).unwrap();

        assert!(signer.verify_at(&url, issue + 59).is_ok());
        assert!(signer.verify_at(&url, issue + 60).is_err());
        assert!(signer.verify_at(&url, issue + 61).is_err());
    }

    #[test]
    fn hmac_rejects_tampered_signature() {
        let signer = hmac_signer();
        let url = signer
            .sign_with_expiry("https://cdn.vidra.local/v", 1_800_000_000, None)
            .unwrap();
        let tampered = url.replace("sig=", "sig=0");
        assert!(signer.verify_at(&tampered, 1_700_000_000).is_err());
    }

    #[test]
    fn hmac_binds_client_ip_into_signature() {
        let signer = hmac_signer();
        let url = signer
            .sign_with_expiry(
                "https://cdn.vidra.local/v",
                1_800_000_000,
                Some("203.0.113.7"),
            )
            .unwrap();
        assert!(url.contains("ip=203.0.113.7"));
        assert!(signer.verify_at(&url, 1_700_000_000).is_ok());

        let other_ip = url.replace("203.0.113.7", "203.0.113.8");
        assert!(signer.verify_at(&other_ip, 1_700_000_000).is_err());
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let a = HmacUrlSigner::new("key1".into());
        let b = HmacUrlSigner::new("key2".into());
        let url_a = a
            .sign_with_expiry("https://cdn.vidra.local/v", 1_800_000_000, None)
            .unwrap();
        let url_b = b
            .sign_with_expiry("https://cdn.vidra.local/v", 1_800_000_000, None)
            .unwrap();
        assert_ne!(url_a, url_b);
    }

    #[test]
    fn policy_signature_verifies_against_public_key() {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let signer = PolicyUrlSigner::new(private_key, "K2JCJMDEHXQW5F".into());

        let base = "https://cdn.vidra.local/videos/abc/master.m3u8";
        let signed = signer
            .sign_with_expiry(base, 1_800_000_000, Some("198.51.100.1"))
            .unwrap();

        let parsed = url::Url::parse(&signed).unwrap();
        let policy_b64 = query_param(&parsed, "Policy").unwrap();
        let sig_b64 = query_param(&parsed, "Signature").unwrap();
        assert_eq!(
            query_param(&parsed, "Key-Pair-Id").unwrap(),
            "K2JCJMDEHXQW5F"
        );

        let policy_bytes = URL_SAFE_NO_PAD.decode(policy_b64.as_bytes()).unwrap();
        let policy: serde_json::Value = serde_json::from_slice(&policy_bytes).unwrap();
        assert_eq!(policy["Resource"], base);
        assert_eq!(
            policy["Condition"]["DateLessThan"]["AWS:EpochTime"],
            1_800_000_000u64
        );
        assert_eq!(
            policy["Condition"]["IpAddress"]["AWS:SourceIp"],
            "198.51.100.1"
        );

        let signature_bytes = URL_SAFE_NO_PAD.decode(sig_b64.as_bytes()).unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice()).unwrap();
        verifying_key.verify(&policy_bytes, &signature).unwrap();
    }
}
