//! Signed identity assertions.
//!
//! An upstream access proxy forwards the caller's identity as a signed JWT in
//! a request header. [`IdentityExtractor`] is the context-pipeline stage that
//! verifies that assertion with an [`IdentityVerifier`] and stores the
//! decoded [`Identity`] in the [`RequestContext`].
//!
//! The trust anchor behind [`JwtVerifier`] is either a JWKS document (fetched
//! once at startup or read from disk) or a shared HMAC secret.

use anyhow::{Context, Result};
use axum::http::{request::Parts, HeaderName};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::IdentityConfig;
use crate::context::{ContextExtractor, RequestContext};

/// Header carrying the signed identity assertion unless configured otherwise.
pub const DEFAULT_ASSERTION_HEADER: &str = "x-pomerium-jwt-assertion";

/// Claims decoded from a verified identity assertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Every other claim, including the registered ones (`iss`, `exp`, ...).
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed assertion: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("no trusted key matches key id {0:?}")]
    UnknownKey(Option<String>),
    #[error("algorithm {0:?} is not accepted by the selected key")]
    AlgorithmNotAllowed(Algorithm),
    #[error("assertion rejected: {0}")]
    Rejected(#[source] jsonwebtoken::errors::Error),
}

/// Verifies a raw assertion string and decodes the identity it carries.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, assertion: &str) -> Result<Identity, VerifyError>;
}

struct TrustedKey {
    kid: Option<String>,
    key: DecodingKey,
    /// Signature algorithms this key may verify.
    algorithms: Vec<Algorithm>,
}

/// JWT verifier backed by a fixed set of trusted keys.
///
/// Each token is checked with exactly the algorithm named in its header, and
/// only against a key whose type supports that algorithm.
pub struct JwtVerifier {
    keys: Vec<TrustedKey>,
    validation: Validation,
}

impl JwtVerifier {
    /// Trusts tokens signed with an HMAC `secret` (HS256).
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            keys: vec![TrustedKey {
                kid: None,
                key: DecodingKey::from_secret(secret),
                algorithms: vec![Algorithm::HS256],
            }],
            validation: base_validation(),
        }
    }

    /// Trusts every usable signing key in a JWKS document.
    pub fn from_jwks(set: &JwkSet) -> Result<Self> {
        let mut keys = Vec::new();
        for jwk in &set.keys {
            let algorithms = jwk_algorithms(jwk);
            if algorithms.is_empty() {
                tracing::warn!(kid = ?jwk.common.key_id, "skipping JWK without a signing algorithm");
                continue;
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => keys.push(TrustedKey {
                    kid: jwk.common.key_id.clone(),
                    key,
                    algorithms,
                }),
                Err(e) => {
                    tracing::warn!(kid = ?jwk.common.key_id, error = %e, "skipping unusable JWK");
                }
            }
        }
        if keys.is_empty() {
            anyhow::bail!("JWKS contains no usable keys");
        }
        Ok(Self {
            keys,
            validation: base_validation(),
        })
    }

    /// Requires the `iss` claim to equal `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Requires the `aud` claim to contain one of `audience`.
    pub fn with_audience(mut self, audience: &[String]) -> Self {
        self.validation.set_audience(audience);
        self.validation.validate_aud = true;
        self
    }

    /// Builds a verifier from the `[identity]` config section, fetching the
    /// JWKS over HTTP when a URL is configured.
    pub async fn from_config(config: &IdentityConfig) -> Result<Self> {
        let mut verifier = if let Some(secret) = &config.shared_secret {
            Self::from_secret(secret.as_bytes())
        } else if let Some(path) = &config.jwks_path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read JWKS file: {}", path.display()))?;
            let set: JwkSet = serde_json::from_str(&raw).context("Failed to parse JWKS file")?;
            Self::from_jwks(&set)?
        } else if let Some(url) = &config.jwks_url {
            let set: JwkSet = reqwest::get(url)
                .await
                .with_context(|| format!("Failed to fetch JWKS from {}", url))?
                .error_for_status()?
                .json()
                .await
                .context("Failed to parse JWKS response")?;
            Self::from_jwks(&set)?
        } else {
            anyhow::bail!("identity requires one of shared_secret, jwks_path or jwks_url");
        };

        if let Some(issuer) = &config.issuer {
            verifier = verifier.with_issuer(issuer);
        }
        if !config.audience.is_empty() {
            verifier = verifier.with_audience(&config.audience);
        }
        Ok(verifier)
    }

    /// Picks the key for a token header: the key with a matching `kid`, or
    /// any key without one. The key must accept `alg`.
    fn key_for(&self, kid: Option<&str>, alg: Algorithm) -> Result<&TrustedKey, VerifyError> {
        let mut candidates: Vec<&TrustedKey> = match kid {
            Some(kid) => self
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .collect(),
            None => self.keys.iter().collect(),
        };
        if candidates.is_empty() {
            candidates = self.keys.iter().filter(|k| k.kid.is_none()).collect();
        }
        if candidates.is_empty() {
            return Err(VerifyError::UnknownKey(kid.map(str::to_string)));
        }
        candidates
            .into_iter()
            .find(|k| k.algorithms.contains(&alg))
            .ok_or(VerifyError::AlgorithmNotAllowed(alg))
    }
}

/// Claim checks shared by every token; the algorithm is set per token.
fn base_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation
}

/// The algorithms a JWK may verify: its declared `alg`, or every signing
/// algorithm of its key type.
fn jwk_algorithms(jwk: &Jwk) -> Vec<Algorithm> {
    if let Some(declared) = &jwk.common.key_algorithm {
        return match declared {
            KeyAlgorithm::HS256 => vec![Algorithm::HS256],
            KeyAlgorithm::HS384 => vec![Algorithm::HS384],
            KeyAlgorithm::HS512 => vec![Algorithm::HS512],
            KeyAlgorithm::ES256 => vec![Algorithm::ES256],
            KeyAlgorithm::ES384 => vec![Algorithm::ES384],
            KeyAlgorithm::RS256 => vec![Algorithm::RS256],
            KeyAlgorithm::RS384 => vec![Algorithm::RS384],
            KeyAlgorithm::RS512 => vec![Algorithm::RS512],
            KeyAlgorithm::PS256 => vec![Algorithm::PS256],
            KeyAlgorithm::PS384 => vec![Algorithm::PS384],
            KeyAlgorithm::PS512 => vec![Algorithm::PS512],
            KeyAlgorithm::EdDSA => vec![Algorithm::EdDSA],
            // Encryption algorithms.
            _ => Vec::new(),
        };
    }
    match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => vec![Algorithm::ES256],
            EllipticCurve::P384 => vec![Algorithm::ES384],
            _ => Vec::new(),
        },
        AlgorithmParameters::RSA(_) => vec![
            Algorithm::RS256,
            Algorithm::RS384,
            Algorithm::RS512,
            Algorithm::PS256,
            Algorithm::PS384,
            Algorithm::PS512,
        ],
        AlgorithmParameters::OctetKey(_) => {
            vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512]
        }
        AlgorithmParameters::OctetKeyPair(_) => vec![Algorithm::EdDSA],
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, assertion: &str) -> Result<Identity, VerifyError> {
        let header = jsonwebtoken::decode_header(assertion).map_err(VerifyError::Malformed)?;
        let trusted = self.key_for(header.kid.as_deref(), header.alg)?;
        let mut validation = self.validation.clone();
        validation.algorithms = vec![header.alg];
        let data = jsonwebtoken::decode::<Identity>(assertion, &trusted.key, &validation)
            .map_err(VerifyError::Rejected)?;
        Ok(data.claims)
    }
}

/// Context-pipeline stage that verifies the identity assertion header.
pub struct IdentityExtractor {
    header: HeaderName,
    verifier: Arc<dyn IdentityVerifier>,
}

impl IdentityExtractor {
    pub fn new(header: HeaderName, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { header, verifier }
    }
}

impl ContextExtractor for IdentityExtractor {
    fn extract(&self, ctx: RequestContext, parts: &Parts) -> RequestContext {
        let Some(assertion) = parts.headers.get(&self.header) else {
            tracing::warn!(header = %self.header, "no identity assertion header found in request");
            return ctx;
        };
        let Ok(assertion) = assertion.to_str() else {
            tracing::warn!(header = %self.header, "identity assertion header is not valid UTF-8");
            return ctx;
        };
        match self.verifier.verify(assertion) {
            Ok(identity) => ctx.with_identity(identity),
            Err(e) => {
                tracing::warn!(error = %e, "failed to verify identity assertion");
                ctx
            }
        }
    }
}
