//! DPoP proof verification (RFC 9449)
//!
//! A proof is a short-lived JWT signed by the client's own key, carried in
//! the `DPoP` header. The public key rides in the proof's JOSE header; its
//! RFC 7638 thumbprint is what access tokens pin via `cnf.jkt`.

use crate::hashing::timing_safe_eq;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DpopError {
    #[error("Invalid DPoP proof: {0}")]
    InvalidProof(String),
    #[error("DPoP proof issued outside the acceptance window")]
    StaleProof,
    #[error("DPoP proof method/URI binding mismatch")]
    HtuHtmMismatch,
    #[error("DPoP proof access-token hash mismatch")]
    AthMismatch,
    #[error("Unsupported DPoP proof algorithm")]
    UnsupportedAlgorithm,
}

/// A verified proof: the caller still checks `jkt` against the token's
/// `cnf.jkt` and records `jti` in the single-use store.
#[derive(Debug, Clone)]
pub struct DpopProof {
    pub jkt: String,
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProofClaims {
    jti: String,
    htm: String,
    htu: String,
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ath: Option<String>,
}

/// Verify a DPoP proof against the request it accompanies. `access_token`
/// is supplied on resource access (userinfo), making `ath` mandatory.
pub fn verify_proof(
    proof: &str,
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    now: DateTime<Utc>,
    window_secs: u64,
) -> Result<DpopProof, DpopError> {
    let header = decode_header(proof).map_err(|e| DpopError::InvalidProof(e.to_string()))?;

    if header.typ.as_deref() != Some("dpop+jwt") {
        return Err(DpopError::InvalidProof("typ must be dpop+jwt".to_string()));
    }
    if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
        return Err(DpopError::UnsupportedAlgorithm);
    }
    let jwk = header
        .jwk
        .as_ref()
        .ok_or_else(|| DpopError::InvalidProof("missing jwk header".to_string()))?;

    let jkt = jwk_thumbprint(jwk)?;
    let decoding_key =
        DecodingKey::from_jwk(jwk).map_err(|e| DpopError::InvalidProof(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<ProofClaims>(proof, &decoding_key, &validation)
        .map_err(|e| DpopError::InvalidProof(e.to_string()))?
        .claims;

    if !claims.htm.eq_ignore_ascii_case(method) {
        return Err(DpopError::HtuHtmMismatch);
    }
    if strip_query_fragment(&claims.htu) != strip_query_fragment(uri) {
        return Err(DpopError::HtuHtmMismatch);
    }

    let skew = (now.timestamp() - claims.iat).unsigned_abs();
    if skew > window_secs {
        return Err(DpopError::StaleProof);
    }

    if let Some(token) = access_token {
        let expected = access_token_hash(token);
        match &claims.ath {
            Some(ath) if timing_safe_eq(ath.as_bytes(), expected.as_bytes()) => {}
            _ => return Err(DpopError::AthMismatch),
        }
    }

    Ok(DpopProof {
        jkt,
        jti: claims.jti,
        htm: claims.htm,
        htu: claims.htu,
        iat: claims.iat,
    })
}

/// `ath` claim value: BASE64URL(SHA256(access_token)).
pub fn access_token_hash(access_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// RFC 7638 thumbprint: SHA-256 over the canonical JSON of the key's
/// required members in lexicographic order.
pub fn jwk_thumbprint(jwk: &Jwk) -> Result<String, DpopError> {
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, rsa.e, rsa.n)
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let crv = match ec.curve {
                EllipticCurve::P256 => "P-256",
                EllipticCurve::P384 => "P-384",
                EllipticCurve::P521 => "P-521",
                _ => return Err(DpopError::UnsupportedAlgorithm),
            };
            format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                crv, ec.x, ec.y
            )
        }
        _ => return Err(DpopError::UnsupportedAlgorithm),
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

fn strip_query_fragment(uri: &str) -> &str {
    let uri = uri.split('#').next().unwrap_or(uri);
    uri.split('?').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::jwk::{CommonParameters, RSAKeyParameters, RSAKeyType};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    struct ProofKey {
        encoding_key: EncodingKey,
        jwk: Jwk,
    }

    fn proof_key() -> ProofKey {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let pem = private_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        let jwk = Jwk {
            common: CommonParameters::default(),
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: RSAKeyType::RSA,
                n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
            }),
        };
        ProofKey { encoding_key, jwk }
    }

    fn make_proof(key: &ProofKey, htm: &str, htu: &str, iat: i64, ath: Option<String>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("dpop+jwt".to_string());
        header.jwk = Some(key.jwk.clone());
        let claims = ProofClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            htm: htm.to_string(),
            htu: htu.to_string(),
            iat,
            ath,
        };
        encode(&header, &claims, &key.encoding_key).unwrap()
    }

    #[test]
    fn valid_proof_verifies_and_yields_stable_thumbprint() {
        let key = proof_key();
        let now = Utc::now();
        let proof = make_proof(&key, "POST", "https://op.example/token", now.timestamp(), None);

        let verified = verify_proof(&proof, "POST", "https://op.example/token", None, now, 300)
            .expect("proof must verify");
        assert_eq!(verified.jkt, jwk_thumbprint(&key.jwk).unwrap());

        // Same key, second proof: thumbprint is a pure key property.
        let proof2 = make_proof(&key, "POST", "https://op.example/token", now.timestamp(), None);
        let verified2 =
            verify_proof(&proof2, "POST", "https://op.example/token", None, now, 300).unwrap();
        assert_eq!(verified.jkt, verified2.jkt);
    }

    #[test]
    fn mismatched_uri_rejected() {
        let key = proof_key();
        let now = Utc::now();
        let proof = make_proof(&key, "GET", "https://op.example/userinfo", now.timestamp(), None);

        let result = verify_proof(&proof, "GET", "https://op.example/token", None, now, 300);
        assert!(matches!(result, Err(DpopError::HtuHtmMismatch)));
    }

    #[test]
    fn stale_proof_rejected() {
        let key = proof_key();
        let now = Utc::now();
        let proof = make_proof(
            &key,
            "POST",
            "https://op.example/token",
            now.timestamp() - 3600,
            None,
        );

        let result = verify_proof(&proof, "POST", "https://op.example/token", None, now, 300);
        assert!(matches!(result, Err(DpopError::StaleProof)));
    }

    #[test]
    fn ath_binding_enforced_on_resource_access() {
        let key = proof_key();
        let now = Utc::now();
        let access_token = "example.access.token";

        let good = make_proof(
            &key,
            "GET",
            "https://op.example/userinfo",
            now.timestamp(),
            Some(access_token_hash(access_token)),
        );
        assert!(verify_proof(
            &good,
            "GET",
            "https://op.example/userinfo",
            Some(access_token),
            now,
            300
        )
        .is_ok());

        let missing_ath = make_proof(&key, "GET", "https://op.example/userinfo", now.timestamp(), None);
        let result = verify_proof(
            &missing_ath,
            "GET",
            "https://op.example/userinfo",
            Some(access_token),
            now,
            300,
        );
        assert!(matches!(result, Err(DpopError::AthMismatch)));
    }

    #[test]
    fn wrong_typ_rejected() {
        let key = proof_key();
        let now = Utc::now();
        let mut header = Header::new(Algorithm::RS256);
        header.jwk = Some(key.jwk.clone());
        let claims = ProofClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            htm: "POST".to_string(),
            htu: "https://op.example/token".to_string(),
            iat: now.timestamp(),
            ath: None,
        };
        let proof = encode(&header, &claims, &key.encoding_key).unwrap();

        let result = verify_proof(&proof, "POST", "https://op.example/token", None, now, 300);
        assert!(matches!(result, Err(DpopError::InvalidProof(_))));
    }
}
