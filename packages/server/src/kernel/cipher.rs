//! PII cipher and document digest.
//!
//! Encryption uses pgcrypto's PGP symmetric functions so the ciphertext is
//! produced and consumed inside the same transaction as the data mutation.
//! pgcrypto output is NOT deterministic, so equality lookups and the
//! duplicate-document constraint run against a separate HMAC-SHA256 digest
//! column computed with a key derived from the encryption key under a
//! fixed domain-separation label.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::common::errors::AppError;
use crate::common::types::Country;

type HmacSha256 = Hmac<Sha256>;

const DIGEST_KEY_LABEL: &[u8] = b"credit-core:document-digest:v1";

/// Symmetric PII cipher bound to database sessions.
#[derive(Clone)]
pub struct Cipher {
    key: String,
}

impl Cipher {
    pub fn new(encryption_key: impl Into<String>) -> Self {
        Cipher {
            key: encryption_key.into(),
        }
    }

    /// Encrypt a plaintext on the given session/transaction.
    pub async fn encrypt<'e, E>(&self, executor: E, plaintext: &str) -> Result<Vec<u8>, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let ciphertext: Vec<u8> = sqlx::query_scalar("SELECT pgp_sym_encrypt($1, $2)")
            .bind(plaintext)
            .bind(&self.key)
            .fetch_one(executor)
            .await?;
        Ok(ciphertext)
    }

    /// Decrypt a ciphertext on the given session/transaction. The result
    /// lives in memory only and must never be written back.
    pub async fn decrypt<'e, E>(&self, executor: E, ciphertext: &[u8]) -> Result<String, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let plaintext: String = sqlx::query_scalar("SELECT pgp_sym_decrypt($1, $2)")
            .bind(ciphertext)
            .bind(&self.key)
            .fetch_one(executor)
            .await?;
        Ok(plaintext)
    }
}

/// Deterministic digest used for equality lookups over encrypted
/// documents.
#[derive(Clone)]
pub struct DocumentDigest {
    digest_key: Vec<u8>,
}

impl DocumentDigest {
    pub fn new(encryption_key: &str) -> Self {
        let mut mac = HmacSha256::new_from_slice(encryption_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(DIGEST_KEY_LABEL);
        DocumentDigest {
            digest_key: mac.finalize().into_bytes().to_vec(),
        }
    }

    /// HMAC over (country, normalized document). Normalization matches the
    /// country validators so formatting variants of the same document
    /// collide.
    pub fn compute(&self, country: Country, document: &str) -> Vec<u8> {
        let normalized = crate::domain::country::normalize_document(document);
        let mut mac =
            HmacSha256::new_from_slice(&self.digest_key).expect("HMAC accepts any key length");
        mac.update(country.as_str().as_bytes());
        mac.update(&[0x1f]);
        mac.update(normalized.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_for_equal_documents() {
        let digest = DocumentDigest::new("a-32-char-encryption-key-for-test");
        let a = digest.compute(Country::ES, "12345678Z");
        let b = digest.compute(Country::ES, "12345678Z");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn digest_normalizes_formatting() {
        let digest = DocumentDigest::new("a-32-char-encryption-key-for-test");
        let bare = digest.compute(Country::BR, "12345678909");
        let dotted = digest.compute(Country::BR, "123.456.789-09");
        assert_eq!(bare, dotted);
    }

    #[test]
    fn digest_separates_countries() {
        let digest = DocumentDigest::new("a-32-char-encryption-key-for-test");
        let es = digest.compute(Country::ES, "123456789");
        let pt = digest.compute(Country::PT, "123456789");
        assert_ne!(es, pt);
    }

    #[test]
    fn digest_key_depends_on_encryption_key() {
        let a = DocumentDigest::new("key-one-key-one-key-one-key-one!");
        let b = DocumentDigest::new("key-two-key-two-key-two-key-two!");
        assert_ne!(
            a.compute(Country::ES, "12345678Z"),
            b.compute(Country::ES, "12345678Z")
        );
    }
}
