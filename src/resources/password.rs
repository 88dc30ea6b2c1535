//! Check a cleartext password against the verifier stored in `pg_authid.rolpassword`
//!
//! PostgreSQL stores either a SCRAM-SHA-256 verifier
//! (`SCRAM-SHA-256$<iterations>:<salt>$<StoredKey>:<ServerKey>`) or a legacy
//! `md5<hex(md5(password || username))>` hash. Comparing against the verifier
//! avoids rewriting the password on every reconciliation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const SCRAM_PREFIX: &str = "SCRAM-SHA-256$";
const MD5_PREFIX: &str = "md5";

/// Whether `password` matches the stored verifier of `role_name`
///
/// Unknown or malformed verifiers never match.
pub fn password_matches(verifier: Option<&str>, password: &str, role_name: &str) -> bool {
    let Some(verifier) = verifier.filter(|v| !v.trim().is_empty()) else {
        return false;
    };

    if let Some(rest) = verifier.strip_prefix(SCRAM_PREFIX) {
        return scram_sha_256_matches(rest, password);
    }
    if let Some(hash) = verifier.strip_prefix(MD5_PREFIX) {
        return md5_matches(hash, password, role_name);
    }
    false
}

/// Parsed `<iterations>:<salt>$<StoredKey>:<ServerKey>`
struct ScramVerifier {
    iterations: u32,
    salt: Vec<u8>,
    stored_key: Vec<u8>,
}

impl ScramVerifier {
    fn parse(rest: &str) -> Option<Self> {
        let (iterations_and_salt, keys) = rest.split_once('$')?;
        let (iterations, salt) = iterations_and_salt.split_once(':')?;
        let (stored_key, _server_key) = keys.split_once(':')?;

        let iterations: u32 = iterations.parse().ok().filter(|i| *i > 0)?;
        Some(Self {
            iterations,
            salt: STANDARD.decode(salt).ok()?,
            stored_key: STANDARD.decode(stored_key).ok()?,
        })
    }
}

/// SASLprep-normalised password, wiped on drop
///
/// Failures fall back to the raw bytes, as the server does.
fn saslprep(password: &str) -> Zeroizing<String> {
    Zeroizing::new(
        stringprep::saslprep(password)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| password.to_string()),
    )
}

fn scram_sha_256_matches(rest: &str, password: &str) -> bool {
    let Some(verifier) = ScramVerifier::parse(rest) else {
        return false;
    };

    let prepared = saslprep(password);
    let mut salted_password = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        prepared.as_bytes(),
        &verifier.salt,
        verifier.iterations,
        salted_password.as_mut_slice(),
    );

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(salted_password.as_slice()) else {
        return false;
    };
    mac.update(b"Client Key");
    let mut client_key = Zeroizing::new([0u8; 32]);
    client_key.copy_from_slice(&mac.finalize().into_bytes());

    let mut stored_key = Zeroizing::new([0u8; 32]);
    stored_key.copy_from_slice(&Sha256::digest(client_key.as_slice()));

    stored_key.as_slice().ct_eq(verifier.stored_key.as_slice()).into()
}

fn md5_matches(hash: &str, password: &str, role_name: &str) -> bool {
    let Ok(current) = hex::decode(hash) else {
        return false;
    };

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(role_name.as_bytes());
    let expected = hasher.finalize();

    current.as_slice().ct_eq(expected.as_slice()).into()
}
