//! Session-init handshake (spec §4.2): wrap a random AES session key under the platform's RSA
//! public key, encrypt the login nonce under that key, and exchange both for session tokens.
//!
//! The RustCrypto family (`rsa`, `aes`, `cbc`, `sha1`) is a natural extension of the teacher's
//! existing `hmac`/`sha2` dependencies rather than a new ecosystem corner (see DESIGN.md).

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::{BigUint, Oaep, RsaPublicKey};
use serde::Deserialize;
use sha1::Sha1;
use tracing::debug;

use crate::error::WebError;
use crate::web::client::{Host, SessionMode, WebClient};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// RSA public key material published for a given account name, used to wrap the session key.
#[derive(Debug, Deserialize)]
pub struct RsaPublicKeyInfo {
    #[serde(rename = "publickey_mod")]
    pub modulus_hex: String,
    #[serde(rename = "publickey_exp")]
    pub exponent_hex: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    success: bool,
    #[serde(default)]
    token: String,
    #[serde(default)]
    token_secure: String,
}

fn build_rsa_key(info: &RsaPublicKeyInfo) -> Result<RsaPublicKey, WebError> {
    let modulus = hex::decode(&info.modulus_hex)
        .map_err(|e| WebError::Decode(format!("bad rsa modulus: {e}")))?;
    let exponent = hex::decode(&info.exponent_hex)
        .map_err(|e| WebError::Decode(format!("bad rsa exponent: {e}")))?;
    RsaPublicKey::new(BigUint::from_bytes_be(&modulus), BigUint::from_bytes_be(&exponent))
        .map_err(|e| WebError::Decode(format!("invalid rsa public key: {e}")))
}

/// Encrypts a fresh 32-byte AES session key under the platform's RSA-OAEP-SHA1 public key, and
/// the given nonce under that session key with AES-256-CBC/PKCS7 and a random IV.
///
/// Returns `(rsa_wrapped_session_key, encrypted_nonce)`, both base64-encoded, ready to go
/// straight onto the identity-endpoint form.
pub fn seal_session(info: &RsaPublicKeyInfo, nonce: &[u8]) -> Result<(String, String), WebError> {
    let public_key = build_rsa_key(info)?;

    let mut session_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut session_key);

    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let padding = Oaep::new::<Sha1>();
    let wrapped_key = public_key
        .encrypt(&mut rand::thread_rng(), padding, &session_key)
        .map_err(|e| WebError::Decode(format!("rsa encryption failed: {e}")))?;

    let mut buffer = vec![0u8; nonce.len() + 16];
    buffer[..nonce.len()].copy_from_slice(nonce);
    let encrypted_nonce = Aes256CbcEnc::new(&session_key.into(), &iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, nonce.len())
        .map_err(|e| WebError::Decode(format!("aes encryption failed: {e}")))?;

    // IV is prepended so the identity endpoint can recover it before decrypting.
    let mut nonce_payload = Vec::with_capacity(16 + encrypted_nonce.len());
    nonce_payload.extend_from_slice(&iv);
    nonce_payload.extend_from_slice(encrypted_nonce);

    Ok((BASE64.encode(wrapped_key), BASE64.encode(nonce_payload)))
}

/// Runs the session-init handshake for `account_name`/`nonce` and plants tokens on the client.
pub async fn initialize_session(
    client: &WebClient,
    account_id: u64,
    account_name: &str,
    nonce: &[u8],
) -> Result<(), WebError> {
    let rsa_info: RsaPublicKeyInfo = client
        .get_json(
            Host::Community,
            &format!("/login/getrsakey?username={}", account_name),
        )
        .await?;

    let (encrypted_password, encrypted_loginkey) = seal_session(&rsa_info, nonce)?;

    let form = vec![
        ("encrypted_password".to_string(), encrypted_password),
        ("encrypted_loginkey".to_string(), encrypted_loginkey),
        ("rsatimestamp".to_string(), rsa_info.timestamp.clone()),
        ("username".to_string(), account_name.to_string()),
    ];

    let response: IdentityResponse = client
        .post_form_json(Host::Community, "/login/dologin", &form, SessionMode::None)
        .await?;

    if !response.success {
        return Err(WebError::RefreshFailed("identity endpoint rejected handshake".into()));
    }

    debug!(account = account_name, "session handshake succeeded");
    client.plant_tokens(
        BASE64.encode(account_id.to_string()),
        response.token,
        response.token_secure,
    );
    Ok(())
}

/// Unlocks family-view restrictions by posting the four-digit parental code to the community and
/// store hosts (spec §4.2). A no-op if no code is configured.
pub async fn unlock_parental_controls(client: &WebClient, code: &str) -> Result<(), WebError> {
    if code.is_empty() {
        return Ok(());
    }
    let form = vec![("pin".to_string(), code.to_string())];
    for host in [Host::Community, Host::Store] {
        client
            .post_form(host, "/parental/ajaxunlock", &form, SessionMode::Attach(
                crate::web::client::SessionFormField::Lowercase,
            ))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;

    fn sample_key_info() -> (RsaPrivateKey, RsaPublicKeyInfo) {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let info = RsaPublicKeyInfo {
            modulus_hex: hex::encode(public_key.n().to_bytes_be()),
            exponent_hex: hex::encode(public_key.e().to_bytes_be()),
            timestamp: "12345".to_string(),
        };
        (private_key, info)
    }

    #[test]
    fn seal_session_produces_base64_payloads_of_expected_shape() {
        let (_, info) = sample_key_info();
        let nonce = b"a-login-nonce";
        let (wrapped_key, encrypted_nonce) = seal_session(&info, nonce).unwrap();

        let wrapped_bytes = BASE64.decode(&wrapped_key).unwrap();
        assert_eq!(wrapped_bytes.len(), 128); // 1024-bit RSA modulus

        let nonce_bytes = BASE64.decode(&encrypted_nonce).unwrap();
        assert!(nonce_bytes.len() > 16); // iv prefix + at least one cbc block
    }
}
