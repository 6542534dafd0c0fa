//! Public-key authentication transcript.
//!
//! The client proves possession of its private key by signing a transcript
//! bound to the target and to a fresh gateway nonce:
//!   `SHA-256("wssh-v1\0" || hostname || "\0" || username || "\0" || nonce)`
//!
//! Signatures use the SSHSIG format (namespace `wssh-auth`) so gateways can
//! verify them with stock OpenSSH tooling.

use sha2::{Digest, Sha256};
use ssh_key::{HashAlg, LineEnding, PrivateKey, PublicKey, SshSig};

use crate::error::{WsshError, WsshResult};
use crate::messages::{AuthCredential, PROTOCOL_VERSION};

/// SSHSIG namespace for auth signatures.
pub const SIGNATURE_NAMESPACE: &str = "wssh-auth";

/// Build the transcript both client and gateway compute.
fn build_transcript(hostname: &str, username: &str, nonce: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_VERSION.as_bytes());
    hasher.update(b"\0");
    hasher.update(hostname.as_bytes());
    hasher.update(b"\0");
    hasher.update(username.as_bytes());
    hasher.update(b"\0");
    hasher.update(nonce);
    hasher.finalize().to_vec()
}

/// Decode the hex nonce carried by a gateway challenge.
pub fn decode_nonce(nonce: &str) -> WsshResult<Vec<u8>> {
    let bytes = hex::decode(nonce)
        .map_err(|e| WsshError::InvalidMessage(format!("challenge nonce is not hex: {e}")))?;
    if bytes.is_empty() {
        return Err(WsshError::InvalidMessage("challenge nonce is empty".into()));
    }
    Ok(bytes)
}

/// Sign a gateway challenge, producing the `publickey` credential.
pub fn sign_challenge(
    key: &PrivateKey,
    hostname: &str,
    username: &str,
    nonce: &[u8],
) -> WsshResult<AuthCredential> {
    let transcript = build_transcript(hostname, username, nonce);
    let signature = key
        .sign(SIGNATURE_NAMESPACE, HashAlg::Sha512, &transcript)
        .map_err(|e| WsshError::Signature(e.to_string()))?;

    let public_key = key
        .public_key()
        .to_openssh()
        .map_err(|e| WsshError::InvalidKey(e.to_string()))?;
    let signature = signature
        .to_pem(LineEnding::LF)
        .map_err(|e| WsshError::Signature(e.to_string()))?;

    Ok(AuthCredential::Publickey {
        public_key,
        signature,
    })
}

/// Verify a `publickey` credential against the expected transcript.
pub fn verify_challenge(
    public_key: &str,
    signature: &str,
    hostname: &str,
    username: &str,
    nonce: &[u8],
) -> bool {
    let Ok(public_key) = PublicKey::from_openssh(public_key) else {
        return false;
    };
    let Ok(signature) = SshSig::from_pem(signature) else {
        return false;
    };
    let transcript = build_transcript(hostname, username, nonce);
    public_key
        .verify(SIGNATURE_NAMESPACE, &transcript, &signature)
        .is_ok()
}
