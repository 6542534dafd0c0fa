//! Authentication negotiator.
//!
//! Runs one authentication exchange with the gateway over a freshly opened
//! transport channel:
//!
//! ```text
//! password:   client --auth{password}--> gateway --auth_ok | error--> client
//! publickey:  gateway --challenge{nonce}--> client --auth{public_key, signature}-->
//!             gateway --auth_ok | error--> client
//! ```
//!
//! A key signature is only ever bound to a gateway nonce, so publickey auth
//! sends nothing until the challenge arrives. A gateway that never challenges
//! runs into the timeout. The whole exchange is bounded by the configured
//! timeout. There is never a second attempt.

use std::time::Duration;

use tokio::time;
use tracing::{debug, info, trace, warn};
use wssh_core::{auth, codec, keys, AuthCredential, AuthRequest, ClientMessage, GatewayMessage};

use crate::config::{Credentials, Target, ValidatedConfig};
use crate::error::AuthFailure;
use crate::transport::{TransportChannel, TransportEvent, TransportMessage};

/// The gateway's acknowledgement of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionHandle {
    pub session_id: Option<String>,
}

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(SessionHandle),
    Failed(AuthFailure),
}

/// Drives a single authentication exchange.
pub struct Negotiator<'a> {
    target: &'a Target,
    credentials: &'a Credentials,
    timeout: Duration,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a ValidatedConfig) -> Self {
        Self {
            target: &config.target,
            credentials: &config.credentials,
            timeout: config.auth_timeout,
        }
    }

    /// Authenticate over `channel`, resolving within the configured timeout.
    pub async fn run(&self, channel: &mut TransportChannel) -> AuthResult {
        debug!(
            username = %self.target.username,
            hostname = %self.target.hostname,
            method = ?self.credentials.method(),
            "authenticating"
        );

        match time::timeout(self.timeout, self.exchange(channel)).await {
            Ok(Ok(handle)) => {
                info!(
                    "authenticated as '{}' on {}:{}",
                    self.target.username, self.target.hostname, self.target.port
                );
                AuthResult::Authenticated(handle)
            }
            Ok(Err(failure)) => AuthResult::Failed(failure),
            Err(_) => {
                warn!(timeout = ?self.timeout, "authentication timed out");
                AuthResult::Failed(AuthFailure::Timeout(self.timeout))
            }
        }
    }

    async fn exchange(&self, channel: &mut TransportChannel) -> Result<SessionHandle, AuthFailure> {
        let credential = match self.credentials {
            Credentials::Password { secret } => AuthCredential::Password {
                password: secret.clone(),
            },
            Credentials::PrivateKey {
                key_material,
                passphrase,
            } => {
                let pem = key_material.clone();
                let passphrase = passphrase.clone();
                // Decrypting runs bcrypt-pbkdf; keep it off the runtime workers.
                let key = tokio::task::spawn_blocking(move || {
                    keys::decode_private_key(&pem, passphrase.as_deref())
                })
                .await
                .map_err(|e| AuthFailure::InvalidKey(e.to_string()))??;
                debug!(fingerprint = %keys::fingerprint(key.public_key()), "using private key");

                let nonce = await_challenge(channel).await?;
                auth::sign_challenge(&key, &self.target.hostname, &self.target.username, &nonce)?
            }
        };

        let request = ClientMessage::Auth(AuthRequest {
            hostname: self.target.hostname.clone(),
            port: self.target.port,
            username: self.target.username.clone(),
            term: self.target.term.clone(),
            command: self.target.command.clone(),
            width: self.target.cols,
            height: self.target.rows,
            credential,
        });
        let text = codec::encode_client(&request)?;
        channel
            .send(TransportMessage::Text(text))
            .await
            .map_err(|e| AuthFailure::Transport(e.to_string()))?;

        await_outcome(channel).await
    }
}

/// Wait for the gateway's key challenge and decode its nonce.
async fn await_challenge(channel: &mut TransportChannel) -> Result<Vec<u8>, AuthFailure> {
    loop {
        match next_gateway_message(channel).await? {
            GatewayMessage::Challenge { nonce } => return Ok(auth::decode_nonce(&nonce)?),
            GatewayMessage::Error(reason) => return Err(AuthFailure::Rejected(reason)),
            GatewayMessage::AuthOk { .. } => {
                return Err(AuthFailure::Protocol(
                    "auth_ok received before credentials were sent".into(),
                ))
            }
            GatewayMessage::Data(banner) => {
                trace!(len = banner.len(), "ignoring pre-auth data");
            }
        }
    }
}

/// Wait for acceptance or rejection of the submitted credentials.
async fn await_outcome(channel: &mut TransportChannel) -> Result<SessionHandle, AuthFailure> {
    loop {
        match next_gateway_message(channel).await? {
            GatewayMessage::AuthOk { session_id } => return Ok(SessionHandle { session_id }),
            GatewayMessage::Error(reason) => return Err(AuthFailure::Rejected(reason)),
            GatewayMessage::Challenge { .. } => {
                debug!("ignoring challenge after credentials were sent");
            }
            GatewayMessage::Data(banner) => {
                trace!(len = banner.len(), "ignoring pre-auth data");
            }
        }
    }
}

async fn next_gateway_message(channel: &mut TransportChannel) -> Result<GatewayMessage, AuthFailure> {
    loop {
        match channel.next_event().await {
            TransportEvent::Message(TransportMessage::Text(text)) => {
                return codec::decode_gateway(&text)
                    .map_err(|e| AuthFailure::Protocol(e.to_string()));
            }
            TransportEvent::Message(TransportMessage::Binary(data)) => {
                trace!(len = data.len(), "ignoring binary frame during authentication");
            }
            TransportEvent::Closed => {
                return Err(AuthFailure::Transport(
                    "gateway closed the connection".into(),
                ))
            }
            TransportEvent::Error(reason) => return Err(AuthFailure::Transport(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::transport::memory::{pair, GatewayFrame};
    use crate::transport::Connector;
    use ssh_key::rand_core::OsRng;
    use ssh_key::{Algorithm, LineEnding, PrivateKey};

    const ENDPOINT: &str = "ws://memory/remote";

    fn key_pem() -> (PrivateKey, String) {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let pem = key.to_openssh(LineEnding::LF).unwrap().to_string();
        (key, pem)
    }

    #[tokio::test]
    async fn password_accepted() {
        let config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "secretpassword")
            .validate()
            .unwrap();
        let (connector, mut gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();

        let gateway_task = tokio::spawn(async move {
            let msg = gateway.recv_control().await.unwrap();
            gateway
                .send(&GatewayMessage::AuthOk {
                    session_id: Some("s-1".into()),
                })
                .await;
            (msg, gateway)
        });

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert_eq!(
            result,
            AuthResult::Authenticated(SessionHandle {
                session_id: Some("s-1".into())
            })
        );

        let (msg, _gateway) = gateway_task.await.unwrap();
        match msg {
            ClientMessage::Auth(req) => {
                assert_eq!(req.username, "root");
                assert_eq!(req.hostname, "localhost");
                assert_eq!(
                    req.credential,
                    AuthCredential::Password {
                        password: "secretpassword".into()
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn password_rejected() {
        let config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "wrong")
            .validate()
            .unwrap();
        let (connector, gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();
        gateway
            .send(&GatewayMessage::Error("Authentication failed.".into()))
            .await;

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert_eq!(
            result,
            AuthResult::Failed(AuthFailure::Rejected("Authentication failed.".into()))
        );
    }

    #[tokio::test]
    async fn silence_times_out() {
        let mut config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "pw");
        config.auth_timeout = Duration::from_millis(100);
        let config = config.validate().unwrap();
        let (connector, _gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert_eq!(
            result,
            AuthResult::Failed(AuthFailure::Timeout(Duration::from_millis(100)))
        );
    }

    #[tokio::test]
    async fn gateway_hangup_is_a_transport_failure() {
        let config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "pw")
            .validate()
            .unwrap();
        let (connector, gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();
        gateway.close().await;

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert!(matches!(result, AuthResult::Failed(AuthFailure::Transport(_))));
    }

    #[tokio::test]
    async fn private_key_signs_the_challenge() {
        let (key, pem) = key_pem();
        let config = ConnectionConfig::private_key(ENDPOINT, "localhost", "root", pem, None)
            .validate()
            .unwrap();
        let (connector, mut gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();

        let nonce = [7u8; 32];
        gateway
            .send(&GatewayMessage::Challenge {
                nonce: hex::encode(nonce),
            })
            .await;

        let gateway_task = tokio::spawn(async move {
            let msg = gateway.recv_control().await.unwrap();
            gateway.send(&GatewayMessage::AuthOk { session_id: None }).await;
            msg
        });

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert!(matches!(result, AuthResult::Authenticated(_)));

        match gateway_task.await.unwrap() {
            ClientMessage::Auth(AuthRequest {
                credential:
                    AuthCredential::Publickey {
                        public_key,
                        signature,
                    },
                ..
            }) => {
                assert_eq!(public_key, key.public_key().to_openssh().unwrap());
                assert!(auth::verify_challenge(
                    &public_key,
                    &signature,
                    "localhost",
                    "root",
                    &nonce
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unchallenged_key_auth_times_out_without_sending() {
        let (_, pem) = key_pem();
        let mut config = ConnectionConfig::private_key(ENDPOINT, "localhost", "root", pem, None);
        config.auth_timeout = Duration::from_millis(100);
        let config = config.validate().unwrap();
        let (connector, mut gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert_eq!(
            result,
            AuthResult::Failed(AuthFailure::Timeout(Duration::from_millis(100)))
        );
        assert!(gateway.drain().is_empty());
    }

    #[tokio::test]
    async fn encrypted_key_without_passphrase_fails_before_sending() {
        let (key, _) = key_pem();
        let encrypted = key.encrypt(&mut OsRng, "secretpassphrase").unwrap();
        let pem = encrypted.to_openssh(LineEnding::LF).unwrap().to_string();
        let config = ConnectionConfig::private_key(ENDPOINT, "localhost", "root", pem, None)
            .validate()
            .unwrap();
        let (connector, mut gateway) = pair();
        let mut channel = connector.open(ENDPOINT).await.unwrap();

        let result = Negotiator::new(&config).run(&mut channel).await;
        assert_eq!(result, AuthResult::Failed(AuthFailure::PassphraseRequired));
        assert!(gateway
            .drain()
            .iter()
            .all(|f| !matches!(f, GatewayFrame::Message(_))));
    }
}
