//! Connection configuration and its validation.
//!
//! [`ConnectionConfig`] mirrors what callers naturally have at hand: a bag
//! of fields where only the credential named by `authentication_method`
//! matters. [`ConnectionConfig::validate`] resolves it into a
//! [`ValidatedConfig`] whose [`Credentials`] carry exactly one credential
//! form, before any transport activity happens.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::transport;

/// Default SSH port on the target host.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default bound on the authentication exchange.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Which credential the session authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationMethod {
    #[default]
    Password,
    PrivateKey,
}

impl FromStr for AuthenticationMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(Self::Password),
            "private_key" => Ok(Self::PrivateKey),
            other => Err(ClientError::Config(format!(
                "unknown authentication method '{other}' (expected 'password' or 'private_key')"
            ))),
        }
    }
}

/// How outbound session bytes are framed on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundFraming {
    /// One binary frame per `send()`.
    #[default]
    Binary,
    /// One `{"data": "..."}` text frame per `send()`, for bridges that parse
    /// every inbound frame as JSON. Bytes that are not UTF-8 are replaced.
    Text,
}

impl FromStr for OutboundFraming {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "text" => Ok(Self::Text),
            other => Err(ClientError::Config(format!(
                "unknown framing '{other}' (expected 'binary' or 'text')"
            ))),
        }
    }
}

/// Caller-supplied connection parameters.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Gateway WebSocket URL (`ws://` or `wss://`).
    pub endpoint: String,
    /// Target SSH host, as seen from the gateway.
    pub hostname: String,
    /// Target SSH port.
    pub port: u16,
    pub username: String,
    pub authentication_method: AuthenticationMethod,
    pub password: Option<String>,
    /// OpenSSH PEM private key material.
    pub private_key: Option<String>,
    pub key_passphrase: Option<String>,
    /// Bound on the authentication exchange.
    pub auth_timeout: Duration,
    /// Terminal type requested for the remote pty.
    pub term: String,
    /// Remote command to run instead of an interactive shell.
    pub command: Option<String>,
    /// Initial pty width in columns.
    pub cols: u16,
    /// Initial pty height in rows.
    pub rows: u16,
    pub framing: OutboundFraming,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            hostname: String::new(),
            port: DEFAULT_SSH_PORT,
            username: String::new(),
            authentication_method: AuthenticationMethod::Password,
            password: None,
            private_key: None,
            key_passphrase: None,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            term: "xterm".to_string(),
            command: None,
            cols: 80,
            rows: 24,
            framing: OutboundFraming::Binary,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("authentication_method", &self.authentication_method)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "<redacted>"))
            .field("auth_timeout", &self.auth_timeout)
            .field("term", &self.term)
            .field("command", &self.command)
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("framing", &self.framing)
            .finish()
    }
}

impl ConnectionConfig {
    /// Password authentication against `username@hostname` through `endpoint`.
    pub fn password(
        endpoint: impl Into<String>,
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            hostname: hostname.into(),
            username: username.into(),
            authentication_method: AuthenticationMethod::Password,
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// Private-key authentication against `username@hostname` through `endpoint`.
    pub fn private_key(
        endpoint: impl Into<String>,
        hostname: impl Into<String>,
        username: impl Into<String>,
        private_key: impl Into<String>,
        key_passphrase: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            hostname: hostname.into(),
            username: username.into(),
            authentication_method: AuthenticationMethod::PrivateKey,
            private_key: Some(private_key.into()),
            key_passphrase,
            ..Default::default()
        }
    }

    /// Check every field and resolve the selected credential.
    pub fn validate(&self) -> ClientResult<ValidatedConfig> {
        transport::validate_endpoint(&self.endpoint)?;

        if self.hostname.trim().is_empty() {
            return Err(ClientError::Config("hostname is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(ClientError::Config("username is required".into()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must be non-zero".into()));
        }
        if self.auth_timeout.is_zero() {
            return Err(ClientError::Config("auth_timeout must be non-zero".into()));
        }
        if self.cols == 0 || self.rows == 0 {
            return Err(ClientError::Config("window size must be non-zero".into()));
        }

        let credentials = match self.authentication_method {
            AuthenticationMethod::Password => Credentials::Password {
                secret: self.password.clone().ok_or_else(|| {
                    ClientError::Config("password authentication requires a password".into())
                })?,
            },
            AuthenticationMethod::PrivateKey => {
                let key_material = self
                    .private_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        ClientError::Config(
                            "private_key authentication requires a private key".into(),
                        )
                    })?;
                Credentials::PrivateKey {
                    key_material,
                    passphrase: self.key_passphrase.clone(),
                }
            }
        };

        Ok(ValidatedConfig {
            endpoint: self.endpoint.clone(),
            target: Target {
                hostname: self.hostname.clone(),
                port: self.port,
                username: self.username.clone(),
                term: self.term.clone(),
                command: self.command.clone(),
                cols: self.cols,
                rows: self.rows,
            },
            credentials,
            auth_timeout: self.auth_timeout,
            framing: self.framing,
        })
    }
}

/// The single credential a session authenticates with.
#[derive(Clone)]
pub enum Credentials {
    Password {
        secret: String,
    },
    PrivateKey {
        key_material: String,
        passphrase: Option<String>,
    },
}

impl Credentials {
    pub fn method(&self) -> AuthenticationMethod {
        match self {
            Self::Password { .. } => AuthenticationMethod::Password,
            Self::PrivateKey { .. } => AuthenticationMethod::PrivateKey,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.write_str("Credentials::Password(<redacted>)"),
            Self::PrivateKey { passphrase, .. } => f
                .debug_struct("Credentials::PrivateKey")
                .field("encrypted_with_passphrase", &passphrase.is_some())
                .finish_non_exhaustive(),
        }
    }
}

/// The SSH target and pty parameters requested from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub term: String,
    pub command: Option<String>,
    pub cols: u16,
    pub rows: u16,
}

/// A configuration that passed [`ConnectionConfig::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub endpoint: String,
    pub target: Target,
    pub credentials: Credentials,
    pub auth_timeout: Duration,
    pub framing: OutboundFraming,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "ws://localhost:5000/remote";

    fn expect_config_error(config: &ConnectionConfig, needle: &str) {
        match config.validate() {
            Err(ClientError::Config(reason)) => {
                assert!(reason.contains(needle), "'{reason}' lacks '{needle}'")
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn password_config_resolves_password_credential() {
        let config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "secretpassword");
        let validated = config.validate().unwrap();
        assert_eq!(validated.target.hostname, "localhost");
        assert_eq!(validated.target.port, DEFAULT_SSH_PORT);
        assert_eq!(validated.auth_timeout, DEFAULT_AUTH_TIMEOUT);
        assert!(matches!(
            validated.credentials,
            Credentials::Password { ref secret } if secret == "secretpassword"
        ));
    }

    #[test]
    fn only_the_selected_credential_is_used() {
        let mut config = ConnectionConfig::password(ENDPOINT, "localhost", "root", "pw");
        config.private_key = Some("ignored".into());
        config.key_passphrase = Some("secretpassphrase".into());
        assert_eq!(
            config.validate().unwrap().credentials.method(),
            AuthenticationMethod::Password
        );

        config.authentication_method = AuthenticationMethod::PrivateKey;
        let validated = config.validate().unwrap();
        match validated.credentials {
            Credentials::PrivateKey {
                key_material,
                passphrase,
            } => {
                assert_eq!(key_material, "ignored");
                assert_eq!(passphrase.as_deref(), Some("secretpassphrase"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_fields_are_rejected() {
        let base = ConnectionConfig::password(ENDPOINT, "localhost", "root", "pw");

        let mut c = base.clone();
        c.hostname = String::new();
        expect_config_error(&c, "hostname");

        let mut c = base.clone();
        c.username = "  ".into();
        expect_config_error(&c, "username");

        let mut c = base.clone();
        c.password = None;
        expect_config_error(&c, "requires a password");

        let mut c = base.clone();
        c.authentication_method = AuthenticationMethod::PrivateKey;
        expect_config_error(&c, "requires a private key");

        let mut c = base.clone();
        c.port = 0;
        expect_config_error(&c, "port");

        let mut c = base;
        c.auth_timeout = Duration::ZERO;
        expect_config_error(&c, "auth_timeout");
    }

    #[test]
    fn endpoint_must_be_websocket() {
        let config = ConnectionConfig::password("http://localhost:5000", "h", "u", "p");
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let config = ConnectionConfig::password("", "h", "u", "p");
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn method_names_parse() {
        assert_eq!(
            "password".parse::<AuthenticationMethod>().unwrap(),
            AuthenticationMethod::Password
        );
        assert_eq!(
            "private_key".parse::<AuthenticationMethod>().unwrap(),
            AuthenticationMethod::PrivateKey
        );
        assert!("keyboard-interactive".parse::<AuthenticationMethod>().is_err());
    }

    #[test]
    fn framing_defaults_to_binary_and_parses() {
        let config = ConnectionConfig::password(ENDPOINT, "h", "u", "p");
        assert_eq!(config.validate().unwrap().framing, OutboundFraming::Binary);
        assert_eq!("text".parse::<OutboundFraming>().unwrap(), OutboundFraming::Text);
        assert!("json".parse::<OutboundFraming>().is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut config = ConnectionConfig::password(ENDPOINT, "h", "u", "hunter2");
        config.key_passphrase = Some("secretpassphrase".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secretpassphrase"));
    }
}
