//! russh-backed transport.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key;
use russh::{Channel, ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{ChannelRead, Connector, RemoteShell, ShellChannel};
use crate::config::SessionConfig;
use crate::core::error::SessionError;
use crate::core::models::CredentialProfile;

/// Missed keepalives tolerated before the session is declared dead.
const KEEPALIVE_MAX: usize = 3;
const PTY_TERM: &str = "vt100";
const PTY_COLUMNS: u32 = 200;
const PTY_ROWS: u32 = 48;

/// Host keys are not pinned; any key the device presents is accepted.
struct AcceptAnyHostKey {
    host: String,
}

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            algorithm = server_public_key.algorithm().as_str(),
            "Accepting host key"
        );
        Ok(true)
    }
}

fn classify(host: &str, port: u16, err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(source) => SessionError::network(host, port, source),
        russh::Error::KeepaliveTimeout | russh::Error::InactivityTimeout => {
            SessionError::timeout(host, port, "keepalive")
        }
        other => SessionError::protocol(host, port, other.to_string()),
    }
}

pub struct SshConnector {
    config: SessionConfig,
}

impl SshConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> Arc<client::Config> {
        Arc::new(client::Config {
            keepalive_interval: Some(self.config.keepalive_interval()),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        address: &str,
        profile: &CredentialProfile,
    ) -> Result<Box<dyn RemoteShell>, SessionError> {
        let port = profile.port;

        let stream = timeout(
            self.config.connect_timeout(),
            TcpStream::connect((address, port)),
        )
        .await
        .map_err(|_| SessionError::timeout(address, port, "connect"))?
        .map_err(|e| SessionError::network(address, port, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(host = %address, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = AcceptAnyHostKey {
            host: address.to_string(),
        };
        let handle = timeout(
            self.config.banner_timeout(),
            client::connect_stream(self.client_config(), stream, handler),
        )
        .await
        .map_err(|_| SessionError::timeout(address, port, "banner exchange"))?
        .map_err(|e| classify(address, port, e))?;

        let mut shell = SshShell {
            handle,
            host: address.to_string(),
            port,
        };

        let auth = timeout(
            self.config.auth_timeout(),
            shell
                .handle
                .authenticate_password(profile.username.clone(), profile.secret.clone()),
        )
        .await;

        let failure = match auth {
            Ok(Ok(result)) if result.success() => return Ok(Box::new(shell)),
            Ok(Ok(_)) => SessionError::authentication(address, port, &profile.username),
            Ok(Err(e)) => classify(address, port, e),
            Err(_) => SessionError::timeout(address, port, "authentication"),
        };

        shell.close().await;
        Err(failure)
    }
}

struct SshShell {
    handle: Handle<AcceptAnyHostKey>,
    host: String,
    port: u16,
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn open_channel(&mut self) -> Result<Box<dyn ShellChannel>, SessionError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| classify(&self.host, self.port, e))?;

        channel
            .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(|e| classify(&self.host, self.port, e))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| classify(&self.host, self.port, e))?;

        Ok(Box::new(SshChannel {
            channel,
            host: self.host.clone(),
            port: self.port,
        }))
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "backup complete", "en")
            .await
        {
            debug!(host = %self.host, error = %e, "Disconnect failed");
        }
    }
}

struct SshChannel {
    channel: Channel<Msg>,
    host: String,
    port: u16,
}

#[async_trait]
impl ShellChannel for SshChannel {
    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| classify(&self.host, self.port, e))
    }

    async fn read_within(&mut self, wait: Duration) -> Result<ChannelRead, SessionError> {
        loop {
            match timeout(wait, self.channel.wait()).await {
                Err(_) => return Ok(ChannelRead::Pending),
                Ok(None) => return Ok(ChannelRead::Closed),
                Ok(Some(ChannelMsg::Data { data })) => return Ok(ChannelRead::Data(data.to_vec())),
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    return Ok(ChannelRead::Data(data.to_vec()));
                }
                Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) => {
                    return Ok(ChannelRead::Closed);
                }
                // Window adjustments, exit status and the like
                Ok(Some(_)) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.channel
            .close()
            .await
            .map_err(|e| classify(&self.host, self.port, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_network_failures() {
        let err = classify(
            "10.0.0.9",
            2222,
            russh::Error::IO(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        );

        assert_eq!(err.kind(), crate::core::models::FailureKind::Network);
        assert!(err.to_string().contains("10.0.0.9:2222"));
    }

    #[test]
    fn keepalive_loss_is_a_timeout() {
        let err = classify("10.0.0.9", 22, russh::Error::KeepaliveTimeout);
        assert_eq!(
            err.kind(),
            crate::core::models::FailureKind::ConnectionTimeout
        );
    }

    #[tokio::test]
    async fn unreachable_port_is_a_network_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = SshConnector::new(SessionConfig {
            connect_timeout_secs: 2,
            ..SessionConfig::default()
        });
        let profile = CredentialProfile {
            name: "lab".to_string(),
            username: "admin".to_string(),
            secret: "secret".to_string(),
            port,
        };

        let err = match connector.connect("127.0.0.1", &profile).await {
            Ok(_) => panic!("connect to closed port should fail"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), crate::core::models::FailureKind::Network);
    }

    #[tokio::test]
    async fn peer_hanging_up_before_banner_fails_with_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept the TCP connection, then hang up without a banner
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let connector = SshConnector::new(SessionConfig {
            connect_timeout_secs: 2,
            banner_timeout_secs: 2,
            ..SessionConfig::default()
        });
        let profile = CredentialProfile {
            name: "lab".to_string(),
            username: "admin".to_string(),
            secret: "secret".to_string(),
            port,
        };

        let err = match connector.connect("127.0.0.1", &profile).await {
            Ok(_) => panic!("handshake with a silent peer should fail"),
            Err(e) => e,
        };
        assert!(
            err.to_string().contains(&format!("127.0.0.1:{}", port)),
            "{}",
            err
        );
    }
}
