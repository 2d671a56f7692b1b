/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt::Display;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{config::Config, message::Message, SmtpClient};

use super::{tls::Connector, ProtocolError};

/// Progress of a single send. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Disconnected,
    PlaintextConnected,
    EncryptionNegotiated,
    Authenticated,
    TransactionInFlight,
    Closed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::PlaintextConnected => "plaintext-connected",
            SessionState::EncryptionNegotiated => "encryption-negotiated",
            SessionState::Authenticated => "authenticated",
            SessionState::TransactionInFlight => "transaction-in-flight",
            SessionState::Closed => "closed",
        })
    }
}

/// The one live handle of a session, before or after the TLS upgrade.
enum Connection<P, S> {
    Plain(SmtpClient<P>),
    Encrypted(SmtpClient<S>),
    Closed,
}

impl<P, S> Connection<P, S>
where
    P: AsyncRead + AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn plain(&mut self) -> crate::Result<&mut SmtpClient<P>> {
        match self {
            Connection::Plain(client) => Ok(client),
            _ => Err(ProtocolError::InvalidState("expected a plaintext connection").into()),
        }
    }

    fn encrypted(&mut self) -> crate::Result<&mut SmtpClient<S>> {
        match self {
            Connection::Encrypted(client) => Ok(client),
            _ => Err(ProtocolError::InvalidState("expected an encrypted connection").into()),
        }
    }

    async fn upgrade<C>(&mut self, connector: &C, hostname: &str) -> crate::Result<()>
    where
        C: Connector<Plain = P, Secure = S>,
    {
        let client = match std::mem::replace(self, Connection::Closed) {
            Connection::Plain(client) => client,
            other => {
                *self = other;
                return Err(ProtocolError::InvalidState("connection already upgraded").into());
            }
        };

        match client.into_tls(connector, hostname).await {
            Ok(client) => {
                *self = Connection::Encrypted(client);
                Ok(())
            }
            Err((err, client)) => {
                if let Some(client) = client {
                    *self = Connection::Plain(client);
                }
                Err(err)
            }
        }
    }

    /// Closes whichever handle is live. Later calls do nothing.
    async fn close(&mut self) {
        match std::mem::replace(self, Connection::Closed) {
            Connection::Plain(client) => client.close().await,
            Connection::Encrypted(client) => client.close().await,
            Connection::Closed => (),
        }
    }
}

/// Sends one message over one connection.
///
/// The connection is opened by [`Session::send`] and closed before it
/// returns, whichever step fails. Dropping the future mid-send drops the
/// socket with it.
pub struct Session<'a, C: Connector> {
    connector: &'a C,
    config: &'a Config,
    state: SessionState,
}

impl<'a, C: Connector> Session<'a, C> {
    pub fn new(connector: &'a C, config: &'a Config) -> Self {
        Session {
            connector,
            config,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{} -> {}", self.state, next);
        log::debug!("Session {} -> {}", self.state, next);
        self.state = next;
    }

    pub async fn send(&mut self, message: &Message<'_>) -> crate::Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(ProtocolError::InvalidState("session already used").into());
        }

        // Malformed messages are rejected before opening a connection
        let payload = message.compose()?.to_bytes();

        let stream = match tokio::time::timeout(
            self.config.timeout,
            self.connector.connect(&self.config.host, self.config.port),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.transition(SessionState::Closed);
                return Err(err.into());
            }
            Err(_) => {
                self.transition(SessionState::Closed);
                return Err(ProtocolError::Timeout.into());
            }
        };
        self.transition(SessionState::PlaintextConnected);

        let mut connection = Connection::Plain(SmtpClient::new(stream, self.config.timeout));
        let result = self.run(&mut connection, message, &payload).await;
        connection.close().await;
        self.transition(SessionState::Closed);

        result
    }

    async fn run(
        &mut self,
        connection: &mut Connection<C::Plain, C::Secure>,
        message: &Message<'_>,
        payload: &[u8],
    ) -> crate::Result<()> {
        let config = self.config;

        let client = connection.plain()?;
        client.read_greeting().await?;
        let capabilities = client.ehlo(&config.helo_host).await?;
        client.request_tls(&capabilities).await?;

        connection.upgrade(self.connector, &config.host).await?;
        self.transition(SessionState::EncryptionNegotiated);

        // Capabilities announced before the upgrade are discarded
        let client = connection.encrypted()?;
        let capabilities = client.ehlo(&config.helo_host).await?;
        client
            .authenticate(&config.credentials, config.mechanism, &capabilities)
            .await?;
        self.transition(SessionState::Authenticated);

        self.transition(SessionState::TransactionInFlight);
        client
            .transmit(&message.from, &message.to, payload, &capabilities)
            .await
    }
}
