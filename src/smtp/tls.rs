/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{io, sync::Arc};

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{ServerName, TrustAnchor};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::{smtp::ProtocolError, SmtpClient};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid TLS name {0:?}")]
    InvalidTLSName(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),
}

/// Opens transport connections and upgrades them to TLS in place.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Plain: AsyncRead + AsyncWrite + Unpin;
    type Secure: AsyncRead + AsyncWrite + Unpin;

    async fn connect(&self, hostname: &str, port: u16) -> io::Result<Self::Plain>;

    /// Runs the TLS handshake over `stream`, validating the peer certificate
    /// against `hostname`. On failure the plaintext stream is handed back so
    /// the caller can still close it.
    async fn upgrade(
        &self,
        stream: Self::Plain,
        hostname: &str,
    ) -> Result<Self::Secure, (Error, Self::Plain)>;
}

/// TCP connections secured with rustls.
#[derive(Clone)]
pub struct TcpConnector {
    tls_connector: TlsConnector,
}

impl TcpConnector {
    pub fn new(tls_connector: TlsConnector) -> Self {
        TcpConnector { tls_connector }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector::new(build_tls_connector())
    }
}

impl Connector for TcpConnector {
    type Plain = TcpStream;
    type Secure = TlsStream<TcpStream>;

    async fn connect(&self, hostname: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((hostname, port)).await
    }

    async fn upgrade(
        &self,
        stream: TcpStream,
        hostname: &str,
    ) -> Result<TlsStream<TcpStream>, (Error, TcpStream)> {
        let server_name = match ServerName::try_from(hostname) {
            Ok(server_name) => server_name.to_owned(),
            Err(_) => return Err((Error::InvalidTLSName(hostname.to_string()), stream)),
        };

        self.tls_connector
            .connect(server_name, stream)
            .into_fallible()
            .await
            .map_err(|(err, stream)| (Error::Handshake(err), stream))
    }
}

impl<P: AsyncRead + AsyncWrite + Unpin> SmtpClient<P> {
    /// Upgrades the connection to TLS.
    ///
    /// Call after [`SmtpClient::request_tls`]. When the handshake fails the
    /// plaintext client is returned alongside the error; when it times out
    /// the stream is dropped with the handshake future.
    pub async fn into_tls<C>(
        self,
        connector: &C,
        hostname: &str,
    ) -> Result<SmtpClient<C::Secure>, (crate::Error, Option<SmtpClient<P>>)>
    where
        C: Connector<Plain = P>,
    {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, connector.upgrade(self.stream, hostname)).await {
            Ok(Ok(stream)) => Ok(SmtpClient::new(stream, timeout)),
            Ok(Err((err, stream))) => Err((
                crate::Error::EncryptionUpgradeFailed(err),
                Some(SmtpClient::new(stream, timeout)),
            )),
            Err(_) => {
                log::debug!("TLS handshake with {hostname} timed out, dropping connection");
                Err((ProtocolError::Timeout.into(), None))
            }
        }
    }
}

pub fn build_tls_connector() -> TlsConnector {
    let mut root_cert_store = RootCertStore::empty();

    root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| TrustAnchor {
        subject: ta.subject.clone(),
        subject_public_key_info: ta.subject_public_key_info.clone(),
        name_constraints: ta.name_constraints.clone(),
    }));

    let config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
