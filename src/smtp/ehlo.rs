/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

use super::{
    capability::{Capabilities, Capability},
    reply::Reply,
    AssertReply, ProtocolError,
};

const SERVICE_READY: u16 = 220;
const OK: u16 = 250;

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Reads the unsolicited greeting; nothing is sent first.
    pub async fn read_greeting(&mut self) -> crate::Result<Reply> {
        self.read_reply().await?.assert_code(SERVICE_READY)
    }

    /// Sends a EHLO command to the server.
    pub async fn ehlo(&mut self, hostname: &str) -> crate::Result<Capabilities> {
        let reply = self.cmd(&format!("EHLO {hostname}")).await?.assert_code(OK)?;
        Ok(Capabilities::from(&reply))
    }

    /// Asks the server to begin the TLS handshake.
    ///
    /// On success the caller must hand the stream to a
    /// [`Connector`](super::tls::Connector) before sending anything else.
    pub async fn request_tls(&mut self, capabilities: &Capabilities) -> crate::Result<()> {
        if !capabilities.has_capability(&Capability::StartTLS) {
            log::warn!(
                "Server {} does not announce STARTTLS, requesting it anyway",
                capabilities.hostname()
            );
        }

        self.cmd("STARTTLS").await?.assert_code(SERVICE_READY)?;

        // Anything already buffered was sent in plaintext and must not be
        // read as if it came over the encrypted channel.
        if self.has_pending() {
            return Err(ProtocolError::PipelinedData.into());
        }
        Ok(())
    }
}
