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

use super::{capability::Capabilities, reply::Reply, AssertReply, ProtocolError};

const OK: u16 = 250;
const USER_NOT_LOCAL: u16 = 251;
const START_DATA: u16 = 354;
const CLOSING: u16 = 221;

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, addr: &str) -> crate::Result<()> {
        self.cmd(&format!("MAIL FROM:<{addr}>"))
            .await?
            .assert_code(OK)
            .map(|_| ())
    }

    /// Sends a RCPT TO command to the server.
    pub async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()> {
        let reply = self.cmd(&format!("RCPT TO:<{addr}>")).await?;
        if reply.code() == USER_NOT_LOCAL {
            Ok(())
        } else {
            reply.assert_code(OK).map(|_| ())
        }
    }

    /// Sends a DATA command followed by the message and the end-of-data marker.
    pub async fn data(&mut self, message: &[u8]) -> crate::Result<Reply> {
        self.cmd("DATA").await?.assert_code(START_DATA)?;
        log::debug!("C: <{} bytes of message data>", message.len());
        tokio::time::timeout(self.timeout, async {
            self.write_message(message).await?;
            self.read().await
        })
        .await
        .map_err(|_| ProtocolError::Timeout)??
        .assert_code(OK)
    }

    /// Sends a QUIT command to the server.
    pub async fn quit(&mut self) -> crate::Result<()> {
        self.cmd("QUIT").await?.assert_code(CLOSING).map(|_| ())
    }

    /// Runs one mail transaction: envelope, payload, then QUIT.
    ///
    /// Each step must succeed before the next is attempted. Once the payload
    /// has been accepted the message counts as delivered, so a failed QUIT is
    /// only logged.
    pub async fn transmit(
        &mut self,
        from: &str,
        to: &str,
        message: &[u8],
        capabilities: &Capabilities,
    ) -> crate::Result<()> {
        if let Some(limit) = capabilities.size() {
            if message.len() > limit {
                return Err(ProtocolError::MessageTooLarge {
                    size: message.len(),
                    limit,
                }
                .into());
            }
        }

        self.mail_from(from).await?;
        self.rcpt_to(to).await?;
        let reply = self.data(message).await?;
        log::info!("Message from <{from}> to <{to}> accepted: {reply}");

        if let Err(err) = self.quit().await {
            log::warn!("QUIT after delivery failed: {err}");
        }
        Ok(())
    }
}
