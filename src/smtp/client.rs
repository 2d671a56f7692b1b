/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::{
    reply::{self, Reply, ReplyParser},
    ProtocolError,
};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    pub fn new(stream: T, timeout: Duration) -> Self {
        SmtpClient {
            stream,
            timeout,
            pending: Vec::new(),
        }
    }

    /// Reads one complete reply, however the bytes are split across reads.
    pub(crate) async fn read(&mut self) -> crate::Result<Reply> {
        let mut parser = ReplyParser::new();

        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let mut iter = pending.iter();
            match parser.parse(&mut iter) {
                Ok(reply) => {
                    self.pending = iter.as_slice().to_vec();
                    log::trace!("S: {reply}");
                    return Ok(reply);
                }
                Err(reply::Error::NeedsMoreData) => (),
                Err(err) => return Err(ProtocolError::from(err).into()),
            }
        }

        let mut buf = vec![0u8; 1024];
        loop {
            let br = self.stream.read(&mut buf).await?;

            if br == 0 {
                return Err(ProtocolError::ConnectionClosedPrematurely.into());
            }

            let mut iter = buf[..br].iter();
            match parser.parse(&mut iter) {
                Ok(reply) => {
                    self.pending.extend_from_slice(iter.as_slice());
                    log::trace!("S: {reply}");
                    return Ok(reply);
                }
                Err(reply::Error::NeedsMoreData) => (),
                Err(err) => return Err(ProtocolError::from(err).into()),
            }
        }
    }

    /// Waits for a reply the server sends unprompted, such as the greeting.
    pub async fn read_reply(&mut self) -> crate::Result<Reply> {
        tokio::time::timeout(self.timeout, self.read())
            .await
            .map_err(|_| ProtocolError::Timeout)?
    }

    /// Sends a command line to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, line: &str) -> crate::Result<Reply> {
        log::debug!("C: {line}");
        self.exchange(line).await
    }

    /// Same as [`SmtpClient::cmd`], keeping `line` out of the logs.
    pub(crate) async fn cmd_secret(&mut self, line: &str) -> crate::Result<Reply> {
        log::debug!("C: <redacted>");
        self.exchange(line).await
    }

    async fn exchange(&mut self, line: &str) -> crate::Result<Reply> {
        tokio::time::timeout(self.timeout, async {
            let mut bytes = Vec::with_capacity(line.len() + 2);
            bytes.extend_from_slice(line.as_bytes());
            bytes.extend_from_slice(b"\r\n");
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await?;
            self.read().await
        })
        .await
        .map_err(|_| ProtocolError::Timeout)?
    }

    /// True if the server sent bytes beyond the last reply read.
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Shuts the connection down. Errors are logged and otherwise ignored.
    pub async fn close(mut self) {
        match tokio::time::timeout(self.timeout, self.stream.shutdown()).await {
            Ok(Ok(())) => log::debug!("Connection closed"),
            Ok(Err(err)) => log::debug!("Failed to shut down connection: {err}"),
            Err(_) => log::debug!("Timed out shutting down connection"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use crate::{smtp::ProtocolError, Error, SmtpClient};

    #[tokio::test]
    async fn multi_line_reply_across_writes() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = SmtpClient::new(client, Duration::from_secs(5));

        let server = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert_eq!(line, "EHLO client.example.test\r\n");
            let server = server.get_mut();
            server.write_all(b"250-smtp.example.test\r\n250-SI").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"ZE 1000\r\n250 STARTTLS\r\n").await.unwrap();
        });

        let reply = client.cmd("EHLO client.example.test").await.unwrap();
        assert_eq!(reply.code(), 250);
        assert_eq!(
            reply.message(),
            &["smtp.example.test", "SIZE 1000", "STARTTLS"]
        );
        assert!(!client.has_pending());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn two_replies_in_one_read() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut client = SmtpClient::new(client, Duration::from_secs(5));
        server
            .write_all(b"220 ready\r\n250 queued\r\n")
            .await
            .unwrap();

        assert_eq!(client.read_reply().await.unwrap().code(), 220);
        assert!(client.has_pending());
        assert_eq!(client.read_reply().await.unwrap().code(), 250);
        assert!(!client.has_pending());
    }

    #[tokio::test]
    async fn closed_before_reply() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut client = SmtpClient::new(client, Duration::from_secs(5));
        server.write_all(b"220-partial\r\n").await.unwrap();
        drop(server);

        assert!(matches!(
            client.read_reply().await,
            Err(Error::Protocol(ProtocolError::ConnectionClosedPrematurely))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut client = SmtpClient::new(client, Duration::from_millis(50));

        assert!(matches!(
            client.cmd("NOOP").await,
            Err(Error::Protocol(ProtocolError::Timeout))
        ));
    }
}
