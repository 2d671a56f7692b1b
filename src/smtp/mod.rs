/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

pub mod auth;
pub mod capability;
pub mod client;
pub mod ehlo;
pub mod envelope;
pub mod reply;
pub mod session;
pub mod stream;
pub mod tls;

use reply::Reply;

/// Failures of the command/reply exchange itself.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The server answered with a code other than the one this step requires.
    #[error("expected {expected}, got {reply}")]
    UnexpectedReply { expected: u16, reply: Reply },

    /// The peer closed the connection before a complete reply arrived.
    #[error("connection closed before a complete reply was received")]
    ConnectionClosedPrematurely,

    /// No complete reply arrived within the configured deadline.
    #[error("timed out waiting for the server")]
    Timeout,

    #[error("malformed reply: {0}")]
    MalformedReply(#[from] reply::Error),

    /// The server sent data after accepting STARTTLS, before the TLS handshake.
    #[error("unexpected data received before the TLS handshake")]
    PipelinedData,

    /// The payload exceeds the size limit the server advertised.
    #[error("message of {size} bytes exceeds the server limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("operation not valid in this session state: {0}")]
    InvalidState(&'static str),
}

pub(crate) trait AssertReply: Sized {
    fn assert_code(self, expected: u16) -> crate::Result<Reply>;
}

impl AssertReply for Reply {
    /// Returns the reply if its code is `expected`, a protocol error otherwise.
    fn assert_code(self, expected: u16) -> crate::Result<Reply> {
        if self.code() == expected {
            Ok(self)
        } else {
            Err(ProtocolError::UnexpectedReply {
                expected,
                reply: self,
            }
            .into())
        }
    }
}
