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

//! # labmail
//!
//! _labmail_ delivers notification e-mails (quotes, approvals, shipment
//! updates, reminders) to a submission server over SMTP. Every message is
//! sent on its own connection:
//!
//! - Reads the greeting and announces itself with `EHLO`.
//! - Upgrades the session with `STARTTLS` (_RFC 3207_) and repeats `EHLO`
//!   over the encrypted channel.
//! - Authenticates with `AUTH PLAIN` or `AUTH LOGIN` (_RFC 4954_).
//! - Transmits a `multipart/alternative` message with a plain-text and an
//!   HTML rendition, applying the dot transparency procedure of _RFC 5321_.
//! - Sends `QUIT` and closes the connection, on every exit path.
//!
//! ## Usage Example
//!
//! ```rust
//!     let config = Config::from_env()?;
//!     let message = Message::new("lab@example.com", "customer@example.com", "Quote ready")
//!         .text_body("Your quote is ready.")
//!         .html_body("<p>Your quote is ready.</p>");
//!
//!     Transport::new(config).send(&message).await?;
//! ```
//!
//! Sending many messages, continuing past individual failures:
//!
//! ```rust
//!     let report = send_batch(&Transport::new(config), reminders).await;
//!     for (index, err) in &report.failed {
//!         eprintln!("reminder {index} not delivered: {err}");
//!     }
//! ```

pub mod batch;
pub mod config;
pub mod message;
pub mod smtp;
#[forbid(unsafe_code)]
pub mod transport;

use std::time::Duration;

pub use batch::{send_batch, BatchReport};
pub use config::Config;
pub use message::{Composed, Message};
pub use smtp::auth::{Credentials, Mechanism};
pub use smtp::reply::Reply;
pub use smtp::session::{Session, SessionState};
pub use smtp::tls::{Connector, TcpConnector};
pub use smtp::ProtocolError;
pub use transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required setting is missing or invalid. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(#[from] config::Error),

    /// Connecting, reading or writing the socket failed.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// The TLS handshake or certificate validation failed.
    #[error("encryption upgrade failed: {0}")]
    EncryptionUpgradeFailed(#[source] smtp::tls::Error),

    /// The server did not accept the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(Reply),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The message could not be composed.
    #[error("malformed message: {0}")]
    Message(#[from] message::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client bound to a single connection.
pub struct SmtpClient<T> {
    pub stream: T,
    pub timeout: Duration,
    pending: Vec<u8>,
}

/// Something that delivers one message per call.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, message: &Message<'_>) -> Result<()>;
}
