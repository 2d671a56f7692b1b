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

use crate::{
    config::Config,
    message::Message,
    smtp::{
        session::Session,
        tls::{Connector, TcpConnector},
    },
    Mailer,
};

/// Delivers each message over a fresh connection to the configured server.
#[derive(Clone)]
pub struct Transport<C = TcpConnector> {
    config: Config,
    connector: C,
}

impl Transport {
    /// Creates a transport that connects over TCP and validates certificates
    /// against the bundled web PKI roots.
    pub fn new(config: Config) -> Self {
        Transport::with_connector(config, TcpConnector::default())
    }
}

impl<C: Connector> Transport<C> {
    pub fn with_connector(config: Config, connector: C) -> Self {
        Transport { config, connector }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<C: Connector> Mailer for Transport<C> {
    async fn send(&self, message: &Message<'_>) -> crate::Result<()> {
        log::debug!(
            "Sending {:?} to <{}> via {}:{}",
            message.subject,
            message.to,
            self.config.host,
            self.config.port
        );
        Session::new(&self.connector, &self.config)
            .send(message)
            .await
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tokio::io::DuplexStream;

    use crate::{
        config::Config,
        message::Message,
        smtp::tls::{self, Connector},
        Error, Mailer,
    };

    use super::Transport;

    /// Refuses every connection, counting attempts.
    #[derive(Default)]
    struct Unreachable {
        attempts: AtomicUsize,
    }

    impl Connector for Unreachable {
        type Plain = DuplexStream;
        type Secure = DuplexStream;

        async fn connect(&self, _: &str, _: u16) -> io::Result<DuplexStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }

        async fn upgrade(
            &self,
            stream: DuplexStream,
            _: &str,
        ) -> Result<DuplexStream, (tls::Error, DuplexStream)> {
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn new_connection_per_message() {
        let config = Config::new("smtp.example.test", "lab", "s3cret")
            .unwrap()
            .timeout(Duration::from_secs(1));
        let transport = Transport::with_connector(config, Unreachable::default());
        let message = Message::new("lab@example.test", "customer@example.test", "Reminder")
            .text_body("Your appointment is tomorrow.")
            .html_body("<p>Your appointment is tomorrow.</p>");

        for _ in 0..3 {
            assert!(matches!(
                transport.send(&message).await,
                Err(Error::Network(_))
            ));
        }
        assert_eq!(transport.connector.attempts.load(Ordering::SeqCst), 3);

        // Invalid messages never reach the network
        let invalid = Message::new("lab@example.test", "customer", "Reminder");
        assert!(matches!(
            transport.send(&invalid).await,
            Err(Error::Message(_))
        ));
        assert_eq!(transport.connector.attempts.load(Ordering::SeqCst), 3);
    }
}
