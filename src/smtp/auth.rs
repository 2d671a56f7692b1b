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

use std::{borrow::Cow, fmt::Display, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

use super::{capability::Capabilities, reply::Reply};

const AUTH_SUCCESS: u16 = 235;
const AUTH_CONTINUE: u16 = 334;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials<'x> {
    username: Cow<'x, str>,
    secret: Cow<'x, str>,
}

impl<'x> From<(&'x str, &'x str)> for Credentials<'x> {
    fn from(credentials: (&'x str, &'x str)) -> Self {
        Credentials {
            username: credentials.0.into(),
            secret: credentials.1.into(),
        }
    }
}

impl<'x> From<(String, String)> for Credentials<'x> {
    fn from(credentials: (String, String)) -> Self {
        Credentials {
            username: credentials.0.into(),
            secret: credentials.1.into(),
        }
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// `AUTH PLAIN`: NUL, username, NUL, password in a single base64 argument.
    Plain,

    /// `AUTH LOGIN`: username and password sent one prompt at a time.
    Login,
}

impl FromStr for Mechanism {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("PLAIN") {
            Ok(Mechanism::Plain)
        } else if s.eq_ignore_ascii_case("LOGIN") {
            Ok(Mechanism::Login)
        } else {
            Err(())
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Plain => write!(f, "PLAIN"),
            Mechanism::Login => write!(f, "LOGIN"),
        }
    }
}

impl<'x> Credentials<'x> {
    /// Creates a new `Credentials` instance.
    pub fn new(
        username: impl Into<Cow<'x, str>>,
        secret: impl Into<Cow<'x, str>>,
    ) -> Credentials<'x> {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn into_owned(self) -> Credentials<'static> {
        Credentials {
            username: self.username.into_owned().into(),
            secret: self.secret.into_owned().into(),
        }
    }

    /// The `AUTH PLAIN` initial response.
    pub(crate) fn encode_plain(&self) -> String {
        STANDARD.encode(format!("\u{0}{}\u{0}{}", self.username, self.secret))
    }

    pub(crate) fn encode_username(&self) -> String {
        STANDARD.encode(self.username.as_bytes())
    }

    pub(crate) fn encode_secret(&self) -> String {
        STANDARD.encode(self.secret.as_bytes())
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Authenticates with the given mechanism.
    ///
    /// Any final reply other than 235, or any intermediate reply other than
    /// 334, fails with [`crate::Error::AuthenticationFailed`].
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        mechanism: Mechanism,
        capabilities: &Capabilities,
    ) -> crate::Result<()> {
        if !capabilities.supports_auth(mechanism) {
            log::warn!(
                "Server {} does not announce AUTH {mechanism}, trying anyway",
                capabilities.hostname()
            );
        }

        let reply = match mechanism {
            Mechanism::Plain => {
                self.cmd_secret(&format!("AUTH PLAIN {}", credentials.encode_plain()))
                    .await?
            }
            Mechanism::Login => {
                prompt(self.cmd("AUTH LOGIN").await?)?;
                prompt(self.cmd_secret(&credentials.encode_username()).await?)?;
                self.cmd_secret(&credentials.encode_secret()).await?
            }
        };

        if reply.code() == AUTH_SUCCESS {
            log::debug!("Authenticated as {}", credentials.username());
            Ok(())
        } else {
            Err(crate::Error::AuthenticationFailed(reply))
        }
    }
}

fn prompt(reply: Reply) -> crate::Result<Reply> {
    if reply.code() == AUTH_CONTINUE {
        log::trace!(
            "Server prompt: {}",
            reply
                .message()
                .first()
                .and_then(|line| STANDARD.decode(line).ok())
                .map(|prompt| String::from_utf8_lossy(&prompt).into_owned())
                .unwrap_or_default()
        );
        Ok(reply)
    } else {
        Err(crate::Error::AuthenticationFailed(reply))
    }
}

#[cfg(test)]
mod test {
    use std::{str::FromStr, time::Duration};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use crate::{
        smtp::{capability::Capabilities, reply::Reply},
        Error, SmtpClient,
    };

    use super::{Credentials, Mechanism};

    #[test]
    fn auth_encode() {
        let credentials = Credentials::new("tim", "tanstaaftanstaaf");
        assert_eq!(credentials.encode_plain(), "AHRpbQB0YW5zdGFhZnRhbnN0YWFm");
        assert_eq!(credentials.encode_username(), "dGlt");
        assert_eq!(credentials.encode_secret(), "dGFuc3RhYWZ0YW5zdGFhZg==");
    }

    #[test]
    fn parse_mechanism() {
        assert_eq!(Mechanism::from_str("plain"), Ok(Mechanism::Plain));
        assert_eq!(Mechanism::from_str("LOGIN"), Ok(Mechanism::Login));
        assert!(Mechanism::from_str("CRAM-MD5").is_err());
        assert_eq!(Mechanism::Login.to_string(), "LOGIN");
    }

    #[test]
    fn debug_hides_secret() {
        let debug = format!("{:?}", Credentials::new("tim", "tanstaaftanstaaf"));
        assert!(debug.contains("tim"));
        assert!(!debug.contains("tanstaaf"));
    }

    /// Answers each received line with the next reply and returns the lines.
    async fn exchange(
        mechanism: Mechanism,
        replies: &'static [&'static str],
    ) -> (crate::Result<()>, Vec<String>) {
        let (client, server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut received = Vec::new();
            for reply in replies {
                let mut line = String::new();
                if server.read_line(&mut line).await.unwrap() == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                server.get_mut().write_all(reply.as_bytes()).await.unwrap();
            }
            received
        });

        let capabilities = Capabilities::from(&Reply::new(
            250,
            vec!["smtp.example.test".into(), "AUTH PLAIN LOGIN".into()],
        ));
        let mut client = SmtpClient::new(client, Duration::from_secs(5));
        let result = client
            .authenticate(
                &Credentials::new("tim", "tanstaaftanstaaf"),
                mechanism,
                &capabilities,
            )
            .await;
        drop(client);

        (result, server.await.unwrap())
    }

    #[tokio::test]
    async fn plain_single_round_trip() {
        let (result, received) = exchange(Mechanism::Plain, &["235 2.7.0 Accepted\r\n"]).await;
        result.unwrap();
        assert_eq!(received, vec!["AUTH PLAIN AHRpbQB0YW5zdGFhZnRhbnN0YWFm"]);
    }

    #[tokio::test]
    async fn login_prompts() {
        let (result, received) = exchange(
            Mechanism::Login,
            &[
                "334 VXNlcm5hbWU6\r\n",
                "334 UGFzc3dvcmQ6\r\n",
                "235 2.7.0 Accepted\r\n",
            ],
        )
        .await;
        result.unwrap();
        assert_eq!(
            received,
            vec!["AUTH LOGIN", "dGlt", "dGFuc3RhYWZ0YW5zdGFhZg=="]
        );
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let (result, _) = exchange(
            Mechanism::Plain,
            &["535 5.7.8 Authentication credentials invalid\r\n"],
        )
        .await;
        match result {
            Err(Error::AuthenticationFailed(reply)) => assert_eq!(reply.code(), 535),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_rejected_mid_exchange() {
        let (result, received) = exchange(
            Mechanism::Login,
            &["334 VXNlcm5hbWU6\r\n", "535 5.7.8 Unknown user\r\n"],
        )
        .await;
        assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
        // The password is never sent after a failed prompt
        assert_eq!(received, vec!["AUTH LOGIN", "dGlt"]);
    }
}
