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

use std::{borrow::Cow, fmt::Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{distributions::Alphanumeric, Rng};

/// Boundaries tried before giving up on a message.
pub const MAX_BOUNDARY_ATTEMPTS: usize = 16;
const MAX_LINE_LENGTH: usize = 998;
const FOLD_WIDTH: usize = 78;
const BASE64_LINE_LENGTH: usize = 76;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("line break in {0} header")]
    HeaderInjection(&'static str),
    #[error("{0} header has a word too long to fit a line")]
    HeaderTooLong(&'static str),
    #[error("no boundary found that does not occur in the message body")]
    BoundaryCollision,
}

/// A single notification: one sender, one recipient, two renditions.
///
/// Placeholders in the bodies must be substituted before composing.
#[derive(Debug, Clone, Default)]
pub struct Message<'x> {
    pub from: Cow<'x, str>,
    pub to: Cow<'x, str>,
    pub subject: Cow<'x, str>,
    pub text_body: Cow<'x, str>,
    pub html_body: Cow<'x, str>,
}

/// Header block and multipart body, ready for the DATA phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub headers: String,
    pub payload: String,
    pub boundary: String,
}

impl Composed {
    /// Headers, the separating empty line and the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.headers.len() + self.payload.len() + 2);
        bytes.extend_from_slice(self.headers.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(self.payload.as_bytes());
        bytes
    }
}

impl<'x> Message<'x> {
    /// Create a new message
    pub fn new(
        from: impl Into<Cow<'x, str>>,
        to: impl Into<Cow<'x, str>>,
        subject: impl Into<Cow<'x, str>>,
    ) -> Self {
        Message {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Set the subject.
    pub fn subject(mut self, subject: impl Into<Cow<'x, str>>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain-text rendition.
    pub fn text_body(mut self, body: impl Into<Cow<'x, str>>) -> Self {
        self.text_body = body.into();
        self
    }

    /// Set the HTML rendition.
    pub fn html_body(mut self, body: impl Into<Cow<'x, str>>) -> Self {
        self.html_body = body.into();
        self
    }

    /// Builds the message with a random boundary.
    pub fn compose(&self) -> Result<Composed, Error> {
        self.compose_with(random_boundary)
    }

    /// Builds the message, drawing boundary candidates from `boundary` until
    /// one does not occur in either encoded body part.
    pub fn compose_with(&self, mut boundary: impl FnMut() -> String) -> Result<Composed, Error> {
        let domain = validate_address(&self.from)?;
        validate_address(&self.to)?;
        if self.subject.contains(['\r', '\n']) {
            return Err(Error::HeaderInjection("Subject"));
        }
        let subject = fold_header("Subject", &self.subject)?;

        let parts = [
            ("text/plain", Part::encode(&self.text_body)),
            ("text/html", Part::encode(&self.html_body)),
        ];

        let boundary = (0..MAX_BOUNDARY_ATTEMPTS)
            .map(|_| boundary())
            .find(|candidate| {
                !candidate.is_empty()
                    && parts
                        .iter()
                        .all(|(_, part)| !part.content.contains(candidate.as_str()))
            })
            .ok_or(Error::BoundaryCollision)?;

        let mut headers = String::with_capacity(256);
        let _ = write!(headers, "From: <{}>\r\n", self.from);
        let _ = write!(headers, "To: <{}>\r\n", self.to);
        headers.push_str(&subject);
        let _ = write!(headers, "Message-ID: {}\r\n", message_id(domain));
        headers.push_str("MIME-Version: 1.0\r\n");
        let _ = write!(
            headers,
            "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n"
        );

        let mut payload = String::with_capacity(
            parts.iter().map(|(_, part)| part.content.len()).sum::<usize>() + 256,
        );
        for (content_type, part) in &parts {
            let _ = write!(payload, "--{boundary}\r\n");
            let _ = write!(
                payload,
                "Content-Type: {content_type}; charset=\"utf-8\"\r\n"
            );
            let _ = write!(
                payload,
                "Content-Transfer-Encoding: {}\r\n\r\n",
                part.encoding
            );
            payload.push_str(&part.content);
            payload.push_str("\r\n");
        }
        let _ = write!(payload, "--{boundary}--\r\n");

        Ok(Composed {
            headers,
            payload,
            boundary,
        })
    }
}

struct Part<'x> {
    encoding: &'static str,
    content: Cow<'x, str>,
}

impl<'x> Part<'x> {
    /// Sends the body verbatim when it is safe as 7bit text, base64 otherwise.
    fn encode(body: &'x str) -> Self {
        if is_7bit(body) {
            Part {
                encoding: "7bit",
                content: Cow::Borrowed(body),
            }
        } else {
            let encoded = STANDARD.encode(body.as_bytes());
            let mut content = String::with_capacity(encoded.len() + encoded.len() / 38);
            for (pos, chunk) in encoded.as_bytes().chunks(BASE64_LINE_LENGTH).enumerate() {
                if pos > 0 {
                    content.push_str("\r\n");
                }
                content.push_str(&String::from_utf8_lossy(chunk));
            }
            Part {
                encoding: "base64",
                content: Cow::Owned(content),
            }
        }
    }
}

/// ASCII without NUL, only CRLF line breaks, no line over 998 octets.
fn is_7bit(body: &str) -> bool {
    let bytes = body.as_bytes();
    let mut line_len = 0;

    for (pos, &byte) in bytes.iter().enumerate() {
        match byte {
            b'\r' => {
                if bytes.get(pos + 1) != Some(&b'\n') {
                    return false;
                }
            }
            b'\n' => {
                if pos == 0 || bytes[pos - 1] != b'\r' {
                    return false;
                }
                line_len = 0;
            }
            0 | 0x80..=0xff => return false,
            _ => {
                line_len += 1;
                if line_len > MAX_LINE_LENGTH {
                    return false;
                }
            }
        }
    }
    true
}

/// Returns the domain of a valid `local@domain` address.
fn validate_address(address: &str) -> Result<&str, Error> {
    let domain = address.rsplit_once('@').and_then(|(local, domain)| {
        (!local.is_empty()
            && !domain.is_empty()
            && address
                .chars()
                .all(|ch| !ch.is_whitespace() && !ch.is_control() && ch != '<' && ch != '>'))
        .then_some(domain)
    });

    if let Some(domain) = domain {
        Ok(domain)
    } else if address.contains(['\r', '\n']) {
        Err(Error::HeaderInjection("address"))
    } else {
        Err(Error::InvalidAddress(address.to_string()))
    }
}

fn random_boundary() -> String {
    // "=_" never appears in base64 output
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("=_{token}")
}

fn message_id(domain: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("<{token}@{domain}>")
}

/// Writes `name: value` with CRLF, folding before spaces so lines stay near
/// 78 octets. Unfolding restores `value` exactly. Fails if a single word
/// would push a line past 998 octets.
fn fold_header(name: &'static str, value: &str) -> Result<String, Error> {
    let mut header = String::with_capacity(name.len() + value.len() + 8);
    header.push_str(name);
    header.push(':');
    let mut line_len = header.len();

    for word in value.split(' ') {
        if !word.is_empty() && line_len + 1 + word.len() > FOLD_WIDTH && line_len > name.len() + 1
        {
            header.push_str("\r\n");
            line_len = 0;
        }
        header.push(' ');
        header.push_str(word);
        line_len += 1 + word.len();

        if line_len > MAX_LINE_LENGTH {
            return Err(Error::HeaderTooLong(name));
        }
    }

    header.push_str("\r\n");
    Ok(header)
}

#[cfg(test)]
mod test {
    use mail_parser::MessageParser;

    use super::{Error, Message, MAX_BOUNDARY_ATTEMPTS};

    fn quote() -> Message<'static> {
        Message::new(
            "lab@example.test",
            "customer@example.test",
            "Quote Q-1042 is ready for review",
        )
        .text_body("Hello Dana,\r\n\r\nQuote Q-1042 is ready.\r\n.\r\nRegards")
        .html_body("<p>Hello Dana,</p>\r\n<p>Quote <b>Q-1042</b> is ready.</p>")
    }

    #[test]
    fn layout() {
        let composed = quote().compose_with(|| "BOUNDARY".to_string()).unwrap();

        assert!(composed.headers.starts_with(
            "From: <lab@example.test>\r\nTo: <customer@example.test>\r\nSubject: Quote Q-1042 is ready for review\r\nMessage-ID: <"
        ));
        assert!(composed.headers.ends_with(
            "MIME-Version: 1.0\r\nContent-Type: multipart/alternative; boundary=\"BOUNDARY\"\r\n"
        ));
        assert_eq!(
            composed.payload,
            concat!(
                "--BOUNDARY\r\n",
                "Content-Type: text/plain; charset=\"utf-8\"\r\n",
                "Content-Transfer-Encoding: 7bit\r\n\r\n",
                "Hello Dana,\r\n\r\nQuote Q-1042 is ready.\r\n.\r\nRegards\r\n",
                "--BOUNDARY\r\n",
                "Content-Type: text/html; charset=\"utf-8\"\r\n",
                "Content-Transfer-Encoding: 7bit\r\n\r\n",
                "<p>Hello Dana,</p>\r\n<p>Quote <b>Q-1042</b> is ready.</p>\r\n",
                "--BOUNDARY--\r\n",
            )
        );
    }

    #[test]
    fn round_trip() {
        for message in [
            quote(),
            quote()
                .text_body("Résultats disponibles\nlot n°7")
                .html_body("<p>Résultats\tdisponibles</p>\n"),
        ] {
            let composed = message.compose().unwrap();
            let bytes = composed.to_bytes();
            let parsed = MessageParser::default().parse(bytes.as_slice()).unwrap();

            assert_eq!(parsed.subject(), Some(message.subject.as_ref()));
            assert_eq!(
                parsed.body_text(0).as_deref(),
                Some(message.text_body.as_ref())
            );
            assert_eq!(
                parsed.body_html(0).as_deref(),
                Some(message.html_body.as_ref())
            );
        }
    }

    #[test]
    fn base64_for_unsafe_bodies() {
        let long_line = "x".repeat(1200);
        let composed = Message::new("a@example.test", "b@example.test", "Results")
            .text_body(long_line.as_str())
            .html_body("<p>naïve</p>")
            .compose()
            .unwrap();

        assert_eq!(
            composed
                .payload
                .matches("Content-Transfer-Encoding: base64")
                .count(),
            2
        );
        assert!(composed
            .payload
            .split("\r\n")
            .all(|line| line.len() <= 76 || line.starts_with("Content-Type")));
    }

    #[test]
    fn colliding_boundary_is_replaced() {
        let message = quote().text_body("See --COLLIDE below\r\n--COLLIDE\r\n");
        let mut candidates = ["COLLIDE", "FRESH"].into_iter().map(String::from);

        let composed = message
            .compose_with(|| candidates.next().unwrap_or_default())
            .unwrap();
        assert_eq!(composed.boundary, "FRESH");
        assert!(composed.payload.contains("--COLLIDE\r\n"));
        assert_eq!(composed.payload.matches("--FRESH\r\n").count(), 2);
    }

    #[test]
    fn always_colliding_boundary_is_rejected() {
        let message = quote().html_body("<pre>STUCK</pre>");
        let mut attempts = 0;

        assert_eq!(
            message
                .compose_with(|| {
                    attempts += 1;
                    "STUCK".to_string()
                })
                .unwrap_err(),
            Error::BoundaryCollision
        );
        assert_eq!(attempts, MAX_BOUNDARY_ATTEMPTS);
    }

    #[test]
    fn random_boundaries_differ() {
        let first = quote().compose().unwrap();
        let second = quote().compose().unwrap();
        assert_ne!(first.boundary, second.boundary);
        assert!(first.boundary.starts_with("=_"));
    }

    #[test]
    fn long_subject_is_folded() {
        let subject = format!(
            "Reminder: {} samples awaiting pickup",
            (1..=60).map(|n| format!("S-{n:03}")).collect::<Vec<_>>().join(" ")
        );
        let message = quote().subject(subject.as_str());
        let composed = message.compose().unwrap();

        let lines = composed
            .headers
            .split("\r\n")
            .skip_while(|line| !line.starts_with("Subject:"))
            .take_while(|line| !line.starts_with("Message-ID:"))
            .collect::<Vec<_>>();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= 78));
        assert!(lines[1..].iter().all(|line| line.starts_with(' ')));
        assert_eq!(lines.join("").strip_prefix("Subject: "), Some(subject.as_str()));

        let bytes = composed.to_bytes();
        let parsed = MessageParser::default().parse(bytes.as_slice()).unwrap();
        assert_eq!(parsed.subject(), Some(subject.as_str()));
    }

    #[test]
    fn overlong_subject_word_is_rejected() {
        let word = "x".repeat(1000);
        assert_eq!(
            quote().subject(word.as_str()).compose().unwrap_err(),
            Error::HeaderTooLong("Subject")
        );

        // Just under the line limit is fine
        let word = "x".repeat(998 - "Subject: ".len());
        assert!(quote().subject(word.as_str()).compose().is_ok());
    }

    #[test]
    fn message_id_uses_sender_domain() {
        let composed = quote().compose().unwrap();
        let id = composed
            .headers
            .split("\r\n")
            .find_map(|line| line.strip_prefix("Message-ID: "))
            .unwrap();
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.test>"));
    }

    #[test]
    fn rejects_bad_headers() {
        assert_eq!(
            Message::new("lab@example.test", "customer@example.test", "Hi\r\nBcc: x@y")
                .compose()
                .unwrap_err(),
            Error::HeaderInjection("Subject")
        );
        assert_eq!(
            Message::new("lab@example.test\r\nBcc: x@y", "customer@example.test", "Hi")
                .compose()
                .unwrap_err(),
            Error::HeaderInjection("address")
        );
        for address in ["", "customer", "@example.test", "customer@", "a b@example.test", "<a@b>"] {
            assert_eq!(
                Message::new("lab@example.test", address, "Hi")
                    .compose()
                    .unwrap_err(),
                Error::InvalidAddress(address.to_string())
            );
        }
    }
}
