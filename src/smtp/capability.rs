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

use std::str::FromStr;

use super::{auth::Mechanism, reply::Reply};

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Capability {
    StartTLS,
    SmtpUTF8,
    Pipelining,
    EightBitMIME,
    EnhancedStatusCodes,
    Size(usize),
    Auth(Vec<Mechanism>),
    Unsupported(String),
}

/// Extensions announced in an EHLO reply.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Capabilities {
    hostname: String,
    capabilities: Vec<Capability>,
}

impl From<&Reply> for Capabilities {
    fn from(reply: &Reply) -> Self {
        let message = reply.message();
        let mut hostname = String::new();
        let mut capabilities = Vec::with_capacity(message.len());

        for (pos, line) in message.iter().enumerate() {
            let mut tokens = line.split_ascii_whitespace();
            let Some(token) = tokens.next() else {
                continue;
            };

            if pos == 0 {
                hostname = token.to_string();
                continue;
            }

            // Some servers still announce "AUTH=LOGIN PLAIN"
            let (keyword, first_arg) = match token.split_once('=') {
                Some((keyword, arg)) => (keyword, Some(arg)),
                None => (token, None),
            };

            capabilities.push(match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => Capability::StartTLS,
                "AUTH" => Capability::Auth(
                    first_arg
                        .into_iter()
                        .chain(tokens)
                        .filter_map(|mechanism| Mechanism::from_str(mechanism).ok())
                        .collect(),
                ),
                "8BITMIME" => Capability::EightBitMIME,
                "ENHANCEDSTATUSCODES" => Capability::EnhancedStatusCodes,
                "SMTPUTF8" => Capability::SmtpUTF8,
                "PIPELINING" => Capability::Pipelining,
                "SIZE" => Capability::Size(
                    first_arg
                        .or_else(|| tokens.next())
                        .and_then(|size| usize::from_str(size).ok())
                        .unwrap_or(0),
                ),
                _ => Capability::Unsupported(token.to_string()),
            });
        }

        Capabilities {
            hostname,
            capabilities,
        }
    }
}

impl Capabilities {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn supports_auth(&self, mechanism: Mechanism) -> bool {
        self.capabilities.iter().any(|capability| {
            matches!(capability, Capability::Auth(mechanisms) if mechanisms.contains(&mechanism))
        })
    }

    /// Maximum message size; `None` when not announced or announced as unlimited (0).
    pub fn size(&self) -> Option<usize> {
        self.capabilities.iter().find_map(|capability| match capability {
            Capability::Size(size) if *size > 0 => Some(*size),
            _ => None,
        })
    }
}
