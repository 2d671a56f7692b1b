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

//! Connection settings, validated once before any network activity.

use std::{str::FromStr, time::Duration};

use crate::smtp::auth::{Credentials, Mechanism};

pub const DEFAULT_PORT: u16 = 587;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_HOST: &str = "SMTP_HOST";
pub const ENV_PORT: &str = "SMTP_PORT";
pub const ENV_USERNAME: &str = "SMTP_USERNAME";
pub const ENV_PASSWORD: &str = "SMTP_PASSWORD";
pub const ENV_MECHANISM: &str = "SMTP_AUTH_MECHANISM";
pub const ENV_TIMEOUT: &str = "SMTP_TIMEOUT_SECS";
pub const ENV_HELO_HOST: &str = "SMTP_HELO_HOST";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Everything a send needs to reach and log in to the submission server.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials<'static>,
    pub mechanism: Mechanism,
    pub timeout: Duration,
    pub helo_host: String,
}

impl Config {
    /// Creates a configuration with default port, mechanism, timeout and
    /// EHLO hostname. Fails if any argument is empty.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, Error> {
        let host = non_empty(ENV_HOST, Some(host.into()))?;
        let username = non_empty(ENV_USERNAME, Some(username.into()))?;
        let password = non_empty(ENV_PASSWORD, Some(password.into()))?;

        Ok(Config {
            host,
            port: DEFAULT_PORT,
            credentials: Credentials::new(username, password),
            mechanism: Mechanism::Plain,
            timeout: DEFAULT_TIMEOUT,
            helo_host: local_hostname(),
        })
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, using the `SMTP_*` keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Config::new(
            non_empty(ENV_HOST, lookup(ENV_HOST))?,
            non_empty(ENV_USERNAME, lookup(ENV_USERNAME))?,
            non_empty(ENV_PASSWORD, lookup(ENV_PASSWORD))?,
        )?;

        if let Some(port) = optional(lookup(ENV_PORT)) {
            config.port = parse(ENV_PORT, &port).and_then(|port: u16| {
                if port > 0 {
                    Ok(port)
                } else {
                    Err(invalid(ENV_PORT, &port.to_string()))
                }
            })?;
        }
        if let Some(mechanism) = optional(lookup(ENV_MECHANISM)) {
            config.mechanism =
                Mechanism::from_str(&mechanism).map_err(|_| invalid(ENV_MECHANISM, &mechanism))?;
        }
        if let Some(timeout) = optional(lookup(ENV_TIMEOUT)) {
            config.timeout = parse(ENV_TIMEOUT, &timeout)
                .and_then(|secs: u64| {
                    if secs > 0 {
                        Ok(secs)
                    } else {
                        Err(invalid(ENV_TIMEOUT, &timeout))
                    }
                })
                .map(Duration::from_secs)?;
        }
        if let Some(helo_host) = optional(lookup(ENV_HELO_HOST)) {
            config.helo_host = helo_host;
        }

        Ok(config)
    }

    /// Sets the SMTP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the authentication mechanism.
    pub fn mechanism(mut self, mechanism: Mechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Sets the deadline applied to each protocol step.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the EHLO hostname.
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.helo_host = host.into();
        self
    }
}

fn local_hostname() -> String {
    gethostname::gethostname()
        .to_str()
        .filter(|name| !name.is_empty())
        .unwrap_or("[127.0.0.1]")
        .to_string()
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty(key: &'static str, value: Option<String>) -> Result<String, Error> {
    optional(value).ok_or(Error::Missing(key))
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> Error {
    Error::Invalid {
        key,
        value: value.to_string(),
    }
}
