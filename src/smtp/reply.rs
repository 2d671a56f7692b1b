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

use std::fmt::Display;

/// Upper bound on the size of a single reply, summed over all its lines.
/// Each line counts its code and separator as well as its text.
pub const MAX_REPLY_LENGTH: usize = 4096;
const LINE_OVERHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    PositiveCompletion = 2,
    PositiveIntermediate = 3,
    TransientNegativeCompletion = 4,
    PermanentNegativeCompletion = 5,
    Invalid = 0,
}

/// A complete server reply: one status code shared by one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    message: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, message: Vec<String>) -> Self {
        Reply { code, message }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &[String] {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        match self.code / 100 {
            2 => Severity::PositiveCompletion,
            3 => Severity::PositiveIntermediate,
            4 => Severity::TransientNegativeCompletion,
            5 => Severity::PermanentNegativeCompletion,
            _ => Severity::Invalid,
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        for (pos, line) in self.message.iter().enumerate() {
            f.write_str(if pos == 0 { " " } else { " / " })?;
            f.write_str(line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid reply code")]
    InvalidReplyCode,
    #[error("invalid separator after reply code")]
    InvalidSeparator,
    #[error("reply lines carry different codes")]
    CodeMismatch,
    #[error("reply exceeds {MAX_REPLY_LENGTH} bytes")]
    ReplyTooLong,
    #[error("incomplete reply")]
    NeedsMoreData,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Code { digits: u8 },
    Separator,
    Text,
}

/// Incremental reply parser.
///
/// Bytes may arrive split at any point: a partial line, several lines or
/// a reply followed by unrelated data. `parse` consumes bytes from the
/// iterator only up to the end of the first complete reply, so whatever
/// remains in the iterator belongs to the next one.
#[derive(Debug)]
pub struct ReplyParser {
    code: Option<u16>,
    current_code: u16,
    state: State,
    is_last: bool,
    buf: Vec<u8>,
    message: Vec<String>,
    message_len: usize,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self {
            code: None,
            current_code: 0,
            state: State::Code { digits: 0 },
            is_last: false,
            buf: Vec::with_capacity(128),
            message: Vec::with_capacity(4),
            message_len: 0,
        }
    }
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.code = None;
        self.current_code = 0;
        self.state = State::Code { digits: 0 };
        self.is_last = false;
        self.buf.clear();
        self.message.clear();
        self.message_len = 0;
    }

    pub fn parse(&mut self, bytes: &mut std::slice::Iter<'_, u8>) -> Result<Reply, Error> {
        for &byte in bytes.by_ref() {
            match self.state {
                State::Code { digits } => {
                    if !byte.is_ascii_digit() {
                        self.reset();
                        return Err(Error::InvalidReplyCode);
                    }
                    self.current_code = self.current_code * 10 + u16::from(byte - b'0');
                    self.state = if digits == 2 {
                        State::Separator
                    } else {
                        State::Code { digits: digits + 1 }
                    };
                }
                State::Separator => {
                    match byte {
                        b'-' => (),
                        // "250\r\n" is a valid final line with no text
                        b' ' | b'\r' | b'\n' => self.is_last = true,
                        _ => {
                            self.reset();
                            return Err(Error::InvalidSeparator);
                        }
                    }

                    match self.code {
                        None => self.code = Some(self.current_code),
                        Some(code) if code != self.current_code => {
                            self.reset();
                            return Err(Error::CodeMismatch);
                        }
                        Some(_) => (),
                    }
                    self.current_code = 0;
                    self.state = State::Text;

                    self.message_len += LINE_OVERHEAD;
                    if self.message_len > MAX_REPLY_LENGTH {
                        self.reset();
                        return Err(Error::ReplyTooLong);
                    }

                    if byte == b'\n' {
                        if let Some(reply) = self.end_line() {
                            return Ok(reply);
                        }
                    }
                }
                State::Text => match byte {
                    b'\n' => {
                        if let Some(reply) = self.end_line() {
                            return Ok(reply);
                        }
                    }
                    b'\r' => (),
                    _ => {
                        if self.message_len < MAX_REPLY_LENGTH {
                            self.buf.push(byte);
                            self.message_len += 1;
                        } else {
                            self.reset();
                            return Err(Error::ReplyTooLong);
                        }
                    }
                },
            }
        }

        Err(Error::NeedsMoreData)
    }

    fn end_line(&mut self) -> Option<Reply> {
        self.message
            .push(String::from_utf8_lossy(&self.buf).into_owned());
        self.buf.clear();
        self.state = State::Code { digits: 0 };

        if self.is_last {
            let reply = Reply {
                code: self.code.take().unwrap_or_default(),
                message: std::mem::take(&mut self.message),
            };
            self.reset();
            Some(reply)
        } else {
            None
        }
    }
}
