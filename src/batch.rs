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

use crate::{message::Message, Error, Mailer};

/// Outcome of [`send_batch`], by position in the input.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub delivered: Vec<usize>,
    pub failed: Vec<(usize, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends the messages one after another. A failed message is logged and
/// recorded; the remaining ones are still attempted.
pub async fn send_batch<'x, M, I>(mailer: &M, messages: I) -> BatchReport
where
    M: Mailer,
    I: IntoIterator<Item = Message<'x>>,
{
    let mut report = BatchReport::default();

    for (index, message) in messages.into_iter().enumerate() {
        match mailer.send(&message).await {
            Ok(()) => report.delivered.push(index),
            Err(err) => {
                log::warn!("Message {index} to <{}> not delivered: {err}", message.to);
                report.failed.push((index, err));
            }
        }
    }

    log::info!(
        "Batch finished: {} delivered, {} failed",
        report.delivered.len(),
        report.failed.len()
    );
    report
}
