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

use labmail::{send_batch, Config, Message, Transport};

#[tokio::main]
async fn main() {
    env_logger::init();

    // SMTP_HOST, SMTP_USERNAME and SMTP_PASSWORD are required
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    let sender = config.credentials.username().to_string();

    let reminders = [
        ("alice@example.com", "Alice", "09:30"),
        ("bob@example.com", "Bob", "14:00"),
    ]
    .into_iter()
    .map(|(to, name, time)| {
        Message::new(sender.clone(), to, "Appointment reminder")
            .text_body(format!(
                "Hello {name},\r\n\r\nThis is a reminder of your appointment tomorrow at {time}.\r\n"
            ))
            .html_body(format!(
                "<p>Hello {name},</p><p>This is a reminder of your appointment tomorrow at <b>{time}</b>.</p>"
            ))
    });

    let report = send_batch(&Transport::new(config), reminders).await;
    for (index, err) in &report.failed {
        eprintln!("reminder {index} not delivered: {err}");
    }
    if !report.is_success() {
        std::process::exit(1);
    }
}
