use crate::output::print_json;
use anyhow::Context;
use std::io::Read;
use std::path::Path;
use wfmail_core::{notify::Recipient, types::MessageId, wire};

pub fn run(root: &Path, file: &Path, to: &[String], json: bool) -> anyhow::Result<()> {
    let data = if file == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read message from stdin")?;
        buf
    } else {
        std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?
    };

    let mut message =
        wire::parse(&data).with_context(|| format!("invalid message in {}", file.display()))?;
    if message.header.message_id.is_none() {
        message.header.message_id = Some(MessageId::generate(&message.header.from));
    }

    let recipients = if to.is_empty() {
        Recipient::for_message(root, &message)
    } else {
        to.iter()
            .map(|arg| {
                let mailbox = super::mailbox_arg(root, arg)?;
                Ok(Recipient::new(super::mailbox_name(&mailbox), mailbox))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let deliveries = super::send_reporting(&message, &recipients, json)?;

    if json {
        print_json(&serde_json::json!({
            "message_id": message.header.message_id,
            "deliveries": deliveries,
        }))?;
    } else {
        for d in &deliveries {
            println!("delivered  {:<20} {}", d.recipient, d.key);
        }
    }
    Ok(())
}
