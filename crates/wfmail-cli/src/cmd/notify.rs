use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wfmail_core::{
    config::Config,
    notify::{compose, ComposeOptions, Recipient},
    search::{search, Query},
    types::{EventType, MessageId, WorkflowState},
};

#[derive(Args)]
pub struct NotifyArgs {
    /// review-request, approval, rejection, clarification-request, blocker-report,
    /// status-update, question, answer, or any custom type
    pub event_type: String,

    /// Sending role
    #[arg(long)]
    pub from: String,

    /// Recipient role (repeatable)
    #[arg(long = "to", required = true)]
    pub to: Vec<String>,

    /// Primary artifact path; also drives the inferred workflow state
    #[arg(long)]
    pub artifact: Option<String>,

    /// Additional artifact path or glob (repeatable)
    #[arg(long = "also")]
    pub also: Vec<String>,

    /// Template variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Message-ID this message replies to
    #[arg(long)]
    pub reply_to: Option<String>,

    /// Explicit workflow state instead of the one inferred from the artifact path
    #[arg(long)]
    pub state: Option<String>,

    #[arg(long)]
    pub session: Option<String>,

    /// Subject text after the [EVENT-TYPE] tag
    #[arg(long)]
    pub summary: Option<String>,

    /// Body template file used instead of the configured or built-in one
    #[arg(long)]
    pub template: Option<PathBuf>,
}

fn parse_vars(raw: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("invalid --var '{pair}': expected KEY=VALUE");
        };
        vars.insert(key.trim().to_string(), value.to_string());
    }
    Ok(vars)
}

pub fn run(root: &Path, args: NotifyArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load wfmail.yaml")?;
    let event_type = EventType::from(args.event_type.as_str());

    let from = config
        .address(&args.from)
        .with_context(|| format!("invalid sender '{}'", args.from))?;
    let recipients = args
        .to
        .iter()
        .map(|r| {
            config
                .address(r)
                .with_context(|| format!("invalid recipient '{r}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut options = ComposeOptions::new(from);
    options.summary = args.summary;
    options.session_id = args.session;
    options.artifacts = args.also;
    options.state = args
        .state
        .as_deref()
        .map(str::parse::<WorkflowState>)
        .transpose()?;
    options.template = match &args.template {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("cannot read template {}", path.display()))?,
        ),
        None => config.template_for(&event_type).map(str::to_string),
    };
    if let Some(raw) = &args.reply_to {
        let id: MessageId = raw.parse()?;
        let query = Query {
            message_id: Some(id.clone()),
            ..Query::default()
        };
        let parent = search(&super::all_mailboxes(root)?, &query)?
            .next()
            .with_context(|| format!("message {id} not found under {}", root.display()))?;
        options = options.replying_to(&parent.envelope.header);
    }

    let vars = parse_vars(&args.vars)?;
    let message = compose(
        event_type,
        args.artifact.as_deref(),
        &recipients,
        &vars,
        &options,
    )?;

    let targets: Vec<Recipient> = Recipient::for_message(root, &message);
    let deliveries = super::send_reporting(&message, &targets, json)?;

    if json {
        print_json(&serde_json::json!({
            "message_id": message.header.message_id,
            "subject": message.header.subject,
            "workflow_state": message.header.workflow_state,
            "deliveries": deliveries,
        }))?;
    } else {
        if let Some(id) = &message.header.message_id {
            println!("Sent {} {}", message.header.subject, id);
        }
        for d in &deliveries {
            println!("  delivered  {:<20} {}", d.recipient, d.key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_split_on_first_equals() {
        let vars = parse_vars(&["REASON=needs a=b example".to_string()]).unwrap();
        assert_eq!(vars["REASON"], "needs a=b example");
        assert!(parse_vars(&["NOPE".to_string()]).is_err());
    }
}
