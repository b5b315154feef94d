use crate::output::{print_json, print_table, print_warnings};
use anyhow::Context;
use clap::Args;
use std::path::{Path, PathBuf};
use wfmail_core::{
    search::{parse_since, search, Query, SearchHit, Shape, SortOrder},
    types::{EventType, WorkflowState},
};

#[derive(Args)]
pub struct SearchArgs {
    /// Mailboxes to search (default: every mailbox under the root)
    pub mailboxes: Vec<String>,

    /// Load the query from a YAML file; flags given on the command line override it
    #[arg(long)]
    pub query: Option<PathBuf>,

    #[arg(long)]
    pub event_type: Option<String>,

    /// Sender role or a prefix of it
    #[arg(long)]
    pub from: Option<String>,

    /// Recipient role or a prefix of it
    #[arg(long)]
    pub to: Option<String>,

    /// Artifact glob; matches messages whose artifacts could name the same path
    #[arg(long)]
    pub artifact: Option<String>,

    #[arg(long)]
    pub state: Option<String>,

    #[arg(long)]
    pub session: Option<String>,

    /// 7d, 24h, 30m, or a date such as 2025-11-01
    #[arg(long)]
    pub since: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Oldest first
    #[arg(long)]
    pub asc: bool,

    /// Include message bodies
    #[arg(long)]
    pub full: bool,

    /// new, cur, or both
    #[arg(long)]
    pub area: Option<String>,
}

impl SearchArgs {
    fn into_query(self) -> anyhow::Result<Query> {
        let mut query = match &self.query {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                serde_yaml::from_str::<Query>(&data)
                    .with_context(|| format!("invalid query file {}", path.display()))?
            }
            None => Query::default(),
        };
        if let Some(et) = self.event_type {
            query.event_type = Some(EventType::from(et));
        }
        if self.from.is_some() {
            query.from_role = self.from;
        }
        if self.to.is_some() {
            query.to_role = self.to;
        }
        if self.artifact.is_some() {
            query.artifact = self.artifact;
        }
        if let Some(state) = self.state {
            query.state = Some(state.parse::<WorkflowState>()?);
        }
        if self.session.is_some() {
            query.session_id = self.session;
        }
        if let Some(since) = self.since {
            query.since = Some(parse_since(&since, chrono::Utc::now())?);
        }
        if self.limit.is_some() {
            query.limit = self.limit;
        }
        if self.asc {
            query.order = SortOrder::Ascending;
        }
        if self.full {
            query.shape = Shape::Full;
        }
        if let Some(area) = self.area {
            query.area = area.parse()?;
        }
        Ok(query)
    }
}

pub fn run(root: &Path, args: SearchArgs, json: bool) -> anyhow::Result<()> {
    let mailboxes = super::mailbox_args(root, &args.mailboxes)?;
    let query = args.into_query()?;

    let mut results = search(&mailboxes, &query)?;
    let hits: Vec<SearchHit> = results.by_ref().collect();
    print_warnings(results.warnings());

    if json {
        print_json(&hits)?;
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matching messages.");
        return Ok(());
    }
    if query.shape == Shape::Full {
        for hit in &hits {
            let h = &hit.envelope.header;
            println!(
                "== {} {} {} -> {}",
                hit.envelope.key,
                h.date.to_rfc2822(),
                h.from,
                h.to.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
            );
            println!("Subject: {}", h.subject);
            println!();
            print!("{}", hit.body.as_deref().unwrap_or_default());
            println!();
        }
        return Ok(());
    }
    let rows = hits.iter().map(|h| super::envelope_row(&h.envelope)).collect();
    print_table(super::ENVELOPE_HEADERS, rows);
    Ok(())
}
