use crate::output::{print_json, print_table};
use std::path::Path;
use wfmail_core::{
    config::Config,
    panel::{self, DecisionModel},
    paths,
    search::parse_since,
};

pub fn run(
    root: &Path,
    name: &str,
    model: Option<&str>,
    since: &str,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    let panel_config = config.panel(name)?;
    let model = model.map(str::parse::<DecisionModel>).transpose()?;
    let since = parse_since(since, chrono::Utc::now())?;
    let mailbox = paths::mailbox_path(root, name);

    let decision = panel::check(name, &mailbox, panel_config, model, Some(since))?;

    if json {
        print_json(&decision)?;
    } else {
        let rows = decision
            .members
            .iter()
            .map(|m| {
                let vote = decision
                    .votes
                    .get(m)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                vec![m.clone(), vote]
            })
            .collect();
        print_table(&["MEMBER", "VOTE"], rows);
        println!();
        match decision.outcome {
            Some(vote) => println!("Decision ({}): {vote}", decision.model),
            None => println!("No decision ({})", decision.model),
        }
    }

    if decision.outcome.is_none() {
        anyhow::bail!("panel '{name}' has not reached a decision");
    }
    Ok(())
}
