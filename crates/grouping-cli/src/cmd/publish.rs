use crate::cmd::start_session;
use crate::output::{format_deadline, print_json};
use grouping_core::session::{AdminCommand, CommandOutcome};
use std::path::Path;

pub fn run(root: &Path, regenerate: bool, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let (_, _, mut session) = start_session(root, seed)?;
    if regenerate {
        session.handle_command(AdminCommand::Regenerate)?;
    }
    let outcome = session.handle_command(AdminCommand::Publish)?;
    let groups = session.overview().groups;
    session.shutdown();

    if json {
        return print_json(&serde_json::json!({
            "outcome": outcome,
            "groups": groups,
        }));
    }
    if let CommandOutcome::Published { refresh } = &outcome {
        let members: usize = groups.iter().map(|g| g.members.len()).sum();
        println!("Published {} group(s), {members} member(s)", groups.len());
        if let Some(at) = refresh.expires_at {
            println!("Next refresh: {}", format_deadline(at));
        }
    }
    Ok(())
}
