use crate::cmd::start_session;
use crate::output::print_json;
use anyhow::Context;
use grouping_core::session::AdminCommand;
use std::path::Path;

pub fn run(root: &Path, yes: bool, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let (_, _, mut session) = start_session(root, seed)?;
    let outcome = session
        .handle_command(AdminCommand::ResetAll { confirmed: yes })
        .context("pass --yes to confirm")?;
    session.shutdown();

    if json {
        print_json(&outcome)?;
    } else {
        println!("Cleared all members and the refresh deadline.");
    }
    Ok(())
}
