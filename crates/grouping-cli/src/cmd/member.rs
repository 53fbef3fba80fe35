use crate::cmd::{open_store, start_session};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use grouping_core::member::MemberId;
use grouping_core::session::AdminCommand;
use grouping_core::store::Store;
use std::path::Path;

#[derive(Subcommand)]
pub enum MemberSubcommand {
    /// List every registered member
    List,
    /// Delete a member
    Delete {
        id: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

pub fn run(
    root: &Path,
    subcmd: MemberSubcommand,
    seed: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        MemberSubcommand::List => list(root, json),
        MemberSubcommand::Delete { id, yes } => delete(root, &id, yes, seed, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(root)?;
    let members = store.read_once()?.member_list();

    if json {
        return print_json(&members);
    }
    if members.is_empty() {
        println!("No members registered.");
        return Ok(());
    }
    let rows = members
        .iter()
        .map(|m| {
            vec![
                m.id.to_string(),
                m.name.clone(),
                m.birth_tag.clone().unwrap_or_default(),
                m.group.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "BIRTH", "GROUP"], rows);
    Ok(())
}

fn delete(root: &Path, id: &str, yes: bool, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let (_, _, mut session) = start_session(root, seed)?;
    let outcome = session.handle_command(AdminCommand::DeleteMember {
        id: MemberId::new(id),
        confirmed: yes,
    })
    .context("pass --yes to confirm")?;
    session.shutdown();

    if json {
        print_json(&outcome)?;
    } else {
        println!("Deleted member {id}");
    }
    Ok(())
}
