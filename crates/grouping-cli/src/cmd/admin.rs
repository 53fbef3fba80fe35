use crate::cmd::status::print_overview;
use crate::cmd::{open_store, rng};
use crate::output::{format_deadline, print_table};
use anyhow::{bail, Context};
use grouping_core::clock::SystemClock;
use grouping_core::config::Config;
use grouping_core::member::MemberId;
use grouping_core::policy::Mode;
use grouping_core::session::{AdminCommand, AdminRequest, AdminSession, CommandOutcome};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const USAGE: &str = "size N | count N | refresh N | mode batch|firstcome | retime N | \
                     regenerate | publish | assign | delete ID [confirm] | reset [confirm] | \
                     status | quit";

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Command(AdminCommand),
    Quit,
    Empty,
}

pub fn run(root: &Path, seed: Option<u64>) -> anyhow::Result<()> {
    let (config, store) = open_store(root)?;
    let root = root.to_path_buf();
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let mut config = config;
        let poller = store.watch_external(Duration::from_millis(config.store.poll_interval_ms.max(1)));

        let mut session = AdminSession::new(
            store.clone(),
            config.policy.clone(),
            rng(seed),
            Arc::new(SystemClock),
        );
        session.start().context("failed to start admin session")?;
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(session.run(rx));

        println!(
            "Admin session for '{}'. Commands: {USAGE}",
            config.event.name
        );
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let command = match parse_line(&line) {
                Ok(Line::Command(command)) => command,
                Ok(Line::Empty) => continue,
                Ok(Line::Quit) => break,
                Err(e) => {
                    eprintln!("error: {e:#}");
                    continue;
                }
            };
            let (request, reply) = AdminRequest::new(command);
            if tx.send(request).await.is_err() {
                bail!("admin session stopped");
            }
            match reply.await.context("admin session dropped the request")? {
                Ok(outcome) => report(&root, &mut config, &outcome)?,
                Err(e) => eprintln!("error: {e}"),
            }
        }

        drop(tx);
        if let Some(poller) = poller {
            poller.abort();
        }
        handle.await.context("admin session task failed")??;
        Ok::<(), anyhow::Error>(())
    })
}

fn parse_line(line: &str) -> anyhow::Result<Line> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Line::Empty);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("quit" | "exit", []) => return Ok(Line::Quit),
        ("size", [n]) => AdminCommand::SetGroupSize(number(n)?),
        ("count", [n]) => AdminCommand::SetGroupCount(number(n)?),
        ("refresh", [n]) => AdminCommand::SetRefreshMinutes(number(n)?),
        ("mode", [mode]) => AdminCommand::SelectMode(mode.parse::<Mode>()?),
        ("retime", [n]) => AdminCommand::RequestRefreshTimeChange(number(n)?),
        ("regenerate", []) => AdminCommand::Regenerate,
        ("publish", []) => AdminCommand::Publish,
        ("assign", []) => AdminCommand::AssignNewMembers,
        ("delete", [id]) => AdminCommand::DeleteMember {
            id: MemberId::new(*id),
            confirmed: false,
        },
        ("delete", [id, "confirm"]) => AdminCommand::DeleteMember {
            id: MemberId::new(*id),
            confirmed: true,
        },
        ("reset", []) => AdminCommand::ResetAll { confirmed: false },
        ("reset", ["confirm"]) => AdminCommand::ResetAll { confirmed: true },
        ("status", []) => AdminCommand::Describe,
        _ => bail!("unrecognized command '{}' (expected: {USAGE})", line.trim()),
    };
    Ok(Line::Command(command))
}

fn number<T: FromStr>(raw: &str) -> anyhow::Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("'{raw}' is not a valid number"))
}

fn report(root: &Path, config: &mut Config, outcome: &CommandOutcome) -> anyhow::Result<()> {
    match outcome {
        CommandOutcome::PolicyUpdated { policy } => {
            config.policy = policy.clone();
            config.save(root).context("failed to write config.yaml")?;
            println!(
                "Policy: mode {}, size {}, count {}, refresh {} min",
                policy.mode, policy.group_size, policy.group_count, policy.refresh_minutes
            );
        }
        CommandOutcome::Proposed { allocation } => {
            let rows = allocation
                .partition
                .groups()
                .map(|(label, members)| {
                    let names: Vec<String> = members.iter().map(|m| m.display_name()).collect();
                    vec![label.to_string(), members.len().to_string(), names.join(", ")]
                })
                .collect();
            print_table(&["GROUP", "SIZE", "MEMBERS"], rows);
            if !allocation.unassigned.is_empty() {
                let names: Vec<String> =
                    allocation.unassigned.iter().map(|m| m.display_name()).collect();
                println!("Left out: {}", names.join(", "));
            }
            println!("Ready to publish.");
        }
        CommandOutcome::Published { refresh } => match refresh.expires_at {
            Some(at) => println!("Published. Next refresh: {}", format_deadline(at)),
            None => println!("Published."),
        },
        CommandOutcome::Assigned { placed } => println!("Assigned {placed} new member(s)"),
        CommandOutcome::RefreshRequested {
            expected_next_expires_at,
        } => println!(
            "Refresh time after the next publish: {}",
            format_deadline(*expected_next_expires_at)
        ),
        CommandOutcome::Deleted { member } => println!("Deleted member {member}"),
        CommandOutcome::Reset => println!("Cleared all members and the refresh deadline."),
        CommandOutcome::Overview { overview } => print_overview(overview),
    }
    Ok(())
}
