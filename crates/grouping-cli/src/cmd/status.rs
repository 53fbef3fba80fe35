use crate::cmd::start_session;
use crate::output::{format_deadline, print_json, print_table};
use grouping_core::session::SessionOverview;
use grouping_core::views::format_remaining;
use std::path::Path;

pub fn run(root: &Path, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    let (config, _, mut session) = start_session(root, seed)?;
    let overview = session.overview();
    session.shutdown();

    if json {
        return print_json(&overview);
    }
    println!("Event: {}", config.event.name);
    print_overview(&overview);
    Ok(())
}

pub(crate) fn print_overview(overview: &SessionOverview) {
    let policy = &overview.policy;
    println!(
        "Mode: {}  size: {}  count: {}  refresh: {} min",
        policy.mode, policy.group_size, policy.group_count, policy.refresh_minutes
    );
    println!("Status: {:?}", overview.status);

    match overview.refresh.expires_at {
        Some(at) => println!(
            "Next refresh: {} ({} left)",
            format_deadline(at),
            format_remaining(overview.remaining_secs.unwrap_or(0))
        ),
        None => println!("Next refresh: not scheduled"),
    }
    if let Some(pending) = overview.refresh.expected_next_expires_at {
        println!("Pending refresh time: {}", format_deadline(pending));
    }

    if let Some(proposal) = &overview.proposal {
        println!("\nProposed groups (not published):");
        let rows = proposal
            .partition
            .groups()
            .map(|(label, members)| {
                let names: Vec<String> = members.iter().map(|m| m.display_name()).collect();
                vec![label.to_string(), members.len().to_string(), names.join(", ")]
            })
            .collect();
        print_table(&["GROUP", "SIZE", "MEMBERS"], rows);
    }

    println!();
    if overview.groups.is_empty() {
        println!("No groups published.");
    } else {
        let rows = overview
            .groups
            .iter()
            .map(|g| {
                let names: Vec<String> = g.members.iter().map(|m| m.display_name()).collect();
                vec![g.label.to_string(), g.members.len().to_string(), names.join(", ")]
            })
            .collect();
        print_table(&["GROUP", "SIZE", "MEMBERS"], rows);
    }

    if !overview.unassigned.is_empty() {
        let names: Vec<String> = overview.unassigned.iter().map(|m| m.display_name()).collect();
        println!("\nUnassigned ({}): {}", names.len(), names.join(", "));
    }
}
