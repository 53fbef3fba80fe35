use crate::cmd::open_store;
use crate::output::print_json;
use grouping_core::directory::MemberDirectory;
use grouping_core::member::validate_birth_tag;
use grouping_core::store::Store;
use grouping_core::views::{participant_view, Identity};
use std::path::Path;

pub fn run(root: &Path, name: &str, birth: Option<String>, json: bool) -> anyhow::Result<()> {
    let birth = validate_birth_tag(birth.as_deref())?;
    let (_, store) = open_store(root)?;
    let directory = MemberDirectory::from_snapshot(&store.read_once()?);
    let view = participant_view(&directory, &Identity::new(name, birth));

    if json {
        return print_json(&view);
    }
    let Some(view) = view else {
        println!("Waiting for your group to be assigned...");
        return Ok(());
    };

    println!("My group: {}", view.my_group.label);
    for member in &view.my_group.members {
        println!("  {}", member.display_name());
    }
    for group in &view.other_groups {
        let names: Vec<String> = group.members.iter().map(|m| m.display_name()).collect();
        println!("{}: {}", group.label, names.join(", "));
    }
    Ok(())
}
