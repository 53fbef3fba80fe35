use crate::cmd::open_store;
use crate::output::print_json;
use grouping_core::member::{validate_birth_tag, validate_name};
use grouping_core::store::Store;
use std::path::Path;

pub fn run(root: &Path, name: &str, birth: Option<&str>, json: bool) -> anyhow::Result<()> {
    let name = validate_name(name)?;
    let birth = validate_birth_tag(birth)?;
    let (_, store) = open_store(root)?;
    let id = store.register_member(&name, birth.as_deref())?;

    if json {
        print_json(&serde_json::json!({
            "id": id,
            "name": name,
            "birth": birth,
        }))?;
    } else {
        println!("Registered {name} ({id})");
    }
    Ok(())
}
