use anyhow::Context;
use grouping_core::{config::Config, paths, store::RedbStore};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let event_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "event".to_string())
    });

    println!("Initializing grouping in: {}", root.display());

    if !paths::is_initialized(root) {
        Config::new(&event_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let store_path = paths::store_path(root);
    let existed = store_path.exists();
    RedbStore::open(&store_path).context("failed to create store")?;
    if existed {
        println!("  exists:  {}", paths::STORE_FILE);
    } else {
        println!("  created: {}", paths::STORE_FILE);
    }

    Ok(())
}
