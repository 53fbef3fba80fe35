pub mod admin;
pub mod config;
pub mod init;
pub mod member;
pub mod publish;
pub mod register;
pub mod reset;
pub mod status;
pub mod view;

use anyhow::Context;
use grouping_core::clock::SystemClock;
use grouping_core::config::Config;
use grouping_core::paths;
use grouping_core::session::AdminSession;
use grouping_core::store::RedbStore;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::path::Path;
use std::sync::Arc;

/// Load the config and open the store file; fails before `grouping init`.
pub(crate) fn open_store(root: &Path) -> anyhow::Result<(Config, Arc<RedbStore>)> {
    let config = Config::load(root).context("failed to load config")?;
    let store = RedbStore::open(&paths::store_path(root)).context("failed to open store")?;
    Ok((config, Arc::new(store)))
}

pub(crate) fn rng(seed: Option<u64>) -> Box<dyn RngCore + Send> {
    match seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_entropy()),
    }
}

/// An admin session over the event's store, already subscribed.
pub(crate) fn start_session(
    root: &Path,
    seed: Option<u64>,
) -> anyhow::Result<(Config, Arc<RedbStore>, AdminSession)> {
    let (config, store) = open_store(root)?;
    let mut session = AdminSession::new(
        store.clone(),
        config.policy.clone(),
        rng(seed),
        Arc::new(SystemClock),
    );
    session.start().context("failed to start admin session")?;
    Ok((config, store, session))
}
