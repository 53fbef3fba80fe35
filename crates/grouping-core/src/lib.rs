pub mod allocator;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod io;
pub mod label;
pub mod member;
pub mod partition;
pub mod paths;
pub mod policy;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod views;
pub mod watcher;

pub use error::{GroupingError, Result};
