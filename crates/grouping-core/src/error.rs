use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("not initialized: run 'grouping init'")]
    NotInitialized,

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("cannot form groups of at least two from {members} member(s) with target size {group_size}")]
    Infeasible { members: usize, group_size: usize },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("'{0}' is destructive and must be confirmed first")]
    DestructiveConfirmationRequired(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("invalid member: {0}")]
    InvalidMember(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GroupingError {
    /// Shorthand used by store backends to wrap driver errors.
    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GroupingError>;
