use std::fmt;

use crate::store::StoreError;

/// Machine-readable error codes for scripts and agents driving `grank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    EmptyGraph,
    InvalidParameter,
    InvalidIdentifier,
    UnknownRelation,
    UnknownColumn,
    InvalidNodeId,
    ConfigParseError,
    OutputCollision,
    NonFiniteRank,
    StoreFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::EmptyGraph => "E1001",
            Self::InvalidParameter => "E1002",
            Self::InvalidIdentifier => "E1003",
            Self::UnknownRelation => "E1004",
            Self::UnknownColumn => "E1005",
            Self::InvalidNodeId => "E1006",
            Self::ConfigParseError => "E1007",
            Self::OutputCollision => "E2001",
            Self::NonFiniteRank => "E3001",
            Self::StoreFailure => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::EmptyGraph => "Graph has no nodes",
            Self::InvalidParameter => "Parameter out of range",
            Self::InvalidIdentifier => "Invalid table or column identifier",
            Self::UnknownRelation => "Relation not found",
            Self::UnknownColumn => "Column not found",
            Self::InvalidNodeId => "Invalid node identifier",
            Self::ConfigParseError => "Config file parse error",
            Self::OutputCollision => "Output relation already exists",
            Self::NonFiniteRank => "Non-finite rank value",
            Self::StoreFailure => "Tabular store failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::EmptyGraph => Some("Check that the edge relation (or vertex relation) has rows."),
            Self::InvalidParameter => Some(
                "Use 0 < damping_factor < 1, epsilon > 0, and max_iter >= 1.",
            ),
            Self::InvalidIdentifier => {
                Some("Identifiers must match [A-Za-z_][A-Za-z0-9_]*.")
            }
            Self::UnknownRelation | Self::UnknownColumn => {
                Some("Run `grank show` or inspect the database schema for the exact name.")
            }
            Self::InvalidNodeId => Some("Node identifiers must be non-NULL integers or text."),
            Self::ConfigParseError => Some("Fix syntax in graphrank.toml and retry."),
            Self::OutputCollision => {
                Some(
                    "Choose another output name. The `replace` policy only overwrites the \
                     output and its summary, never other relations.",
                )
            }
            Self::NonFiniteRank => Some("Inspect the input for corrupt rows and retry."),
            Self::StoreFailure => Some("Check the database path, permissions, and disk space."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors produced by a PageRank run.
///
/// Validation failures surface as [`RankError::InvalidInput`] before any
/// iteration starts. Schema resolution failures from the store are folded
/// into `InvalidInput` as well, since they describe caller input rather than
/// a broken store.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// Empty graph, unresolvable names, bad identifiers, or out-of-range
    /// parameters.
    #[error("invalid input: {reason}")]
    InvalidInput { code: ErrorCode, reason: String },

    /// The destination exists and the overwrite policy forbids replacing it.
    #[error("output relation `{name}` already exists")]
    Collision { name: String },

    /// An iteration produced a NaN or infinite rank.
    #[error("non-finite rank {value} for node {node} at iteration {iteration}")]
    Computation {
        node: String,
        value: f64,
        iteration: usize,
    },

    /// The tabular store failed while reading, joining, or materializing.
    #[error(transparent)]
    Store(StoreError),

    /// A broken internal contract (e.g. an aggregator returned the wrong
    /// vector length).
    #[error("internal error: {0}")]
    Internal(String),
}

impl RankError {
    /// Shorthand for an [`RankError::InvalidInput`] with the given code.
    pub fn invalid(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            code,
            reason: reason.into(),
        }
    }

    /// The stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput { code, .. } => *code,
            Self::Collision { .. } => ErrorCode::OutputCollision,
            Self::Computation { .. } => ErrorCode::NonFiniteRank,
            Self::Store(_) => ErrorCode::StoreFailure,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Returns `true` for errors raised before the iteration loop starts.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

impl From<StoreError> for RankError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::InvalidIdentifier(_) => ErrorCode::InvalidIdentifier,
            StoreError::UnknownRelation(_) => ErrorCode::UnknownRelation,
            StoreError::UnknownColumn { .. } | StoreError::ForeignColumn { .. } => {
                ErrorCode::UnknownColumn
            }
            StoreError::AlreadyExists(name) => {
                return Self::Collision { name: name.clone() };
            }
            _ => return Self::Store(err),
        };
        Self::InvalidInput {
            code,
            reason: err.to_string(),
        }
    }
}
