use thiserror::Error;

/// Canonical Rill error taxonomy used across crates.
///
/// Classification guidance:
/// - [`RillError::InvalidArgument`]: malformed batches, schema or type mismatches, bad plan wiring
/// - [`RillError::NotFound`]: unregistered functions, unknown peers, missing tables or files
/// - [`RillError::AlreadyExists`]: duplicate function bindings or overloads
/// - [`RillError::InvalidState`]: node lifecycle violations
/// - [`RillError::Execution`]: kernel failures and broken runtime invariants
/// - [`RillError::Unavailable`]: transport failures and timeouts towards remote peers
/// - [`RillError::InvalidConfig`]: configuration/environment contract violations
/// - [`RillError::Io`]: raw filesystem IO failures from std APIs
///
/// No variant is retried inside the execution core. The first error observed by
/// a graph driver becomes the terminal status of the query.
#[derive(Debug, Error)]
pub enum RillError {
    /// Shape, schema or type mismatch detected close to its cause.
    ///
    /// Examples:
    /// - column length differs from the batch row count
    /// - batch descriptor differs from the consuming node's input descriptor
    /// - predicate does not evaluate to boolean
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named entity could not be resolved.
    ///
    /// Examples:
    /// - no overload of a scalar function matches the argument types
    /// - `(plan node, call site)` was never bound
    /// - unknown remote peer or table
    #[error("not found: {0}")]
    NotFound(String),

    /// A registration collided with an existing entry.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An operation was issued in the wrong lifecycle state.
    ///
    /// Examples:
    /// - `open` called twice
    /// - `consume_next` after `close`
    /// - a batch arriving on an input that already delivered end-of-stream
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Runtime evaluation failures after validation succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Remote peer could not be reached or did not answer in time.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Invalid or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard Rill result alias.
pub type Result<T> = std::result::Result<T, RillError>;
