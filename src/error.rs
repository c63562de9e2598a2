//! Error taxonomy.
//!
//! Every fallible operation in this crate returns a typed error from [`RouterError`] (or one of
//! the narrower error types it wraps, such as [`BuildError`] or [`ForwardError`]). Nothing in
//! this crate panics on user input.

use std::fmt;

use crate::state::State;

/// The stable error taxonomy raised by the router, its matcher, and its route tree.
///
/// Each variant corresponds to one row of the error table in the design: callers can match on
/// `code()` to get a stable string identifier independent of the `Display` message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// Illegal input shape or value, raised synchronously before any event is emitted.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A route name is not present in the route tree.
    #[error("route not found: {0}")]
    RouteNotFound(String),

    /// The operation requires an active (started, non-disposed) router.
    #[error("router has not been started")]
    RouterNotStarted,

    /// The router has been disposed and no longer accepts mutating operations.
    #[error("router has been disposed")]
    RouterDisposed,

    /// The requested transition target is structurally equal to the current state and neither
    /// `force` nor `reload` was set.
    #[error("transition target equals the current state")]
    SameStates,

    /// A `canDeactivate` guard rejected the transition.
    #[error("cannot deactivate: {message}")]
    CannotDeactivate {
        message: String,
        #[source]
        cause: Option<Box<RouterError>>,
    },

    /// A `canActivate` guard rejected the transition.
    #[error("cannot activate: {message}")]
    CannotActivate {
        message: String,
        #[source]
        cause: Option<Box<RouterError>>,
    },

    /// The navigation record was superseded by a newer one, or the router was stopped.
    #[error("transition was cancelled")]
    TransitionCancelled,

    /// `buildPath` could not produce a URL for the given name/params.
    #[error("build error: {0}")]
    BuildError(#[from] BuildError),

    /// A `forwardTo` declaration is missing its target, forms a cycle, exceeds the chain bound,
    /// or requires params the source route cannot supply.
    #[error("invalid forward: {0}")]
    InvalidForwardTo(#[from] ForwardError),
}

impl RouterError {
    /// A stable machine-readable identifier for this error kind, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::ValidationError(_) => "ValidationError",
            RouterError::RouteNotFound(_) => "RouteNotFound",
            RouterError::RouterNotStarted => "RouterNotStarted",
            RouterError::RouterDisposed => "RouterDisposed",
            RouterError::SameStates => "SameStates",
            RouterError::CannotDeactivate { .. } => "CannotDeactivate",
            RouterError::CannotActivate { .. } => "CannotActivate",
            RouterError::TransitionCancelled => "TransitionCancelled",
            RouterError::BuildError(_) => "BuildError",
            RouterError::InvalidForwardTo(_) => "InvalidForwardTo",
        }
    }

    pub fn cannot_deactivate(message: impl Into<String>) -> Self {
        RouterError::CannotDeactivate {
            message: message.into(),
            cause: None,
        }
    }

    pub fn cannot_deactivate_with_cause(message: impl Into<String>, cause: RouterError) -> Self {
        RouterError::CannotDeactivate {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn cannot_activate(message: impl Into<String>) -> Self {
        RouterError::CannotActivate {
            message: message.into(),
            cause: None,
        }
    }

    pub fn cannot_activate_with_cause(message: impl Into<String>, cause: RouterError) -> Self {
        RouterError::CannotActivate {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

/// Errors raised while compiling a path pattern or building a URL from one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid route pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("missing required parameter '{0}'")]
    MissingParam(String),

    #[error("parameter '{param}' with value '{value}' violates its constraint")]
    ConstraintViolation { param: String, value: String },
}

/// Errors raised while declaring or resolving a `forwardTo` edge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    #[error("forward target '{0}' does not exist")]
    UnknownTarget(String),

    #[error("forward from '{from}' to '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("forward chain from '{0}' exceeds the maximum depth of {1}")]
    ChainTooLong(String, usize),

    #[error("forward target '{target}' requires param '{param}' which '{source}' cannot supply")]
    ParamNotSubset {
        source: String,
        target: String,
        param: String,
    },
}

/// The outcome of a rejected navigation, carrying both the error and the states involved, as
/// delivered to `TRANSITION_ERROR` listeners.
#[derive(Debug, Clone)]
pub struct TransitionError {
    pub to: State,
    pub from: Option<State>,
    pub error: RouterError,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transition to '{}' failed: {}",
            self.to.name, self.error
        )
    }
}

impl std::error::Error for TransitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
