//! The identity a request acts as.

use std::fmt;

/// The already-authenticated actor of one request.
///
/// Resolved by the authentication layer and passed explicitly into every
/// operation. `None` means the request carries no usable identity.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    actor: Option<String>,
}

impl ActorContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }

    /// A context with no identity.
    pub fn anonymous() -> Self {
        Self { actor: None }
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Whether `actor` is the caller itself.
    pub fn is(&self, actor: &str) -> bool {
        self.actor.as_deref() == Some(actor)
    }
}

impl fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actor {
            Some(actor) => write!(f, "ActorContext({})", actor),
            None => f.write_str("ActorContext(<anonymous>)"),
        }
    }
}
