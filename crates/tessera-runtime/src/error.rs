use std::sync::Arc;

/// Failure raised while rendering a unit.
///
/// Every tag lifecycle call, scope operation and dispatch reports through this
/// one type so generated code can propagate with `?` and route the result to
/// the unit's error page.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("illegal state: {0}")]
    State(String),
    #[error("illegal argument: {0}")]
    Argument(String),
    #[error("{message}")]
    Tag {
        message: String,
        root_cause: Option<Arc<RenderError>>,
    },
    #[error("cannot evaluate `{expression}`: {message}")]
    Expression { expression: String, message: String },
    #[error("cannot instantiate {0}")]
    Instantiation(String),
    #[error("property error: {0}")]
    Property(String),
    #[error("{message}")]
    Servlet {
        message: String,
        root_cause: Option<Arc<RenderError>>,
    },
    /// Stops the rest of the page without reporting a failure.
    #[error("page evaluation skipped")]
    SkipPage,
}

impl RenderError {
    pub fn io(message: impl Into<String>) -> Self {
        RenderError::Io(Arc::new(std::io::Error::other(message.into())))
    }

    pub fn state(message: impl Into<String>) -> Self {
        RenderError::State(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        RenderError::Argument(message.into())
    }

    pub fn tag(message: impl Into<String>) -> Self {
        RenderError::Tag {
            message: message.into(),
            root_cause: None,
        }
    }

    /// Wraps `cause` as a tag failure unless it already is one.
    pub fn wrap_tag(cause: RenderError) -> Self {
        match cause {
            RenderError::Tag { .. } | RenderError::SkipPage => cause,
            other => RenderError::Tag {
                message: other.to_string(),
                root_cause: Some(Arc::new(other)),
            },
        }
    }

    pub fn is_skip_page(&self) -> bool {
        matches!(self, RenderError::SkipPage)
    }

    /// Direct cause attached to this failure, if any.
    pub fn root_cause(&self) -> Option<&Arc<RenderError>> {
        match self {
            RenderError::Tag { root_cause, .. } | RenderError::Servlet { root_cause, .. } => {
                root_cause.as_ref()
            }
            _ => None,
        }
    }

    /// Follows the cause chain down to the innermost recorded failure.
    pub fn deepest_cause(&self) -> Option<Arc<RenderError>> {
        let mut current = self.root_cause()?.clone();
        while let Some(next) = current.root_cause() {
            let next = next.clone();
            current = next;
        }
        Some(current)
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(Arc::new(err))
    }
}

impl From<std::fmt::Error> for RenderError {
    fn from(_: std::fmt::Error) -> Self {
        RenderError::io("formatter error")
    }
}

/// Raised by an attribute store whose backing lifetime has ended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("session has been invalidated")]
    Invalidated,
}

impl From<ScopeError> for RenderError {
    fn from(err: ScopeError) -> Self {
        RenderError::State(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepest_cause_walks_nested_tag_failures() {
        let inner = RenderError::Property("no getter `total`".to_string());
        let middle = RenderError::wrap_tag(inner);
        let outer = RenderError::Tag {
            message: "outer".to_string(),
            root_cause: Some(Arc::new(middle)),
        };
        let deepest = outer.deepest_cause().expect("cause");
        assert!(matches!(&*deepest, RenderError::Property(msg) if msg.contains("total")));
    }

    #[test]
    fn wrap_tag_keeps_skip_page() {
        assert!(RenderError::wrap_tag(RenderError::SkipPage).is_skip_page());
    }
}
