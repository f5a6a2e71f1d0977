use std::fmt;

#[derive(Debug)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispatch cancelled")
    }
}

impl std::error::Error for CancelledError {}

/// Failures raised while turning host parameters into payloads or while
/// handing them to the ingestion API. Carried through `anyhow::Result`;
/// callers recover the variant with `downcast_ref::<DispatchError>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    MissingParameter {
        name: String,
        target: String,
    },
    InvalidParameter {
        name: String,
        target: String,
        reason: String,
    },
    InvalidTimestamp {
        raw: String,
    },
    UnsupportedOperation {
        resource: String,
        operation: String,
    },
    Transport {
        status: Option<u16>,
        message: String,
    },
}

impl DispatchError {
    pub fn missing(name: &str, target: impl fmt::Display) -> Self {
        Self::MissingParameter {
            name: name.to_string(),
            target: target.to_string(),
        }
    }

    pub fn invalid(name: &str, target: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameter { name, target } => {
                write!(f, "missing required parameter `{name}` for {target}")
            }
            Self::InvalidParameter {
                name,
                target,
                reason,
            } => write!(f, "invalid parameter `{name}` for {target}: {reason}"),
            Self::InvalidTimestamp { raw } => write!(f, "invalid timestamp `{raw}`"),
            Self::UnsupportedOperation {
                resource,
                operation,
            } => write!(
                f,
                "unsupported operation `{operation}` for resource `{resource}`"
            ),
            Self::Transport {
                status: Some(code),
                message,
            } => write!(f, "ingestion request failed with status {code}: {message}"),
            Self::Transport {
                status: None,
                message,
            } => write!(f, "ingestion request failed: {message}"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_field_and_target() {
        let err = DispatchError::missing("distinctId", "alias/create");
        assert_eq!(
            err.to_string(),
            "missing required parameter `distinctId` for alias/create"
        );
    }

    #[test]
    fn anyhow_roundtrip_keeps_variant() {
        let err: anyhow::Error = DispatchError::Transport {
            status: Some(401),
            message: "bad key".into(),
        }
        .into();
        let inner = err.downcast_ref::<DispatchError>().unwrap();
        assert!(inner.is_transport());
        assert!(err.to_string().contains("401"));
    }
}
