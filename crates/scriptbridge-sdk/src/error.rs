//! Error types for calls crossing the bridge

/// Result type for marshaled calls
pub type CallResult<T> = Result<T, CallError>;

/// Per-call marshaling failures.
///
/// These are surfaced to the immediate caller only; none of them leave the
/// owning engine in a bad state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The script side declared the override but has no implementation
    #[error("Override not implemented: {function}")]
    Unimplemented {
        /// Function name of the override
        function: String,
    },

    /// A reference return was requested from an unimplemented abstract override
    #[error("Cannot return a reference from unimplemented abstract override {function}")]
    AbstractReference {
        /// Function name of the override
        function: String,
    },

    /// The object's dispatch table was never patched by any engine
    #[error("Object dispatch table is not patched")]
    NotPatched,

    /// The dispatch table has no call target at this slot
    #[error("Empty dispatch slot {0}")]
    EmptySlot(u32),

    /// Any other non-zero status returned through a slot
    #[error("Call failed with status {0}")]
    Status(i32),
}

impl CallError {
    /// Map a raw slot status to an error, `None` for success
    pub fn from_status(status: i32, function: &str) -> Option<Self> {
        match status {
            crate::STATUS_OK => None,
            crate::STATUS_UNIMPLEMENTED => Some(CallError::Unimplemented {
                function: function.to_string(),
            }),
            crate::STATUS_NOT_PATCHED => Some(CallError::NotPatched),
            other => Some(CallError::Status(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert_eq!(CallError::from_status(0, "speak"), None);
        assert_eq!(
            CallError::from_status(-1, "speak"),
            Some(CallError::Unimplemented {
                function: "speak".to_string()
            })
        );
        assert_eq!(CallError::from_status(-2, "speak"), Some(CallError::NotPatched));
        assert_eq!(CallError::from_status(7, "speak"), Some(CallError::Status(7)));
    }

    #[test]
    fn test_display() {
        let err = CallError::AbstractReference {
            function: "name".to_string(),
        };
        assert!(err.to_string().contains("name"));
    }
}
