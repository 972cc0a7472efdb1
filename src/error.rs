//! The closed error taxonomy, wrapping internal `anyhow::Error`s at the
//! façade boundary.
//!
//! Internal layers (compiler, adapter, lock store, engine) return
//! `anyhow::Result`; the façade is the one place that needs a closed error
//! *kind* to pick the right `{ok:false, msg}` shape, so it classifies there
//! rather than threading a typed error through every internal call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Preflight(String),

    #[error("{0}")]
    Runtime(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    NotFound(String),
}

impl EngineError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Classify an internal `anyhow::Error` into the façade's error kind.
    /// Internal layers don't carry a typed kind, so this inspects the
    /// rendered message for the markers each layer already produces —
    /// `io::Error`'s `Display`, `preflight_message`'s `path: message` shape,
    /// and the literal "not found"/validation wording used by the compiler
    /// and stack engine.
    pub fn classify(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<std::io::Error>().is_some() {
            return EngineError::Io(err.to_string());
        }
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("not found") {
            EngineError::NotFound(msg)
        } else if lower.contains("is not supported by the target runtime") || lower.contains("no services defined") {
            EngineError::Preflight(msg)
        } else if lower.contains("stack name")
            || lower.contains("already exists")
            || lower.contains("invalid .env format")
            || lower.contains("invalid yaml format")
            || lower.contains("must not be empty")
            || lower.contains("is required")
        {
            EngineError::Validation(msg)
        } else {
            EngineError::Runtime(msg)
        }
    }
}

/// Build the `path: message, path: message` text from a `CompileResult`'s
/// errors.
pub fn preflight_message(errors: &[crate::compose::CompileError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::CompileError;

    #[test]
    fn preflight_message_joins_path_and_message() {
        let errors = vec![
            CompileError {
                key: "deploy".into(),
                path: "services.web.deploy".into(),
                message: "key is not supported".into(),
            },
            CompileError {
                key: "image".into(),
                path: "services.db.image".into(),
                message: "image is required".into(),
            },
        ];
        let msg = preflight_message(&errors);
        assert!(msg.contains("services.web.deploy: key is not supported"));
        assert!(msg.contains("services.db.image: image is required"));
    }

    #[test]
    fn classify_recognises_not_found() {
        let err = anyhow::anyhow!("Stack not found");
        assert!(matches!(EngineError::classify(&err), EngineError::NotFound(_)));
    }

    #[test]
    fn classify_recognises_validation() {
        let err = anyhow::anyhow!("Stack name already exists");
        assert!(matches!(EngineError::classify(&err), EngineError::Validation(_)));
    }

    #[test]
    fn classify_recognises_preflight() {
        let err = anyhow::anyhow!(preflight_message(&[CompileError {
            key: "deploy".into(),
            path: "services.web.deploy".into(),
            message: "'deploy' is not supported by the target runtime".into(),
        }]));
        assert!(matches!(EngineError::classify(&err), EngineError::Preflight(_)));
    }

    #[test]
    fn classify_falls_back_to_runtime() {
        let err = anyhow::anyhow!("Failed to start 'web': exit 1");
        assert!(matches!(EngineError::classify(&err), EngineError::Runtime(_)));
    }

    #[test]
    fn classify_recognises_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: anyhow::Error = io_err.into();
        assert!(matches!(EngineError::classify(&err), EngineError::Io(_)));
    }
}
