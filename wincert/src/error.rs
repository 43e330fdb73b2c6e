// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {std::path::PathBuf, thiserror::Error};

/// Unified error type for certificate management operations.
///
/// Each variant is a distinct failure kind so callers can branch on the
/// variant rather than on message text.
#[derive(Debug, Error)]
pub enum WincertError {
    /// A required tool or registry entry is missing.
    ///
    /// This needs operator action and should not be retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An expected popup window never appeared.
    #[error("timeout waiting for makecert popup({dialog}) \"{title}\"")]
    Timeout { dialog: usize, title: String },

    /// An external tool exited with a failure status.
    #[error("error running {program} (exit code {code:?}): {output}")]
    ToolInvocation {
        program: String,
        code: Option<i32>,
        output: String,
    },

    /// A tool ran but did not produce a file it should have.
    #[error("{tool} did not create {}", path.display())]
    MissingOutput { tool: String, path: PathBuf },

    /// A certificate store query matched nothing.
    #[error("no certificate with matching certid '{token}' in store {store}")]
    NotFound { token: String, store: String },

    /// Every timestamp server was tried without a successful signature.
    #[error("retries exhausted signing {} after {attempts} timestamp servers", path.display())]
    ExhaustedRetries { path: PathBuf, attempts: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl WincertError {
    /// Whether restarting the whole operation could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, WincertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retriable() {
        assert!(WincertError::Timeout {
            dialog: 1,
            title: "Create Private Key Password".into()
        }
        .is_retriable());
        assert!(!WincertError::Configuration("missing".into()).is_retriable());
        assert!(!WincertError::ExhaustedRetries {
            path: PathBuf::from("app.exe"),
            attempts: 4
        }
        .is_retriable());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = WincertError::MissingOutput {
            tool: "makecert(CA)".into(),
            path: PathBuf::from("ca.pvk"),
        };
        assert_eq!(err.to_string(), "makecert(CA) did not create ca.pvk");

        let err = WincertError::Timeout {
            dialog: 2,
            title: "Enter Private Key Password".into(),
        };
        assert!(err.to_string().contains("popup(2)"));
    }
}
