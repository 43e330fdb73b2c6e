// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration for certificate operations.

Settings can be loaded from a YAML document. Every field is optional and
falls back to the values in [Default]. */

use {
    crate::error::Result,
    serde::{Deserialize, Serialize},
    std::{path::Path, path::PathBuf, time::Duration},
};

/// Timestamp servers tried in order when signing.
pub const DEFAULT_TIMESTAMP_URLS: [&str; 4] = [
    "http://timestamp.comodoca.com/authenticode",
    "http://timestamp.verisign.com/scripts/timstamp.dll",
    "http://timestamp.globalsign.com/scripts/timestamp.dll",
    "http://tsa.starfieldtech.com",
];

/// Describes a timestamp server to use during signing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampServer {
    /// URL of the server.
    pub url: String,

    /// Digest algorithm for an RFC 3161 server.
    ///
    /// When set, signtool is given `/tr` and `/td`. Otherwise the legacy `/t`
    /// flag is used.
    #[serde(default)]
    pub digest: Option<String>,
}

impl TimestampServer {
    /// A legacy (non RFC 3161) timestamp server.
    pub fn simple(url: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            digest: None,
        }
    }

    /// An RFC 3161 timestamp server using the given digest algorithm.
    pub fn rfc3161(url: impl ToString, digest: impl ToString) -> Self {
        Self {
            url: url.to_string(),
            digest: Some(digest.to_string()),
        }
    }
}

/// Timing of the popup responder.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopupSettings {
    /// Delay between window activation attempts.
    pub poll_interval_ms: u64,
    /// Maximum number of window activation attempts per dialog.
    pub poll_attempts: usize,
    /// Delay between activating a dialog and the first keystroke.
    pub activation_settle_ms: u64,
    /// Delay after each keystroke except a dialog's final ENTER.
    pub keystroke_settle_ms: u64,
    /// Delay after a dialog's final ENTER.
    pub dialog_settle_ms: u64,
    /// Poll for every dialog's title, not just the first one.
    pub verify_each_dialog: bool,
}

impl Default for PopupSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            poll_attempts: 20,
            activation_settle_ms: 200,
            keystroke_settle_ms: 200,
            dialog_settle_ms: 500,
            verify_each_dialog: false,
        }
    }
}

impl PopupSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn activation_settle(&self) -> Duration {
        Duration::from_millis(self.activation_settle_ms)
    }

    pub fn keystroke_settle(&self) -> Duration {
        Duration::from_millis(self.keystroke_settle_ms)
    }

    pub fn dialog_settle(&self) -> Duration {
        Duration::from_millis(self.dialog_settle_ms)
    }
}

/// Settings for a [crate::CertificateManager].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Windows SDK installation folder.
    ///
    /// When unset, the folder is read from the registry.
    pub sdk_path: Option<PathBuf>,

    /// Path to `certutil.exe`. Resolved via `PATH` by default.
    pub certutil_path: PathBuf,

    /// Directory under which scratch directories are created.
    ///
    /// Defaults to the system temporary directory.
    pub scratch_dir: Option<PathBuf>,

    /// Hash algorithm passed to `makecert -a` for authorities.
    pub authority_hash_algorithm: String,

    /// Timestamp servers, tried in order.
    pub timestamp_servers: Vec<TimestampServer>,

    pub popup: PopupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sdk_path: None,
            certutil_path: PathBuf::from("certutil.exe"),
            scratch_dir: None,
            authority_hash_algorithm: "sha1".to_string(),
            timestamp_servers: DEFAULT_TIMESTAMP_URLS
                .iter()
                .map(TimestampServer::simple)
                .collect(),
            popup: PopupSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse settings from a YAML file.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        let fh = std::fs::File::open(path.as_ref())?;

        Ok(serde_yaml::from_reader(fh)?)
    }
}
