// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Windows code signing certificate management.

This crate creates certificate authorities and code signing packages, removes
certificates from the system stores and signs binaries by driving the tools
in the Windows SDK (`makecert.exe`, `cert2spc.exe`, `pvk2pfx.exe`,
`signtool.exe`) and `certutil.exe`. No cryptography is performed here.

`makecert.exe` prompts for passwords with GUI dialogs. These are answered by
[PopupResponder] using synthetic keystrokes, so certificate creation requires
an interactive Windows desktop and must not be disturbed while it runs.

[CertificateManager] is the entry point. */

pub mod certutil;
pub use certutil::{parse_serial_numbers, CertUtil, SystemStore};
pub mod desktop;
pub use desktop::{Desktop, Keystroke, SystemDesktop};
mod error;
pub use error::{Result, WincertError};
mod lifecycle;
pub use lifecycle::{CertificateManager, DEFAULT_VALID_HOURS};
pub mod makecert;
pub mod popup;
pub use popup::{PopupFlow, PopupResponder};
pub mod process;
pub use process::{DuctRunner, ToolOutput, ToolRunner};
pub mod sdk;
pub use sdk::{find_windows_sdk_path, SdkTool, Toolset};
mod settings;
pub use settings::{PopupSettings, Settings, TimestampServer, DEFAULT_TIMESTAMP_URLS};
pub mod signtool;
#[cfg(test)]
mod testutil;
