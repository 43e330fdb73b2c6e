// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Locating the Windows SDK and the tools it ships. */

use {
    crate::error::{Result, WincertError},
    once_cell::sync::Lazy,
    regex::{NoExpand, Regex},
    std::path::{Path, PathBuf},
};

/// Guidance appended to errors when the Windows SDK cannot be found.
pub const WINSDK_ERROR: &str = "Windows SDK may not be installed on this machine. \
    You can read more and (re-)download from \
    https://en.wikipedia.org/wiki/Microsoft_Windows_SDK";

/// Registry key holding Windows SDK installation information.
pub const WINSDK_REGISTRY_KEY: &str = r"SOFTWARE\Microsoft\Microsoft SDKs\Windows";

/// Registry value holding the Windows SDK installation folder.
pub const WINSDK_REGISTRY_VALUE: &str = "CurrentInstallFolder";

/// A tool shipped with the Windows SDK.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SdkTool {
    MakeCert,
    Cert2Spc,
    Pvk2Pfx,
    SignTool,
}

impl SdkTool {
    /// The executable filename of this tool.
    pub fn exe_name(&self) -> &'static str {
        match self {
            Self::MakeCert => "makecert.exe",
            Self::Cert2Spc => "cert2spc.exe",
            Self::Pvk2Pfx => "pvk2pfx.exe",
            Self::SignTool => "signtool.exe",
        }
    }
}

/// Convert the current binary's target architecture to a path used by the Windows SDK.
///
/// This can be used to resolve the path to host-native platform binaries in the
/// Windows SDK.
pub fn target_arch_to_windows_sdk_platform_path() -> Result<&'static str> {
    if cfg!(target_arch = "x86") {
        Ok("x86")
    } else if cfg!(target_arch = "x86_64") {
        Ok("x64")
    } else if cfg!(target_arch = "arm") {
        Ok("arm")
    } else if cfg!(target_arch = "aarch64") {
        Ok("arm64")
    } else {
        Err(WincertError::Configuration(
            "target architecture not supported on Windows".to_string(),
        ))
    }
}

static DOUBLED_BACKSLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\\\").unwrap());

/// Collapse doubled backslashes found in some registry values.
pub fn normalize_install_folder(value: &str) -> String {
    DOUBLED_BACKSLASH_RE
        .replace_all(value, NoExpand(r"\"))
        .into_owned()
}

/// Resolve the Windows SDK installation folder from the registry.
#[cfg(windows)]
pub fn find_windows_sdk_path() -> Result<PathBuf> {
    use winreg::{
        enums::{HKEY_LOCAL_MACHINE, KEY_READ},
        RegKey,
    };

    let value: String = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey_with_flags(WINSDK_REGISTRY_KEY, KEY_READ)
        .and_then(|key| key.get_value(WINSDK_REGISTRY_VALUE))
        .map_err(|_| {
            WincertError::Configuration(format!(
                "missing windows sdk registry entry: {}",
                WINSDK_ERROR
            ))
        })?;

    if value.is_empty() {
        return Err(WincertError::Configuration(format!(
            "empty windows sdk registry entry: {}",
            WINSDK_ERROR
        )));
    }

    Ok(PathBuf::from(normalize_install_folder(&value)))
}

/// Resolve the Windows SDK installation folder from the registry.
#[cfg(not(windows))]
pub fn find_windows_sdk_path() -> Result<PathBuf> {
    Err(WincertError::Configuration(format!(
        "finding the Windows SDK only supported on Windows: {}",
        WINSDK_ERROR
    )))
}

/// Locates tools inside a Windows SDK installation.
#[derive(Clone, Debug)]
pub struct Toolset {
    root: PathBuf,
}

impl Toolset {
    /// Construct an instance from an explicit installation folder.
    ///
    /// No validation is done that the folder exists.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Use `sdk_path` if given, otherwise consult the registry.
    pub fn locate(sdk_path: Option<&Path>) -> Result<Self> {
        match sdk_path {
            Some(path) => Ok(Self::new(path)),
            None => Ok(Self::new(find_windows_sdk_path()?)),
        }
    }

    /// Directories searched for tools, in order.
    ///
    /// Older SDKs put everything in `Bin`. Newer ones have per architecture
    /// directories.
    pub fn bin_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.root.join("Bin")];

        if let Ok(arch) = target_arch_to_windows_sdk_platform_path() {
            paths.push(self.root.join("bin").join(arch));
        }

        paths
    }

    /// Resolve the path to a tool, which must exist.
    pub fn tool(&self, tool: SdkTool) -> Result<PathBuf> {
        self.bin_paths()
            .into_iter()
            .map(|p| p.join(tool.exe_name()))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                WincertError::Configuration(format!(
                    "missing '{}' in {}: {}",
                    tool.exe_name(),
                    self.root.display(),
                    WINSDK_ERROR
                ))
            })
    }
}
