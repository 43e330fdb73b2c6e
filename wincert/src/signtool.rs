// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interface to `signtool.exe`. */

use {
    crate::{
        error::Result,
        process::{ToolOutput, ToolRunner},
        settings::TimestampServer,
    },
    std::path::{Path, PathBuf},
};

/// signtool exit code for a failure that may succeed against another timestamp server.
pub const SIGNTOOL_TIMESTAMP_UNAVAILABLE: i32 = 2;

/// Represents a code signing package (`.pfx`) backed by a file.
#[derive(Clone, Debug)]
pub struct FileBasedSigningCertificate {
    /// Path to the package file.
    path: PathBuf,
    /// Password used to unlock the package.
    password: Option<String>,
}

impl FileBasedSigningCertificate {
    /// Construct an instance from a path.
    ///
    /// No validation is done that the path exists.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            password: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn set_password(&mut self, password: impl ToString) {
        self.password = Some(password.to_string());
    }
}

/// Represents an invocation of `signtool.exe sign` to sign some files.
#[derive(Clone, Debug)]
pub struct SigntoolSign {
    certificate: FileBasedSigningCertificate,
    timestamp_server: Option<TimestampServer>,
    sign_files: Vec<PathBuf>,
}

impl SigntoolSign {
    /// Construct a new instance using a specified signing certificate.
    pub fn new(certificate: FileBasedSigningCertificate) -> Self {
        Self {
            certificate,
            timestamp_server: None,
            sign_files: vec![],
        }
    }

    /// Set the timestamp server to use when signing.
    pub fn timestamp_server(&mut self, server: TimestampServer) -> &mut Self {
        self.timestamp_server = Some(server);
        self
    }

    /// Mark a file path as to be signed.
    pub fn sign_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sign_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Arguments to `signtool.exe`.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["sign".to_string()];

        args.push("/f".to_string());
        args.push(self.certificate.path().display().to_string());
        if let Some(password) = self.certificate.password() {
            args.push("/p".to_string());
            args.push(password.to_string());
        }

        if let Some(server) = &self.timestamp_server {
            match &server.digest {
                None => {
                    args.push("/t".to_string());
                    args.push(server.url.to_string());
                }
                Some(digest) => {
                    args.push("/tr".to_string());
                    args.push(server.url.to_string());
                    args.push("/td".to_string());
                    args.push(digest.to_string());
                }
            }
        }

        args.extend(self.sign_files.iter().map(|p| p.display().to_string()));

        args
    }

    /// Run `signtool sign` with requested options.
    ///
    /// The exit status is not interpreted.
    pub fn run(&self, runner: &impl ToolRunner, signtool: &Path) -> Result<ToolOutput> {
        runner.run(signtool, &self.args())
    }
}

/// Arguments to `signtool.exe` verifying a file against the default authenticode policy.
pub fn verify_args(path: &Path) -> Vec<String> {
    vec![
        "verify".to_string(),
        "/q".to_string(),
        "/pa".to_string(),
        path.display().to_string(),
    ]
}
