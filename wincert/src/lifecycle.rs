// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Creating, installing, removing and signing with code signing certificates. */

use {
    crate::{
        certutil::{CertUtil, SystemStore},
        desktop::Desktop,
        error::{Result, WincertError},
        makecert::{authority_args, end_entity_args, ValidityWindow},
        popup::{PopupFlow, PopupResponder},
        process::ToolRunner,
        sdk::{SdkTool, Toolset},
        settings::Settings,
        signtool::{
            verify_args, FileBasedSigningCertificate, SigntoolSign, SIGNTOOL_TIMESTAMP_UNAVAILABLE,
        },
    },
    slog::{debug, error, info, warn},
    std::path::{Path, PathBuf},
};

/// Default lifetime of a newly created authority.
pub const DEFAULT_VALID_HOURS: i64 = 24;

/// Stores an authority is removed from.
const AUTHORITY_STORES: [SystemStore; 2] = [SystemStore::Root, SystemStore::Ca];

fn require_file(tool: &str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WincertError::MissingOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Performs certificate operations with the Windows SDK tools.
///
/// Operations are sequential and blocking. None of them are safe to run
/// concurrently against the same files.
pub struct CertificateManager<D: Desktop, R: ToolRunner> {
    settings: Settings,
    desktop: D,
    runner: R,
}

impl<D: Desktop, R: ToolRunner> CertificateManager<D, R> {
    pub fn new(settings: Settings, desktop: D, runner: R) -> Self {
        Self {
            settings,
            desktop,
            runner,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn tool(&self, tool: SdkTool) -> Result<PathBuf> {
        Toolset::locate(self.settings.sdk_path.as_deref())?.tool(tool)
    }

    fn certutil(&self) -> CertUtil<'_, R> {
        CertUtil::new(&self.runner, &self.settings.certutil_path)
    }

    /// Create a self-signed certificate authority and trust it.
    ///
    /// The private key is written to `key_path` and the certificate to
    /// `cert_path`. The certificate is valid from yesterday until
    /// `valid_hours` from now and is added to the `Root` store.
    pub fn create_authority(
        &self,
        logger: &slog::Logger,
        subject: &str,
        password: &str,
        key_path: &Path,
        cert_path: &Path,
        valid_hours: i64,
    ) -> Result<()> {
        let makecert = self.tool(SdkTool::MakeCert)?;
        let validity = ValidityWindow::from_now(chrono::Local::now(), valid_hours)?;

        info!(
            logger,
            "creating authority CN={} valid {} to {}",
            subject,
            validity.begin_arg(),
            validity.end_arg()
        );

        let args = authority_args(
            &self.settings.authority_hash_algorithm,
            &validity,
            subject,
            key_path,
            cert_path,
        );

        PopupResponder::new(&self.desktop, &self.settings.popup).run(
            logger,
            &makecert,
            &args,
            PopupFlow::Authority,
            password,
        )?;

        for path in [key_path, cert_path] {
            require_file("makecert(CA)", path)?;
        }

        self.certutil()
            .add_to_store(logger, SystemStore::Root, cert_path)?;

        Ok(())
    }

    /// Create a password protected `.pfx` package issued by an authority.
    ///
    /// Intermediate files live in a scratch directory which is removed on
    /// every exit path.
    pub fn create_end_entity_package(
        &self,
        logger: &slog::Logger,
        authority_subject: &str,
        password: &str,
        authority_key_path: &Path,
        authority_cert_path: &Path,
        package_path: &Path,
    ) -> Result<()> {
        let makecert = self.tool(SdkTool::MakeCert)?;
        let cert2spc = self.tool(SdkTool::Cert2Spc)?;
        let pvk2pfx = self.tool(SdkTool::Pvk2Pfx)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("wincert-");
        let scratch = match &self.settings.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!(logger, "using scratch directory {}", scratch.path().display());

        let pvk = scratch.path().join("mykey.pvk");
        let cer = scratch.path().join("mycert.cer");
        let spc = scratch.path().join("mycert.spc");

        let args = end_entity_args(
            authority_subject,
            authority_cert_path,
            authority_key_path,
            &pvk,
            &cer,
        );

        PopupResponder::new(&self.desktop, &self.settings.popup).run(
            logger,
            &makecert,
            &args,
            PopupFlow::EndEntity,
            password,
        )?;

        for path in [&pvk, &cer] {
            require_file("makecert(end)", path)?;
        }

        info!(logger, "converting certificate to software publisher certificate");
        self.runner
            .run(
                &cert2spc,
                &[cer.display().to_string(), spc.display().to_string()],
            )?
            .check(&cert2spc)?;

        info!(logger, "writing {}", package_path.display());
        self.runner
            .run(
                &pvk2pfx,
                &[
                    "-pvk".to_string(),
                    pvk.display().to_string(),
                    "-pi".to_string(),
                    password.to_string(),
                    "-spc".to_string(),
                    spc.display().to_string(),
                    "-f".to_string(),
                    "-pfx".to_string(),
                    package_path.display().to_string(),
                    "-po".to_string(),
                    password.to_string(),
                ],
            )?
            .check(&pvk2pfx)?;

        if let Err(e) = scratch.close() {
            warn!(logger, "unable to remove scratch directory: {}", e);
        }

        Ok(())
    }

    /// Remove certificates matching `token` from the `Root` and `CA` stores.
    ///
    /// `token` is any certutil match token: a serial number, a SHA-1
    /// certificate hash, a public key hash and so on. Only if neither store
    /// has a match is [WincertError::NotFound] returned.
    pub fn remove_from_store(&self, logger: &slog::Logger, token: &str) -> Result<usize> {
        let certutil = self.certutil();
        let mut removed = 0;

        for store in AUTHORITY_STORES {
            match certutil.remove(logger, token, store) {
                Ok(count) => {
                    info!(logger, "removed {} certificates from {}", count, store);
                    removed += count;
                }
                Err(WincertError::NotFound { .. }) => {
                    debug!(logger, "no certificate matching {} in {}", token, store);
                }
                Err(e) => return Err(e),
            }
        }

        if removed == 0 {
            return Err(WincertError::NotFound {
                token: token.to_string(),
                store: AUTHORITY_STORES
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        Ok(removed)
    }

    /// Remove certificates matching `token` from a single store.
    pub fn remove_from_single_store(
        &self,
        logger: &slog::Logger,
        token: &str,
        store: SystemStore,
    ) -> Result<usize> {
        self.certutil().remove(logger, token, store)
    }

    /// Sign `path` with the `.pfx` package at `package_path`.
    ///
    /// Configured timestamp servers are tried in order until one succeeds.
    pub fn sign(
        &self,
        logger: &slog::Logger,
        path: &Path,
        package_path: &Path,
        password: &str,
    ) -> Result<()> {
        let signtool = self.tool(SdkTool::SignTool)?;

        let mut certificate = FileBasedSigningCertificate::new(package_path);
        certificate.set_password(password);

        for server in &self.settings.timestamp_servers {
            let output = SigntoolSign::new(certificate.clone())
                .timestamp_server(server.clone())
                .sign_file(path)
                .run(&self.runner, &signtool)?;

            match output.code {
                Some(0) => {
                    debug!(logger, "{}", output.stdout);
                    info!(logger, "signed {} using {}", path.display(), server.url);
                    return Ok(());
                }
                Some(SIGNTOOL_TIMESTAMP_UNAVAILABLE) => {
                    debug!(logger, "failed to sign w/ timestamp url {}", server.url);
                }
                code => {
                    info!(logger, "{}", output.stdout);
                    error!(
                        logger,
                        "signtool exited with {:?} using {}: {}", code, server.url, output.stderr
                    );
                }
            }
        }

        Err(WincertError::ExhaustedRetries {
            path: path.to_path_buf(),
            attempts: self.settings.timestamp_servers.len(),
        })
    }

    /// Whether `path` carries a valid authenticode signature.
    ///
    /// Any verification failure, including signtool itself failing, is
    /// reported as `false`.
    pub fn is_signed(&self, logger: &slog::Logger, path: &Path) -> Result<bool> {
        let signtool = self.tool(SdkTool::SignTool)?;

        let output = self.runner.run(&signtool, &verify_args(path))?;

        if !output.success() {
            debug!(
                logger,
                "verification of {} failed with {:?}: {}",
                path.display(),
                output.code,
                output.combined()
            );
        }

        Ok(output.success())
    }
}
