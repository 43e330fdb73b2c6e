// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interface to `certutil.exe`.

certutil has no structured output. Matching certificates are found by scanning
its human readable listing for serial number lines, which is sensitive to the
tool's output format and locale. That parsing is confined to
[parse_serial_numbers]. */

use {
    crate::{
        error::{Result, WincertError},
        process::ToolRunner,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    slog::{debug, warn},
    std::{fmt, path::Path, str::FromStr},
};

static SERIAL_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Serial Number: ([0-9a-fA-F]+)$").unwrap());

/// A Windows system certificate store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SystemStore {
    /// Trusted root certification authorities.
    Root,
    /// Intermediate certification authorities.
    Ca,
    /// Personal certificates.
    My,
}

impl SystemStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Ca => "CA",
            Self::My => "My",
        }
    }
}

impl fmt::Display for SystemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemStore {
    type Err = WincertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root" => Ok(Self::Root),
            "ca" => Ok(Self::Ca),
            "my" => Ok(Self::My),
            _ => Err(WincertError::Configuration(format!(
                "{} is not a valid certificate store; use Root, CA or My",
                s
            ))),
        }
    }
}

/// Extract serial numbers from `certutil -store` output.
///
/// One entry is returned per matching line, in order.
pub fn parse_serial_numbers(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            SERIAL_NUMBER_RE
                .captures(line.trim_end_matches('\r'))
                .map(|caps| caps[1].to_string())
        })
        .collect()
}

/// Runs `certutil.exe` subcommands.
pub struct CertUtil<'a, R: ToolRunner> {
    runner: &'a R,
    program: &'a Path,
}

impl<'a, R: ToolRunner> CertUtil<'a, R> {
    pub fn new(runner: &'a R, program: &'a Path) -> Self {
        Self { runner, program }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Add a certificate file to a store.
    pub fn add_to_store(
        &self,
        logger: &slog::Logger,
        store: SystemStore,
        cert_path: &Path,
    ) -> Result<()> {
        debug!(
            logger,
            "adding {} to certificate store {}",
            cert_path.display(),
            store
        );

        let cert = cert_path.display().to_string();
        self.runner
            .run(self.program, &Self::args(&["-addstore", store.as_str(), &cert]))?
            .check(self.program)?;

        Ok(())
    }

    /// Serial numbers of the certificates in `store` matching `token`.
    ///
    /// `token` can be a serial number, a SHA-1 certificate hash or any other
    /// match token certutil accepts.
    pub fn find_serial_numbers(
        &self,
        logger: &slog::Logger,
        token: &str,
        store: SystemStore,
    ) -> Result<Vec<String>> {
        let output = self
            .runner
            .run(self.program, &Self::args(&["-store", store.as_str(), token]))?;

        let serials = parse_serial_numbers(&output.stdout);

        // certutil exits non-zero when nothing matches.
        if !serials.is_empty() && !output.success() {
            return Err(WincertError::ToolInvocation {
                program: self.program.display().to_string(),
                code: output.code,
                output: output.combined(),
            });
        }

        if serials.is_empty() && !output.success() {
            warn!(
                logger,
                "certutil -store {} exited with {:?}",
                store,
                output.code
            );
        }

        Ok(serials)
    }

    /// Delete a certificate from a store by serial number.
    pub fn delete_serial_number(
        &self,
        logger: &slog::Logger,
        store: SystemStore,
        serial: &str,
    ) -> Result<()> {
        debug!(logger, "delete certificate {} from {}", serial, store);

        self.runner
            .run(self.program, &Self::args(&["-delstore", store.as_str(), serial]))?
            .check(self.program)?;

        Ok(())
    }

    /// Delete every certificate in `store` matching `token`.
    ///
    /// Returns the number of certificates deleted. Nothing matching is a
    /// [WincertError::NotFound].
    pub fn remove(&self, logger: &slog::Logger, token: &str, store: SystemStore) -> Result<usize> {
        let serials = self.find_serial_numbers(logger, token, store)?;

        if serials.is_empty() {
            return Err(WincertError::NotFound {
                token: token.to_string(),
                store: store.to_string(),
            });
        }

        for serial in &serials {
            self.delete_serial_number(logger, store, serial)?;
        }

        Ok(serials.len())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::{exit, exit_with_stdout, FakeRunner},
        wincert_common::testutil::get_logger,
    };

    const TWO_CERTIFICATES: &str = "Root \"Trusted Root Certification Authorities\"\r\n\
        ================ Certificate 0 ================\r\n\
        Serial Number: 3c4e2a1f9b7d6e5a4c3b2a1f0e9d8c7b\r\n\
        Issuer: CN=Test Authority\r\n\
        Subject: CN=Test Authority\r\n\
        Signature matches Public Key\r\n\
        ================ Certificate 1 ================\r\n\
        Serial Number: 00ff\r\n\
        Issuer: CN=Test Authority\r\n\
        CertUtil: -store command completed successfully.\r\n";

    #[test]
    fn parse_none() {
        assert!(parse_serial_numbers("").is_empty());
        assert!(parse_serial_numbers(
            "Root\nCertUtil: -store command FAILED: 0x80092004 (-2146885628)\n"
        )
        .is_empty());
    }

    #[test]
    fn parse_one() {
        assert_eq!(
            parse_serial_numbers("Serial Number: 1a2b3c\nSubject: CN=x\n"),
            vec!["1a2b3c".to_string()]
        );
    }

    #[test]
    fn parse_many_with_crlf() {
        assert_eq!(
            parse_serial_numbers(TWO_CERTIFICATES),
            vec![
                "3c4e2a1f9b7d6e5a4c3b2a1f0e9d8c7b".to_string(),
                "00ff".to_string()
            ]
        );
    }

    #[test]
    fn parse_ignores_near_misses() {
        let output = "  Serial Number: abcd\n\
            Serial Number: xyz\n\
            Serial Number: abcd trailing\n\
            Serial Number:\n\
            Serial Number: 0123\n";

        assert_eq!(parse_serial_numbers(output), vec!["0123".to_string()]);
    }

    #[test]
    fn store_names() -> anyhow::Result<()> {
        assert_eq!(SystemStore::from_str("root")?, SystemStore::Root);
        assert_eq!(SystemStore::from_str("CA")?, SystemStore::Ca);
        assert_eq!(SystemStore::Ca.to_string(), "CA");
        assert!(SystemStore::from_str("Disallowed").is_err());

        Ok(())
    }

    #[test]
    fn remove_deletes_each_serial() -> anyhow::Result<()> {
        let logger = get_logger()?;
        let runner = FakeRunner::new(|inv| {
            if inv.args[0] == "-store" {
                exit_with_stdout(0, TWO_CERTIFICATES)
            } else {
                exit(0)
            }
        });

        let certutil = CertUtil::new(&runner, Path::new("certutil.exe"));
        let removed = certutil.remove(&logger, "Test Authority", SystemStore::Root)?;

        assert_eq!(removed, 2);

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].args, vec!["-store", "Root", "Test Authority"]);
        assert_eq!(
            calls[1].args,
            vec!["-delstore", "Root", "3c4e2a1f9b7d6e5a4c3b2a1f0e9d8c7b"]
        );
        assert_eq!(calls[2].args, vec!["-delstore", "Root", "00ff"]);

        Ok(())
    }

    #[test]
    fn remove_without_match_is_not_found() -> anyhow::Result<()> {
        let logger = get_logger()?;
        let runner = FakeRunner::new(|_| exit_with_stdout(-2146885628, "CertUtil: FAILED\n"));

        let certutil = CertUtil::new(&runner, Path::new("certutil.exe"));
        let err = certutil
            .remove(&logger, "deadbeef", SystemStore::Ca)
            .unwrap_err();

        match err {
            WincertError::NotFound { token, store } => {
                assert_eq!(token, "deadbeef");
                assert_eq!(store, "CA");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);

        Ok(())
    }

    #[test]
    fn failed_delete_propagates() -> anyhow::Result<()> {
        let logger = get_logger()?;
        let runner = FakeRunner::new(|inv| {
            if inv.args[0] == "-store" {
                exit_with_stdout(0, TWO_CERTIFICATES)
            } else {
                exit(5)
            }
        });

        let certutil = CertUtil::new(&runner, Path::new("certutil.exe"));
        let err = certutil
            .remove(&logger, "Test Authority", SystemStore::Root)
            .unwrap_err();

        assert!(matches!(
            err,
            WincertError::ToolInvocation { code: Some(5), .. }
        ));
        assert_eq!(runner.calls_to("certutil.exe").len(), 2);

        Ok(())
    }

    #[test]
    fn add_to_store_args() -> anyhow::Result<()> {
        let logger = get_logger()?;
        let runner = FakeRunner::succeeding();

        CertUtil::new(&runner, Path::new("certutil.exe")).add_to_store(
            &logger,
            SystemStore::Root,
            Path::new("ca.cer"),
        )?;

        assert_eq!(runner.calls()[0].args, vec!["-addstore", "Root", "ca.cer"]);

        Ok(())
    }
}
