// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Running non-interactive external tools. */

use {
    crate::error::{Result, WincertError},
    std::path::Path,
};

/// The outcome of running an external tool to completion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ToolOutput {
    /// Exit code. `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !s.is_empty() && !self.stderr.is_empty() && !s.ends_with('\n') {
            s.push('\n');
        }
        s.push_str(&self.stderr);

        s
    }

    /// Convert a failed run into a [WincertError::ToolInvocation].
    pub fn check(self, program: &Path) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(WincertError::ToolInvocation {
                program: program.display().to_string(),
                code: self.code,
                output: self.combined(),
            })
        }
    }
}

/// Runs a program to completion and captures its output.
pub trait ToolRunner {
    /// Run `program` with `args`.
    ///
    /// A non-zero exit is not an error at this layer. An `Err` means the
    /// program could not be run at all.
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput>;
}

/// [ToolRunner] spawning real processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuctRunner;

impl ToolRunner for DuctRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        // A bare `Path` is prefixed with `./` by duct; an `OsStr` is searched for on PATH.
        let output = duct::cmd(program.as_os_str(), args.to_vec())
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    WincertError::Configuration(format!("unable to run {}", program.display()))
                } else {
                    WincertError::Io(e)
                }
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output() {
        let output = ToolOutput {
            code: Some(1),
            stdout: "Succeeded".into(),
            stderr: "Error: bad file".into(),
        };

        assert_eq!(output.combined(), "Succeeded\nError: bad file");

        match output.check(Path::new("cert2spc.exe")) {
            Err(WincertError::ToolInvocation {
                program,
                code,
                output,
            }) => {
                assert_eq!(program, "cert2spc.exe");
                assert_eq!(code, Some(1));
                assert!(output.ends_with("bad file"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_configuration_error() {
        let res = DuctRunner.run(Path::new("wincert-definitely-not-a-program"), &[]);

        assert!(matches!(res, Err(WincertError::Configuration(_))));
    }

    #[cfg(unix)]
    #[test]
    fn bare_program_name_searches_path() -> anyhow::Result<()> {
        let output = DuctRunner.run(Path::new("true"), &[])?;

        assert!(output.success());

        Ok(())
    }

    #[cfg(windows)]
    #[test]
    fn bare_program_name_searches_path() -> anyhow::Result<()> {
        let output = DuctRunner.run(
            Path::new("cmd.exe"),
            &["/c".to_string(), "exit 3".to_string()],
        )?;

        assert_eq!(output.code, Some(3));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn captures_exit_code() -> anyhow::Result<()> {
        let output = DuctRunner.run(
            Path::new("sh"),
            &["-c".to_string(), "echo out; echo err >&2; exit 2".to_string()],
        )?;

        assert_eq!(output.code, Some(2));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");

        Ok(())
    }
}
