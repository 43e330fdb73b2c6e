// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test doubles for the desktop and tool runner.

use {
    crate::{
        desktop::{Desktop, Keystroke},
        error::{Result, WincertError},
        process::{ToolOutput, ToolRunner},
    },
    std::{
        cell::RefCell,
        collections::HashMap,
        path::{Path, PathBuf},
        time::Duration,
    },
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DesktopEvent {
    Launch(PathBuf, Vec<String>),
    Activate(String, bool),
    Keys(Keystroke),
    Pause(Duration),
}

/// A window manager where windows appear after a set number of activation attempts.
#[derive(Default)]
pub struct FakeDesktop {
    /// Title -> 1-based activation attempt at which the window appears.
    windows: HashMap<String, usize>,
    activations: RefCell<HashMap<String, usize>>,
    events: RefCell<Vec<DesktopEvent>>,
    create_outputs: bool,
    fail_launch: bool,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// A desktop where both makecert dialogs are present immediately.
    pub fn responsive() -> Self {
        Self::new()
            .with_window(crate::popup::CREATE_PASSWORD_TITLE, 1)
            .with_window(crate::popup::ENTER_PASSWORD_TITLE, 1)
    }

    pub fn with_window(mut self, title: &str, appears_at: usize) -> Self {
        self.windows.insert(title.to_string(), appears_at);
        self
    }

    /// Write the `-sv` key file and the trailing certificate file on launch,
    /// like makecert would.
    pub fn creating_outputs(mut self) -> Self {
        self.create_outputs = true;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn events(&self) -> Vec<DesktopEvent> {
        self.events.borrow().clone()
    }

    pub fn activation_count(&self, title: &str) -> usize {
        self.activations.borrow().get(title).copied().unwrap_or(0)
    }

    pub fn keystrokes(&self) -> Vec<Keystroke> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                DesktopEvent::Keys(k) => Some(k.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                DesktopEvent::Pause(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                DesktopEvent::Launch(p, a) => Some((p.clone(), a.clone())),
                _ => None,
            })
            .collect()
    }
}

impl Desktop for FakeDesktop {
    fn launch(&self, program: &Path, args: &[String]) -> Result<()> {
        self.events
            .borrow_mut()
            .push(DesktopEvent::Launch(program.to_path_buf(), args.to_vec()));

        if self.fail_launch {
            return Err(WincertError::Configuration(format!(
                "unable to launch {}",
                program.display()
            )));
        }

        if self.create_outputs {
            if let Some(pos) = args.iter().position(|a| a == "-sv") {
                std::fs::write(&args[pos + 1], b"pvk")?;
            }
            if let Some(cert) = args.last() {
                std::fs::write(cert, b"cer")?;
            }
        }

        Ok(())
    }

    fn activate(&self, title: &str) -> bool {
        let attempt = {
            let mut activations = self.activations.borrow_mut();
            let count = activations.entry(title.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let active = self
            .windows
            .get(title)
            .map(|appears_at| attempt >= *appears_at)
            .unwrap_or(false);

        self.events
            .borrow_mut()
            .push(DesktopEvent::Activate(title.to_string(), active));

        active
    }

    fn send_keys(&self, keys: &Keystroke) -> Result<()> {
        self.events.borrow_mut().push(DesktopEvent::Keys(keys.clone()));

        Ok(())
    }

    fn pause(&self, duration: Duration) {
        self.events.borrow_mut().push(DesktopEvent::Pause(duration));
    }
}

/// An invocation recorded by [FakeRunner].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// File name of the program, e.g. `signtool.exe`.
    pub program: String,
    pub args: Vec<String>,
}

type Responder = Box<dyn Fn(&Invocation) -> ToolOutput>;

/// A [ToolRunner] answering with scripted outputs.
pub struct FakeRunner {
    calls: RefCell<Vec<Invocation>>,
    responder: Responder,
}

impl FakeRunner {
    pub fn new(responder: impl Fn(&Invocation) -> ToolOutput + 'static) -> Self {
        Self {
            calls: RefCell::new(vec![]),
            responder: Box::new(responder),
        }
    }

    /// Every invocation exits 0 with no output.
    pub fn succeeding() -> Self {
        Self::new(|_| exit(0))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }
}

impl ToolRunner for FakeRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let invocation = Invocation {
            program: program
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            args: args.to_vec(),
        };

        let output = (self.responder)(&invocation);
        self.calls.borrow_mut().push(invocation);

        Ok(output)
    }
}

pub fn exit(code: i32) -> ToolOutput {
    ToolOutput {
        code: Some(code),
        ..Default::default()
    }
}

pub fn exit_with_stdout(code: i32, stdout: &str) -> ToolOutput {
    ToolOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Create an SDK layout whose `Bin` directory has empty tool files.
pub fn fake_sdk(root: &Path) -> std::io::Result<PathBuf> {
    let bin = root.join("Bin");
    std::fs::create_dir_all(&bin)?;

    for tool in ["makecert.exe", "cert2spc.exe", "pvk2pfx.exe", "signtool.exe"] {
        std::fs::write(bin.join(tool), b"")?;
    }

    Ok(root.to_path_buf())
}
