// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Window focus and synthetic keyboard input.

The [Desktop] trait is the automation substrate used to answer the modal
dialogs opened by interactive tools. [SystemDesktop] is the implementation
backed by the interactive Windows session. */

use {
    crate::error::{Result, WincertError},
    std::{fmt, path::Path, time::Duration},
};

/// A unit of synthetic keyboard input.
#[derive(Clone, Eq, PartialEq)]
pub enum Keystroke {
    /// Literal text, typed character by character.
    Text(String),
    Tab,
    Enter,
}

// Text is usually a password.
impl fmt::Debug for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text(<{} chars>)", s.chars().count()),
            Self::Tab => f.write_str("Tab"),
            Self::Enter => f.write_str("Enter"),
        }
    }
}

/// Capabilities needed to drive a GUI popup from the outside.
pub trait Desktop {
    /// Start a process without waiting for it.
    fn launch(&self, program: &Path, args: &[String]) -> Result<()>;

    /// Activate the window having the exact title given.
    ///
    /// Returns whether such a window exists and now has focus.
    fn activate(&self, title: &str) -> bool;

    /// Send a keystroke to whatever window has focus.
    fn send_keys(&self, keys: &Keystroke) -> Result<()>;

    /// Block the calling thread.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The interactive Windows desktop.
#[derive(Default)]
pub struct SystemDesktop {
    #[cfg(windows)]
    launched: std::sync::Mutex<Vec<duct::Handle>>,
}

impl SystemDesktop {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Forget handles of processes that have exited.
#[cfg_attr(not(windows), allow(dead_code))]
fn retain_running(handles: &mut Vec<duct::Handle>) {
    handles.retain(|handle| matches!(handle.try_wait(), Ok(None)));
}

#[cfg(windows)]
mod windows {
    use {
        super::*,
        std::{ffi::OsStr, os::windows::ffi::OsStrExt},
        winapi::{
            shared::minwindef::WORD,
            um::winuser::{
                FindWindowW, SendInput, SetForegroundWindow, INPUT, INPUT_KEYBOARD,
                KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, VK_RETURN, VK_TAB,
            },
        },
    };

    fn to_wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(Some(0)).collect()
    }

    fn key_input(vk: WORD, scan: WORD, flags: u32) -> INPUT {
        // SAFETY: INPUT is plain data; all-zero is a valid value.
        let mut input: INPUT = unsafe { std::mem::zeroed() };
        input.type_ = INPUT_KEYBOARD;
        // SAFETY: type_ is INPUT_KEYBOARD so `ki` is the active union member.
        let ki = unsafe { input.u.ki_mut() };
        ki.wVk = vk;
        ki.wScan = scan;
        ki.dwFlags = flags;

        input
    }

    fn keystroke_inputs(keys: &Keystroke) -> Vec<INPUT> {
        match keys {
            Keystroke::Text(text) => text
                .encode_utf16()
                .flat_map(|unit| {
                    [
                        key_input(0, unit, KEYEVENTF_UNICODE),
                        key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
                    ]
                })
                .collect(),
            Keystroke::Tab => vec![
                key_input(VK_TAB as WORD, 0, 0),
                key_input(VK_TAB as WORD, 0, KEYEVENTF_KEYUP),
            ],
            Keystroke::Enter => vec![
                key_input(VK_RETURN as WORD, 0, 0),
                key_input(VK_RETURN as WORD, 0, KEYEVENTF_KEYUP),
            ],
        }
    }

    impl Desktop for SystemDesktop {
        fn launch(&self, program: &Path, args: &[String]) -> Result<()> {
            let handle = duct::cmd(program.as_os_str(), args.to_vec())
                .start()
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        WincertError::Configuration(format!(
                            "unable to launch {}",
                            program.display()
                        ))
                    } else {
                        WincertError::Io(e)
                    }
                })?;

            // Handles of running children are retained so they are not reaped early.
            let mut launched = self
                .launched
                .lock()
                .map_err(|_| WincertError::Configuration("desktop state poisoned".into()))?;
            retain_running(&mut launched);
            launched.push(handle);

            Ok(())
        }

        fn activate(&self, title: &str) -> bool {
            let title = to_wide(title);

            // SAFETY: `title` is a NUL terminated UTF-16 buffer outliving the call.
            let hwnd = unsafe { FindWindowW(std::ptr::null(), title.as_ptr()) };
            if hwnd.is_null() {
                return false;
            }

            // SAFETY: `hwnd` was just returned by FindWindowW.
            unsafe { SetForegroundWindow(hwnd) != 0 }
        }

        fn send_keys(&self, keys: &Keystroke) -> Result<()> {
            let mut inputs = keystroke_inputs(keys);

            // SAFETY: `inputs` is a valid, initialized slice of INPUT structures.
            let sent = unsafe {
                SendInput(
                    inputs.len() as u32,
                    inputs.as_mut_ptr(),
                    std::mem::size_of::<INPUT>() as i32,
                )
            };

            if sent as usize == inputs.len() {
                Ok(())
            } else {
                Err(WincertError::Io(std::io::Error::last_os_error()))
            }
        }
    }
}

#[cfg(not(windows))]
impl Desktop for SystemDesktop {
    fn launch(&self, program: &Path, _args: &[String]) -> Result<()> {
        Err(WincertError::Configuration(format!(
            "launching {} requires an interactive Windows desktop",
            program.display()
        )))
    }

    fn activate(&self, _title: &str) -> bool {
        false
    }

    fn send_keys(&self, _keys: &Keystroke) -> Result<()> {
        Err(WincertError::Configuration(
            "sending keystrokes requires an interactive Windows desktop".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_text() {
        let keys = Keystroke::Text("hunter2".into());

        assert_eq!(format!("{:?}", keys), "Text(<7 chars>)");
        assert_eq!(format!("{:?}", Keystroke::Enter), "Enter");
    }

    #[cfg(unix)]
    #[test]
    fn finished_processes_are_forgotten() -> anyhow::Result<()> {
        let finished = duct::cmd!("true").start()?;
        finished.wait()?;
        let running = duct::cmd!("sleep", "30").start()?;

        let mut handles = vec![finished, running];
        retain_running(&mut handles);

        assert_eq!(handles.len(), 1);
        assert!(handles[0].try_wait()?.is_none());
        handles[0].kill()?;

        Ok(())
    }

    #[test]
    fn system_desktop_unsupported_off_windows() {
        if cfg!(windows) {
            eprintln!("skipping test because it would launch a process");
            return;
        }

        let desktop = SystemDesktop::new();
        assert!(matches!(
            desktop.launch(Path::new("makecert.exe"), &[]),
            Err(WincertError::Configuration(_))
        ));
        assert!(!desktop.activate("Create Private Key Password"));
    }
}
