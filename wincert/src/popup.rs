// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Answering the password popups opened by `makecert.exe`.

`makecert.exe` has no non-interactive mode when it creates a password
protected private key. It opens modal dialogs that must be answered from the
keyboard. [PopupResponder] launches the tool, polls for the first dialog by
window title and then types a fixed schedule of keystrokes, pausing after each
one so the dialog can process it.

There is no confirmation that a keystroke reached the intended widget. The
timing in [PopupSettings] errs on the side of waiting too long.

By default only the first dialog is polled for. Subsequent dialogs are assumed
to take focus when the previous one is dismissed. Setting
[PopupSettings::verify_each_dialog] polls for every dialog instead. */

use {
    crate::{
        desktop::{Desktop, Keystroke},
        error::{Result, WincertError},
        settings::PopupSettings,
    },
    slog::{debug, info},
    std::path::Path,
};

/// Title of the dialog asking for a new private key password.
pub const CREATE_PASSWORD_TITLE: &str = "Create Private Key Password";

/// Title of the dialogs asking for an existing private key password.
pub const ENTER_PASSWORD_TITLE: &str = "Enter Private Key Password";

/// A modal password dialog.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PasswordDialog {
    /// Window title.
    pub title: &'static str,
    /// What the password unlocks. Only used for logging.
    pub label: &'static str,
    /// Whether the dialog has a second field to confirm the password.
    pub confirm: bool,
}

impl PasswordDialog {
    /// Keystrokes that fill in and submit this dialog.
    pub fn keystrokes(&self, password: &str) -> Vec<Keystroke> {
        let mut keys = vec![Keystroke::Text(password.to_string()), Keystroke::Tab];

        if self.confirm {
            keys.push(Keystroke::Text(password.to_string()));
            keys.push(Keystroke::Tab);
        }

        keys.push(Keystroke::Enter);

        keys
    }
}

const CREATE_SUBJECT_KEY: PasswordDialog = PasswordDialog {
    title: CREATE_PASSWORD_TITLE,
    label: "subject key",
    confirm: true,
};

const SIGNER_KEY: PasswordDialog = PasswordDialog {
    title: ENTER_PASSWORD_TITLE,
    label: "signer key",
    confirm: false,
};

const ISSUER_KEY: PasswordDialog = PasswordDialog {
    title: ENTER_PASSWORD_TITLE,
    label: "issuer key",
    confirm: false,
};

/// The sequence of dialogs a `makecert.exe` invocation opens.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PopupFlow {
    /// Self-signed authority: create the key, then sign with it.
    Authority,
    /// End-entity certificate: create the key, sign, then unlock the issuer key.
    EndEntity,
}

impl PopupFlow {
    pub fn dialogs(&self) -> &'static [PasswordDialog] {
        match self {
            Self::Authority => &[CREATE_SUBJECT_KEY, SIGNER_KEY],
            Self::EndEntity => &[CREATE_SUBJECT_KEY, SIGNER_KEY, ISSUER_KEY],
        }
    }

    /// Whether to wait for the activation settle after the first dialog is found.
    ///
    /// The end-entity dialog is typed into as soon as it is activated.
    pub fn settles_after_activation(&self) -> bool {
        matches!(self, Self::Authority)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::EndEntity => "end-entity",
        }
    }
}

/// Position in a popup session. Indices are 0-based.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Launched,
    AwaitingDialog(usize),
    DialogActive(usize),
    Done,
}

/// Drives a launched process through its password dialogs.
pub struct PopupResponder<'a, D: Desktop> {
    desktop: &'a D,
    settings: &'a PopupSettings,
}

impl<'a, D: Desktop> PopupResponder<'a, D> {
    pub fn new(desktop: &'a D, settings: &'a PopupSettings) -> Self {
        Self { desktop, settings }
    }

    /// Launch `program` and answer every dialog of `flow` with `password`.
    ///
    /// Returns once the last keystroke schedule has been sent. The launched
    /// process is not waited on, so callers must check for its outputs.
    ///
    /// A [WincertError::Timeout] is terminal. The process has to be started
    /// again from scratch to retry.
    pub fn run(
        &self,
        logger: &slog::Logger,
        program: &Path,
        args: &[String],
        flow: PopupFlow,
        password: &str,
    ) -> Result<()> {
        let dialogs = flow.dialogs();
        let mut state = SessionState::Launched;

        loop {
            state = match state {
                SessionState::Launched => {
                    debug!(
                        logger,
                        "launching {} for {} popups",
                        program.display(),
                        flow.name()
                    );
                    self.desktop.launch(program, args)?;

                    SessionState::AwaitingDialog(0)
                }
                SessionState::AwaitingDialog(index) => {
                    if index == 0 || self.settings.verify_each_dialog {
                        self.await_dialog(logger, index, &dialogs[index])?;

                        if flow.settles_after_activation() {
                            self.desktop.pause(self.settings.activation_settle());
                        }
                    }

                    SessionState::DialogActive(index)
                }
                SessionState::DialogActive(index) => {
                    self.answer_dialog(logger, index, &dialogs[index], password)?;

                    if index + 1 < dialogs.len() {
                        SessionState::AwaitingDialog(index + 1)
                    } else {
                        SessionState::Done
                    }
                }
                SessionState::Done => {
                    info!(logger, "answered {} makecert popups", dialogs.len());
                    return Ok(());
                }
            };
        }
    }

    /// Poll until the dialog's window can be activated.
    ///
    /// Returns the 1-based attempt that succeeded.
    fn await_dialog(
        &self,
        logger: &slog::Logger,
        index: usize,
        dialog: &PasswordDialog,
    ) -> Result<usize> {
        let attempts = self.settings.poll_attempts;

        for attempt in 1..=attempts {
            if self.desktop.activate(dialog.title) {
                debug!(
                    logger,
                    "popup({}) \"{}\" active after {} attempts",
                    index + 1,
                    dialog.title,
                    attempt
                );
                return Ok(attempt);
            }

            if attempt < attempts {
                self.desktop.pause(self.settings.poll_interval());
            }
        }

        Err(WincertError::Timeout {
            dialog: index + 1,
            title: dialog.title.to_string(),
        })
    }

    fn answer_dialog(
        &self,
        logger: &slog::Logger,
        index: usize,
        dialog: &PasswordDialog,
        password: &str,
    ) -> Result<()> {
        debug!(
            logger,
            "popup({}) answering {} password",
            index + 1,
            dialog.label
        );

        let keys = dialog.keystrokes(password);
        let last = keys.len() - 1;

        for (i, key) in keys.iter().enumerate() {
            self.desktop.send_keys(key)?;

            self.desktop.pause(if i == last {
                self.settings.dialog_settle()
            } else {
                self.settings.keystroke_settle()
            });
        }

        Ok(())
    }
}
