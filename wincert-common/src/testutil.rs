// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {crate::logging::logger_with_level, once_cell::sync::Lazy};

pub static DEFAULT_TEMP_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| {
    tempfile::Builder::new()
        .prefix("wincert-test")
        .tempdir()
        .expect("unable to create temporary directory")
});

pub fn get_logger() -> anyhow::Result<slog::Logger> {
    Ok(logger_with_level(slog::Level::Warning))
}
