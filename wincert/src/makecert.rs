// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Command lines for `makecert.exe`. */

use {
    crate::error::{Result, WincertError},
    chrono::{DateTime, NaiveDate, TimeDelta, TimeZone},
    std::path::Path,
};

/// Date format understood by `makecert -b` and `makecert -e`.
const MAKECERT_DATE_FORMAT: &str = "%m/%d/%Y";

/// The dates a certificate is valid between.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidityWindow {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl ValidityWindow {
    /// Window starting the day before `now` and ending `valid_hours` after it.
    ///
    /// Back-dating the start absorbs clock skew between machines.
    /// `valid_hours` must be positive.
    pub fn from_now<Tz: TimeZone>(now: DateTime<Tz>, valid_hours: i64) -> Result<Self> {
        let out_of_range = || {
            WincertError::Configuration(format!(
                "certificate validity of {} hours is out of range",
                valid_hours
            ))
        };

        if valid_hours <= 0 {
            return Err(WincertError::Configuration(format!(
                "certificate validity must be a positive number of hours; got {}",
                valid_hours
            )));
        }

        let now = now.naive_local();
        let begin = now.date().pred_opt().ok_or_else(out_of_range)?;
        let end = TimeDelta::try_hours(valid_hours)
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or_else(out_of_range)?
            .date();

        Ok(Self { begin, end })
    }

    pub fn begin_arg(&self) -> String {
        self.begin.format(MAKECERT_DATE_FORMAT).to_string()
    }

    pub fn end_arg(&self) -> String {
        self.end.format(MAKECERT_DATE_FORMAT).to_string()
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Arguments creating a self-signed authority in the local machine CA store.
pub fn authority_args(
    hash_algorithm: &str,
    validity: &ValidityWindow,
    subject: &str,
    key_path: &Path,
    cert_path: &Path,
) -> Vec<String> {
    vec![
        // self-signed
        "-r".to_string(),
        "-a".to_string(),
        hash_algorithm.to_string(),
        // exportable private key
        "-pe".to_string(),
        "-b".to_string(),
        validity.begin_arg(),
        "-e".to_string(),
        validity.end_arg(),
        "-n".to_string(),
        format!("CN={}", subject),
        "-ss".to_string(),
        "CA".to_string(),
        "-sr".to_string(),
        "LocalMachine".to_string(),
        "-cy".to_string(),
        "authority".to_string(),
        "-sky".to_string(),
        "signature".to_string(),
        "-sv".to_string(),
        path_arg(key_path),
        path_arg(cert_path),
    ]
}

/// Arguments creating an end-entity signing certificate issued by an authority.
pub fn end_entity_args(
    subject: &str,
    issuer_cert_path: &Path,
    issuer_key_path: &Path,
    key_path: &Path,
    cert_path: &Path,
) -> Vec<String> {
    vec![
        "-pe".to_string(),
        "-n".to_string(),
        format!("CN={}", subject),
        "-cy".to_string(),
        "end".to_string(),
        "-sky".to_string(),
        "signature".to_string(),
        "-ic".to_string(),
        path_arg(issuer_cert_path),
        "-iv".to_string(),
        path_arg(issuer_key_path),
        "-sv".to_string(),
        path_arg(key_path),
        path_arg(cert_path),
    ]
}
