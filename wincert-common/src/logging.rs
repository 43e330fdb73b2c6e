// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::Drain;

/// A slog Drain that uses println!.
pub struct PrintlnDrain {
    /// Minimum logging level that we're emitting.
    pub min_level: slog::Level,
}

/// slog Drain that uses println!.
impl slog::Drain for PrintlnDrain {
    type Ok = ();
    type Err = std::io::Error;

    fn log(
        &self,
        record: &slog::Record,
        _values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.min_level) {
            println!("{}", record.msg());
        }

        Ok(())
    }
}

/// Construct a root logger emitting records at or above `min_level`.
pub fn logger_with_level(min_level: slog::Level) -> slog::Logger {
    slog::Logger::root(PrintlnDrain { min_level }.fuse(), slog::o!())
}

/// Resolve a logging level from the number of times `--verbose` was given.
pub fn level_from_verbosity(count: u8) -> slog::Level {
    match count {
        0 => slog::Level::Info,
        1 => slog::Level::Debug,
        _ => slog::Level::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_from_verbosity(0), slog::Level::Info);
        assert_eq!(level_from_verbosity(1), slog::Level::Debug);
        assert_eq!(level_from_verbosity(5), slog::Level::Trace);
    }

    #[test]
    fn drain_filters_below_minimum() {
        let logger = logger_with_level(slog::Level::Critical);
        slog::debug!(logger, "suppressed");
        slog::crit!(logger, "emitted");
    }
}
