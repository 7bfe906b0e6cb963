//! Process exit codes for the at-core CLI.
//!
//! Codes below 10 mean the command ran to completion. Codes from 10 up
//! to 19 point at the operator's inputs (config, store directory, reserve
//! file); 20 and above are engine faults.

use at_common::{Error, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Clean = 0,

    /// Replay finished but some entries were skipped and kept on disk
    PartialReplay = 1,

    /// Configuration could not be loaded or failed validation
    ConfigError = 11,

    /// Store or reserve file missing or unreadable
    StoreError = 12,

    InternalError = 20,

    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// True when the command completed, even with skipped replay entries.
    pub fn is_success(self) -> bool {
        self.as_i32() < 10
    }

    /// Stable name used in the JSON error envelope.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PartialReplay => "OK_PARTIAL_REPLAY",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StoreError => "ERR_STORE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Map an engine error onto the exit code reported for it.
    pub fn from_error(error: &Error) -> Self {
        match error.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Storage => ExitCode::StoreError,
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::Types | ErrorCategory::Pipeline => ExitCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_replay_still_succeeds() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::PartialReplay.is_success());
        assert!(!ExitCode::ConfigError.is_success());
        assert_eq!(ExitCode::IoError.as_i32(), 21);
        assert_eq!(ExitCode::StoreError.code_name(), "ERR_STORE");
    }

    #[test]
    fn test_error_categories_map_to_codes() {
        let cases = [
            (Error::Config("bad".into()), ExitCode::ConfigError),
            (Error::Storage("gone".into()), ExitCode::StoreError),
            (Error::ShuttingDown, ExitCode::InternalError),
        ];
        for (error, expected) in cases {
            assert_eq!(ExitCode::from_error(&error), expected, "{}", error);
        }
    }
}
