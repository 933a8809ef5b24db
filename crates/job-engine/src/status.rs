//! Outcome classification of a completed job.

use std::fmt;

/// Outcome of one job invocation.
///
/// `Error` means the handler ran and reported failure; `NotFound` means no
/// handler was ever invoked because the name did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Error,
    NotFound,
}

impl Status {
    /// Exit-style code: 0, 1 or 127.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::NotFound => 127,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Error => "ERR",
            Self::NotFound => "NOT_FOUND",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Error.code(), 1);
        assert_eq!(Status::NotFound.code(), 127);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Ok.to_string(), "OK");
        assert_eq!(Status::NotFound.to_string(), "NOT_FOUND");
        assert!(!Status::Error.is_ok());
    }
}
