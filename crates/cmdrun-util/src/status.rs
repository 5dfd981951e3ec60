//! Process exit status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit status of a finished process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,

    /// Signal number if the process was killed by a signal (Unix)
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            signal: None,
        }
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::with_code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return Self::signaled(sig);
            }
        }

        Self {
            code: None,
            signal: None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit status {}", code),
            (None, Some(sig)) => write!(f, "signal {}", sig),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status() {
        assert!(ExitStatus::success().is_success());
        assert!(!ExitStatus::with_code(1).is_success());
        assert!(!ExitStatus::signaled(9).is_success());
    }

    #[test]
    fn display_follows_platform_wording() {
        assert_eq!(ExitStatus::with_code(2).to_string(), "exit status 2");
        assert_eq!(ExitStatus::signaled(9).to_string(), "signal 9");
    }

    #[test]
    fn status_serialization() {
        let json = serde_json::to_string(&ExitStatus::signaled(15)).unwrap();
        let parsed: ExitStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.signal, Some(15));
        assert_eq!(parsed.code, None);
    }

    #[cfg(unix)]
    #[test]
    fn from_std_status() {
        use std::os::unix::process::ExitStatusExt;

        let exited = std::process::ExitStatus::from_raw(3 << 8);
        assert_eq!(ExitStatus::from(exited), ExitStatus::with_code(3));

        let killed = std::process::ExitStatus::from_raw(9);
        assert_eq!(ExitStatus::from(killed), ExitStatus::signaled(9));
    }
}
