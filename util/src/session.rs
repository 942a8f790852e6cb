//! Session management
//!
//! A session is one execution of a binary. It owns a directory under the sessions directory,
//! named after the executable and the time it started, which holds the log file. The session
//! start time is the epoch used for elapsed times in the logs.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::host::{self, SW_ROOT_ENV_VAR};
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Format of the start time in session directory names.
const DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Paths belonging to the current session.
#[derive(Clone, Debug)]
pub struct Session {
    /// Directory holding everything produced by this session
    pub session_root: PathBuf,

    /// Log file written by [`crate::logger::logger_init`]
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({0}) is not set")]
    SwRootNotSet(&'static str),

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error("A session has already been started in this process ({0})")]
    CannotInitEpoch(conquer_once::TryInitError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a session in `sessions_dir`, relative to the software root.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = host::get_sw_root().map_err(|_| SessionError::SwRootNotSet(SW_ROOT_ENV_VAR))?;

        Self::new_in(root.join(sessions_dir), exec_name)
    }

    /// Start a session in an explicit sessions directory.
    ///
    /// Sets the session epoch, so only one session can be started per process.
    pub fn new_in<P: AsRef<Path>>(sessions_dir: P, exec_name: &str) -> Result<Self, SessionError> {
        let epoch = Utc::now();
        SESSION_EPOCH
            .try_init_once(|| epoch)
            .map_err(SessionError::CannotInitEpoch)?;

        let session_root = sessions_dir.as_ref().join(format!(
            "{}_{}",
            exec_name,
            epoch.format(DIR_TIMESTAMP_FORMAT)
        ));
        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            session_root,
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the session started.
///
/// # Panics
/// - If no session has been started.
pub fn get_elapsed_seconds() -> f64 {
    time::duration_to_seconds(Utc::now() - *get_epoch()).unwrap_or(std::f64::NAN)
}

/// The time the session started.
///
/// # Panics
/// - If no session has been started.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(e) => e,
        None => panic!("No session has been started"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_session_creation() {
        let dir = std::env::temp_dir().join("util_session_test");
        let session = Session::new_in(&dir, "test_exec").unwrap();

        assert!(session.session_root.starts_with(&dir));
        assert!(session.session_root.is_dir());
        assert_eq!(
            session.log_file_path.file_name().and_then(|f| f.to_str()),
            Some("test_exec.log")
        );
        assert!(get_elapsed_seconds() >= 0.0);

        // The epoch can only be set once per process
        assert!(matches!(
            Session::new_in(&dir, "test_exec"),
            Err(SessionError::CannotInitEpoch(_))
        ));

        fs::remove_dir_all(&session.session_root).ok();
    }
}
