//! Session management

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How often the save thread checks for a stop request while idle.
const SAVE_POLL: Duration = Duration::from_millis(50);

type SaveRequest = (PathBuf, Box<dyn Serialize + Send>);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,

    save_sender: Sender<SaveRequest>,

    save_stop: Arc<AtomicBool>,

    save_jh: Arc<Mutex<Option<JoinHandle<()>>>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (EEZYBOT_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised the\
         session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,

    #[error("Cannot start the save thread: {0}")]
    CannotStartSaveThread(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}` inside
    /// `$EEZYBOT_SW_ROOT/{sessions_dir}`.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let root = crate::host::get_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        Self::new_in(exec_name, root.join(sessions_dir))
    }

    /// Start a new session inside an explicit directory.
    pub fn new_in<P: AsRef<Path>>(exec_name: &str, sessions_dir: P) -> Result<Self, SessionError> {
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let timestamp = match SESSION_EPOCH.get() {
            Some(e) => e.format(TIMESTAMP_FORMAT),
            None => return Err(SessionError::CannotGetEpoch),
        };

        let path = sessions_dir
            .as_ref()
            .join(format!("{}_{}", exec_name, timestamp));
        fs::create_dir_all(&path).map_err(SessionError::CannotCreateDir)?;

        let log_file_path = path.join(format!("{}.log", exec_name));

        // Spawn background save thread
        let (tx, rx) = channel();
        let save_stop = Arc::new(AtomicBool::new(false));
        let session_root = path.clone();
        let stop = save_stop.clone();
        let jh = thread::Builder::new()
            .name("session::save".into())
            .spawn(move || save_thread(stop, session_root, rx))
            .map_err(SessionError::CannotStartSaveThread)?;

        Ok(Session {
            session_root: path,
            log_file_path,
            save_sender: tx,
            save_stop,
            save_jh: Arc::new(Mutex::new(Some(jh))),
        })
    }

    /// Exit the session, waiting for the save thread to finish any pending actions
    pub fn exit(self) {
        self.save_stop.store(true, Ordering::SeqCst);

        info!("Stopping save thread");

        let jh = match self.save_jh.lock() {
            Ok(mut jh) => jh.take(),
            Err(_) => {
                warn!("Save thread handle poisoned, not waiting for it");
                None
            }
        };

        if let Some(jh) = jh {
            if jh.join().is_err() {
                warn!("Save thread panicked");
            }
        }

        info!("Save thread exited");
    }

    /// Saves the given data to the given session-relative path in a background thread.
    pub fn save<P: AsRef<Path>, T: Serialize + Send + 'static>(&self, path: P, data: T) {
        if let Err(e) = self
            .save_sender
            .send((path.as_ref().to_path_buf(), Box::new(data)))
        {
            warn!(
                "Could not send data to be saved to path {:?}: {}",
                path.as_ref(),
                e
            )
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Returns `NaN` if the session hasn't been started yet.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(std::f64::NAN),
        None => std::f64::NAN,
    }
}

/// Return a reference to the session's epoch, if a session has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn save_thread(stop: Arc<AtomicBool>, session_root: PathBuf, receiver: Receiver<SaveRequest>) {
    loop {
        match receiver.recv_timeout(SAVE_POLL) {
            Ok((path, data)) => write_file(&session_root.join(path), &*data),
            // Only stop once everything already sent has been written
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn write_file(full_path: &Path, data: &(dyn Serialize + Send)) {
    match full_path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            if let Some(parent) = full_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Couldn't create parent directory for {:?}: {}", full_path, e);
                    return;
                }
            }

            let file = match OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(full_path)
            {
                Ok(f) => f,
                Err(e) => {
                    warn!("Couldn't create file {:?}: {}", full_path, e);
                    return;
                }
            };

            if let Err(e) = serde_json::to_writer_pretty(&file, data) {
                warn!("Couldn't serialize data for file {:?}: {}", full_path, e);
            }
        }
        ext => warn!(
            "Unrecognised file path extension for {:?} (got {:?})",
            full_path, ext
        ),
    }
}
