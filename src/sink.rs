//! Per-session CSV log sink.
//!
//! When session logging is enabled, each created session gets its own CSV
//! file named after the session id. Writes happen on a dedicated thread fed
//! by an unbounded channel: event processing enqueues and returns, with no
//! back-pressure and no ordering guarantee between appends. The log is
//! diagnostic, not authoritative; write failures are reported and never
//! retried.

use crate::session::SessionSnapshot;
use chrono::{Local, TimeZone};
use crossbeam_channel::{unbounded, Sender};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

/// Fixed CSV header, CRLF-terminated.
pub const LOG_HEADER: &str = "time,timestamp,instanceId,\
receiverId[0],rssi[0],numberOfDecodings[0],\
receiverId[1],rssi[1],numberOfDecodings[1],\
receiverId[2],rssi[2],numberOfDecodings[2]\r\n";

/// Receivers logged per row; fewer are blank-padded.
const LOGGED_RECEIVERS: usize = 3;

enum Command {
    /// Start the session's file with the fixed header
    Create { session_id: String },
    /// Append one emission row
    Append(Box<SessionSnapshot>),
}

/// Fire-and-forget CSV writer for session emissions.
pub struct SessionLogSink {
    sender: Option<Sender<Command>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SessionLogSink {
    /// Create a sink writing into `log_dir`, spawning the writer thread.
    pub fn new(log_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&log_dir)?;

        let (sender, receiver) = unbounded::<Command>();
        let worker = thread::Builder::new()
            .name("session-log".to_string())
            .spawn(move || {
                for command in receiver {
                    if let Err(e) = run_command(&log_dir, &command) {
                        let session_id = match &command {
                            Command::Create { session_id } => session_id.as_str(),
                            Command::Append(snapshot) => snapshot.session_id.as_str(),
                        };
                        eprintln!("Warning: session log write failed for {session_id}: {e}");
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Enqueue log output for an emission. A new session gets its header
    /// before the first row.
    pub fn record(&self, snapshot: &SessionSnapshot, new_session: bool) {
        let Some(sender) = &self.sender else {
            return;
        };
        if new_session {
            let _ = sender.send(Command::Create {
                session_id: snapshot.session_id.clone(),
            });
        }
        let _ = sender.send(Command::Append(Box::new(snapshot.clone())));
    }
}

impl Drop for SessionLogSink {
    fn drop(&mut self) {
        // Close the channel, then let the worker drain what was enqueued.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_command(log_dir: &Path, command: &Command) -> std::io::Result<()> {
    match command {
        Command::Create { session_id } => {
            let mut file = std::fs::File::create(session_file(log_dir, session_id))?;
            file.write_all(LOG_HEADER.as_bytes())
        }
        Command::Append(snapshot) => {
            let mut file = OpenOptions::new()
                .append(true)
                .open(session_file(log_dir, &snapshot.session_id))?;
            file.write_all(format_row(snapshot).as_bytes())
        }
    }
}

fn session_file(log_dir: &Path, session_id: &str) -> PathBuf {
    log_dir.join(format!("{session_id}.csv"))
}

/// Render one emission row: local date and time, raw epoch timestamp,
/// instance id, then up to three receivers' (id, rssi, decodings) triples,
/// blank-padded. CRLF-terminated.
pub fn format_row(snapshot: &SessionSnapshot) -> String {
    let local = Local
        .timestamp_millis_opt(snapshot.timestamp as i64)
        .earliest()
        .unwrap_or_else(Local::now);

    let mut fields = vec![
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M:%S").to_string(),
        snapshot.timestamp.to_string(),
        snapshot.instance_id.clone(),
    ];

    for index in 0..LOGGED_RECEIVERS {
        match snapshot.nearest.get(index) {
            Some(sighting) => {
                fields.push(sighting.receiver_id.clone());
                fields.push(sighting.rssi.to_string());
                fields.push(sighting.number_of_decodings.to_string());
            }
            None => fields.extend([String::new(), String::new(), String::new()]),
        }
    }

    let mut row = fields.join(",");
    row.push_str("\r\n");
    row
}
