// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! # tt — Time tracker CLI
//!
//! Tracks one work session at a time from an interactive terminal. A session is stopped
//! by pressing `d`, automatically after 7h40m, or by SIGINT/SIGTERM; each finished session
//! is appended to `$HOME/scripts/time_entries.json` and mirrored to a CSV log. Every Friday
//! at 16:00 the current week's sessions are exported to their own CSV file.
//!
//! ## Files (under `$TT_HOME`, default `$HOME/scripts`)
//!
//! | Path | Contents |
//! |------|----------|
//! | `time_entries.json` | JSON array of `{date, start_time, end_time, duration}` |
//! | `export/time_tracker_log.csv` | Every session, `Dato,Starttid,Sluttid,Varighed` |
//! | `export/time_tracker_weekly_YYYY-MM-DD.csv` | One week (named by its Sunday) |
//! | `logs/time_tracker.log` | Event log |
//!
//! ## Subcommands
//!
//! | Command  | Description |
//! |----------|-------------|
//! | (none), `run` | Ask to start today's session, then track it until stopped. |
//! | `export` | Write this week's CSV export now. |
//! | `list`   | Show this week's sessions and total. |
//! | `help`   | Show usage. |

mod clock;
mod config;
mod display;
mod error;
mod keys;
mod listener;
mod logging;
mod record;
mod scheduler;
mod session;
mod signals;
mod store;

use chrono::Local;
use clock::{Clock, SystemClock};
use config::{Config, DISPLAY_INTERVAL};
use error::Result;
use keys::{KeystrokeSource, TerminalKeys, INTERRUPT_KEY};
use record::{DATE_FORMAT, TIME_FORMAT};
use session::{Completion, ExitReason, SessionPolicy, SessionTracker};
use std::env;
use std::io::{self, Write};
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use store::{FileStore, SessionStore};
use tracing::{info, warn};
#[cfg(unix)]
use libc::{signal, SIGPIPE, SIG_IGN};

fn open_store(config: &Config) -> FileStore {
    FileStore::new(
        config.entries_path.clone(),
        config.master_csv_path.clone(),
        config.export_dir.clone(),
    )
}

/// Asks whether to start; `y` starts the session, `n` (or Ctrl-C) cancels, anything else re-asks.
fn prompt_to_start(tracker: &Arc<SessionTracker>, keys: &dyn KeystrokeSource) {
    let completion = tracker.completion();
    print!("Start tracking internal work for today? (y/N): ");
    let _ = io::stdout().flush();
    loop {
        let key = match keys.read_key() {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "Cannot read from terminal");
                eprintln!("\nCannot read from terminal: {}", e);
                completion.set(ExitReason::Interrupted);
                return;
            }
        };
        if completion.is_set() {
            return;
        }
        if key.eq_ignore_ascii_case(&'y') {
            println!();
            tracker.start();
            return;
        }
        if key.eq_ignore_ascii_case(&'n') || key == INTERRUPT_KEY {
            println!("\nTracking cancelled.");
            info!("Tracking cancelled by user");
            completion.set(ExitReason::Declined);
            return;
        }
        print!("\nInvalid input. Press 'y' to start or 'n' to cancel: ");
        let _ = io::stdout().flush();
    }
}

/// Interactive session: prompt, track, exit once the session is over or termination is requested.
fn cmd_run(config: &Config) -> Result<()> {
    config.ensure_dirs()?;
    let _log_guard = logging::init(config);
    info!("Time tracker started");

    let store: Arc<dyn SessionStore> = Arc::new(open_store(config));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let keys = Arc::new(TerminalKeys::new());
    let completion = Arc::new(Completion::new());
    let stdout: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(io::stdout()));
    let policy = SessionPolicy {
        max_duration: config.max_duration,
        stop_key: config.stop_key,
        display_interval: DISPLAY_INTERVAL,
    };
    let tracker = Arc::new(
        SessionTracker::new(Arc::clone(&store), Arc::clone(&clock), policy, Arc::clone(&completion))
            .with_keystrokes(keys.clone())
            .with_display(stdout),
    );

    signals::install(Arc::clone(&tracker))?;
    let weekly_export = scheduler::spawn(store, clock, config.weekly);

    {
        let tracker = Arc::clone(&tracker);
        let keys = Arc::clone(&keys);
        thread::spawn(move || prompt_to_start(&tracker, keys.as_ref()));
    }

    let reason = completion.wait();
    keys.restore();
    // Lets an export that is already writing finish before the process goes away.
    weekly_export.stop();
    match reason {
        ExitReason::Stopped(trigger) => {
            println!("Exiting...");
            info!(%trigger, "Time tracker exiting after session stop");
        }
        ExitReason::Interrupted => {
            println!("Exiting...");
            info!("Time tracker exiting on termination request");
        }
        ExitReason::Declined => info!("Time tracker exiting: tracking declined"),
    }
    Ok(())
}

/// Writes the current week's export immediately.
fn cmd_export(config: &Config) -> Result<()> {
    config.ensure_dirs()?;
    let _log_guard = logging::init(config);
    let store = open_store(config);
    let result = scheduler::generate_weekly_export(&store, Local::now().date_naive());
    scheduler::report_export(&result);
    result.map(|_| ())
}

/// Prints this week's sessions and their total.
fn cmd_list(config: &Config) -> Result<()> {
    let store = open_store(config);
    let today = Local::now().date_naive();
    let weekly = scheduler::records_in_week(&store.load_all(), today);
    if weekly.is_empty() {
        println!("No time entries found for this week.");
        return Ok(());
    }
    for r in &weekly {
        println!(
            "{}  {}-{}  {}",
            r.date.format(DATE_FORMAT),
            r.start_time.format(TIME_FORMAT),
            r.end_time.format(TIME_FORMAT),
            r.duration
        );
    }
    let (monday, sunday) = scheduler::week_bounds(today);
    println!(
        "Total  {}  ({} to {})",
        scheduler::total_duration(&weekly),
        monday.format(DATE_FORMAT),
        sunday.format(DATE_FORMAT)
    );
    Ok(())
}

fn usage() -> &'static str {
    "Usage: tt [command]

Commands:
  run      Ask to start today's session and track it (default)
  export   Write this week's CSV export now
  list     Show this week's sessions and total
  help     Show this message

While tracking, press 'd' to stop. Sessions stop automatically after 7h40m.

Environment:
  TT_HOME   Data directory (default: $HOME/scripts)
  TT_DEBUG  If set, log debug messages
  RUST_LOG  Log filter when TT_DEBUG is unset (default: info)
"
}

fn main() {
    #[cfg(unix)]
    unsafe {
        signal(SIGPIPE, SIG_IGN);
    }
    let args: Vec<String> = env::args().skip(1).collect();
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("tt: {}", e);
            process::exit(1);
        }
    };

    let result = match args.first().map(String::as_str) {
        None | Some("run") => cmd_run(&config),
        Some("export") => cmd_export(&config),
        Some("list") => cmd_list(&config),
        Some("help") | Some("-h") | Some("--help") => {
            print!("{}", usage());
            Ok(())
        }
        Some(other) => {
            eprintln!("tt: unknown command: {}\n", other);
            eprint!("{}", usage());
            process::exit(1);
        }
    };
    if let Err(e) = result {
        eprintln!("tt: {}", e);
        process::exit(1);
    }
}
