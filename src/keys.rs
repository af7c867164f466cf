// Copyright (c) 2025 Robert August Vincent II <pillarsdotnet@gmail.com>
// Co-author: Cursor-AI.

//! Single-keystroke input from the controlling terminal.

use std::io::{self, Read};
use std::sync::Mutex;

/// Byte delivered for Ctrl-C while the terminal is in raw mode (ISIG is off, so no SIGINT).
pub const INTERRUPT_KEY: char = '\u{3}';

pub trait KeystrokeSource: Send + Sync {
    /// Blocks until one key arrives; no line terminator needed.
    fn read_key(&self) -> io::Result<char>;
}

/// Defer a closure to run when the guard is dropped (restores terminal mode on every exit path).
struct Defer<F: FnOnce()>(Option<F>);

fn defer<F: FnOnce()>(f: F) -> Defer<F> {
    Defer(Some(f))
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Reads stdin one byte at a time, switching the tty to raw mode only for the duration of each read.
/// When stdin is not a terminal the byte is read as-is.
pub struct TerminalKeys {
    #[cfg(unix)]
    saved: Mutex<Option<libc::termios>>,
    #[cfg(not(unix))]
    saved: Mutex<Option<()>>,
}

impl TerminalKeys {
    pub fn new() -> Self {
        TerminalKeys {
            saved: Mutex::new(None),
        }
    }

    /// Puts the terminal back into the mode it had before the first raw read.
    /// Called on exit, when a listener may still be blocked mid-read.
    pub fn restore(&self) {
        #[cfg(unix)]
        {
            if let Ok(saved) = self.saved.lock() {
                if let Some(original) = saved.as_ref() {
                    unsafe {
                        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSADRAIN, original);
                    }
                }
            }
        }
    }

    #[cfg(unix)]
    fn enter_raw(&self) -> Option<libc::termios> {
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) != 1 {
                return None;
            }
            let mut original: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut original) != 0 {
                return None;
            }
            if let Ok(mut saved) = self.saved.lock() {
                saved.get_or_insert(original);
            }
            let mut raw = original;
            libc::cfmakeraw(&mut raw);
            // Keep output processing so concurrent println! output stays line-aligned.
            raw.c_oflag |= libc::OPOST;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
                return None;
            }
            Some(original)
        }
    }
}

impl Default for TerminalKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystrokeSource for TerminalKeys {
    fn read_key(&self) -> io::Result<char> {
        #[cfg(unix)]
        let _restore = {
            let original = self.enter_raw();
            defer(move || {
                if let Some(original) = original {
                    unsafe {
                        libc::tcsetattr(libc::STDIN_FILENO, libc::TCSADRAIN, &original);
                    }
                }
            })
        };
        #[cfg(not(unix))]
        let _restore = defer(|| {});

        let mut byte = [0u8; 1];
        loop {
            match io::stdin().lock().read(&mut byte) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed")),
                Ok(_) => return Ok(char::from(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keys fed through a channel; the sender side plays the user.
#[cfg(test)]
pub struct ScriptedKeys(Mutex<std::sync::mpsc::Receiver<char>>);

#[cfg(test)]
impl ScriptedKeys {
    pub fn new() -> (std::sync::mpsc::Sender<char>, Self) {
        let (tx, rx) = std::sync::mpsc::channel();
        (tx, ScriptedKeys(Mutex::new(rx)))
    }
}

#[cfg(test)]
impl KeystrokeSource for ScriptedKeys {
    fn read_key(&self) -> io::Result<char> {
        let rx = self.0.lock().unwrap();
        rx.recv()
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "script finished"))
    }
}
