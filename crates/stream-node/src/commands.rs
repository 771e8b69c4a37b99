//! Operator commands read line by line from stdin.

use std::io::{self, BufRead};
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const LINE_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Switch a camera between LQ and HQ. 0-based index.
    Toggle(usize),
    Detach(usize),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs a camera number")]
    MissingCamera(&'static str),
    #[error("invalid camera number '{0}', cameras are numbered from 1")]
    InvalidCamera(String),
}

fn camera_number(name: &'static str, arg: Option<&str>) -> Result<usize, CommandError> {
    let raw = arg.ok_or(CommandError::MissingCamera(name))?;
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(CommandError::InvalidCamera(raw.to_string())),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandError::Empty)?.to_ascii_lowercase();
        let arg = words.next();
        match verb.as_str() {
            "toggle" | "t" => camera_number("toggle", arg).map(Command::Toggle),
            "detach" | "d" => camera_number("detach", arg).map(Command::Detach),
            "status" | "s" => Ok(Command::Status),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(verb)),
        }
    }
}

/// Forwards lines from a blocking reader on a dedicated OS thread. A read that
/// never returns only parks that thread, so it cannot hold the runtime open at
/// shutdown. The receiver yields `None` once the reader hits EOF or an error.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read commands");
                        return;
                    }
                }
            }
            debug!("command input closed");
        })?;
    Ok(rx)
}
