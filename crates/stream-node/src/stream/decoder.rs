//! External decoder process: command line and process-group ownership.

use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

pub const URL_PLACEHOLDER: &str = "{url}";

/// Program and argument template used to start a decoder. Every `{url}` in
/// the arguments is replaced with the stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DecoderCommand {
    /// ffmpeg pulling RTSP over TCP and writing a JPEG image sequence to stdout.
    fn default() -> Self {
        Self::ffmpeg("ffmpeg")
    }
}

impl DecoderCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn ffmpeg(program: impl Into<String>) -> Self {
        Self::new(program).args([
            "-rtsp_transport",
            "tcp",
            "-i",
            URL_PLACEHOLDER,
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-",
        ])
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build_args(&self, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect()
    }
}

/// A running decoder that owns its whole process tree.
///
/// On Unix the decoder leads its own process group so that anything it forks
/// is killed with it.
pub struct DecoderProcess {
    child: Child,
    pid: Option<u32>,
    killed: bool,
}

impl DecoderProcess {
    pub fn start(command: &DecoderCommand, url: &str) -> io::Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.build_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(windows_flags::CREATE_NEW_PROCESS_GROUP);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(program = %command.program, pid = ?pid, "decoder started");

        Ok(Self {
            child,
            pid,
            killed: false,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Forcefully kill the decoder and everything in its process group.
    /// Only the first call signals; later calls do nothing.
    pub fn kill_group(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;

        if let Some(pid) = self.pid {
            if kill_tree(pid) {
                debug!(pid, "decoder process group killed");
                return;
            }
        }

        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, error = %e, "decoder kill failed");
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        self.kill_group();
    }
}

#[cfg(unix)]
fn kill_tree(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: killpg only sends a signal; pgid is the group created for this
    // child at spawn time and the child has not been reaped yet.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %io::Error::last_os_error(), "killpg failed");
    }
    rc == 0
}

#[cfg(windows)]
fn kill_tree(pid: u32) -> bool {
    std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(_pid: u32) -> bool {
    false
}

#[cfg(windows)]
mod windows_flags {
    pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
}
