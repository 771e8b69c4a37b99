//! Runs the built binary and checks that a termination signal ends it within
//! the shutdown grace, even while the operator's stdin is still open.
#![cfg(unix)]

use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const EXIT_LIMIT: Duration = Duration::from_secs(3);

fn wait_exit(child: &mut Child, limit: Duration) -> Result<bool> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(child.try_wait()?.is_some())
}

#[test]
fn test_sigterm_exits_with_stdin_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cameras_file = dir.path().join("cameras.yaml");
    std::fs::write(
        &cameras_file,
        "tapo_cameras:\n  - ip: 127.0.0.1\n    username: user\n    password: pass\n    rtsp_path: /stream1\n",
    )?;

    let mut child = Command::new(env!("CARGO_BIN_EXE_stream-node"))
        .arg(&cameras_file)
        .env("DECODER_PROGRAM", "true")
        .env("RUST_LOG", "off")
        .env_remove("DEBUG")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn stream-node")?;
    let _stdin = child.stdin.take().context("stdin pipe")?;

    std::thread::sleep(Duration::from_millis(1500));
    assert!(child.try_wait()?.is_none(), "stream-node exited before the signal");

    let pid = i32::try_from(child.id())?;
    // SAFETY: `pid` is our own child, which has not been reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    assert_eq!(rc, 0);

    let exited = wait_exit(&mut child, EXIT_LIMIT)?;
    if !exited {
        let _ = child.kill();
        let _ = child.wait();
    }
    assert!(exited, "stream-node still running {EXIT_LIMIT:?} after SIGTERM");
    Ok(())
}

#[test]
fn test_quit_command_exits() -> Result<()> {
    use std::io::Write;

    let dir = tempfile::tempdir()?;
    let cameras_file = dir.path().join("cameras.yaml");
    std::fs::write(&cameras_file, "tapo_cameras:\n  - ip: 127.0.0.1\n")?;

    let mut child = Command::new(env!("CARGO_BIN_EXE_stream-node"))
        .arg(&cameras_file)
        .env("DECODER_PROGRAM", "true")
        .env("RUST_LOG", "off")
        .env_remove("DEBUG")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn stream-node")?;
    let mut stdin = child.stdin.take().context("stdin pipe")?;

    std::thread::sleep(Duration::from_millis(500));
    writeln!(stdin, "status")?;
    writeln!(stdin, "quit")?;

    let exited = wait_exit(&mut child, EXIT_LIMIT)?;
    if !exited {
        let _ = child.kill();
        let _ = child.wait();
    }
    assert!(exited, "stream-node ignored quit");
    Ok(())
}
