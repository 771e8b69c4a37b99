use std::sync::Arc;
use stream_node::commands::{spawn_line_reader, Command};
use stream_node::{load_or_discover, metrics, CameraWall, LoggingSink, ShutdownOutcome, StreamNodeConfig};
use telemetry::LogConfig;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = StreamNodeConfig::load()?;

  telemetry::init_structured_logging(
    LogConfig::new("stream-node")
      .with_version(env!("CARGO_PKG_VERSION"))
      .with_debug(config.debug),
  );

  let cameras = load_or_discover(&config.cameras_file, config.discovery.clone()).await?;
  if cameras.is_empty() {
    warn!("no cameras found, nothing to show");
    return Ok(());
  }

  let (mut wall, receivers) = CameraWall::new(cameras, config.decoder.clone());
  wall.spawn_display(receivers, Arc::new(LoggingSink::new(wall.len())));
  wall.attach_all();
  info!(cameras = wall.len(), "camera wall running, commands: toggle <n>, detach <n>, status, quit");

  let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
  let mut stdin_open = true;
  let shutdown = shutdown_signal();
  tokio::pin!(shutdown);

  loop {
    tokio::select! {
      _ = &mut shutdown => break,
      line = lines.recv(), if stdin_open => match line {
        Some(line) if line.trim().is_empty() => {}
        Some(line) => match line.parse::<Command>() {
          Ok(Command::Quit) => break,
          Ok(Command::Toggle(index)) => match wall.toggle_quality(index) {
            Some(quality) => info!(camera = index + 1, %quality, "toggled"),
            None => warn!(camera = index + 1, "cannot toggle camera"),
          },
          Ok(Command::Detach(index)) => {
            if !wall.detach(index) {
              warn!(camera = index + 1, "no such camera");
            }
          }
          Ok(Command::Status) => {
            for cam in wall.status() {
              info!(camera = cam.number, name = %cam.name, ip = %cam.ip, quality = %cam.quality, attached = cam.attached, "status");
            }
            debug!(metrics = %metrics::render(), "metrics");
          }
          Err(e) => warn!(error = %e, "bad command"),
        },
        None => {
          debug!("stdin closed, waiting for a shutdown signal");
          stdin_open = false;
        }
      },
    }
  }

  let outcome = wall.shutdown(config.shutdown_grace).await;
  debug!(metrics = %metrics::render(), "final metrics");
  if outcome == ShutdownOutcome::TimedOut {
    warn!("forcing exit");
    std::process::exit(0);
  }
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if tokio::signal::ctrl_c().await.is_err() {
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(_) => std::future::pending::<()>().await,
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }

  info!("shutdown signal received");
}
