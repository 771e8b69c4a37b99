use crate::stream::DecoderCommand;
use crate::wall::{MAX_CAMERAS, SHUTDOWN_GRACE};
use anyhow::{Context, Result};
use clap::Parser;
use discovery::{parse_subnet, DefaultCredentials, DiscoveryConfig, OnvifConfig, ScanConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CAMERAS_FILE: &str = "tapo-ip.yaml";

#[derive(Debug, Parser)]
#[command(name = "stream-node")]
#[command(about = "Discover RTSP cameras and supervise their decoder streams", long_about = None)]
pub struct Cli {
    /// Camera list file; written after discovery when it does not exist
    #[arg(env = "CAMERAS_FILE", default_value = DEFAULT_CAMERAS_FILE)]
    pub cameras_file: PathBuf,

    /// Verbose logging (yes/no)
    #[arg(long, env = "DEBUG", action = clap::ArgAction::Set, default_value = "no", num_args = 0..=1, default_missing_value = "yes", value_parser = parse_yes_no)]
    pub debug: bool,

    /// Subnet swept by the port-scan fallback, e.g. 192.168.0.0/24
    #[arg(long, env = "SCAN_SUBNET", default_value = "192.168.0.0")]
    pub scan_subnet: String,

    #[arg(long, env = "RTSP_PORT", default_value_t = common::DEFAULT_RTSP_PORT)]
    pub rtsp_port: u16,

    #[arg(long, env = "SCAN_TIMEOUT_MS", default_value_t = 300)]
    pub scan_timeout_ms: u64,

    #[arg(long, env = "MAX_CAMERAS", default_value_t = MAX_CAMERAS)]
    pub max_cameras: usize,

    #[arg(long, env = "ONVIF_PORT", default_value_t = discovery::media::DEFAULT_ONVIF_PORT)]
    pub onvif_port: u16,

    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 2)]
    pub probe_timeout_secs: u64,

    /// Credentials placed in synthesized stream URLs
    #[arg(long, env = "RTSP_USERNAME", default_value = "user")]
    pub rtsp_username: String,

    #[arg(long, env = "RTSP_PASSWORD", default_value = "pass", hide_env_values = true)]
    pub rtsp_password: String,

    #[arg(long, env = "DECODER_PROGRAM", default_value = "ffmpeg")]
    pub decoder_program: String,

    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = SHUTDOWN_GRACE.as_millis() as u64)]
    pub shutdown_grace_ms: u64,
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" | "on" => Ok(true),
        "no" | "n" | "false" | "0" | "off" | "" => Ok(false),
        other => Err(format!("expected yes or no, got '{other}'")),
    }
}

#[derive(Debug, Clone)]
pub struct StreamNodeConfig {
    pub cameras_file: PathBuf,
    pub debug: bool,
    pub discovery: DiscoveryConfig,
    pub decoder: DecoderCommand,
    pub shutdown_grace: Duration,
}

impl StreamNodeConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let subnet = parse_subnet(&cli.scan_subnet)
            .with_context(|| format!("invalid SCAN_SUBNET '{}'", cli.scan_subnet))?;
        let credentials = DefaultCredentials {
            username: cli.rtsp_username,
            password: cli.rtsp_password,
        };
        let max_cameras = cli.max_cameras.clamp(1, MAX_CAMERAS);

        let discovery = DiscoveryConfig {
            max_cameras,
            onvif: OnvifConfig {
                probe_timeout: Duration::from_secs(cli.probe_timeout_secs),
                onvif_port: cli.onvif_port,
                credentials: credentials.clone(),
                ..OnvifConfig::default()
            },
            scan: ScanConfig {
                subnet,
                port: cli.rtsp_port,
                connect_timeout: Duration::from_millis(cli.scan_timeout_ms),
                max_results: max_cameras,
                credentials,
                ..ScanConfig::default()
            },
        };

        Ok(Self {
            cameras_file: cli.cameras_file,
            debug: cli.debug,
            discovery,
            decoder: DecoderCommand::ffmpeg(cli.decoder_program),
            shutdown_grace: Duration::from_millis(cli.shutdown_grace_ms),
        })
    }

    pub fn load() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_constants() {
        let cli = Cli::try_parse_from(["stream-node"]).unwrap();
        let config = StreamNodeConfig::from_cli(cli).unwrap();
        assert_eq!(config.cameras_file, PathBuf::from(DEFAULT_CAMERAS_FILE));
        assert!(!config.debug);
        assert_eq!(config.discovery.max_cameras, 4);
        assert_eq!(config.discovery.scan.port, 554);
        assert_eq!(config.discovery.scan.connect_timeout, Duration::from_millis(300));
        assert_eq!(config.discovery.onvif.onvif_port, 80);
        assert_eq!(config.decoder.program, "ffmpeg");
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_debug_flag_and_positional_file() {
        let cli = Cli::try_parse_from(["stream-node", "--debug", "Yes", "cams.yaml"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.cameras_file, PathBuf::from("cams.yaml"));

        let cli = Cli::try_parse_from(["stream-node", "--debug=No"]).unwrap();
        assert!(!cli.debug);
    }

    #[test]
    fn test_max_cameras_is_capped() {
        let cli = Cli::try_parse_from(["stream-node", "--max-cameras", "9"]).unwrap();
        let config = StreamNodeConfig::from_cli(cli).unwrap();
        assert_eq!(config.discovery.max_cameras, 4);
        assert_eq!(config.discovery.scan.max_results, 4);
    }

    #[test]
    fn test_bad_subnet_is_rejected() {
        let cli = Cli::try_parse_from(["stream-node", "--scan-subnet", "10.0.0.0/16"]).unwrap();
        assert!(StreamNodeConfig::from_cli(cli).is_err());
    }
}
