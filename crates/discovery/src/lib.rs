//! Camera discovery: ONVIF WS-Discovery first, TCP port scan as fallback.

pub mod error;
pub mod media;
pub mod onvif;
pub mod port_scan;

pub use error::DiscoveryError;
pub use media::{OnvifMediaClient, StreamUriNegotiator};
pub use onvif::{DiscoveredEndpoint, MulticastProbe, OnvifConfig, OnvifDiscovery, ProbeTransport};
pub use port_scan::{parse_subnet, scan_subnet, ScanConfig};

use common::Camera;
use tracing::info;

/// Credentials put into synthesized stream URLs when the device did not
/// hand out an address of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCredentials {
    pub username: String,
    pub password: String,
}

impl Default for DefaultCredentials {
    fn default() -> Self {
        Self {
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub max_cameras: usize,
    pub onvif: OnvifConfig,
    pub scan: ScanConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_cameras: 4,
            onvif: OnvifConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

/// Runs protocol discovery and falls back to the subnet scan when it finds
/// nothing.
pub struct Discovery<P, N> {
    onvif: OnvifDiscovery<P, N>,
    scan: ScanConfig,
    max_cameras: usize,
}

impl Discovery<MulticastProbe, OnvifMediaClient> {
    pub fn from_config(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let transport = MulticastProbe::new(config.onvif.probe_timeout);
        let negotiator = OnvifMediaClient::new(config.onvif.onvif_port, config.onvif.request_timeout)?;
        let onvif = OnvifDiscovery::new(transport, negotiator, config.onvif.credentials);
        Ok(Self::new(onvif, config.scan, config.max_cameras))
    }
}

impl<P: ProbeTransport, N: StreamUriNegotiator> Discovery<P, N> {
    pub fn new(onvif: OnvifDiscovery<P, N>, scan: ScanConfig, max_cameras: usize) -> Self {
        let scan = ScanConfig {
            max_results: scan.max_results.min(max_cameras),
            ..scan
        };
        Self {
            onvif,
            scan,
            max_cameras,
        }
    }

    pub async fn discover(&self) -> Vec<Camera> {
        let mut cameras = self.onvif.discover().await;
        if cameras.is_empty() {
            info!("no ONVIF cameras found, falling back to port scan");
            cameras = scan_subnet(&self.scan).await;
        }
        cameras.truncate(self.max_cameras);
        cameras
    }
}
