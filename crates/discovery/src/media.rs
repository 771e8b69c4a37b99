//! ONVIF media service calls used to turn a discovered device into a
//! playable RTSP address: GetProfiles, then GetStreamUri for the first
//! profile.

use crate::error::DiscoveryError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ONVIF_PORT: u16 = 80;
const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";

/// Remote procedure calls against a device's media service. Both calls return
/// the raw response body.
#[async_trait]
pub trait StreamUriNegotiator: Send + Sync {
    async fn get_profiles(&self, ip: &str) -> Result<String, DiscoveryError>;

    async fn get_stream_uri(&self, ip: &str, profile_token: &str) -> Result<String, DiscoveryError>;
}

/// SOAP-over-HTTP media client. Requests carry no device credentials, so
/// negotiated cameras are stored without any.
pub struct OnvifMediaClient {
    port: u16,
    http_client: reqwest::Client,
}

impl OnvifMediaClient {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, DiscoveryError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            port,
            http_client,
        })
    }

    pub fn service_url(&self, ip: &str) -> String {
        format!("http://{}:{}{}", ip, self.port, DEVICE_SERVICE_PATH)
    }

    fn build_soap_envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
            body
        )
    }

    async fn send_onvif_request(&self, ip: &str, soap_body: &str) -> Result<String, DiscoveryError> {
        let url = self.service_url(ip);
        debug!(%url, "sending ONVIF media request");

        let request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(Self::build_soap_envelope(soap_body));

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }
        Ok(body)
    }
}

#[async_trait]
impl StreamUriNegotiator for OnvifMediaClient {
    async fn get_profiles(&self, ip: &str) -> Result<String, DiscoveryError> {
        self.send_onvif_request(ip, "<trt:GetProfiles/>").await
    }

    async fn get_stream_uri(&self, ip: &str, profile_token: &str) -> Result<String, DiscoveryError> {
        let body = stream_uri_request_body(profile_token);
        self.send_onvif_request(ip, &body).await
    }
}

pub(crate) fn stream_uri_request_body(profile_token: &str) -> String {
    format!(
        r#"<trt:GetStreamUri>
      <trt:StreamSetup>
        <tt:Stream>RTP-Unicast</tt:Stream>
        <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>
      </trt:StreamSetup>
      <trt:ProfileToken>{}</trt:ProfileToken>
    </trt:GetStreamUri>"#,
        quick_xml::escape::escape(profile_token)
    )
}

/// First `token="..."` attribute value in a GetProfiles body.
pub fn extract_profile_token(xml: &str) -> Option<&str> {
    const NEEDLE: &str = "token=\"";
    let start = xml.find(NEEDLE)? + NEEDLE.len();
    let len = xml[start..].find('"')?;
    let token = &xml[start..start + len];
    (!token.is_empty()).then_some(token)
}

/// First literal `rtsp://` address in a GetStreamUri body, cut at the next
/// quote, angle bracket or space.
pub fn extract_rtsp_uri(xml: &str) -> Option<String> {
    let start = xml.find("rtsp://")?;
    let rest = &xml[start..];
    let end = rest
        .find(|c: char| matches!(c, '"' | '<' | '>' | ' '))
        .unwrap_or(rest.len());
    let raw = &rest[..end];
    let uri = quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(uri)
}
