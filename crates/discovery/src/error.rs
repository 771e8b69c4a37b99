use thiserror::Error;

/// Failures inside one discovery method. None of these abort discovery as a
/// whole; callers log them and move on to the next reply, endpoint or method.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("probe transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed probe reply: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid endpoint address '{0}'")]
    InvalidAddress(String),

    #[error("onvif request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("onvif request returned status {0}")]
    Status(u16),

    #[error("no profile token in GetProfiles response")]
    NoProfileToken,

    #[error("no rtsp uri in GetStreamUri response")]
    NoStreamUri,
}
