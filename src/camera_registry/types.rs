//! CameraRegistry type definitions

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Camera identifier, unique within a loaded registry
pub type CameraId = u32;

/// Default RTSP port when the URL omits it
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Login credentials carried through to devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

/// Identity and connection info for one configured camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEndpoint {
    pub id: CameraId,
    /// RTSP URL including credentials and path
    pub url: String,
    pub display_name: String,
    /// Vendor device id used to address sleeping devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Parse and validate a camera URL (must carry a host)
pub fn parse_camera_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(Error::Validation(format!("camera URL has no host: {}", raw)));
    }
    Ok(url)
}

/// Host of a URL string, without brackets for IPv6
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}
