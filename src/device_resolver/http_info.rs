//! Device info over the vendor HTTP API

use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use std::net::{IpAddr, SocketAddr};

use super::digest::{new_cnonce, parse_challenge, AuthChallenge};
use crate::camera_registry::Credentials;
use crate::error::Result;
use crate::wire_protocol::{extract_device_info, DeviceIdentity, Payload};

/// Device-info endpoint (path and query, also the digest `uri`)
pub const DEVICE_INFO_PATH: &str = "/cgi-bin/api.cgi?cmd=GetDevInfo";

/// GET the device-info endpoint, answering one auth challenge
///
/// `Ok(None)` means the host answered but gave no usable identity.
pub async fn fetch_device_info(
    client: &reqwest::Client,
    host: IpAddr,
    port: u16,
    credentials: &Credentials,
) -> Result<Option<DeviceIdentity>> {
    let url = format!("http://{}{}", SocketAddr::new(host, port), DEVICE_INFO_PATH);

    let mut resp = client.get(&url).send().await?;

    if resp.status() == StatusCode::UNAUTHORIZED {
        if credentials.is_empty() {
            tracing::debug!(ip = %host, port = port, "Device info requires credentials");
            return Ok(None);
        }

        let challenge = resp
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_challenge)
            // Prefer digest when both are offered
            .min_by_key(|c| matches!(c, AuthChallenge::Basic));

        resp = match challenge {
            Some(AuthChallenge::Digest(digest)) => {
                let header = digest.authorization(credentials, "GET", DEVICE_INFO_PATH, &new_cnonce(), 1);
                client.get(&url).header(AUTHORIZATION, header).send().await?
            }
            Some(AuthChallenge::Basic) => {
                client
                    .get(&url)
                    .basic_auth(&credentials.username, Some(&credentials.password))
                    .send()
                    .await?
            }
            None => {
                tracing::debug!(ip = %host, port = port, "No supported auth challenge");
                return Ok(None);
            }
        };
    }

    if !resp.status().is_success() {
        tracing::debug!(ip = %host, port = port, status = %resp.status(), "Device info request rejected");
        return Ok(None);
    }

    let body: serde_json::Value = resp.json().await?;
    let identity = Payload::from_value(body)
        .as_ref()
        .and_then(extract_device_info)
        .map(|info| info.into_identity());

    Ok(identity)
}
