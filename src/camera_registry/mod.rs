//! CameraRegistry - configured camera list
//!
//! ## Responsibilities
//!
//! - Own the CameraEndpoint list of the application
//! - Monotonic id assignment (ids are never reused while the list is loaded)
//! - Write-back of fallback URLs reported by stream sessions
//!
//! The registry is plain data; persistence belongs to the caller, which
//! saves `cameras()` together with `next_id()` and restores both.

mod types;

pub use types::*;

use crate::error::{Error, Result};

/// Configured cameras
#[derive(Debug, Clone)]
pub struct CameraRegistry {
    cameras: Vec<CameraEndpoint>,
    next_id: CameraId,
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self {
            cameras: Vec::new(),
            next_id: 1,
        }
    }

    /// Restore a saved list; `next_id` is raised past every restored id
    pub fn restore(cameras: Vec<CameraEndpoint>, next_id: CameraId) -> Self {
        let max_id = cameras.iter().map(|c| c.id).max().unwrap_or(0);
        Self {
            cameras,
            next_id: next_id.max(max_id + 1).max(1),
        }
    }

    /// Add a camera; display name defaults to `Camera {id}`
    pub fn add(
        &mut self,
        url: &str,
        display_name: Option<String>,
        uid: Option<String>,
    ) -> Result<&CameraEndpoint> {
        parse_camera_url(url)?;

        let id = self.next_id;
        self.next_id += 1;

        let display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Camera {}", id));

        tracing::info!(camera_id = id, name = %display_name, "Camera added");

        self.cameras.push(CameraEndpoint {
            id,
            url: url.trim().to_string(),
            display_name,
            uid: uid.filter(|u| !u.trim().is_empty()),
        });
        let idx = self.cameras.len() - 1;
        Ok(&self.cameras[idx])
    }

    pub fn remove(&mut self, id: CameraId) -> Result<CameraEndpoint> {
        let pos = self
            .cameras
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("camera {}", id)))?;
        tracing::info!(camera_id = id, "Camera removed");
        Ok(self.cameras.remove(pos))
    }

    /// Remove every camera; ids handed out so far stay consumed
    pub fn clear(&mut self) {
        self.cameras.clear();
    }

    pub fn get(&self, id: CameraId) -> Option<&CameraEndpoint> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn cameras(&self) -> &[CameraEndpoint] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn next_id(&self) -> CameraId {
        self.next_id
    }

    /// Replace a camera's URL with a working fallback variant
    pub fn apply_url_update(&mut self, id: CameraId, new_url: &str) -> Result<()> {
        parse_camera_url(new_url)?;
        let camera = self
            .cameras
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("camera {}", id)))?;

        if camera.url != new_url {
            tracing::info!(camera_id = id, "Camera URL updated to working fallback");
            camera.url = new_url.to_string();
        }
        Ok(())
    }

    /// URLs of every configured camera, for discovery dedup
    pub fn known_urls(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.url.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL_A: &str = "rtsp://admin:pw@192.168.1.20:554/h264Preview_01_main";
    const URL_B: &str = "rtsp://admin:pw@192.168.1.21:554/h264Preview_01_main";

    #[test]
    fn test_ids_are_monotonic_and_not_reused() {
        let mut reg = CameraRegistry::new();
        let a = reg.add(URL_A, None, None).unwrap().id;
        let b = reg.add(URL_B, None, None).unwrap().id;
        assert_eq!((a, b), (1, 2));

        reg.remove(b).unwrap();
        let c = reg.add(URL_B, None, None).unwrap().id;
        assert_eq!(c, 3);

        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.add(URL_A, None, None).unwrap().id, 4);
    }

    #[test]
    fn test_default_registry_starts_at_one() {
        let mut reg = CameraRegistry::default();
        assert_eq!(reg.next_id(), 1);
        let cam = reg.add(URL_A, None, None).unwrap();
        assert_eq!((cam.id, cam.display_name.as_str()), (1, "Camera 1"));
    }

    #[test]
    fn test_default_display_name() {
        let mut reg = CameraRegistry::new();
        assert_eq!(reg.add(URL_A, None, None).unwrap().display_name, "Camera 1");
        assert_eq!(
            reg.add(URL_B, Some("  ".into()), None).unwrap().display_name,
            "Camera 2"
        );
        assert_eq!(
            reg.add(URL_B, Some("Garage".into()), Some("95270000ABCD".into()))
                .unwrap()
                .display_name,
            "Garage"
        );
    }

    #[test]
    fn test_invalid_url_consumes_no_id() {
        let mut reg = CameraRegistry::new();
        assert!(reg.add("nope", None, None).is_err());
        assert_eq!(reg.add(URL_A, None, None).unwrap().id, 1);
    }

    #[test]
    fn test_restore_raises_next_id() {
        let cameras = vec![CameraEndpoint {
            id: 7,
            url: URL_A.into(),
            display_name: "Porch".into(),
            uid: None,
        }];
        let mut reg = CameraRegistry::restore(cameras, 3);
        assert_eq!(reg.next_id(), 8);
        assert_eq!(reg.add(URL_B, None, None).unwrap().id, 8);

        let reg = CameraRegistry::restore(Vec::new(), 12);
        assert_eq!(reg.next_id(), 12);
    }

    #[test]
    fn test_apply_url_update() {
        let mut reg = CameraRegistry::new();
        let id = reg.add(URL_A, None, None).unwrap().id;
        let sub = "rtsp://admin:pw@192.168.1.20:554/h264Preview_01_sub";

        reg.apply_url_update(id, sub).unwrap();
        assert_eq!(reg.get(id).unwrap().url, sub);
        assert!(matches!(reg.apply_url_update(99, sub), Err(Error::NotFound(_))));
        assert_eq!(reg.known_urls(), vec![sub.to_string()]);
    }
}
