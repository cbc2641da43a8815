//! Camera Status Tracker
//!
//! Tracks per-camera connection status from session events to detect
//! lost/recovered transitions. Only transitions are logged, so a camera
//! that keeps failing to reconnect does not flood the log.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::camera_registry::CameraId;
use crate::stream_session::SessionEvent;

/// Camera connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraConnectionStatus {
    /// No status reported yet
    Unknown,
    /// Session is streaming
    Online,
    /// Session failed to connect or lost its stream
    Offline,
}

/// Camera status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Camera went from Online (or Unknown) to Offline
    Lost,
    /// Camera went from Offline to Online
    Recovered,
}

/// Tracks camera connection status and detects transitions
#[derive(Default)]
pub struct CameraStatusTracker {
    statuses: RwLock<HashMap<CameraId, CameraConnectionStatus>>,
}

impl CameraStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update camera status and return transition event if any
    ///
    /// Returns:
    /// - `Some(Lost)` if camera transitioned from Online to Offline
    /// - `Some(Recovered)` if camera transitioned from Offline to Online
    /// - `Some(Lost)` if camera's first status is Offline
    /// - `None` if no transition occurred
    pub async fn update_status(
        &self,
        camera_id: CameraId,
        is_online: bool,
    ) -> Option<CameraStatusEvent> {
        let new_status = if is_online {
            CameraConnectionStatus::Online
        } else {
            CameraConnectionStatus::Offline
        };

        let prev = self
            .statuses
            .write()
            .await
            .insert(camera_id, new_status)
            .unwrap_or(CameraConnectionStatus::Unknown);

        match (prev, new_status) {
            (CameraConnectionStatus::Online, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = camera_id, "Camera connection lost");
                Some(CameraStatusEvent::Lost)
            }
            (CameraConnectionStatus::Offline, CameraConnectionStatus::Online) => {
                tracing::info!(camera_id = camera_id, "Camera connection recovered");
                Some(CameraStatusEvent::Recovered)
            }
            (CameraConnectionStatus::Unknown, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = camera_id, "Camera unreachable on first attempt");
                Some(CameraStatusEvent::Lost)
            }
            _ => None,
        }
    }

    /// Feed a session event; only `Status` events change the tracked state
    pub async fn observe(&self, event: &SessionEvent) -> Option<CameraStatusEvent> {
        match event {
            SessionEvent::Status {
                session_id,
                connected,
                ..
            } => self.update_status(*session_id, *connected).await,
            _ => None,
        }
    }

    pub async fn get_status(&self, camera_id: CameraId) -> CameraConnectionStatus {
        self.statuses
            .read()
            .await
            .get(&camera_id)
            .copied()
            .unwrap_or(CameraConnectionStatus::Unknown)
    }

    /// Offline camera ids, ascending
    pub async fn get_offline_cameras(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self
            .statuses
            .read()
            .await
            .iter()
            .filter(|(_, status)| **status == CameraConnectionStatus::Offline)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
