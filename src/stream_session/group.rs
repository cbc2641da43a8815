//! Bulk control over the sessions of all configured cameras

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::{SessionConfig, SessionDeps, SessionEvent, StreamSession};
use crate::camera_registry::{CameraEndpoint, CameraId};

/// Sessions keyed by camera id, publishing into one shared event channel
pub struct SessionGroup {
    config: SessionConfig,
    deps: SessionDeps,
    events: broadcast::Sender<SessionEvent>,
    sessions: RwLock<BTreeMap<CameraId, Arc<StreamSession>>>,
}

impl SessionGroup {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            deps,
            events,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Events from every session in the group
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn get(&self, id: CameraId) -> Option<Arc<StreamSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Start a session for the endpoint unless one is already running
    pub async fn start(&self, endpoint: &CameraEndpoint) -> bool {
        let mut sessions = self.sessions.write().await;
        self.start_locked(&mut sessions, endpoint).await
    }

    /// Start sessions for all endpoints, skipping running ones; returns how many started
    pub async fn start_all(&self, endpoints: &[CameraEndpoint]) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut started = 0;
        for endpoint in endpoints {
            if self.start_locked(&mut sessions, endpoint).await {
                started += 1;
            }
        }
        tracing::info!(started = started, total = endpoints.len(), "Streams started");
        started
    }

    async fn start_locked(
        &self,
        sessions: &mut BTreeMap<CameraId, Arc<StreamSession>>,
        endpoint: &CameraEndpoint,
    ) -> bool {
        if sessions.get(&endpoint.id).map(|s| s.is_running()).unwrap_or(false) {
            return false;
        }
        let session = Arc::new(StreamSession::with_events(
            endpoint.clone(),
            self.config.clone(),
            self.deps.clone(),
            self.events.clone(),
        ));
        let started = session.start().await;
        sessions.insert(endpoint.id, session);
        started
    }

    /// Stop and remove one session
    pub async fn stop(&self, id: CameraId) -> bool {
        let session = self.sessions.write().await.remove(&id);
        match session {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every session; returns how many were running
    pub async fn stop_all(&self) -> usize {
        let sessions: Vec<_> = std::mem::take(&mut *self.sessions.write().await)
            .into_values()
            .collect();
        let running = sessions.iter().filter(|s| s.is_running()).count();
        join_all(sessions.iter().map(|s| s.stop())).await;
        tracing::info!(stopped = running, "All streams stopped");
        running
    }

    /// Start recording on every running session; returns the new recording paths
    pub async fn record_all(&self, output_dir: &Path) -> Vec<PathBuf> {
        let sessions = self.snapshot().await;
        let mut paths = Vec::new();
        for session in sessions.iter().filter(|s| s.is_running()) {
            if let Some(path) = session.start_recording(output_dir).await {
                paths.push(path);
            }
        }
        tracing::info!(count = paths.len(), "Recordings started");
        paths
    }

    /// Stop every active recording; returns how many were stopped
    pub async fn stop_all_recordings(&self) -> usize {
        let sessions = self.snapshot().await;
        let mut stopped = 0;
        for session in &sessions {
            if session.stop_recording().await.is_some() {
                stopped += 1;
            }
        }
        tracing::info!(count = stopped, "Recordings stopped");
        stopped
    }

    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_running())
            .count()
    }

    async fn snapshot(&self) -> Vec<Arc<StreamSession>> {
        self.sessions.read().await.values().cloned().collect()
    }
}
