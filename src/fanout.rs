//! Fanout Broadcaster + Connection Accounting
//!
//! Pushes lifecycle events to every connected viewer and to the privileged
//! admin audience, replays currently-live bubbles to newly joined viewers,
//! and tracks the concurrent/peak viewer counts. The transport is abstract:
//! each viewer owns an mpsc receiver, and a send into a closed channel is a
//! silent no-op (a viewer disconnecting mid-broadcast is not an error).

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::bubble::{Bubble, BubbleInput};
use crate::error::SubmitError;
use crate::lifecycle::{BubbleService, Origin};
use crate::metrics;

/// Events delivered to viewers, tagged with their wire names.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "bubble:new")]
    BubbleNew(Bubble),
    #[serde(rename = "bubble:admin")]
    AdminBubble(Bubble),
    #[serde(rename = "bubble:error")]
    BubbleError { message: String },
    #[serde(rename = "bubble:cooldown")]
    BubbleCooldown { remaining_seconds: u64 },
    #[serde(rename = "users:count")]
    UserCount { active: usize },
    #[serde(rename = "admin:joined")]
    AdminJoined { success: bool },
}

/// Inbound commands from the transport layer. One typed entry point per
/// operation instead of per-connection callbacks.
#[derive(Debug, Clone)]
pub enum Command {
    Connect,
    Disconnect,
    Submit {
        source: String,
        input: BubbleInput,
    },
    JoinAdmin {
        password: String,
    },
}

pub struct Hub {
    service: BubbleService,
    viewers: DashMap<String, mpsc::UnboundedSender<ServerEvent>>,
    admins: DashMap<String, ()>,
    active: AtomicUsize,
    peak: AtomicUsize,
    admin_password: String,
}

impl Hub {
    pub fn new(service: BubbleService, admin_password: String) -> Arc<Self> {
        Arc::new(Self {
            service,
            viewers: DashMap::new(),
            admins: DashMap::new(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            admin_password,
        })
    }

    pub fn service(&self) -> &BubbleService {
        &self.service
    }

    pub fn active_users(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn peak_users(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Dispatch a transport command. `Connect` hands back the viewer's
    /// event receiver; every other command returns None.
    pub async fn handle(
        &self,
        viewer: &str,
        command: Command,
    ) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        match command {
            Command::Connect => Some(self.connect(viewer).await),
            Command::Disconnect => {
                self.disconnect(viewer);
                None
            }
            Command::Submit { source, input } => {
                let _ = self.submit(viewer, &source, &input).await;
                None
            }
            Command::JoinAdmin { password } => {
                self.join_admin(viewer, &password);
                None
            }
        }
    }

    /// Register a viewer: accounting increment, count broadcast, then a
    /// private replay of everything currently live on the map.
    pub async fn connect(&self, viewer: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.viewers.insert(viewer.to_string(), tx);

        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(active, Ordering::Relaxed);
        metrics::CONNECTED_VIEWERS.set(active as i64);
        metrics::PEAK_VIEWERS.set(self.peak_users() as i64);

        // Persist the peak; analytics bookkeeping never blocks a connect.
        if let Err(e) = self.service.counters().record_peak(active).await {
            tracing::warn!(error = %e, "peak counter update failed");
        }

        self.broadcast(ServerEvent::UserCount { active });

        match self.service.live_bubbles().await {
            Ok(bubbles) => {
                metrics::REPLAYED_BUBBLES.inc_by(bubbles.len() as u64);
                for bubble in bubbles {
                    self.send_to(viewer, ServerEvent::BubbleNew(bubble));
                }
            }
            Err(e) => {
                // Replay is best-effort: the viewer still gets new bubbles.
                tracing::warn!(viewer = %viewer, error = %e, "replay failed");
            }
        }

        tracing::debug!(viewer = %viewer, active, "viewer connected");
        rx
    }

    pub fn disconnect(&self, viewer: &str) {
        if self.viewers.remove(viewer).is_none() {
            return;
        }
        self.admins.remove(viewer);

        let active = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .map(|n| n.saturating_sub(1))
            .unwrap_or(0);
        metrics::CONNECTED_VIEWERS.set(active as i64);

        self.broadcast(ServerEvent::UserCount { active });
        tracing::debug!(viewer = %viewer, active, "viewer disconnected");
    }

    /// Submit a candidate on behalf of a viewer. Rejections go back to the
    /// originating viewer only; accepted bubbles fan out to everyone and
    /// mirror to the admin audience.
    pub async fn submit(
        &self,
        viewer: &str,
        source: &str,
        input: &BubbleInput,
    ) -> Result<Bubble, SubmitError> {
        match self.service.submit(input, source, Origin::Viewer).await {
            Ok(bubble) => {
                self.fan_out(&bubble);
                Ok(bubble)
            }
            Err(SubmitError::OnCooldown { remaining_seconds }) => {
                self.send_to(viewer, ServerEvent::BubbleCooldown { remaining_seconds });
                Err(SubmitError::OnCooldown { remaining_seconds })
            }
            Err(SubmitError::Storage(e)) => {
                // Infrastructure detail stays out of the viewer-facing event.
                self.send_to(
                    viewer,
                    ServerEvent::BubbleError {
                        message: "submission failed".to_string(),
                    },
                );
                Err(SubmitError::Storage(e))
            }
            Err(rejection) => {
                self.send_to(
                    viewer,
                    ServerEvent::BubbleError {
                        message: rejection.to_string(),
                    },
                );
                Err(rejection)
            }
        }
    }

    /// Seed injection path: same lifecycle entry point, cooldown bypassed,
    /// broadcast normally.
    pub async fn submit_seed(
        &self,
        input: &BubbleInput,
        ttl: Duration,
    ) -> Result<Bubble, SubmitError> {
        let bubble = self
            .service
            .submit(input, "seed", Origin::Seed { ttl })
            .await?;
        self.fan_out(&bubble);
        Ok(bubble)
    }

    /// Membership toggle for the privileged audience; the answer is always
    /// private.
    pub fn join_admin(&self, viewer: &str, password: &str) -> bool {
        let success = password == self.admin_password;
        if success {
            self.admins.insert(viewer.to_string(), ());
            tracing::info!(viewer = %viewer, "viewer joined admin audience");
        } else {
            tracing::warn!(viewer = %viewer, "admin join rejected");
        }
        self.send_to(viewer, ServerEvent::AdminJoined { success });
        success
    }

    fn fan_out(&self, bubble: &Bubble) {
        self.broadcast(ServerEvent::BubbleNew(bubble.clone()));
        self.send_admins(ServerEvent::AdminBubble(bubble.clone()));
    }

    fn broadcast(&self, event: ServerEvent) {
        for entry in self.viewers.iter() {
            let _ = entry.value().send(event.clone());
        }
        metrics::EVENTS_BROADCAST.with_label_values(&["all"]).inc();
    }

    fn send_admins(&self, event: ServerEvent) {
        for entry in self.admins.iter() {
            if let Some(tx) = self.viewers.get(entry.key()) {
                let _ = tx.send(event.clone());
            }
        }
        metrics::EVENTS_BROADCAST.with_label_values(&["admin"]).inc();
    }

    fn send_to(&self, viewer: &str, event: ServerEvent) {
        if let Some(tx) = self.viewers.get(viewer) {
            // A closed channel means the viewer is already gone.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bubble::BubbleKind;

    #[test]
    fn test_event_wire_names() {
        let event = ServerEvent::BubbleCooldown {
            remaining_seconds: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "bubble:cooldown");
        assert_eq!(json["data"]["remaining_seconds"], 12);

        let bubble = Bubble::build("s", "n", "t", 1.0, 2.0, BubbleKind::Speech, 20, 140, false);
        let json = serde_json::to_value(ServerEvent::BubbleNew(bubble)).unwrap();
        assert_eq!(json["event"], "bubble:new");
        assert_eq!(json["data"]["type"], "speech");

        let json = serde_json::to_value(ServerEvent::UserCount { active: 3 }).unwrap();
        assert_eq!(json["event"], "users:count");
        assert_eq!(json["data"]["active"], 3);
    }
}
