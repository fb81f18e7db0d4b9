//! Short-lived broadcast alerts: gunshots, impacts, explosions.
//!
//! Alerts live only while their generator keeps refreshing them; a
//! heartbeat lapse of [`ALERT_TTL_TICKS`] removes them. Delivery is
//! positional: a listener hears an alert when it stands within the
//! alert radius scaled by its own hearing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actor::ActorId;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for an alert instance.
pub type AlertId = u64;

/// Ticks an alert survives without a refresh.
pub const ALERT_TTL_TICKS: u64 = 2;

/// One live alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique id.
    pub id: AlertId,
    /// Origin position.
    pub position: Vec2Fixed,
    /// Base audible radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Whether the event is hostile (gunfire) as opposed to neutral
    /// noise.
    pub hostile: bool,
    /// Actor that generated the alert, when known.
    pub source: Option<ActorId>,
    /// True when the source is actually at the origin position, false
    /// for indirect effects like an echo or a landing grenade.
    pub direct: bool,
    /// Tick of the most recent refresh.
    last_refresh: u64,
    /// Listeners already notified of this instance.
    delivered: Vec<ActorId>,
}

/// A delivered alert, snapshot for the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertView {
    /// Alert id.
    pub id: AlertId,
    /// Origin position.
    pub position: Vec2Fixed,
    /// Whether the event is hostile.
    pub hostile: bool,
    /// Generating actor, when known.
    pub source: Option<ActorId>,
    /// Source actually at the origin.
    pub direct: bool,
}

/// Registry of live alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertBus {
    alerts: HashMap<AlertId, Alert>,
    next_id: AlertId,
}

impl AlertBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a new alert. Returns its id so the generator can keep it
    /// alive with [`Self::refresh`].
    pub fn post(
        &mut self,
        position: Vec2Fixed,
        radius: Fixed,
        hostile: bool,
        source: Option<ActorId>,
        direct: bool,
        now: u64,
    ) -> AlertId {
        let id = self.next_id;
        self.next_id += 1;
        self.alerts.insert(
            id,
            Alert {
                id,
                position,
                radius,
                hostile,
                source,
                direct,
                last_refresh: now,
                delivered: Vec::new(),
            },
        );
        debug!(alert = id, ?position, hostile, "alert posted");
        id
    }

    /// Keep an alert alive for another heartbeat. Returns false when
    /// the alert already expired.
    pub fn refresh(&mut self, id: AlertId, now: u64) -> bool {
        match self.alerts.get_mut(&id) {
            Some(alert) => {
                alert.last_refresh = now;
                true
            }
            None => false,
        }
    }

    /// Drop alerts whose heartbeat lapsed.
    pub fn expire(&mut self, now: u64) {
        self.alerts.retain(|id, alert| {
            let live = now.saturating_sub(alert.last_refresh) < ALERT_TTL_TICKS;
            if !live {
                debug!(alert = id, "alert expired");
            }
            live
        });
    }

    /// Number of live alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// True when no alerts are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Look up a live alert.
    #[must_use]
    pub fn get(&self, id: AlertId) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    /// Alert ids in ascending order for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<AlertId> {
        let mut ids: Vec<AlertId> = self.alerts.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Match live alerts against listeners and return the new
    /// deliveries. `listeners` carries (id, position, hearing); each
    /// listener receives a given alert instance at most once, but a
    /// listener that wanders into range later still gets it while the
    /// alert lives.
    pub fn deliver(&mut self, listeners: &[(ActorId, Vec2Fixed, Fixed)]) -> Vec<(ActorId, AlertView)> {
        let mut deliveries = Vec::new();

        for id in self.sorted_ids() {
            let Some(alert) = self.alerts.get_mut(&id) else {
                continue;
            };
            for &(listener, position, hearing) in listeners {
                if Some(listener) == alert.source {
                    continue;
                }
                if alert.delivered.contains(&listener) {
                    continue;
                }
                let audible = alert.radius * hearing;
                if alert.position.distance_squared(position) <= audible * audible {
                    alert.delivered.push(listener);
                    deliveries.push((
                        listener,
                        AlertView {
                            id: alert.id,
                            position: alert.position,
                            hostile: alert.hostile,
                            source: alert.source,
                            direct: alert.direct,
                        },
                    ));
                }
            }
        }

        deliveries
    }

    /// Contents in ascending id order plus the id counter, for
    /// canonical snapshots.
    #[must_use]
    pub fn export(&self) -> (Vec<Alert>, AlertId) {
        let alerts = self
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.alerts.get(&id).cloned())
            .collect();
        (alerts, self.next_id)
    }

    /// Rebuild from an export.
    #[must_use]
    pub fn import(alerts: Vec<Alert>, next_id: AlertId) -> Self {
        Self {
            alerts: alerts.into_iter().map(|a| (a.id, a)).collect(),
            next_id,
        }
    }
}
