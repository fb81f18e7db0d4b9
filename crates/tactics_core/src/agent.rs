//! Per-agent brain state.
//!
//! An [`Agent`] is the decision-side companion of an actor: threat
//! memory, sweep state, timers and the current behavioral state. It
//! holds no world references; the world looks both sides up by id each
//! tick and despawns them together.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::brain::{AiState, StateReason};
use crate::cover_search::CoverCandidate;
use crate::events::SquadMessage;
use crate::math::Vec2Fixed;
use crate::search::SearchPlanner;
use crate::threat::ThreatTracker;

/// An alert-derived spot worth checking out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigateLead {
    /// Where to look.
    pub position: Vec2Fixed,
    /// Tick the lead was raised.
    pub tick: u64,
}

/// Decision-side state for one actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Owning actor.
    pub id: ActorId,
    /// Current behavioral state.
    pub state: AiState,
    /// Why it was entered.
    pub reason: StateReason,
    /// Tick the state was entered or restarted.
    pub state_entered: u64,
    /// Threat memory.
    pub tracker: ThreatTracker,
    /// Sweep state driving investigate and follow.
    pub planner: SearchPlanner,
    /// Enemies currently in sight, sorted by id.
    pub visible_enemies: Vec<ActorId>,
    /// Tick of the next full perception re-scan.
    pub next_scan: u64,
    /// Fire windows spent at the current cover position.
    pub bursts_done: u32,
    /// Claimed hiding slot, possibly still en route.
    pub target_cover: Option<CoverCandidate>,
    /// Consecutive failed cover searches.
    pub cover_fails: u32,
    /// Tick of the last failed retreat search.
    pub last_retreat_fail: Option<u64>,
    /// Earliest tick another grenade may be thrown.
    pub next_grenade_ok: u64,
    /// Remaining ticks of the current patrol pause.
    pub patrol_pause_left: Option<u64>,
    /// Latest alert-derived lead.
    pub lead: Option<InvestigateLead>,
    /// Tick the threat's last known spot was confirmed empty.
    pub spot_check_tick: Option<u64>,
    /// A new lead arrived this tick.
    pub new_alert: bool,
    /// A search point was verified this tick.
    pub point_just_cleared: bool,
    /// Damage response keeps squad check-ins forced until this tick.
    pub forced_until: u64,
    /// Squadmates currently in contact, sorted by id.
    pub friends: Vec<ActorId>,
    /// Messages delivered for the next intake phase.
    pub inbox: Vec<SquadMessage>,
}

impl Agent {
    /// Fresh agent in the [`AiState::None`] state.
    #[must_use]
    pub fn new(id: ActorId, now: u64) -> Self {
        Self {
            id,
            state: AiState::None,
            reason: StateReason::None,
            state_entered: now,
            tracker: ThreatTracker::new(),
            planner: SearchPlanner::new(),
            visible_enemies: Vec::new(),
            next_scan: now,
            bursts_done: 0,
            target_cover: None,
            cover_fails: 0,
            last_retreat_fail: None,
            next_grenade_ok: 0,
            patrol_pause_left: None,
            lead: None,
            spot_check_tick: None,
            new_alert: false,
            point_just_cleared: false,
            forced_until: 0,
            friends: Vec::new(),
            inbox: Vec::new(),
        }
    }

    /// Switch state, resetting the state timer.
    pub fn enter_state(&mut self, state: AiState, reason: StateReason, now: u64) {
        self.state = state;
        self.reason = reason;
        self.state_entered = now;
    }

    /// Whole ticks spent in the current state.
    #[must_use]
    pub fn ticks_in_state(&self, now: u64) -> u64 {
        now.saturating_sub(self.state_entered)
    }

    /// The threat's last known spot was visited and found empty, and
    /// no fresher sighting has arrived since.
    #[must_use]
    pub fn spot_checked(&self) -> bool {
        let Some(belief) = self.tracker.belief() else {
            return false;
        };
        self.spot_check_tick
            .is_some_and(|tick| tick >= belief.last_seen)
    }

    /// A lead newer than the last spot check exists.
    #[must_use]
    pub fn fresh_lead(&self) -> bool {
        self.lead
            .is_some_and(|lead| self.spot_check_tick.map_or(true, |tick| lead.tick > tick))
    }

    /// Record a spot worth investigating. Older leads never replace
    /// newer ones.
    pub fn note_lead(&mut self, position: Vec2Fixed, tick: u64) {
        if self.lead.map_or(true, |lead| tick >= lead.tick) {
            self.lead = Some(InvestigateLead { position, tick });
            self.new_alert = true;
        }
    }

    /// Reset the per-tick transient flags. Runs at intake start.
    pub fn begin_tick(&mut self) {
        self.new_alert = false;
        self.point_just_cleared = false;
    }
}
