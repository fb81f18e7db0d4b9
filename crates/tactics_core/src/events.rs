//! Typed commands and notifications crossing the decision boundary.
//!
//! Everything the state machine wants from the motor layer is expressed
//! as a [`MotorCommand`]; everything agents tell each other is a
//! [`SquadMessage`]; everything the host might care about observing is
//! an [`AiEvent`]. No stringly-typed dispatch anywhere.

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::brain::{AiState, StateReason};
use crate::cover::CoverId;
use crate::math::Vec2Fixed;

/// Movement gait for motor commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveSpeed {
    /// Careful pace, weapon up.
    Walk,
    /// Full pace.
    #[default]
    Run,
}

/// A command issued to the locomotion/weapon layer.
///
/// The world applies these to its own kinematic model and also exports
/// them in [`crate::world::TickEvents`] for an external motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorCommand {
    /// Move to a position.
    MoveTo {
        /// Destination on the ground plane.
        position: Vec2Fixed,
        /// Gait to use.
        speed: MoveSpeed,
    },
    /// Move directly away from a position.
    MoveAwayFrom {
        /// Position to flee.
        position: Vec2Fixed,
        /// Gait to use.
        speed: MoveSpeed,
    },
    /// Strafe around a pivot keeping distance.
    Circle {
        /// Point to orbit.
        pivot: Vec2Fixed,
    },
    /// Settle into a claimed cover slot.
    EnterCover {
        /// Cover being claimed.
        cover: CoverId,
        /// Slot position behind the cover.
        position: Vec2Fixed,
    },
    /// Release the current cover slot.
    LeaveCover,
    /// Track a position with the weapon.
    AimAt {
        /// Aim target.
        position: Vec2Fixed,
    },
    /// Turn the body towards a position without aiming.
    FaceAt {
        /// Facing target.
        position: Vec2Fixed,
    },
    /// Begin firing at a position.
    OpenFire {
        /// Fire target.
        position: Vec2Fixed,
    },
    /// Stop firing.
    CeaseFire,
    /// Reload the weapon.
    Reload,
    /// Lob a grenade at a position.
    ThrowGrenade {
        /// Blast target.
        target: Vec2Fixed,
    },
    /// Halt in place.
    Stop,
}

/// Peer-to-peer notification between same-side agents in
/// communication range. Delivered at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SquadMessage {
    /// A squadmate link was established.
    FoundFriend {
        /// The squadmate.
        friend: ActorId,
    },
    /// A squadmate link was lost (range or death).
    LostFriend {
        /// The squadmate.
        friend: ActorId,
    },
    /// A squadmate shares its threat belief.
    FriendFoundEnemy {
        /// Reporting squadmate.
        friend: ActorId,
        /// The enemy in question.
        enemy: ActorId,
        /// Where the friend believes the enemy is.
        position: Vec2Fixed,
        /// Tick of the friend's most recent confirmation.
        seen_tick: u64,
        /// Cover the friend believes the enemy holds.
        cover: Option<CoverId>,
        /// Whether the friend has ever directly seen the enemy.
        ever_seen: bool,
    },
    /// A search point was verified clear.
    PointInvestigated {
        /// The verified position.
        position: Vec2Fixed,
        /// When it was verified.
        tick: u64,
    },
    /// A squadmate died in view of the sender.
    FriendSawDeath {
        /// The actor that died.
        victim: ActorId,
        /// Where it died.
        position: Vec2Fixed,
    },
}

/// Observable simulation event, collected per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiEvent {
    /// An agent changed behavioral state.
    StateChanged {
        /// The agent.
        agent: ActorId,
        /// State before the transition.
        from: AiState,
        /// State after the transition.
        to: AiState,
        /// Why the transition happened.
        reason: StateReason,
    },
    /// An agent's tracked threat actor changed.
    ThreatChanged {
        /// The agent.
        agent: ActorId,
        /// New threat, if any.
        threat: Option<ActorId>,
    },
    /// An agent verified a search point.
    PointInvestigated {
        /// The agent.
        agent: ActorId,
        /// The verified position.
        position: Vec2Fixed,
    },
    /// An agent threw a grenade.
    GrenadeThrown {
        /// The agent.
        agent: ActorId,
        /// Blast target.
        target: Vec2Fixed,
    },
    /// An actor died this tick.
    Died {
        /// The actor.
        actor: ActorId,
    },
}
