//! Fixed-point scalars, vectors and the seeded random stream.
//!
//! Every quantity the combat layer reasons about is fixed-point so a
//! given seed replays bit-for-bit on any platform. Floats never enter
//! the simulation; hosts convert at the boundary.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Scalar type for all simulation math.
///
/// 32 integer bits and 32 fractional bits: range a little over two
/// billion either way, resolution of about 2.3e-10. Far more than the
/// few hundred world units a combat arena spans.
pub type Fixed = I32F32;

/// Fixed-point 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde codec carrying [`Fixed`] as its raw i64 bit pattern.
///
/// Snapshot state goes through here: no rounding, so a value round
/// trips to the identical bits it left with.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Write the raw bit pattern.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Read a value back from its bit pattern.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers in human-edited files.
///
/// Serializes via f64 so RON configs read naturally (`0.5` instead of a
/// raw bit pattern). Conversion is deterministic for a given literal;
/// simulation state keeps using [`fixed_serde`] for exact bits.
pub mod fixed_num_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as f64.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from f64.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = f64::deserialize(deserializer)?;
        Ok(Fixed::from_num(num))
    }
}

/// Bit-pattern codec for `Option<Fixed>`, keeping `None` as `None`.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Write `Some(bits)` or `None`.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_bits()),
            None => serializer.serialize_none(),
        }
    }

    /// Read an optional value back from its bit pattern.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

impl Vec2Fixed {
    /// Vector from components.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// The origin.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Squared distance to `other`; preferred for comparisons since it
    /// skips the square root.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Squared length, skipping the square root.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Perpendicular vector, 90 degrees counter-clockwise.
    #[must_use]
    pub fn perp_left(self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Point `t` of the way from `self` to `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Unit-length copy. The zero vector stays zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);
        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Normalized direction from `self` towards `target`.
    ///
    /// Zero vector when the points coincide.
    #[must_use]
    pub fn direction_to(self, target: Self) -> Self {
        (target - self).normalize()
    }

    /// Rotate counter-clockwise by an angle in degrees.
    #[must_use]
    pub fn rotated_deg(self, degrees: Fixed) -> Self {
        let cos = fixed_cos_deg(degrees);
        let sin = fixed_sin_deg(degrees);
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

/// Square root by bisection; 32 rounds pins the result well past the
/// precision any distance check needs. Non-positive input gives zero.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::from_num(1) {
        value
    } else {
        Fixed::from_num(1)
    };

    for _ in 0..32 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);
        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Sine of an angle given in degrees.
///
/// Bhaskara's rational approximation, accurate to ~0.002 over a full
/// turn. Good enough for direction vectors and angle thresholds; not
/// intended for accumulating rotations.
#[must_use]
pub fn fixed_sin_deg(angle: Fixed) -> Fixed {
    let full = Fixed::from_num(360);
    let half = Fixed::from_num(180);

    let turns = (angle / full).floor();
    let wrapped = angle - turns * full;

    let (arg, sign) = if wrapped <= half {
        (wrapped, Fixed::from_num(1))
    } else {
        (wrapped - half, Fixed::from_num(-1))
    };

    // sin(x) ~= 4x(180 - x) / (40500 - x(180 - x)) for x in [0, 180]
    let prod = arg * (half - arg);
    let numer = Fixed::from_num(4) * prod;
    let denom = Fixed::from_num(40500) - prod;
    if denom == Fixed::ZERO {
        return Fixed::ZERO;
    }
    sign * numer / denom
}

/// Cosine of an angle given in degrees.
#[must_use]
pub fn fixed_cos_deg(angle: Fixed) -> Fixed {
    fixed_sin_deg(angle + Fixed::from_num(90))
}

/// Deterministic pseudo-random stream.
///
/// Drives re-poll jitter and guessed-position perturbation. Seeded from
/// the world configuration so identical seeds replay identically; the
/// state serializes with the rest of the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a stream from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform fixed-point value in [0, 1).
    pub fn next_unit(&mut self) -> Fixed {
        Fixed::from_bits((self.next() & 0xFFFF_FFFF) as i64)
    }

    /// Uniform fixed-point value in [min, max). Returns `min` when the
    /// range is empty.
    pub fn next_range(&mut self, min: Fixed, max: Fixed) -> Fixed {
        if max <= min {
            return min;
        }
        min + (max - min) * self.next_unit()
    }

    /// Uniform integer in [0, bound). Returns 0 when `bound` is 0.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        ((self.next() >> 32) % u64::from(bound)) as u32
    }

    /// Unit vector in a uniformly random direction.
    pub fn unit_vec(&mut self) -> Vec2Fixed {
        let angle = self.next_range(Fixed::ZERO, Fixed::from_num(360));
        Vec2Fixed::new(fixed_cos_deg(angle), fixed_sin_deg(angle))
    }

    /// Multiplier in [1 - spread, 1 + spread] for staggering re-polls.
    pub fn jitter(&mut self, spread: Fixed) -> Fixed {
        self.next_range(Fixed::from_num(1) - spread, Fixed::from_num(1) + spread)
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<Fixed> for Vec2Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}
