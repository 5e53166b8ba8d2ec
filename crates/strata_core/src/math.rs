//! Plain math value types.
//!
//! These carry no locks and no identity. A [`Transform`] here is the value
//! half of an entity transform; the concurrency wrapper lives in
//! [`crate::sync::SharedTransform`]. Serialization only ever touches these.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, offset, scale
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All ones
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Position of something not placed anywhere.
    pub const INVALID: Self = Self::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Floors each component to the containing integer cell.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn floor_i32(self) -> [i32; 3] {
        [
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        ]
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Hamilton product `self * rhs` (apply `rhs`, then `self`).
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform - position + rotation + scale
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quaternion,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Transform {
    /// Creates a new transform
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY, Vec3::ONE);

    /// Unplaced transform: invalid position, neutral rotation and scale.
    pub const EMPTY: Self = Self::new(Vec3::INVALID, Quaternion::IDENTITY, Vec3::ONE);

    /// Returns this transform moved by `offset`.
    #[must_use]
    pub fn translate(self, offset: Vec3) -> Self {
        Self { position: self.position + offset, ..self }
    }

    /// Returns this transform with `offset` applied on top of its rotation.
    #[must_use]
    pub fn rotate(self, offset: Quaternion) -> Self {
        Self { rotation: offset.mul(self.rotation), ..self }
    }

    /// Returns this transform with `offset` added to its scale.
    #[must_use]
    pub fn add_scale(self, offset: Vec3) -> Self {
        Self { scale: self.scale + offset, ..self }
    }

    /// True for [`Transform::EMPTY`]. A transform at the origin is not empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::EMPTY
    }
}
