//! Lock-guarded transform.
//!
//! Transforms are written at high frequency outside the tick stages, so they
//! are guarded by their own [`SpinLock`] rather than the stage barrier. The
//! value half is the plain [`Transform`]; serialization only sees that.

use crate::math::{Quaternion, Transform, Vec3};

use super::spin::{dual_lock, SpinLock};

/// A transform whose three fields are always read and written together.
#[derive(Debug, Default)]
pub struct SharedTransform {
    value: SpinLock<Transform>,
}

impl SharedTransform {
    /// Creates a shared transform holding `value`.
    #[must_use]
    pub const fn new(value: Transform) -> Self {
        Self {
            value: SpinLock::new(value),
        }
    }

    /// Consistent copy of position, rotation and scale.
    #[must_use]
    pub fn get(&self) -> Transform {
        *self.value.lock()
    }

    /// Same as [`get`](Self::get).
    #[must_use]
    pub fn copy(&self) -> Transform {
        self.get()
    }

    /// Replaces all three fields at once.
    pub fn set(&self, value: Transform) {
        *self.value.lock() = value;
    }

    /// Position
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.value.lock().position
    }

    /// Sets the position
    pub fn set_position(&self, position: Vec3) {
        self.value.lock().position = position;
    }

    /// Rotation
    #[must_use]
    pub fn rotation(&self) -> Quaternion {
        self.value.lock().rotation
    }

    /// Sets the rotation
    pub fn set_rotation(&self, rotation: Quaternion) {
        self.value.lock().rotation = rotation;
    }

    /// Scale
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.value.lock().scale
    }

    /// Sets the scale
    pub fn set_scale(&self, scale: Vec3) {
        self.value.lock().scale = scale;
    }

    /// Moves the position by `offset`.
    pub fn translate(&self, offset: Vec3) {
        let mut value = self.value.lock();
        *value = value.translate(offset);
    }

    /// Applies `offset` on top of the current rotation.
    pub fn rotate(&self, offset: Quaternion) {
        let mut value = self.value.lock();
        *value = value.rotate(offset);
    }

    /// Moves by `offset` and replaces the rotation in one critical section.
    pub fn translate_and_set_rotation(&self, offset: Vec3, rotation: Quaternion) {
        let mut value = self.value.lock();
        value.position = value.position + offset;
        value.rotation = rotation;
    }

    /// Copies `other` into `self` atomically with respect to both.
    ///
    /// Safe to run concurrently with `other.set_from(self)`.
    pub fn set_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut this, that) = dual_lock(&self.value, &other.value);
        *this = *that;
    }

    /// Returns true if both transforms hold equal values at one instant.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let (this, that) = dual_lock(&self.value, &other.value);
        *this == *that
    }

    /// True while the value is [`Transform::EMPTY`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.lock().is_empty()
    }
}

impl From<Transform> for SharedTransform {
    fn from(value: Transform) -> Self {
        Self::new(value)
    }
}

impl Clone for SharedTransform {
    /// Clones the current value into a fresh lock.
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_setters() {
        let t = SharedTransform::default();
        assert!(t.is_empty());
        t.set_position(Vec3::new(1.0, 2.0, 3.0));
        t.set_scale(Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(t.rotation(), Quaternion::IDENTITY);
        assert_eq!(t.scale(), Vec3::new(2.0, 2.0, 2.0));
        assert!(!t.is_empty());
    }

    #[test]
    fn test_translate_and_set_rotation() {
        let t = SharedTransform::new(Transform::IDENTITY);
        let q = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        t.translate(Vec3::new(1.0, 0.0, 0.0));
        t.translate_and_set_rotation(Vec3::new(0.0, 1.0, 0.0), q);
        let value = t.copy();
        assert_eq!(value.position, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(value.rotation, q);
    }

    #[test]
    fn test_set_from_and_same_value() {
        let a = SharedTransform::new(Transform::IDENTITY.translate(Vec3::ONE));
        let b = SharedTransform::default();
        assert!(!a.same_value(&b));
        b.set_from(&a);
        assert!(a.same_value(&b));
        assert_eq!(b.position(), Vec3::ONE);
    }

    #[test]
    fn test_self_copy_is_noop() {
        let a = SharedTransform::new(Transform::IDENTITY.translate(Vec3::ONE));
        a.set_from(&a);
        assert!(a.same_value(&a));
        assert_eq!(a.position(), Vec3::ONE);
    }
}
