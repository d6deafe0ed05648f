//! Two-dimensional vector math used by the simulation and carried inside tracks.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    /// Value along the x-axis.
    pub x: f32,
    /// Value along the y-axis.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along the given angle.
    pub fn from_radians(radians: f32) -> Self {
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    /// Returns the magnitude of the vector.
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Vec2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, other: Vec2) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2 {
            x: -self.x,
            y: -self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_length() {
        assert_approx_eq!(Vec2::new(3.0, 4.0).length(), 5.0, 1e-6);
        assert_eq!(Vec2::ZERO.length(), 0.0);
    }

    #[test]
    fn test_from_radians() {
        let v = Vec2::from_radians(PI / 2.0);
        assert_approx_eq!(v.x, 0.0, 1e-6);
        assert_approx_eq!(v.y, 1.0, 1e-6);
        assert_approx_eq!(Vec2::from_radians(1.234).length(), 1.0, 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
        let n = Vec2::new(10.0, 0.0).normalize();
        assert_eq!(n, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_operators() {
        let mut a = Vec2::new(1.0, 2.0);
        a += Vec2::new(0.5, -1.0);
        assert_eq!(a, Vec2::new(1.5, 1.0));
        a -= Vec2::new(1.5, 1.0);
        assert_eq!(a, Vec2::ZERO);
        assert_eq!(-Vec2::new(1.0, -2.0), Vec2::new(-1.0, 2.0));
        assert_eq!(Vec2::new(1.0, 1.0) + Vec2::new(2.0, 3.0) - Vec2::new(1.0, 1.0), Vec2::new(2.0, 3.0));
    }
}
