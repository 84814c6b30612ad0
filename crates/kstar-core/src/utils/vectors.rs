use std::fmt::Display;

use auto_ops::impl_op_ex;
use serde::{Deserialize, Serialize};

/// A three-vector of `f64` components, typically a momentum (GeV/$`c`$) or a position (cm).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// The $`x`$-component.
    pub x: f64,
    /// The $`y`$-component.
    pub y: f64,
    /// The $`z`$-component.
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Attach an on-shell energy computed from the given `mass`.
    pub fn with_mass(&self, mass: f64) -> Vec4 {
        let e = (mass * mass + self.mag2()).sqrt();
        Vec4::new(self.x, self.y, self.z, e)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
    pub fn mag2(&self) -> f64 {
        self.dot(self)
    }
    pub fn mag(&self) -> f64 {
        self.mag2().sqrt()
    }
    /// Magnitude of the component transverse to the $`z`$-axis.
    pub fn pt(&self) -> f64 {
        self.x.hypot(self.y)
    }
    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        (self - other).mag()
    }
}

impl_op_ex!(+ |a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z) });
impl_op_ex!(-|a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z) });
impl_op_ex!(-|a: &Vec3| -> Vec3 { Vec3::new(-a.x, -a.y, -a.z) });

impl Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.5}, {:.5}, {:.5}]", self.x, self.y, self.z)
    }
}

/// A four-vector with the time-like component stored last, `(x, y, z, t)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl Vec4 {
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self {
            x: px,
            y: py,
            z: pz,
            t: e,
        }
    }
    pub fn vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
    pub fn pt(&self) -> f64 {
        self.vec3().pt()
    }
    pub fn m2(&self) -> f64 {
        self.t * self.t - self.vec3().mag2()
    }
    /// Invariant mass.
    pub fn m(&self) -> f64 {
        self.m2().sqrt()
    }
    /// Rapidity $`y = \frac{1}{2}\ln\frac{E + p_z}{E - p_z}`$.
    pub fn rapidity(&self) -> f64 {
        0.5 * ((self.t + self.z) / (self.t - self.z)).ln()
    }
}

impl_op_ex!(+ |a: &Vec4, b: &Vec4| -> Vec4 { Vec4::new(a.x + b.x, a.y + b.y, a.z + b.z, a.t + b.t) });

impl Display for Vec4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[e = {:.5}; p = ({:.5}, {:.5}, {:.5}); m = {:.5}]",
            self.t,
            self.x,
            self.y,
            self.z,
            self.m()
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_vec_sums() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        let res = a + b;
        assert_eq!(res.x, 5.0);
        assert_eq!(res.y, 7.0);
        assert_eq!(res.z, 9.0);
        assert_eq!(res - b, a);
        assert_eq!(res + -a, b);
    }

    #[test]
    fn test_three_to_four_momentum_conversion() {
        let p3 = Vec3::new(1.0, 2.0, 3.0);
        let p4 = p3.with_mass(2.0);
        assert_eq!(p4.vec3(), p3);
        assert_relative_eq!(p4.t, 18.0_f64.sqrt());
        assert_relative_eq!(p4.m(), 2.0);
    }

    #[test]
    fn test_four_momentum_basics() {
        let p = Vec4::new(3.0, 4.0, 5.0, 10.0);
        assert_eq!(p.vec3(), Vec3::new(3.0, 4.0, 5.0));
        assert_relative_eq!(p.m(), 50.0_f64.sqrt());
        assert_relative_eq!(p.m2(), 50.0);
        assert_relative_eq!(p.pt(), 5.0);
        assert_relative_eq!(p.rapidity(), 0.5 * (15.0_f64 / 5.0).ln());
        let sum = p + Vec4::new(-3.0, -4.0, -5.0, 2.0);
        assert_relative_eq!(sum.m(), 12.0);
    }

    #[test]
    fn test_three_momentum_basics() {
        let p = Vec3::new(3.0, 4.0, 5.0);
        assert_relative_eq!(p.mag(), 50.0_f64.sqrt());
        assert_relative_eq!(p.mag2(), 50.0);
        assert_relative_eq!(p.pt(), 5.0);
        assert_relative_eq!(p.dot(&Vec3::new(1.0, -1.0, 2.0)), 9.0);
        assert_relative_eq!(Vec3::new(0.0, 0.0, 0.0).distance(&p), p.mag());
    }
}
