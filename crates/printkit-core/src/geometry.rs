//! Machine geometry: axes and five-dimensional points.
//!
//! Printer motion is expressed over five axes: the cartesian X/Y/Z
//! carriage plus two auxiliary A/B axes that boards may assign to
//! extruders or other rotating hardware. Points are in millimeters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A single machine axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    A,
    B,
}

impl Axis {
    /// All axes in wire bit order.
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B];

    /// Bit assigned to this axis in wire-level axis bitmasks.
    pub fn bit(self) -> u8 {
        match self {
            Axis::X => 1 << 0,
            Axis::Y => 1 << 1,
            Axis::Z => 1 << 2,
            Axis::A => 1 << 3,
            Axis::B => 1 << 4,
        }
    }

    /// Index into per-axis arrays.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::A => 3,
            Axis::B => 4,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
            Axis::B => 'B',
        };
        write!(f, "{}", c)
    }
}

/// A set of axes, stored as the wire bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisSet(u8);

impl AxisSet {
    /// The empty set.
    pub const EMPTY: AxisSet = AxisSet(0);

    /// Build a set from a slice of axes.
    pub fn of(axes: &[Axis]) -> Self {
        let mut mask = 0;
        for a in axes {
            mask |= a.bit();
        }
        AxisSet(mask)
    }

    /// Build a set from a raw wire bitmask. Bits above B are dropped.
    pub fn from_bits(bits: u8) -> Self {
        AxisSet(bits & 0x1f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, axis: Axis) -> bool {
        self.0 & axis.bit() != 0
    }

    pub fn insert(&mut self, axis: Axis) {
        self.0 |= axis.bit();
    }

    pub fn remove(&mut self, axis: Axis) {
        self.0 &= !axis.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the member axes in X..B order.
    pub fn iter(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in self.iter() {
            write!(f, "{}", a)?;
        }
        Ok(())
    }
}

/// A position or displacement over all five axes, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point5d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
}

impl Point5d {
    pub const ZERO: Point5d = Point5d {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        a: 0.0,
        b: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64) -> Self {
        Point5d { x, y, z, a, b }
    }

    /// A point with only the cartesian axes set.
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Point5d {
            x,
            y,
            z,
            a: 0.0,
            b: 0.0,
        }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::A => self.a,
            Axis::B => self.b,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::A => self.a = value,
            Axis::B => self.b = value,
        }
    }

    /// Component-wise absolute value.
    pub fn abs(&self) -> Point5d {
        Point5d {
            x: self.x.abs(),
            y: self.y.abs(),
            z: self.z.abs(),
            a: self.a.abs(),
            b: self.b.abs(),
        }
    }

    /// Euclidean length over the cartesian axes only.
    ///
    /// Feed rates describe carriage motion, so move timing uses the
    /// XYZ distance even when auxiliary axes travel further.
    pub fn xyz_length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Largest absolute component across all five axes.
    pub fn longest(&self) -> f64 {
        let d = self.abs();
        d.x.max(d.y).max(d.z).max(d.a).max(d.b)
    }

    /// The axis with the largest absolute component.
    pub fn longest_axis(&self) -> Axis {
        let d = self.abs();
        let mut best = Axis::X;
        for a in Axis::ALL {
            if d.axis(a) > d.axis(best) {
                best = a;
            }
        }
        best
    }

    /// Component-wise multiply, used for mm-to-steps scaling.
    pub fn scale(&self, other: &Point5d) -> Point5d {
        Point5d {
            x: self.x * other.x,
            y: self.y * other.y,
            z: self.z * other.z,
            a: self.a * other.a,
            b: self.b * other.b,
        }
    }

    /// Round every component to the nearest integer step count.
    pub fn round(&self) -> Point5d {
        Point5d {
            x: self.x.round(),
            y: self.y.round(),
            z: self.z.round(),
            a: self.a.round(),
            b: self.b.round(),
        }
    }
}

impl Add for Point5d {
    type Output = Point5d;
    fn add(self, rhs: Point5d) -> Point5d {
        Point5d {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
            a: self.a + rhs.a,
            b: self.b + rhs.b,
        }
    }
}

impl Sub for Point5d {
    type Output = Point5d;
    fn sub(self, rhs: Point5d) -> Point5d {
        Point5d {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
            a: self.a - rhs.a,
            b: self.b - rhs.b,
        }
    }
}

impl fmt::Display for Point5d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.3}, {:.3}, {:.3})",
            self.x, self.y, self.z, self.a, self.b
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_bits_are_wire_order() {
        assert_eq!(Axis::X.bit(), 1);
        assert_eq!(Axis::Y.bit(), 2);
        assert_eq!(Axis::Z.bit(), 4);
        assert_eq!(Axis::A.bit(), 8);
        assert_eq!(Axis::B.bit(), 16);
    }

    #[test]
    fn axis_set_roundtrip() {
        let mut set = AxisSet::of(&[Axis::X, Axis::Z]);
        assert!(set.contains(Axis::X));
        assert!(!set.contains(Axis::Y));
        assert_eq!(set.bits(), 0b101);
        set.insert(Axis::B);
        set.remove(Axis::X);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Axis::Z, Axis::B]);
    }

    #[test]
    fn xyz_length_ignores_aux_axes() {
        let p = Point5d::new(3.0, 4.0, 0.0, 100.0, 100.0);
        assert_eq!(p.xyz_length(), 5.0);
    }

    #[test]
    fn longest_axis_spans_all_five() {
        let p = Point5d::new(1.0, -2.0, 0.5, -7.0, 3.0);
        assert_eq!(p.longest_axis(), Axis::A);
        assert_eq!(p.longest(), 7.0);
    }

    #[test]
    fn scale_and_round_to_steps() {
        let mm = Point5d::xyz(1.0, 2.0, -0.5);
        let steps_per_mm = Point5d::new(11.77, 11.77, 320.0, 50.0, 50.0);
        let steps = mm.scale(&steps_per_mm).round();
        assert_eq!(steps.x, 12.0);
        assert_eq!(steps.y, 24.0);
        assert_eq!(steps.z, -160.0);
    }
}
