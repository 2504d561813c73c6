use std::ops::{Add, AddAssign, Div, Mul, Sub};

use bytemuck::NoUninit;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vec2<T> {
    pub x: T,
    pub y: T,
}

// Safety: `repr(C)` with two fields of the same type has no padding iff `T` has none.
unsafe impl<T: NoUninit> NoUninit for Vec2<T> {}

pub type Vec2f = Vec2<f32>;

impl Vec2f {
    pub const ZERO: Self = Vec2 { x: 0.0, y: 0.0 };

    /// Euclidean distance between `self` and `other`.
    pub fn dist(self, other: Self) -> f32 {
        (other - self).length()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

pub fn vec2<T>(x: T, y: T) -> Vec2<T> {
    Vec2 { x, y }
}

impl<T: Add<Output = T>> Add for Vec2<T> {
    type Output = Vec2<T>;

    fn add(self, rhs: Vec2<T>) -> Self::Output {
        vec2(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<T: Add<Output = T> + Copy> AddAssign for Vec2<T> {
    fn add_assign(&mut self, rhs: Vec2<T>) {
        *self = *self + rhs;
    }
}

impl<T: Sub<Output = T>> Sub for Vec2<T> {
    type Output = Vec2<T>;

    fn sub(self, rhs: Vec2<T>) -> Self::Output {
        vec2(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<T: Mul<Output = T> + Copy> Mul<T> for Vec2<T> {
    type Output = Vec2<T>;

    fn mul(self, rhs: T) -> Self::Output {
        vec2(self.x * rhs, self.y * rhs)
    }
}

impl<T: Div<Output = T> + Copy> Div<T> for Vec2<T> {
    type Output = Vec2<T>;

    fn div(self, rhs: T) -> Self::Output {
        vec2(self.x / rhs, self.y / rhs)
    }
}
