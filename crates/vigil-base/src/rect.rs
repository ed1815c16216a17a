use crate::Vec2;

/// Axis-aligned rectangle described by its top-left origin and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect<T> {
    pub origin: Vec2<T>,
    pub size: Vec2<T>,
}

impl<T> Rect<T> {
    pub fn new(origin: Vec2<T>, size: Vec2<T>) -> Self {
        Self { origin, size }
    }
}

impl<T: Default> Default for Rect<T> {
    fn default() -> Self {
        Self { origin: Vec2::zero(), size: Vec2::zero() }
    }
}

impl<T: std::ops::Add<Output = T> + Copy> Rect<T> {
    pub fn min(&self) -> Vec2<T> {
        self.origin
    }

    pub fn max(&self) -> Vec2<T> {
        self.origin + self.size
    }
}

impl<T: std::ops::Add<Output = T> + std::ops::Mul<Output = T> + Copy> Rect<T> {
    pub fn area(&self) -> T {
        self.size.x * self.size.y
    }
}

impl<T: std::ops::Sub<Output = T> + Copy> Rect<T> {
    pub fn from_min_max(min: Vec2<T>, max: Vec2<T>) -> Self {
        Self { origin: min, size: max - min }
    }
}

impl<T: PartialOrd + std::ops::Add<Output = T> + Copy> Rect<T> {
    /// True when `point` lies inside the rectangle; the right and bottom
    /// edges are exclusive.
    pub fn contains(&self, point: Vec2<T>) -> bool {
        let max = self.max();
        point.x >= self.origin.x && point.x < max.x && point.y >= self.origin.y && point.y < max.y
    }
}

impl Rect<f32> {
    pub fn from_center_size(center: Vec2<f32>, size: Vec2<f32>) -> Self {
        Self { origin: Vec2::new(center.x - size.x / 2.0, center.y - size.y / 2.0), size }
    }

    pub fn center(&self) -> Vec2<f32> {
        Vec2::new(self.origin.x + self.size.x / 2.0, self.origin.y + self.size.y / 2.0)
    }

    /// Overlapping region of two rectangles, `None` when they are disjoint
    /// or touch only along an edge.
    pub fn intersection(&self, other: Rect<f32>) -> Option<Rect<f32>> {
        let min_x = self.origin.x.max(other.origin.x);
        let min_y = self.origin.y.max(other.origin.y);
        let max_x = self.max().x.min(other.max().x);
        let max_y = self.max().y.min(other.max().y);
        if max_x > min_x && max_y > min_y {
            Some(Rect::from_min_max(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y)))
        } else {
            None
        }
    }
}
