use serde::{Deserialize, Serialize};

/// Axis-aligned text region in pixel coordinates, as produced by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BBox {
    pub const fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }

    /// True when the box has positive area.
    pub fn is_valid(&self) -> bool {
        self.x_min < self.x_max && self.y_min < self.y_max
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x_min as f32 + self.width() as f32 / 2.0,
            self.y_min as f32 + self.height() as f32 / 2.0,
        )
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && self.x_max >= other.x_max
            && self.y_max >= other.y_max
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Grows the box by `padding` on every side and clamps it to a
    /// `width` x `height` canvas.
    pub fn padded_within(&self, padding: i32, width: u32, height: u32) -> BBox {
        BBox {
            x_min: (self.x_min - padding).max(0),
            y_min: (self.y_min - padding).max(0),
            x_max: (self.x_max + padding).min(width as i32),
            y_max: (self.y_max + padding).min(height as i32),
        }
    }

    /// Clamps the box to the canvas. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BBox> {
        let clamped = self.padded_within(0, width, height);
        clamped.is_valid().then_some(clamped)
    }
}

impl From<[i32; 4]> for BBox {
    fn from(value: [i32; 4]) -> Self {
        BBox::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(value: BBox) -> Self {
        [value.x_min, value.y_min, value.x_max, value.y_max]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_boxes() {
        let a = BBox::new(10, 10, 50, 30);
        let b = BBox::new(60, 35, 100, 55);
        let merged = a.union(&b);
        assert_eq!(merged, BBox::new(10, 10, 100, 55));
        assert!(merged.contains(&a));
        assert!(merged.contains(&b));
    }

    #[test]
    fn padded_within_clamps_to_canvas() {
        let bbox = BBox::new(2, 3, 95, 48);
        let padded = bbox.padded_within(10, 100, 50);
        assert_eq!(padded, BBox::new(0, 0, 100, 50));
    }

    #[test]
    fn clamp_to_drops_boxes_outside_canvas() {
        assert_eq!(BBox::new(120, 0, 140, 10).clamp_to(100, 100), None);
        assert_eq!(
            BBox::new(-5, 90, 20, 130).clamp_to(100, 100),
            Some(BBox::new(0, 90, 20, 100))
        );
    }
}
