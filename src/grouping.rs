use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::geometry::BBox;

pub const DEFAULT_Y_THRESHOLD: i32 = 50;

/// Boxes that belong to one speech bubble, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    boxes: Vec<BBox>,
    bbox: BBox,
}

impl Group {
    fn start(first: BBox) -> Self {
        Self {
            boxes: vec![first],
            bbox: first,
        }
    }

    fn push(&mut self, next: BBox) {
        self.bbox = self.bbox.union(&next);
        self.boxes.push(next);
    }

    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    /// Minimal box enclosing every member.
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn into_boxes(self) -> Vec<BBox> {
        self.boxes
    }
}

/// Sorts boxes top-to-bottom then left-to-right and splits them into
/// groups wherever the gap to the previous box leaves `0..=y_threshold`.
///
/// The gap is measured against the immediately preceding box, not the
/// group's lowest edge. Vertically overlapping boxes (negative gap) always
/// start a new group.
pub fn group_boxes(boxes: &[BBox], y_threshold: i32) -> Vec<Group> {
    let mut sorted = boxes.to_vec();
    sorted.sort_by_key(|bbox| (bbox.y_min, bbox.x_min));

    let mut groups: Vec<Group> = Vec::new();
    let mut previous: Option<BBox> = None;

    for bbox in sorted {
        if let (Some(prev), Some(current)) = (previous, groups.last_mut()) {
            // A gap too large for i32 always splits.
            let close = bbox
                .y_min
                .checked_sub(prev.y_max)
                .is_some_and(|distance| (0..=y_threshold).contains(&distance));
            if close {
                current.push(bbox);
                previous = Some(bbox);
                continue;
            }
        }
        groups.push(Group::start(bbox));
        previous = Some(bbox);
    }

    groups
}

/// Enclosing box of a non-empty slice of boxes.
pub fn group_bounding_box(boxes: &[BBox]) -> Result<BBox> {
    let (first, rest) = boxes
        .split_first()
        .ok_or_else(|| anyhow!("invalid argument: cannot bound an empty group"))?;
    Ok(rest.iter().fold(*first, |acc, bbox| acc.union(bbox)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_boxes() -> Vec<BBox> {
        vec![
            BBox::new(200, 300, 250, 320),
            BBox::new(60, 35, 100, 55),
            BBox::new(10, 10, 50, 30),
        ]
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_boxes(&[], 50).is_empty());
    }

    #[test]
    fn single_box_forms_single_group() {
        let groups = group_boxes(&[BBox::new(0, 0, 10, 10)], 50);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].boxes(), &[BBox::new(0, 0, 10, 10)]);
    }

    #[test]
    fn close_boxes_merge_and_far_boxes_split() {
        let groups = group_boxes(&page_boxes(), 50);
        let sizes: Vec<usize> = groups.iter().map(Group::len).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(groups[0].bbox(), BBox::new(10, 10, 100, 55));
        assert_eq!(groups[1].bbox(), BBox::new(200, 300, 250, 320));
    }

    #[test]
    fn overlapping_boxes_do_not_merge() {
        let boxes = [BBox::new(0, 0, 40, 40), BBox::new(50, 20, 90, 60)];
        let groups = group_boxes(&boxes, 50);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn touching_boxes_merge() {
        let boxes = [BBox::new(0, 0, 40, 40), BBox::new(0, 40, 40, 80)];
        assert_eq!(group_boxes(&boxes, 0).len(), 1);
    }

    #[test]
    fn gap_beyond_threshold_splits() {
        let boxes = [BBox::new(0, 0, 10, 20), BBox::new(0, 51, 10, 60)];
        assert_eq!(group_boxes(&boxes, 30).len(), 2);
        assert_eq!(group_boxes(&boxes, 31).len(), 1);
    }

    #[test]
    fn groups_partition_input_in_reading_order() {
        let boxes = vec![
            BBox::new(300, 400, 340, 420),
            BBox::new(10, 10, 40, 30),
            BBox::new(5, 10, 9, 20),
            BBox::new(100, 45, 140, 70),
            BBox::new(12, 500, 40, 520),
            BBox::new(50, 60, 70, 90),
        ];
        let groups = group_boxes(&boxes, 20);

        let flattened: Vec<BBox> = groups
            .iter()
            .flat_map(|group| group.boxes().iter().copied())
            .collect();
        let mut expected = boxes.clone();
        expected.sort_by_key(|bbox| (bbox.y_min, bbox.x_min));
        assert_eq!(flattened, expected);

        for group in &groups {
            assert!(!group.is_empty());
            for member in group.boxes() {
                assert!(group.bbox().contains(member));
            }
        }
    }

    #[test]
    fn extreme_coordinates_split_instead_of_overflowing() {
        let boxes = [
            BBox::new(0, -300, 10, -100),
            BBox::new(0, i32::MAX - 10, 10, i32::MAX),
        ];
        let groups = group_boxes(&boxes, i32::MAX);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].boxes(), &[boxes[1]]);
    }

    #[test]
    fn bounding_box_rejects_empty_group() {
        assert!(group_bounding_box(&[]).is_err());
    }

    #[test]
    fn bounding_box_matches_group_bbox() {
        let groups = group_boxes(&page_boxes(), 50);
        for group in groups {
            assert_eq!(group_bounding_box(group.boxes()).unwrap(), group.bbox());
        }
    }
}
