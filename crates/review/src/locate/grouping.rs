//! Line grouping for matched boxes

use clauseforge_common::BoundingBox;

/// Merge boxes that sit on the same text line into one box per line.
///
/// A box joins the first line whose anchor center is within half the
/// height of the very first box. Lines keep the order in which they were
/// opened and duplicate merged boxes are dropped.
pub fn group_into_lines(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    let Some(first) = boxes.first() else {
        return Vec::new();
    };
    let epsilon = first.height * 0.5;

    // (anchor center, left, top, right, bottom)
    let mut lines: Vec<(f64, f64, f64, f64, f64)> = Vec::new();
    for rect in boxes {
        let center = rect.center_y();
        let right = rect.x + rect.width;
        let bottom = rect.y + rect.height;

        match lines
            .iter_mut()
            .find(|line| line.0 - epsilon < center && center < line.0 + epsilon)
        {
            Some(line) => {
                line.1 = line.1.min(rect.x);
                line.2 = line.2.min(rect.y);
                line.3 = line.3.max(right);
                line.4 = line.4.max(bottom);
            }
            None => lines.push((center, rect.x, rect.y, right, bottom)),
        }
    }

    let mut merged: Vec<BoundingBox> = Vec::with_capacity(lines.len());
    for (_, left, top, right, bottom) in lines {
        let rect = BoundingBox::from_corners(left, top, right, bottom);
        if !merged.contains(&rect) {
            merged.push(rect);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox { x, y, width, height }
    }

    #[test]
    fn test_boxes_on_one_line_merge() {
        let lines = group_into_lines(&[
            rect(10.0, 20.0, 2.0, 2.0),
            rect(12.0, 20.2, 2.0, 2.0),
            rect(14.0, 19.9, 2.0, 2.0),
        ]);
        assert_eq!(lines.len(), 1);
        assert!((lines[0].x - 10.0).abs() < 1e-9);
        assert!((lines[0].width - 6.0).abs() < 1e-9);
        assert!((lines[0].y - 19.9).abs() < 1e-9);
    }

    #[test]
    fn test_separate_lines_stay_apart_in_order() {
        let lines = group_into_lines(&[
            rect(10.0, 20.0, 2.0, 2.0),
            rect(10.0, 24.0, 2.0, 2.0),
            rect(12.0, 20.0, 2.0, 2.0),
        ]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].y, 20.0);
        assert_eq!(lines[0].width, 4.0);
        assert_eq!(lines[1].y, 24.0);
    }

    #[test]
    fn test_output_is_clamped() {
        let lines = group_into_lines(&[rect(98.0, 99.0, 5.0, 3.0)]);
        assert!(lines[0].is_within_bounds());
    }

    #[test]
    fn test_duplicates_collapse() {
        let lines = group_into_lines(&[rect(0.0, 0.0, 0.0, 0.0), rect(0.0, 0.0, 0.0, 0.0)]);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_into_lines(&[]).is_empty());
    }
}
