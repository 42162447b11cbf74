use indextree::NodeId;
use serde::{Deserialize, Serialize};

use crate::tree::DirectoryTree;

/// Rectangle structure for treemap layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Area shared with `other`; zero when they only touch.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }
}

/// Item to be laid out in the treemap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreemapItem {
    pub size: u64,
    /// Caller-side identifier echoed back in [`LayoutRect`]
    pub index: usize,
}

/// Result of the treemap layout calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutRect {
    pub rect: Rect,
    pub index: usize,
}

/// Which partitioning strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreemapAlgorithm {
    /// Rows grouped by worst aspect ratio
    #[default]
    Squarified,
    /// One item per row, cut across the longer side
    Slice,
}

/// Lay out `items` in `container` with the chosen algorithm.
///
/// Every item gets exactly one rectangle, largest first. Zero-sized items
/// get a zero-area rectangle. Returns nothing when `items` is empty or
/// sums to zero.
pub fn layout_treemap(
    items: &[TreemapItem],
    container: Rect,
    algorithm: TreemapAlgorithm,
) -> Vec<LayoutRect> {
    match algorithm {
        TreemapAlgorithm::Squarified => SquarifiedTreemap::layout(items, container),
        TreemapAlgorithm::Slice => SliceTreemap::layout(items, container),
    }
}

/// Lay out the children of `node` from a tree snapshot.
///
/// Files, atomic units and unreadable directories have no children and
/// produce an empty layout.
pub fn layout_children(
    tree: &DirectoryTree,
    node: NodeId,
    container: Rect,
    algorithm: TreemapAlgorithm,
) -> Vec<(NodeId, Rect)> {
    let children = tree.child_entries(node);
    let items: Vec<TreemapItem> = children
        .iter()
        .enumerate()
        .map(|(index, (_, entry))| TreemapItem {
            size: entry.size,
            index,
        })
        .collect();

    layout_treemap(&items, container, algorithm)
        .into_iter()
        .map(|placed| (children[placed.index].0, placed.rect))
        .collect()
}

/// Sort descending by size; `None` when there is nothing to distribute.
///
/// The total is summed as `f64` since byte counts near `u64::MAX` would
/// overflow an integer sum.
fn sorted_by_size(items: &[TreemapItem]) -> Option<(Vec<TreemapItem>, f64)> {
    let total: f64 = items.iter().map(|item| item.size as f64).sum();
    if items.is_empty() || total <= 0.0 {
        return None;
    }
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| b.size.cmp(&a.size));
    Some((sorted, total))
}

/// Squarified Treemap Algorithm (Bruls, Huizing, van Wijk)
pub struct SquarifiedTreemap;

impl SquarifiedTreemap {
    /// Calculate the squarified treemap layout
    pub fn layout(items: &[TreemapItem], container: Rect) -> Vec<LayoutRect> {
        let Some((sorted, total_size)) = sorted_by_size(items) else {
            return vec![];
        };

        // Normalize sizes to fit container area
        let scale = container.area().max(0.0) / total_size;
        let normalized: Vec<(usize, f64)> = sorted
            .iter()
            .map(|item| (item.index, item.size as f64 * scale))
            .collect();

        let mut result = Vec::with_capacity(items.len());
        let mut remaining = container;
        let mut row: Vec<(usize, f64)> = Vec::new();
        let mut zero_sized = Vec::new();

        for &(index, size) in &normalized {
            if size <= 0.0 {
                zero_sized.push(index);
                continue;
            }
            if row.is_empty() {
                row.push((index, size));
                continue;
            }

            let side = remaining.short_side();
            let current_worst = Self::worst_aspect_ratio(&row, side);
            row.push((index, size));
            if Self::worst_aspect_ratio(&row, side) > current_worst {
                row.pop();
                remaining = Self::layout_row(&row, remaining, &mut result);
                row.clear();
                row.push((index, size));
            }
        }

        if !row.is_empty() {
            remaining = Self::layout_row(&row, remaining, &mut result);
        }

        for index in zero_sized {
            result.push(LayoutRect {
                rect: Rect::new(remaining.x, remaining.y, 0.0, 0.0),
                index,
            });
        }

        result
    }

    fn worst_aspect_ratio(row: &[(usize, f64)], side: f64) -> f64 {
        if row.is_empty() {
            return f64::INFINITY;
        }

        let total: f64 = row.iter().map(|(_, size)| size).sum();
        let max_size = row.iter().map(|(_, size)| *size).fold(0.0f64, f64::max);
        let min_size = row.iter().map(|(_, size)| *size).fold(f64::INFINITY, f64::min);

        let aspect1 = (side * side * max_size) / (total * total);
        let aspect2 = (total * total) / (side * side * min_size);

        aspect1.max(aspect2)
    }

    /// Place `row` along the shorter side of `container` and return what is
    /// left of it.
    fn layout_row(row: &[(usize, f64)], container: Rect, result: &mut Vec<LayoutRect>) -> Rect {
        let total: f64 = row.iter().map(|(_, size)| size).sum();

        // A wide container gets a column on its left edge, a tall one a
        // strip along its top.
        let vertical = container.width >= container.height;
        let length = if vertical {
            container.height
        } else {
            container.width
        };

        let thickness = if length > 0.0 { total / length } else { 0.0 };

        let mut offset = 0.0f64;
        for &(index, size) in row {
            let item_length = if total > 0.0 {
                size / total * length
            } else {
                0.0
            };

            let rect = if vertical {
                Rect::new(container.x, container.y + offset, thickness, item_length)
            } else {
                Rect::new(container.x + offset, container.y, item_length, thickness)
            };

            result.push(LayoutRect { rect, index });
            offset += item_length;
        }

        if vertical {
            Rect::new(
                container.x + thickness,
                container.y,
                (container.width - thickness).max(0.0),
                container.height,
            )
        } else {
            Rect::new(
                container.x,
                container.y + thickness,
                container.width,
                (container.height - thickness).max(0.0),
            )
        }
    }
}

/// Peels one item per step off the remaining rectangle.
///
/// Each item takes a slice across the longer side of what is left,
/// proportional to its share of the remaining total. Simpler than
/// [`SquarifiedTreemap`] but gives more elongated rectangles.
pub struct SliceTreemap;

impl SliceTreemap {
    pub fn layout(items: &[TreemapItem], container: Rect) -> Vec<LayoutRect> {
        let Some((sorted, total_size)) = sorted_by_size(items) else {
            return vec![];
        };

        let mut result = Vec::with_capacity(items.len());
        let mut remaining = container;
        let mut remaining_total = total_size;

        for item in sorted {
            let share = if remaining_total > 0.0 {
                (item.size as f64 / remaining_total).min(1.0)
            } else {
                0.0
            };

            let rect = if remaining.width > remaining.height {
                let width = remaining.width * share;
                let rect = Rect::new(remaining.x, remaining.y, width, remaining.height);
                remaining.x += width;
                remaining.width -= width;
                rect
            } else {
                let height = remaining.height * share;
                let rect = Rect::new(remaining.x, remaining.y, remaining.width, height);
                remaining.y += height;
                remaining.height -= height;
                rect
            };

            result.push(LayoutRect {
                rect,
                index: item.index,
            });
            remaining_total = (remaining_total - item.size as f64).max(0.0);
        }

        result
    }
}
