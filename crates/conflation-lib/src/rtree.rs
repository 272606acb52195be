//! Insertion-only R-tree over bounding boxes
//!
//! Items descend to the leaf whose box grows least, and full nodes split
//! with Guttman's quadratic algorithm. Splits propagate towards the root
//! like B-tree splits; a split root gets a new parent, so every leaf stays
//! at the same depth.

use crate::bbox::BoundingBox;
use std::ops::ControlFlow;

/// Something that can be stored in an [`RTree`]
pub trait IndexItem {
    /// Box the item is indexed under
    fn bbox(&self) -> BoundingBox;

    /// Whether queries may report the item
    fn is_selectable(&self) -> bool {
        true
    }
}

/// Outcome of inserting into a subtree
enum InsertStatus<I> {
    /// The subtree absorbed the item
    Accommodated,
    /// The subtree overflowed and must be replaced by two nodes
    Split(Node<I>, Node<I>),
}

#[derive(Debug, Clone)]
enum NodeKind<I> {
    Leaf(Vec<I>),
    Internal(Vec<Node<I>>),
}

#[derive(Debug, Clone)]
struct Node<I> {
    bbox: BoundingBox,
    kind: NodeKind<I>,
}

/// R-tree with a fixed fan-out
#[derive(Debug, Clone)]
pub struct RTree<I> {
    root: Node<I>,
    max_children: usize,
    len: usize,
}

/// Smallest fan-out that still lets a node split in two
pub const MIN_CHILDREN: usize = 2;

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<I: IndexItem> RTree<I> {
    /// Create an empty tree
    ///
    /// # Arguments
    /// * `max_children` - Node capacity; values below 2 are raised to 2
    pub fn new(max_children: usize) -> Self {
        let max_children = if max_children < MIN_CHILDREN {
            tracing::warn!(
                requested = max_children,
                used = MIN_CHILDREN,
                "R-tree fan-out too small, clamping"
            );
            MIN_CHILDREN
        } else {
            max_children
        };
        Self {
            root: Node::leaf(Vec::new()),
            max_children,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn max_children(&self) -> usize {
        self.max_children
    }

    /// Box of everything indexed, empty for an empty tree
    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.root.bbox
    }

    /// Number of levels, 1 for a tree that is a single leaf
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = &self.root;
        while let NodeKind::Internal(children) = &node.kind {
            depth += 1;
            match children.first() {
                Some(child) => node = child,
                None => break,
            }
        }
        depth
    }

    pub fn clear(&mut self) {
        self.root = Node::leaf(Vec::new());
        self.len = 0;
    }

    pub fn insert(&mut self, item: I) {
        #[cfg(feature = "profiling")]
        profiling::scope!("rtree::insert");

        if let InsertStatus::Split(a, b) = self.root.insert(item, self.max_children) {
            self.root = Node::internal(vec![a, b]);
        }
        self.len += 1;
    }

    /// Selectable items whose box overlaps `bbox`
    pub fn query(&self, bbox: &BoundingBox) -> Vec<&I> {
        #[cfg(feature = "profiling")]
        profiling::scope!("rtree::query");

        let mut results = Vec::new();
        if self.root.bbox.overlaps(bbox) {
            self.root.query(bbox, &mut results);
        }
        results
    }

    /// Visit every item until the observer breaks
    pub fn for_each<F>(&self, mut observer: F) -> ControlFlow<()>
    where
        F: FnMut(&I) -> ControlFlow<()>,
    {
        self.root.for_each(&mut observer)
    }

    /// Visit every item together with the other items overlapping it
    ///
    /// # Arguments
    /// * `tolerance` - Optional `(dx, dy)` expansion of each item's box
    ///   before looking for overlaps
    /// * `observer` - Receives an item and the selectable items whose boxes
    ///   overlap it, the item itself excluded
    pub fn for_each_with_overlaps<F>(&self, tolerance: Option<(f64, f64)>, mut observer: F) -> ControlFlow<()>
    where
        F: FnMut(&I, Vec<&I>) -> ControlFlow<()>,
    {
        self.for_each(|item| {
            let mut bbox = item.bbox();
            if let Some((dx, dy)) = tolerance {
                bbox.surround_by(dx, dy);
            }
            let overlaps = self
                .query(&bbox)
                .into_iter()
                .filter(|other| !std::ptr::eq(*other, item))
                .collect();
            observer(item, overlaps)
        })
    }

    /// Check that every node box contains the boxes below it
    pub fn validate(&self) -> bool {
        self.root.validate()
    }
}

impl<I: IndexItem> Node<I> {
    fn leaf(items: Vec<I>) -> Self {
        let mut bbox = BoundingBox::empty();
        for item in &items {
            bbox.extend(&item.bbox());
        }
        Self {
            bbox,
            kind: NodeKind::Leaf(items),
        }
    }

    fn internal(children: Vec<Node<I>>) -> Self {
        let mut bbox = BoundingBox::empty();
        for child in &children {
            bbox.extend(&child.bbox);
        }
        Self {
            bbox,
            kind: NodeKind::Internal(children),
        }
    }

    fn insert(&mut self, item: I, max_children: usize) -> InsertStatus<I> {
        let item_box = item.bbox();
        let status = match &mut self.kind {
            NodeKind::Leaf(items) => {
                if items.len() < max_children {
                    items.push(item);
                    InsertStatus::Accommodated
                } else {
                    let mut buffer = std::mem::take(items);
                    buffer.push(item);
                    let (a, b) = quadratic_split(buffer, |i| i.bbox());
                    return InsertStatus::Split(Node::leaf(a), Node::leaf(b));
                }
            }
            NodeKind::Internal(children) => {
                let best = find_min_enlargement(children, &item_box);
                match children[best].insert(item, max_children) {
                    InsertStatus::Accommodated => InsertStatus::Accommodated,
                    InsertStatus::Split(a, b) => {
                        children.swap_remove(best);
                        if children.len() + 2 <= max_children {
                            children.push(a);
                            children.push(b);
                            let mut bbox = BoundingBox::empty();
                            for child in children.iter() {
                                bbox.extend(&child.bbox);
                            }
                            self.bbox = bbox;
                            InsertStatus::Accommodated
                        } else {
                            let mut buffer = std::mem::take(children);
                            buffer.push(a);
                            buffer.push(b);
                            let (a, b) = quadratic_split(buffer, |n| n.bbox);
                            return InsertStatus::Split(Node::internal(a), Node::internal(b));
                        }
                    }
                }
            }
        };
        self.bbox.extend(&item_box);
        debug_assert!(self.bbox.contains(&item_box));
        status
    }

    fn query<'a>(&'a self, bbox: &BoundingBox, results: &mut Vec<&'a I>) {
        match &self.kind {
            NodeKind::Leaf(items) => {
                results.extend(
                    items
                        .iter()
                        .filter(|item| item.is_selectable() && item.bbox().overlaps(bbox)),
                );
            }
            NodeKind::Internal(children) => {
                for child in children {
                    if child.bbox.overlaps(bbox) {
                        child.query(bbox, results);
                    }
                }
            }
        }
    }

    fn for_each<F>(&self, observer: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&I) -> ControlFlow<()>,
    {
        match &self.kind {
            NodeKind::Leaf(items) => {
                for item in items {
                    observer(item)?;
                }
            }
            NodeKind::Internal(children) => {
                for child in children {
                    child.for_each(observer)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn validate(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(items) => items.iter().all(|item| self.bbox.contains(&item.bbox())),
            NodeKind::Internal(children) => {
                !children.is_empty()
                    && children
                        .iter()
                        .all(|child| self.bbox.contains(&child.bbox) && child.validate())
            }
        }
    }
}

/// Index of the child that grows least when covering `bbox`
///
/// Ties go to the smaller resulting box, then to the child with fewer
/// entries, then to the lower index.
fn find_min_enlargement<I>(children: &[Node<I>], bbox: &BoundingBox) -> usize {
    let mut best = 0;
    let mut best_key = (f64::INFINITY, f64::INFINITY, usize::MAX);
    for (i, child) in children.iter().enumerate() {
        let key = (
            child.bbox.enlargement(bbox),
            child.bbox.union(bbox).area(),
            child.occupancy(),
        );
        if key.0 < best_key.0
            || (key.0 == best_key.0 && (key.1 < best_key.1 || (key.1 == best_key.1 && key.2 < best_key.2)))
        {
            best = i;
            best_key = key;
        }
    }
    best
}

impl<I> Node<I> {
    fn occupancy(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(items) => items.len(),
            NodeKind::Internal(children) => children.len(),
        }
    }
}

/// Split an overflowing entry list into two groups
///
/// Seeds are the pair of entries farthest apart; overlapping pairs are
/// ranked by the dead area their union would waste. Remaining entries join
/// the group whose box grows least.
fn quadratic_split<E, F>(mut entries: Vec<E>, bbox_of: F) -> (Vec<E>, Vec<E>)
where
    F: Fn(&E) -> BoundingBox,
{
    let boxes: Vec<BoundingBox> = entries.iter().map(&bbox_of).collect();
    let mut seeds = (0, 1);
    let mut best = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for i in 0..boxes.len() {
        for j in i + 1..boxes.len() {
            let distance = boxes[i].distance_sq(&boxes[j]);
            let dead = boxes[i].union(&boxes[j]).area() - boxes[i].area() - boxes[j].area();
            if distance > best.0 || (distance == best.0 && dead > best.1) {
                best = (distance, dead);
                seeds = (i, j);
            }
        }
    }

    // j > i, so removing j first keeps i valid
    let seed_b = entries.swap_remove(seeds.1);
    let seed_a = entries.swap_remove(seeds.0);
    let mut box_a = bbox_of(&seed_a);
    let mut box_b = bbox_of(&seed_b);
    let mut group_a = vec![seed_a];
    let mut group_b = vec![seed_b];

    for entry in entries {
        let bbox = bbox_of(&entry);
        let enlargement_a = box_a.enlargement(&bbox);
        let enlargement_b = box_b.enlargement(&bbox);
        let to_a = if enlargement_a != enlargement_b {
            enlargement_a < enlargement_b
        } else {
            let area_a = box_a.union(&bbox).area();
            let area_b = box_b.union(&bbox).area();
            if area_a != area_b {
                area_a < area_b
            } else {
                group_a.len() <= group_b.len()
            }
        };
        if to_a {
            box_a.extend(&bbox);
            group_a.push(entry);
        } else {
            box_b.extend(&bbox);
            group_b.push(entry);
        }
    }
    (group_a, group_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone)]
    struct TestItem {
        id: usize,
        bbox: BoundingBox,
        selectable: bool,
    }

    impl IndexItem for TestItem {
        fn bbox(&self) -> BoundingBox {
            self.bbox
        }

        fn is_selectable(&self) -> bool {
            self.selectable
        }
    }

    fn create_test_item(id: usize, x: f64, y: f64, w: f64, h: f64) -> TestItem {
        TestItem {
            id,
            bbox: BoundingBox::new(x, y, x + w, y + h),
            selectable: true,
        }
    }

    fn random_items(count: usize, seed: u64) -> Vec<TestItem> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|id| {
                let x = rng.gen_range(-1000.0..1000.0);
                let y = rng.gen_range(-1000.0..1000.0);
                let w = rng.gen_range(0.0..50.0);
                let h = rng.gen_range(0.0..50.0);
                let mut item = create_test_item(id, x, y, w, h);
                item.selectable = id % 7 != 0;
                item
            })
            .collect()
    }

    fn ids(items: Vec<&TestItem>) -> Vec<usize> {
        let mut ids: Vec<usize> = items.into_iter().map(|i| i.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_empty_tree() {
        let tree: RTree<TestItem> = RTree::new(3);
        assert!(tree.is_empty());
        assert!(tree.bbox().is_empty());
        assert!(tree.query(&BoundingBox::new(-1.0, -1.0, 1.0, 1.0)).is_empty());
        assert!(tree.validate());
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_fan_out_is_clamped() {
        let tree: RTree<TestItem> = RTree::new(1);
        assert_eq!(tree.max_children(), MIN_CHILDREN);
    }

    #[test]
    fn test_root_split() {
        let mut tree = RTree::new(3);
        for i in 0..4 {
            tree.insert(create_test_item(i, i as f64 * 10.0, 0.0, 1.0, 1.0));
        }
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.depth(), 2);
        assert!(tree.validate());
        assert_eq!(*tree.bbox(), BoundingBox::new(0.0, 0.0, 31.0, 1.0));

        // the farthest pair seeds the split, so both ends land apart
        let left = ids(tree.query(&BoundingBox::new(-1.0, -1.0, 0.5, 0.5)));
        assert_eq!(left, vec![0]);
    }

    #[test]
    fn test_quadratic_split_groups() {
        let entries = vec![
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(100.0, 0.0, 101.0, 1.0),
            BoundingBox::new(1.0, 0.0, 2.0, 1.0),
            BoundingBox::new(99.0, 0.0, 100.0, 1.0),
        ];
        let (a, b) = quadratic_split(entries, |b| *b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(a.iter().all(|b| b.x_max() <= 2.0));
        assert!(b.iter().all(|b| b.x_min() >= 99.0));
    }

    #[test]
    fn test_query_matches_brute_force() {
        let items = random_items(600, 42);
        let mut tree = RTree::new(4);
        for item in items.iter().cloned() {
            tree.insert(item);
        }
        assert_eq!(tree.len(), items.len());
        assert!(tree.validate());
        assert!(tree.depth() > 2);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let x = rng.gen_range(-1100.0..1100.0);
            let y = rng.gen_range(-1100.0..1100.0);
            let query = BoundingBox::new(x, y, x + rng.gen_range(0.0..300.0), y + rng.gen_range(0.0..300.0));
            let expected: Vec<usize> = items
                .iter()
                .filter(|i| i.selectable && i.bbox.overlaps(&query))
                .map(|i| i.id)
                .collect();
            assert_eq!(ids(tree.query(&query)), expected);
        }
    }

    #[test]
    fn test_for_each_stops_early() {
        let mut tree = RTree::new(3);
        for item in random_items(50, 1) {
            tree.insert(item);
        }
        let mut seen = 0;
        let flow = tree.for_each(|_| {
            seen += 1;
            if seen == 10 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(seen, 10);

        let mut all = 0;
        let flow = tree.for_each(|_| {
            all += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(all, 50);
    }

    #[test]
    fn test_for_each_with_overlaps() {
        let mut tree = RTree::new(3);
        tree.insert(create_test_item(0, 0.0, 0.0, 1.0, 1.0));
        tree.insert(create_test_item(1, 0.5, 0.5, 1.0, 1.0));
        tree.insert(create_test_item(2, 1.4, 0.0, 1.0, 1.0));
        tree.insert(create_test_item(3, 50.0, 50.0, 1.0, 1.0));

        let mut plain = Vec::new();
        let _ = tree.for_each_with_overlaps(None, |item, others| {
            plain.push((item.id, ids(others)));
            ControlFlow::Continue(())
        });
        plain.sort();
        assert_eq!(
            plain,
            vec![(0, vec![1]), (1, vec![0, 2]), (2, vec![1]), (3, vec![])]
        );

        // a tolerance of 0.5 also brings 0 and 2 together
        let mut widened = Vec::new();
        let _ = tree.for_each_with_overlaps(Some((0.5, 0.5)), |item, others| {
            widened.push((item.id, ids(others)));
            ControlFlow::Continue(())
        });
        widened.sort();
        assert_eq!(widened[0], (0, vec![1, 2]));
        assert_eq!(widened[3], (3, vec![]));
    }

    #[test]
    fn test_clear() {
        let mut tree = RTree::new(3);
        for item in random_items(20, 3) {
            tree.insert(item);
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 1);
    }
}
