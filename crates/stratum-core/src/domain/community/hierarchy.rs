//! Hierarchy construction across detection levels
//!
//! Each community gets at most one parent, taken from the nearest coarser
//! level present in the run. A parent qualifies when it holds a strict
//! majority of the child's members; among qualifying parents the largest
//! overlap wins, and equal overlaps go to the smallest parent id.

use super::entity::DetectedCommunity;

/// A child → parent edge produced by [`build_hierarchy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub child_id: String,
    pub parent_id: String,
    /// Number of shared members
    pub overlap: usize,
}

/// Assign parents across consecutive levels and record them on the
/// communities. Returns the links in child-level order.
pub fn build_hierarchy(communities: &mut [DetectedCommunity]) -> Vec<ParentLink> {
    let mut levels: Vec<u32> = communities.iter().map(|c| c.level).collect();
    levels.sort_unstable();
    levels.dedup();

    let mut links = Vec::new();

    for pair in levels.windows(2) {
        let (child_level, parent_level) = (pair[0], pair[1]);

        let parents: Vec<&DetectedCommunity> = communities
            .iter()
            .filter(|c| c.level == parent_level)
            .collect();

        for child in communities.iter().filter(|c| c.level == child_level) {
            if let Some((parent, overlap)) = best_parent(child, &parents) {
                links.push(ParentLink {
                    child_id: child.id.clone(),
                    parent_id: parent.id.clone(),
                    overlap,
                });
            }
        }
    }

    for link in &links {
        if let Some(child) = communities.iter_mut().find(|c| c.id == link.child_id) {
            child.parent_id = Some(link.parent_id.clone());
        }
    }

    links
}

fn best_parent<'a>(
    child: &DetectedCommunity,
    parents: &[&'a DetectedCommunity],
) -> Option<(&'a DetectedCommunity, usize)> {
    let child_size = child.members.len();
    let mut best: Option<(&'a DetectedCommunity, usize)> = None;

    for &parent in parents {
        let overlap = child.members.intersection(&parent.members).count();
        // overlap / |child| > 0.5, in integers
        if overlap * 2 <= child_size {
            continue;
        }

        best = match best {
            Some((current, current_overlap))
                if current_overlap > overlap
                    || (current_overlap == overlap && current.id <= parent.id) =>
            {
                Some((current, current_overlap))
            }
            _ => Some((parent, overlap)),
        };
    }

    best
}
