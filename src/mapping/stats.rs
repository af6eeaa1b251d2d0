use std::collections::HashSet;

use serde::Serialize;

use super::{MappingEdge, Strength};

/// Summary of one context's edges by strength tier. Display only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub total: usize,
    pub strong_count: usize,
    pub moderate_count: usize,
    pub weak_count: usize,
    pub distinct_sources_mapped: usize,
    pub distinct_targets_mapped: usize,
}

pub fn compute_stats(edges: &[MappingEdge]) -> MappingStats {
    let mut stats = MappingStats {
        total: edges.len(),
        ..MappingStats::default()
    };
    let mut sources = HashSet::new();
    let mut targets = HashSet::new();
    for edge in edges {
        match edge.strength {
            Strength::Strong => stats.strong_count += 1,
            Strength::Moderate => stats.moderate_count += 1,
            Strength::Weak => stats.weak_count += 1,
        }
        sources.insert(edge.source_id.as_str());
        targets.insert(edge.target_id.as_str());
    }
    stats.distinct_sources_mapped = sources.len();
    stats.distinct_targets_mapped = targets.len();
    stats
}
