//! Dependency-aware execution ordering.
//!
//! Sources are first ranked by descending composite score, then reordered so
//! that every source appears after its dependencies. The reorder is an
//! iterative topological pass over an adjacency map keyed by source name;
//! cycles degrade to plain score order for the affected sources and are
//! reported on the result rather than treated as fatal.

use std::collections::{HashMap, HashSet};

use super::score::PriorityScore;
use super::source::PriorityLevel;

/// One scheduled slot in an optimized execution order.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// Source name.
    pub source: String,
    /// Score that produced this slot.
    pub score: PriorityScore,
    /// Base priority the job should be submitted with.
    pub priority: PriorityLevel,
}

/// Result of an ordering pass.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOrder {
    /// Sources in execution order.
    pub jobs: Vec<ScheduledJob>,
    /// Sources that participated in a dependency cycle, if any.
    ///
    /// Cycle members are appended in score order after all acyclic sources.
    pub cycle_members: Vec<String>,
}

impl ExecutionOrder {
    /// True when a dependency cycle was detected during ordering.
    pub fn has_cycles(&self) -> bool {
        !self.cycle_members.is_empty()
    }
}

/// Reorders score-ranked candidates so dependencies come first.
///
/// `candidates` must already be sorted by descending score (ties broken by
/// registration order). `dependencies` maps each candidate to its declared
/// dependency names; edges pointing outside the candidate set are ignored,
/// since a source cannot wait on work that is not being scheduled.
///
/// Kahn's algorithm, seeded in candidate order so the result is a stable
/// refinement of the score ranking. Nodes remaining after the queue drains
/// form one or more cycles; they are appended in score order and reported
/// via [`ExecutionOrder::cycle_members`].
pub fn resolve_order(
    candidates: Vec<ScheduledJob>,
    dependencies: &HashMap<String, HashSet<String>>,
) -> ExecutionOrder {
    let selected: HashSet<&str> = candidates.iter().map(|c| c.source.as_str()).collect();

    // In-degree per candidate, counting only edges inside the selection.
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    // Reverse adjacency: dependency name → dependents.
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for job in &candidates {
        let name = job.source.as_str();
        let deps = dependencies.get(name);
        let mut degree = 0;
        if let Some(deps) = deps {
            for dep in deps {
                if selected.contains(dep.as_str()) && dep.as_str() != name {
                    degree += 1;
                    dependents.entry(dep.as_str()).or_default().push(name);
                }
            }
        }
        in_degree.insert(name, degree);
    }

    let mut placed: Vec<ScheduledJob> = Vec::with_capacity(candidates.len());
    let mut placed_names: HashSet<&str> = HashSet::new();

    // Repeatedly place the best-scored candidate whose dependencies are all
    // placed. Scanning in candidate order keeps the result stable.
    loop {
        let next = candidates.iter().find(|job| {
            let name = job.source.as_str();
            !placed_names.contains(name) && in_degree.get(name).copied().unwrap_or(0) == 0
        });

        let Some(job) = next else { break };
        let name = job.source.as_str();
        placed_names.insert(name);
        placed.push(job.clone());

        if let Some(deps) = dependents.get(name) {
            for dependent in deps {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
    }

    // Whatever could not be placed is part of a cycle. Fall back to score
    // order for those sources.
    let mut cycle_members = Vec::new();
    for job in &candidates {
        if !placed_names.contains(job.source.as_str()) {
            cycle_members.push(job.source.clone());
            placed.push(job.clone());
        }
    }

    ExecutionOrder {
        jobs: placed,
        cycle_members,
    }
}
