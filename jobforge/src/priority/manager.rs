//! Priority manager: registration, scoring, ordering, and adjustment.
//!
//! The manager owns the registry of job sources, their recent outcome
//! histories, the current resource-availability view, and the append-only
//! audit log of priority adjustments. All state lives behind a single mutex;
//! individual operations are atomic but not composable without external
//! synchronization.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::order::{resolve_order, ExecutionOrder, ScheduledJob};
use super::score::{
    rating_score, time_of_day_score, OutcomeHistory, PriorityScore, SourceOutcome,
};
use super::source::{JobSource, PriorityLevel, ResourceKind};

/// Outcomes required before the error-rate check may demote a source.
///
/// Prevents a single early failure (trailing rate 1.0) from demoting a
/// source that has barely run.
pub const MIN_SAMPLES_FOR_DEMOTION: usize = 5;

/// Errors returned by priority-manager operations.
#[derive(Debug, Error)]
pub enum PriorityError {
    /// No source with the given name is registered.
    #[error("unknown job source: {0}")]
    NotFound(String),

    /// A source with the given name already exists.
    #[error("job source already registered: {0}")]
    Duplicate(String),

    /// A resource requirement fraction was outside (0, 1].
    #[error("invalid resource requirement for {kind}: {fraction}")]
    InvalidRequirement {
        /// Offending resource kind.
        kind: ResourceKind,
        /// Supplied fraction.
        fraction: f64,
    },
}

/// Why a priority adjustment happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentReason {
    /// Explicit administrative change.
    Manual,
    /// Automatic demotion after sustained failures.
    HighErrorRate,
    /// Feedback-loop rebalancing.
    LoadBalancing,
}

impl AdjustmentReason {
    /// Returns the reason name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Manual => "manual",
            AdjustmentReason::HighErrorRate => "high_error_rate",
            AdjustmentReason::LoadBalancing => "load_balancing",
        }
    }
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the append-only adjustment audit log.
#[derive(Debug, Clone)]
pub struct PriorityAdjustment {
    /// Adjusted source name.
    pub source: String,
    /// Priority before the adjustment.
    pub old_priority: PriorityLevel,
    /// Priority after the adjustment.
    pub new_priority: PriorityLevel,
    /// Why the adjustment happened.
    pub reason: AdjustmentReason,
    /// Signed level delta (new rank − old rank).
    pub factor: i8,
    /// When the adjustment was recorded.
    pub at: DateTime<Utc>,
    /// Optional free-text context.
    pub note: Option<String>,
}

/// Configuration for the priority manager.
#[derive(Debug, Clone)]
pub struct PriorityConfig {
    /// Start of the active window (hour of day, inclusive).
    pub active_start_hour: u32,
    /// End of the active window (hour of day, exclusive).
    pub active_end_hour: u32,
    /// Trailing error rate above which a source is auto-demoted.
    pub error_rate_threshold: f64,
    /// Whether `record_outcome` may auto-demote sources.
    pub auto_demote: bool,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            active_start_hour: 9,
            active_end_hour: 17,
            error_rate_threshold: 0.5,
            auto_demote: true,
        }
    }
}

struct Inner {
    sources: HashMap<String, JobSource>,
    histories: HashMap<String, OutcomeHistory>,
    adjustments: Vec<PriorityAdjustment>,
    /// Currently available fraction of capacity per resource kind.
    available: HashMap<ResourceKind, f64>,
    next_seq: u64,
}

/// Scores and orders registered job sources.
pub struct PriorityManager {
    inner: Mutex<Inner>,
    config: PriorityConfig,
}

impl PriorityManager {
    /// Creates a manager with the given configuration.
    pub fn new(config: PriorityConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sources: HashMap::new(),
                histories: HashMap::new(),
                adjustments: Vec::new(),
                available: HashMap::new(),
                next_seq: 0,
            }),
            config,
        }
    }

    /// Registers a new source.
    ///
    /// Importance and urgency are clamped into [1, 10]. Resource requirement
    /// fractions must lie in (0, 1]. Dependency names do not have to be
    /// registered yet; unknown names are simply never blocking.
    pub fn register(
        &self,
        name: impl Into<String>,
        base_priority: PriorityLevel,
        importance: u8,
        urgency: u8,
        resource_requirements: HashMap<ResourceKind, f64>,
        dependencies: HashSet<String>,
    ) -> Result<(), PriorityError> {
        let name = name.into();

        for (kind, fraction) in &resource_requirements {
            if !(*fraction > 0.0 && *fraction <= 1.0) {
                return Err(PriorityError::InvalidRequirement {
                    kind: *kind,
                    fraction: *fraction,
                });
            }
        }

        let mut inner = self.lock();
        if inner.sources.contains_key(&name) {
            return Err(PriorityError::Duplicate(name));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        debug!(source = %name, priority = %base_priority, "Registered job source");
        inner.histories.insert(name.clone(), OutcomeHistory::new());
        inner.sources.insert(
            name.clone(),
            JobSource::new(
                name,
                base_priority,
                importance,
                urgency,
                resource_requirements,
                dependencies,
                seq,
            ),
        );
        Ok(())
    }

    /// Computes the composite score for one source at the given instant.
    pub fn score(&self, name: &str, now: DateTime<Utc>) -> Result<PriorityScore, PriorityError> {
        let inner = self.lock();
        let source = inner
            .sources
            .get(name)
            .ok_or_else(|| PriorityError::NotFound(name.to_string()))?;
        Ok(self.score_source(&inner, source, now))
    }

    /// Scores all enabled sources (or the named subset) and returns a
    /// dependency-respecting execution order.
    ///
    /// `max_concurrent` truncates the result to the first N slots after
    /// ordering. Cycles degrade to score order and are reported on the
    /// returned [`ExecutionOrder`], never treated as fatal.
    pub fn optimized_order(
        &self,
        names: Option<&[String]>,
        max_concurrent: Option<usize>,
    ) -> ExecutionOrder {
        let now = Utc::now();
        let inner = self.lock();

        let mut candidates: Vec<(&JobSource, PriorityScore)> = inner
            .sources
            .values()
            .filter(|s| s.enabled)
            .filter(|s| match names {
                Some(selection) => selection.iter().any(|n| n == &s.name),
                None => true,
            })
            .map(|s| (s, self.score_source(&inner, s, now)))
            .collect();

        // Descending by total score; declaration order breaks ties.
        candidates.sort_by(|(a, sa), (b, sb)| {
            sb.total
                .partial_cmp(&sa.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.registered_seq.cmp(&b.registered_seq))
        });

        let ranked: Vec<ScheduledJob> = candidates
            .into_iter()
            .map(|(source, score)| ScheduledJob {
                source: source.name.clone(),
                score,
                priority: source.base_priority,
            })
            .collect();

        let dependencies: HashMap<String, HashSet<String>> = inner
            .sources
            .values()
            .map(|s| (s.name.clone(), s.dependencies.clone()))
            .collect();
        drop(inner);

        let mut order = resolve_order(ranked, &dependencies);
        if order.has_cycles() {
            warn!(
                members = ?order.cycle_members,
                "Dependency cycle detected; falling back to score order"
            );
        }
        if let Some(limit) = max_concurrent {
            order.jobs.truncate(limit);
        }
        order
    }

    /// Changes a source's base priority, recording an audit entry.
    ///
    /// A no-op (no audit entry) when the priority is unchanged.
    pub fn adjust_priority(
        &self,
        name: &str,
        new_priority: PriorityLevel,
        reason: AdjustmentReason,
        note: Option<String>,
    ) -> Result<(), PriorityError> {
        let mut inner = self.lock();
        let source = inner
            .sources
            .get_mut(name)
            .ok_or_else(|| PriorityError::NotFound(name.to_string()))?;

        let old_priority = source.base_priority;
        if old_priority == new_priority {
            return Ok(());
        }

        source.base_priority = new_priority;
        let factor = new_priority.rank() as i8 - old_priority.rank() as i8;
        info!(
            source = name,
            old = %old_priority,
            new = %new_priority,
            reason = %reason,
            "Adjusted source priority"
        );
        inner.adjustments.push(PriorityAdjustment {
            source: name.to_string(),
            old_priority,
            new_priority,
            reason,
            factor,
            at: Utc::now(),
            note,
        });
        Ok(())
    }

    /// Records an execution outcome for a source.
    ///
    /// Feeds the performance sub-score. When the trailing error rate exceeds
    /// the configured threshold and auto-demotion is enabled, the source is
    /// demoted one level with reason [`AdjustmentReason::HighErrorRate`].
    pub fn record_outcome(
        &self,
        name: &str,
        success: bool,
        duration: Duration,
        error: Option<String>,
    ) -> Result<(), PriorityError> {
        let demote_to = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if !inner.sources.contains_key(name) {
                return Err(PriorityError::NotFound(name.to_string()));
            }

            let history = inner.histories.entry(name.to_string()).or_default();
            history.push(SourceOutcome {
                success,
                duration,
                error,
            });

            let error_rate = history.trailing_error_rate();
            let enough_samples = history.len() >= MIN_SAMPLES_FOR_DEMOTION;
            if self.config.auto_demote
                && enough_samples
                && error_rate > self.config.error_rate_threshold
            {
                let source = &inner.sources[name];
                let demoted = source.base_priority.demoted();
                (demoted != source.base_priority).then(|| (demoted, error_rate))
            } else {
                None
            }
        };

        if let Some((demoted, error_rate)) = demote_to {
            warn!(
                source = name,
                error_rate, "Error rate over threshold; demoting source"
            );
            self.adjust_priority(
                name,
                demoted,
                AdjustmentReason::HighErrorRate,
                Some(format!("trailing error rate {error_rate:.2}")),
            )?;
        }
        Ok(())
    }

    /// Re-checks every source's trailing error rate, demoting those over
    /// the threshold. Returns the names that were demoted.
    ///
    /// Called periodically by the runtime's auto-priority loop; redundant
    /// with the synchronous check in `record_outcome` but catches sources
    /// whose outcomes arrived while auto-demotion was disabled.
    pub fn review_error_rates(&self) -> Vec<String> {
        let over_threshold: Vec<(String, PriorityLevel, f64)> = {
            let inner = self.lock();
            inner
                .sources
                .values()
                .filter_map(|source| {
                    let history = inner.histories.get(&source.name)?;
                    if history.len() < MIN_SAMPLES_FOR_DEMOTION {
                        return None;
                    }
                    let rate = history.trailing_error_rate();
                    let demoted = source.base_priority.demoted();
                    (rate > self.config.error_rate_threshold
                        && demoted != source.base_priority)
                        .then(|| (source.name.clone(), demoted, rate))
                })
                .collect()
        };

        let mut adjusted = Vec::new();
        for (name, demoted, rate) in over_threshold {
            if self
                .adjust_priority(
                    &name,
                    demoted,
                    AdjustmentReason::HighErrorRate,
                    Some(format!("periodic review: trailing error rate {rate:.2}")),
                )
                .is_ok()
            {
                adjusted.push(name);
            }
        }
        adjusted
    }

    /// Enables or disables a source. Disabled sources are skipped by
    /// `optimized_order` but stay registered.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), PriorityError> {
        let mut inner = self.lock();
        let source = inner
            .sources
            .get_mut(name)
            .ok_or_else(|| PriorityError::NotFound(name.to_string()))?;
        source.enabled = enabled;
        Ok(())
    }

    /// Updates the available fraction of a resource kind, clamped to [0, 1].
    ///
    /// Fed by the monitor's system sampler so the resource sub-score tracks
    /// real load.
    pub fn set_resource_availability(&self, kind: ResourceKind, fraction: f64) {
        let mut inner = self.lock();
        inner.available.insert(kind, fraction.clamp(0.0, 1.0));
    }

    /// Returns a copy of a registered source, if present.
    pub fn source(&self, name: &str) -> Option<JobSource> {
        self.lock().sources.get(name).cloned()
    }

    /// Names of all registered sources, in registration order.
    pub fn source_names(&self) -> Vec<String> {
        let inner = self.lock();
        let mut sources: Vec<&JobSource> = inner.sources.values().collect();
        sources.sort_by_key(|s| s.registered_seq);
        sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Returns the full adjustment audit log.
    pub fn adjustment_history(&self) -> Vec<PriorityAdjustment> {
        self.lock().adjustments.clone()
    }

    /// Trailing error rate for a source, if registered.
    pub fn trailing_error_rate(&self, name: &str) -> Option<f64> {
        let inner = self.lock();
        inner.histories.get(name).map(|h| h.trailing_error_rate())
    }

    fn score_source(&self, inner: &Inner, source: &JobSource, now: DateTime<Utc>) -> PriorityScore {
        let importance = rating_score(source.importance);
        let urgency = rating_score(source.urgency);

        let performance = inner
            .histories
            .get(&source.name)
            .map(|h| h.performance_score())
            .unwrap_or(super::score::DEFAULT_PERFORMANCE_SCORE);

        let resource = if source.resource_requirements.is_empty() {
            1.0
        } else {
            let sum: f64 = source
                .resource_requirements
                .iter()
                .map(|(kind, required)| {
                    let available = inner.available.get(kind).copied().unwrap_or(1.0);
                    if *required <= available {
                        1.0
                    } else if *required > 0.0 {
                        available / required
                    } else {
                        1.0
                    }
                })
                .sum();
            sum / source.resource_requirements.len() as f64
        };

        let time = time_of_day_score(
            now,
            self.config.active_start_hour,
            self.config.active_end_hour,
        );

        PriorityScore::combine(importance, urgency, performance, resource, time)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PriorityManager {
    fn default() -> Self {
        Self::new(PriorityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PriorityManager {
        PriorityManager::default()
    }

    fn register_simple(m: &PriorityManager, name: &str, importance: u8, urgency: u8) {
        m.register(
            name,
            PriorityLevel::Normal,
            importance,
            urgency,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let m = manager();
        register_simple(&m, "quotes", 5, 5);
        let err = m
            .register(
                "quotes",
                PriorityLevel::Low,
                1,
                1,
                HashMap::new(),
                HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PriorityError::Duplicate(_)));
    }

    #[test]
    fn test_register_invalid_requirement() {
        let m = manager();
        let mut reqs = HashMap::new();
        reqs.insert(ResourceKind::Cpu, 1.5);
        let err = m
            .register(
                "heavy",
                PriorityLevel::Normal,
                5,
                5,
                reqs,
                HashSet::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PriorityError::InvalidRequirement { .. }));
    }

    #[test]
    fn test_score_unknown_source() {
        let m = manager();
        let err = m.score("nope", Utc::now()).unwrap_err();
        assert!(matches!(err, PriorityError::NotFound(_)));
    }

    #[test]
    fn test_score_within_bounds() {
        let m = manager();
        register_simple(&m, "a", 10, 10);
        let score = m.score("a", Utc::now()).unwrap();

        assert!(score.total >= 0.0 && score.total <= 1.0);
        for sub in [
            score.importance,
            score.urgency,
            score.performance,
            score.resource,
            score.time,
        ] {
            assert!((0.0..=1.0).contains(&sub), "sub-score out of range: {sub}");
        }
    }

    #[test]
    fn test_resource_subscore_degrades_when_scarce() {
        let m = manager();
        let mut reqs = HashMap::new();
        reqs.insert(ResourceKind::Cpu, 0.8);
        m.register("hungry", PriorityLevel::Normal, 5, 5, reqs, HashSet::new())
            .unwrap();

        let full = m.score("hungry", Utc::now()).unwrap();
        assert_eq!(full.resource, 1.0);

        m.set_resource_availability(ResourceKind::Cpu, 0.4);
        let scarce = m.score("hungry", Utc::now()).unwrap();
        assert!((scarce.resource - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_optimized_order_respects_dependency() {
        let m = manager();
        m.register(
            "A",
            PriorityLevel::Normal,
            9,
            8,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();
        m.register(
            "B",
            PriorityLevel::Normal,
            5,
            4,
            HashMap::new(),
            ["A".to_string()].into_iter().collect(),
        )
        .unwrap();

        let order = m.optimized_order(None, None);
        let names: Vec<_> = order.jobs.iter().map(|j| j.source.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(!order.has_cycles());
    }

    #[test]
    fn test_optimized_order_skips_disabled() {
        let m = manager();
        register_simple(&m, "a", 9, 9);
        register_simple(&m, "b", 5, 5);
        m.set_enabled("a", false).unwrap();

        let order = m.optimized_order(None, None);
        let names: Vec<_> = order.jobs.iter().map(|j| j.source.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_optimized_order_truncates() {
        let m = manager();
        register_simple(&m, "a", 9, 9);
        register_simple(&m, "b", 8, 8);
        register_simple(&m, "c", 7, 7);

        let order = m.optimized_order(None, Some(2));
        assert_eq!(order.jobs.len(), 2);
    }

    #[test]
    fn test_optimized_order_reports_cycles() {
        let m = manager();
        m.register(
            "x",
            PriorityLevel::Normal,
            8,
            8,
            HashMap::new(),
            ["y".to_string()].into_iter().collect(),
        )
        .unwrap();
        m.register(
            "y",
            PriorityLevel::Normal,
            6,
            6,
            HashMap::new(),
            ["x".to_string()].into_iter().collect(),
        )
        .unwrap();

        let order = m.optimized_order(None, None);
        assert!(order.has_cycles());
        assert_eq!(order.jobs.len(), 2);
    }

    #[test]
    fn test_adjust_priority_records_audit() {
        let m = manager();
        register_simple(&m, "a", 5, 5);

        m.adjust_priority("a", PriorityLevel::High, AdjustmentReason::Manual, None)
            .unwrap();

        let history = m.adjustment_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_priority, PriorityLevel::Normal);
        assert_eq!(history[0].new_priority, PriorityLevel::High);
        assert_eq!(history[0].factor, 1);
        assert_eq!(m.source("a").unwrap().base_priority, PriorityLevel::High);
    }

    #[test]
    fn test_adjust_priority_noop_when_unchanged() {
        let m = manager();
        register_simple(&m, "a", 5, 5);

        m.adjust_priority("a", PriorityLevel::Normal, AdjustmentReason::Manual, None)
            .unwrap();
        assert!(m.adjustment_history().is_empty());
    }

    #[test]
    fn test_record_outcome_auto_demotes() {
        let m = manager();
        register_simple(&m, "flaky", 5, 5);

        for _ in 0..8 {
            m.record_outcome(
                "flaky",
                false,
                Duration::from_millis(50),
                Some("boom".to_string()),
            )
            .unwrap();
        }

        // Sustained failures cascade one level per breach until Background.
        let source = m.source("flaky").unwrap();
        assert_eq!(source.base_priority, PriorityLevel::Background);

        let history = m.adjustment_history();
        assert!(!history.is_empty());
        assert_eq!(history[0].reason, AdjustmentReason::HighErrorRate);
        assert_eq!(history[0].old_priority, PriorityLevel::Normal);
        assert_eq!(history[0].new_priority, PriorityLevel::Low);
    }

    #[test]
    fn test_record_outcome_no_demotion_below_min_samples() {
        let m = manager();
        register_simple(&m, "young", 5, 5);

        for _ in 0..(MIN_SAMPLES_FOR_DEMOTION - 1) {
            m.record_outcome(
                "young",
                false,
                Duration::from_millis(5),
                Some("err".to_string()),
            )
            .unwrap();
        }
        assert_eq!(
            m.source("young").unwrap().base_priority,
            PriorityLevel::Normal
        );
    }

    #[test]
    fn test_record_outcome_unknown_source() {
        let m = manager();
        let err = m
            .record_outcome("nope", true, Duration::from_millis(1), None)
            .unwrap_err();
        assert!(matches!(err, PriorityError::NotFound(_)));
    }
}
