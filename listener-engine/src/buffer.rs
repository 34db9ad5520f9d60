use crate::models::{Reading, Record};
use crate::registry::ChannelRegistry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

/// Completeness and capacity policy for one pump variant.
#[derive(Debug, Clone)]
pub struct BufferPolicy {
    /// Fields that should be present before a group is forwarded.
    pub required_fields: Vec<String>,
    /// How many required fields must actually be observed before the group
    /// becomes eligible (equal to `required_fields.len()` for the strict
    /// variant, lower for lenient variants that backfill the rest).
    pub threshold: usize,
    /// Fallback values applied to required fields still missing at
    /// eligibility time. Never overwrites an observed field.
    pub default_values: HashMap<String, f64>,
    /// Maximum number of live groups before staleness eviction kicks in.
    pub capacity: usize,
}

/// Why a reading was dropped instead of ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    MissingCorrelationKey,
    UnknownChannel(String),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCorrelationKey => write!(f, "missing correlation key"),
            Self::UnknownChannel(channel) => write!(f, "unknown channel '{channel}'"),
        }
    }
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// The group crossed the completeness threshold, was backfilled where
    /// needed, removed from the buffer, and its snapshot is ready to forward.
    Completed { key: String, record: Record },
    /// The reading was stored; the group is still waiting for more fields.
    Pending { key: String, present: usize },
    /// The reading was dropped (warned, not fatal).
    Discarded(DiscardReason),
}

/// Correlation-key grouping store. Owns all live groups; single consumer, so
/// no interior locking. A group leaves the buffer exactly once: either as a
/// completed snapshot handed back from `ingest`, or through staleness
/// eviction.
pub struct AggregationBuffer {
    registry: ChannelRegistry,
    policy: BufferPolicy,
    // BTreeMap over the correlation key: keys are sortable sampling instants,
    // so iteration order is oldest-first for eviction.
    groups: BTreeMap<String, Record>,
}

impl AggregationBuffer {
    pub fn new(registry: ChannelRegistry, policy: BufferPolicy) -> Self {
        Self {
            registry,
            policy,
            groups: BTreeMap::new(),
        }
    }

    /// Fold one reading into its group and evaluate eligibility.
    ///
    /// Last write wins per field. A completed group is removed here,
    /// unconditionally, before any forward attempt happens; the forward
    /// outcome never brings it back.
    pub fn ingest(&mut self, channel: &str, reading: Reading) -> Ingest {
        let Some(key) = reading.correlation_key else {
            return Ingest::Discarded(DiscardReason::MissingCorrelationKey);
        };
        let Some(field) = self.registry.field_for(channel) else {
            return Ingest::Discarded(DiscardReason::UnknownChannel(channel.to_string()));
        };
        let field = field.to_string();

        let created = !self.groups.contains_key(&key);
        let group = self.groups.entry(key.clone()).or_default();
        group.insert(field, reading.value);
        if created {
            debug!(%key, "group created");
        }

        let present = self
            .policy
            .required_fields
            .iter()
            .filter(|f| group.contains_key(f.as_str()))
            .count();

        if present >= self.policy.threshold {
            // Backfill on a snapshot, not on the stored group: if required
            // fields remain missing even after defaults, the group stays
            // pending with only its observed fields.
            let mut record = group.clone();
            let mut backfilled = 0usize;
            for required in &self.policy.required_fields {
                if !record.contains_key(required) {
                    if let Some(default) = self.policy.default_values.get(required) {
                        record.insert(required.clone(), serde_json::Value::from(*default));
                        backfilled += 1;
                    }
                }
            }

            if self
                .policy
                .required_fields
                .iter()
                .all(|f| record.contains_key(f))
            {
                self.groups.remove(&key);
                if backfilled > 0 {
                    info!(%key, backfilled, "backfilled missing fields from defaults");
                }
                return Ingest::Completed { key, record };
            }
            debug!(%key, present, "eligible but unfillable, group stays pending");
        }

        self.evict_stale();
        Ingest::Pending { key, present }
    }

    /// Number of live (incomplete) groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains_key(key)
    }

    /// Observed fields for a pending group, if it exists.
    pub fn group(&self, key: &str) -> Option<&Record> {
        self.groups.get(key)
    }

    /// Drop the oldest incomplete groups until the buffer is back under
    /// capacity. Everything still stored here is incomplete, so key order is
    /// the only criterion.
    fn evict_stale(&mut self) {
        while self.groups.len() > self.policy.capacity {
            if let Some((key, group)) = self.groups.pop_first() {
                warn!(%key, fields = group.len(), "evicting stale incomplete group");
            } else {
                break;
            }
        }
    }
}
