use std::collections::HashMap;

/// Static channel table for one pump variant: channel id -> semantic field
/// name, plus the optional per-channel backend route used by the secondary
/// forward. Pure data; unknown channels are simply `None`.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    entries: HashMap<String, ChannelEntry>,
}

#[derive(Debug, Clone)]
struct ChannelEntry {
    field: String,
    route: Option<String>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: impl Into<String>, field: impl Into<String>, route: Option<String>) {
        self.entries.insert(
            channel.into(),
            ChannelEntry {
                field: field.into(),
                route,
            },
        );
    }

    /// Semantic field name for a channel, `None` if the channel is unknown.
    pub fn field_for(&self, channel: &str) -> Option<&str> {
        self.entries.get(channel).map(|e| e.field.as_str())
    }

    /// Backend route for the per-channel secondary forward, if configured.
    pub fn route_for(&self, channel: &str) -> Option<&str> {
        self.entries.get(channel).and_then(|e| e.route.as_deref())
    }

    /// All channel ids, i.e. the subscription set for the supervisor.
    pub fn channels(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
