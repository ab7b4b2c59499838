//! Data structures shared by the extractor, the hosts file patcher and the
//! runtime seam.
//!
//! [`HostnameSet`] is the value that flows from container labels to the
//! managed region of the hosts file.  It is recomputed from scratch on every
//! reconciliation, so the types here carry no history.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

/// A deduplicated set of hostnames, iterated in ascending order.
///
/// Names are trimmed on insertion and empty names are dropped, so the set
/// never contains `""`.  Case is kept as declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HostnameSet(BTreeSet<String>);

impl HostnameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hostname, returning `true` if it was not already present.
    pub fn insert(&mut self, host: impl AsRef<str>) -> bool {
        let host = host.as_ref().trim();
        if host.is_empty() {
            return false;
        }
        self.0.insert(host.to_string())
    }

    pub fn contains(&self, host: &str) -> bool {
        self.0.contains(host)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hostnames in ascending lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Merges `other` into `self`. A host declared twice is kept once.
    pub fn union_with(&mut self, other: HostnameSet) {
        self.0.extend(other.0);
    }
}

impl<S: AsRef<str>> FromIterator<S> for HostnameSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = HostnameSet::new();
        for host in iter {
            set.insert(host);
        }
        set
    }
}

impl<S: AsRef<str>> Extend<S> for HostnameSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for host in iter {
            self.insert(host);
        }
    }
}

impl IntoIterator for HostnameSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for HostnameSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, host) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(host)?;
        }
        f.write_str("}")
    }
}

/// A running container as reported by the runtime.
///
/// Only the labels matter for hostname discovery; `id` and `name` are
/// carried for logging.
#[derive(Debug, Clone, Default)]
pub struct ContainerRecord {
    pub id: String,
    pub name: Option<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerRecord {
    /// Name without the leading `/` Docker adds, falling back to the short id.
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.is_empty() => name.trim_start_matches('/'),
            _ => short_id(&self.id),
        }
    }
}

/// Lifecycle actions that can change the set of declared hostnames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerAction {
    Start,
    Stop,
    Die,
}

impl ContainerAction {
    pub const ALL: [ContainerAction; 3] = [Self::Start, Self::Stop, Self::Die];

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "die" => Some(Self::Die),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message from the runtime's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub container_id: String,
    /// Raw action string, e.g. `start` or `health_status: healthy`.
    pub action: String,
}

impl RuntimeEvent {
    pub fn new(container_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            action: action.into(),
        }
    }
}

/// Subscription filter passed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub types: Vec<String>,
    pub actions: Vec<ContainerAction>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            types: vec!["container".to_string()],
            actions: ContainerAction::ALL.to_vec(),
        }
    }
}

impl EventFilter {
    /// Returns `true` if the event's action is one this filter subscribes to.
    ///
    /// Runtimes apply the filter server-side as well, but anything that slips
    /// through is checked again here.
    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        ContainerAction::parse(&event.action).is_some_and(|a| self.actions.contains(&a))
    }
}

/// First 12 characters of a container id, the form `docker ps` prints.
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
