//! Human-readable names for streams.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Maps an SSRC onto a display label.
///
/// Consulted once, when a session is created.
pub trait LabelLookup: Send + Sync {
    fn label_for(&self, ssrc: u32) -> Option<String>;
}

/// No labels.
impl LabelLookup for () {
    fn label_for(&self, _ssrc: u32) -> Option<String> {
        None
    }
}

impl LabelLookup for HashMap<u32, String> {
    fn label_for(&self, ssrc: u32) -> Option<String> {
        self.get(&ssrc).cloned()
    }
}

/// A replaceable table of labels.
///
/// Whoever owns the label source (e.g., a file watched for changes) can
/// swap in a new table while the monitor runs. Existing sessions keep the
/// label they were created with.
#[derive(Debug, Default)]
pub struct StaticLabels {
    labels: RwLock<HashMap<u32, String>>,
}

impl StaticLabels {
    pub fn new(labels: HashMap<u32, String>) -> Self {
        Self {
            labels: RwLock::new(labels),
        }
    }

    /// Replaces every label at once.
    pub fn replace(&self, labels: HashMap<u32, String>) {
        *self.labels.write() = labels;
    }

    pub fn insert(&self, ssrc: u32, label: impl Into<String>) {
        self.labels.write().insert(ssrc, label.into());
    }

    pub fn len(&self) -> usize {
        self.labels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.read().is_empty()
    }
}

impl LabelLookup for StaticLabels {
    fn label_for(&self, ssrc: u32) -> Option<String> {
        self.labels.read().get(&ssrc).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaced_labels_are_seen() {
        let labels = StaticLabels::default();
        assert_eq!(labels.label_for(5), None);

        labels.insert(5, "Five");
        assert_eq!(labels.label_for(5).as_deref(), Some("Five"));

        labels.replace(HashMap::new());
        assert!(labels.is_empty());
        assert_eq!(labels.label_for(5), None);
    }

    #[test]
    fn maps_and_unit_are_lookups() {
        let mut map = HashMap::new();
        map.insert(1, "One".to_string());

        assert_eq!(map.label_for(1).as_deref(), Some("One"));
        assert_eq!(().label_for(1), None);
    }
}
