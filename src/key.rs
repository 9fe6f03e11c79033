//! Structural metric identity.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricProperty {
    pub key: String,
    pub value: String,
}

impl MetricProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// `(group, name, properties)`; equal keys name the same metric.
///
/// Properties are kept sorted by key and unique per key, so the order they
/// were supplied in does not matter. Keys order hierarchically: group and
/// name compare segment by segment on `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MetricKey {
    group: String,
    name: String,
    properties: Vec<MetricProperty>,
}

impl MetricKey {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        properties: impl IntoIterator<Item = MetricProperty>,
    ) -> Self {
        // Later duplicates win.
        let properties: BTreeMap<String, String> =
            properties.into_iter().map(|p| (p.key, p.value)).collect();

        Self {
            group: group.into(),
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(key, value)| MetricProperty { key, value })
                .collect(),
        }
    }

    pub fn simple(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(group, name, Vec::new())
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[MetricProperty] {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .binary_search_by(|p| p.key.as_str().cmp(key))
            .ok()
            .map(|i| self.properties[i].value.as_str())
    }

    /// `group.name`
    pub fn path(&self) -> String {
        format!("{}.{}", self.group, self.name)
    }
}

fn compare_dotted(a: &str, b: &str) -> Ordering {
    a.split('.').cmp(b.split('.'))
}

impl Ord for MetricKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_dotted(&self.group, &other.group)
            .then_with(|| compare_dotted(&self.name, &other.name))
            .then_with(|| self.properties.cmp(&other.properties))
    }
}

impl PartialOrd for MetricKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:name={}", self.group, self.name)?;
        for p in &self.properties {
            write!(f, ",{}={}", p.key, p.value)?;
        }
        Ok(())
    }
}
