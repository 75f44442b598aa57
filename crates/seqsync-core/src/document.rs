//! Visible document projection

use crate::id::ElementId;
use serde::{Deserialize, Serialize};

/// One visible element as pushed to sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleElement {
    pub id: ElementId,
    pub value: String,
}

/// Ordered, non-tombstoned view of a replica.
///
/// Immutable once produced; readers never touch the replica itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Vec<VisibleElement>);

impl Document {
    pub fn new(elements: Vec<VisibleElement>) -> Self {
        Self(elements)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VisibleElement> {
        self.0.iter()
    }

    pub fn elements(&self) -> &[VisibleElement] {
        &self.0
    }

    /// Value-only projection, the shape persisted in snapshots
    pub fn values(&self) -> Vec<String> {
        self.0.iter().map(|e| e.value.clone()).collect()
    }

    /// Concatenated visible text
    pub fn text(&self) -> String {
        self.0.iter().map(|e| e.value.as_str()).collect()
    }
}

impl IntoIterator for Document {
    type Item = VisibleElement;
    type IntoIter = std::vec::IntoIter<VisibleElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a VisibleElement;
    type IntoIter = std::slice::Iter<'a, VisibleElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
