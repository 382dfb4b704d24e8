use std::collections::HashMap;

use uuid::Uuid;

use super::model::{CompositeKey, Violation};

/// Insertion-ordered, deduplicated collection of violations.
///
/// Two records are the same event when their server ids match, their local
/// ids match, or their `(student_id, violation_type, detected_at)` triples
/// match. A duplicate never adds a row; when it carries a server id and the
/// stored copy does not, it replaces the stored copy in place.
#[derive(Debug, Default, Clone)]
pub struct ViolationSet {
    items: Vec<Violation>,
    by_id: HashMap<i64, usize>,
    by_local: HashMap<Uuid, usize>,
    by_triple: HashMap<CompositeKey, usize>,
}

impl ViolationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `v` was new.
    pub fn insert(&mut self, v: Violation) -> bool {
        let triple = v.composite_key();
        let existing = v
            .id
            .and_then(|id| self.by_id.get(&id).copied())
            .or_else(|| v.local_id.and_then(|l| self.by_local.get(&l).copied()))
            .or_else(|| self.by_triple.get(&triple).copied());

        match existing {
            Some(idx) => {
                if self.items[idx].id.is_none() && v.id.is_some() {
                    let local_id = self.items[idx].local_id;
                    let mut upgraded = v;
                    if upgraded.local_id.is_none() {
                        upgraded.local_id = local_id;
                    }
                    self.index(idx, &upgraded);
                    self.items[idx] = upgraded;
                }
                false
            }
            None => {
                let idx = self.items.len();
                self.index(idx, &v);
                self.items.push(v);
                true
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = Violation>>(&mut self, it: I) -> usize {
        let mut added = 0;
        for v in it {
            if self.insert(v) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.items
    }

    fn index(&mut self, idx: usize, v: &Violation) {
        if let Some(id) = v.id {
            self.by_id.insert(id, idx);
        }
        if let Some(l) = v.local_id {
            self.by_local.insert(l, idx);
        }
        self.by_triple.insert(v.composite_key(), idx);
    }
}

impl FromIterator<Violation> for ViolationSet {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        let mut set = ViolationSet::new();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violations::model::{timestamp, Severity, ViolationType};

    fn v(id: Option<i64>, student: i64, at: &str) -> Violation {
        Violation {
            id,
            local_id: None,
            student_id: student,
            assignment_id: 7,
            violation_type: ViolationType::PasteDetected,
            description: String::new(),
            detected_at: timestamp::parse(at).expect("ts"),
            time_away_seconds: 0,
            severity: Severity::Low,
            content_added_during_absence: None,
            ai_similarity_score: None,
            paste_content_length: None,
            student_name: None,
            assignment_name: None,
            class_name: None,
        }
    }

    #[test]
    fn same_id_different_triple_collapses() {
        let mut set = ViolationSet::new();
        assert!(set.insert(v(Some(1), 5, "2024-01-01T00:00:00Z")));
        assert!(!set.insert(v(Some(1), 5, "2024-01-02T00:00:00Z")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn server_copy_upgrades_local_copy_in_place() {
        let mut local = v(None, 5, "2024-01-01T00:00:00Z");
        local.local_id = Some(Uuid::new_v4());
        let local_id = local.local_id;

        let mut set = ViolationSet::new();
        set.insert(v(Some(9), 6, "2024-01-01T00:00:00Z"));
        set.insert(local);
        assert!(!set.insert(v(Some(10), 5, "2024-01-01T00:00:00Z")));

        let items = set.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, Some(10));
        assert_eq!(items[1].local_id, local_id);
    }

    #[test]
    fn insertion_order_is_kept() {
        let set: ViolationSet = vec![
            v(Some(3), 1, "2024-01-03T00:00:00Z"),
            v(Some(1), 2, "2024-01-01T00:00:00Z"),
            v(Some(2), 3, "2024-01-02T00:00:00Z"),
        ]
        .into_iter()
        .collect();
        let ids: Vec<_> = set.iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![Some(3), Some(1), Some(2)]);
    }
}
