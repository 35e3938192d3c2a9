//! Partial-update diffing
//!
//! Handlers compare each mutable field of the prior and desired config,
//! stage the changed ones into a single update request and skip the call
//! when nothing changed.

/// Names of the fields that differ between prior and desired
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    changed: Vec<&'static str>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `field` when the values differ; returns whether they do
    pub fn check<T: PartialEq + ?Sized>(
        &mut self,
        field: &'static str,
        prior: &T,
        desired: &T,
    ) -> bool {
        let changed = prior != desired;
        if changed {
            self.changed.push(field);
        }
        changed
    }

    /// Like [`Diff::check`], but an unset desired value means "keep whatever is there"
    pub fn check_set<T: PartialEq>(
        &mut self,
        field: &'static str,
        prior: &Option<T>,
        desired: &Option<T>,
    ) -> bool {
        match desired {
            Some(_) => self.check(field, prior, desired),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changed.contains(&field)
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.changed
    }

    pub fn into_fields(self) -> Vec<&'static str> {
        self.changed
    }
}
