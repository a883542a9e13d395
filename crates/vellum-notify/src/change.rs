use vellum_diff::PropertyChange;

/// What an observer is told about one version transition.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectChange {
    /// The observed row was deleted. This is the last delivery.
    Deleted,
    /// One or more fields changed. Nested fields are named by their own
    /// name and listed after the property that leads to them.
    Changed { properties: Vec<PropertyChange> },
}

impl ObjectChange {
    pub fn is_deleted(&self) -> bool {
        matches!(self, ObjectChange::Deleted)
    }

    /// The changed properties; empty for `Deleted`.
    pub fn properties(&self) -> &[PropertyChange] {
        match self {
            ObjectChange::Deleted => &[],
            ObjectChange::Changed { properties } => properties,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyChange> {
        self.properties().iter().find(|p| p.name == name)
    }
}
