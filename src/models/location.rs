//! Location model for forecast zones declared in a meteogram header

use serde::{Deserialize, Serialize};

/// A forecast zone of the meteogram export
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Location {
    /// Stable identifier used by threshold rules and alert records
    pub id: String,
    /// Human-readable name (city, region, etc.)
    pub name: String,
    /// Polygon identifier tying the location to its region in the export
    pub polygon: String,
}

impl Location {
    /// Create a new location
    #[must_use]
    pub fn new(id: impl Into<String>, polygon: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            polygon: polygon.into(),
        }
    }

    /// Whether a block header reference points at this location.
    ///
    /// Blocks usually reference the polygon, but the location id is accepted too.
    #[must_use]
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.polygon == reference || self.id == reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_polygon_or_id() {
        let location = Location::new("campinas", "P042", "Campinas");
        assert!(location.matches_reference("P042"));
        assert!(location.matches_reference("campinas"));
        assert!(!location.matches_reference("P043"));
    }
}
