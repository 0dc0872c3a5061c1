use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Pickup library reference data plus per-location restrictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupLibraries {
    /// code -> display label
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
    /// Codes offered when no restriction applies.
    #[serde(default)]
    pub default: Vec<String>,
    /// Item location code -> the only codes it may be picked up at.
    #[serde(default)]
    pub restrictions: HashMap<String, Vec<String>>,
}

impl PickupLibraries {
    pub fn label<'a>(&'a self, code: &'a str) -> &'a str {
        self.libraries.get(code).map(String::as_str).unwrap_or(code)
    }

    /// Eligible pickup codes for an item at `location`. The current pickup
    /// library is always kept so a patron can leave it unchanged.
    pub fn options_for(&self, location: Option<&str>, current: Option<&str>) -> Vec<String> {
        let mut codes: Vec<String> = location
            .and_then(|loc| self.restrictions.get(loc))
            .cloned()
            .unwrap_or_else(|| {
                if self.default.is_empty() {
                    self.libraries.keys().cloned().collect()
                } else {
                    self.default.clone()
                }
            });

        if let Some(current) = current {
            if !codes.iter().any(|c| c == current) {
                codes.insert(0, current.to_string());
            }
        }
        codes
    }

    pub fn allowed(&self, location: Option<&str>, code: &str) -> bool {
        self.options_for(location, None).iter().any(|c| c == code)
    }

    /// Merges codes learned from the ILS (library list, service points) into
    /// the configured labels without overriding configured ones.
    pub fn merge_labels<I>(&mut self, labels: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (code, label) in labels {
            self.libraries.entry(code).or_insert(label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> PickupLibraries {
        let mut libraries = BTreeMap::new();
        libraries.insert("GREEN".to_string(), "Green Library".to_string());
        libraries.insert("MUSIC".to_string(), "Music Library".to_string());
        libraries.insert("ART".to_string(), "Art & Architecture Library".to_string());
        let mut restrictions = HashMap::new();
        restrictions.insert("PAGE-MU".to_string(), vec!["MUSIC".to_string()]);
        PickupLibraries {
            libraries,
            default: vec!["GREEN".to_string(), "ART".to_string()],
            restrictions,
        }
    }

    #[test]
    fn test_default_options() {
        let pickup = fixture();
        assert_eq!(pickup.options_for(Some("STACKS"), None), vec!["GREEN", "ART"]);
        assert!(pickup.allowed(None, "ART"));
        assert!(!pickup.allowed(None, "MUSIC"));
    }

    #[test]
    fn test_restricted_location() {
        let pickup = fixture();
        assert_eq!(pickup.options_for(Some("PAGE-MU"), None), vec!["MUSIC"]);
        assert!(!pickup.allowed(Some("PAGE-MU"), "GREEN"));
    }

    #[test]
    fn test_current_library_kept() {
        let pickup = fixture();
        assert_eq!(
            pickup.options_for(Some("PAGE-MU"), Some("GREEN")),
            vec!["GREEN", "MUSIC"]
        );
    }

    #[test]
    fn test_labels() {
        let mut pickup = fixture();
        assert_eq!(pickup.label("GREEN"), "Green Library");
        assert_eq!(pickup.label("EAST"), "EAST");
        pickup.merge_labels(vec![
            ("EAST".to_string(), "East Asia Library".to_string()),
            ("GREEN".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(pickup.label("EAST"), "East Asia Library");
        assert_eq!(pickup.label("GREEN"), "Green Library");
    }
}
