use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One swimmer's line in a saved heat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub stroke: String,
    /// Always "MM:SS,CC". Treat as a display string, not a number.
    pub time: String,
    pub feedback: String,
}

/// Finalized outcome of a heat, ready to hand to a [`crate::store::HeatSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatResult {
    pub distance: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "swimmers")]
    pub entries: Vec<HeatEntry>,
}

impl HeatResult {
    /// Entries belonging to one swimmer account (case-insensitive email match)
    pub fn entries_for_email<'a>(&'a self, email: &'a str) -> impl Iterator<Item = &'a HeatEntry> + 'a {
        self.entries.iter().filter(move |e| {
            e.email
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(email))
        })
    }
}

/// A heat as read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHeat {
    pub id: i64,
    /// Generated by the store when the heat was written
    pub timestamp: String,
    #[serde(flatten)]
    pub result: HeatResult,
}

impl StoredHeat {
    /// Copy of this heat narrowed down to one swimmer's entries
    pub fn narrowed_to_email(&self, email: &str) -> Option<StoredHeat> {
        let entries: Vec<HeatEntry> = self.result.entries_for_email(email).cloned().collect();
        if entries.is_empty() {
            return None;
        }
        Some(StoredHeat {
            id: self.id,
            timestamp: self.timestamp.clone(),
            result: HeatResult {
                distance: self.result.distance.clone(),
                date: self.result.date,
                entries,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, email: Option<&str>) -> HeatEntry {
        HeatEntry {
            name: name.to_string(),
            email: email.map(str::to_string),
            stroke: "Freestyle".to_string(),
            time: "00:31,20".to_string(),
            feedback: String::new(),
        }
    }

    fn result() -> HeatResult {
        HeatResult {
            distance: "50 m".to_string(),
            date: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
            entries: vec![
                entry("Ana", Some("Ana@Example.com")),
                entry("Leo", None),
                entry("Ana", Some("ana@example.com")),
            ],
        }
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!(json["distance"], "50 m");
        assert_eq!(json["date"], "2026-03-14T09:30:00Z");
        let swimmers = json["swimmers"].as_array().unwrap();
        assert_eq!(swimmers.len(), 3);
        assert_eq!(swimmers[0]["email"], "Ana@Example.com");
        assert!(swimmers[1].get("email").is_none());
        assert_eq!(swimmers[1]["time"], "00:31,20");
    }

    #[test]
    fn test_entries_for_email_ignores_case() {
        let result = result();
        assert_eq!(result.entries_for_email("ANA@example.com").count(), 2);
        assert_eq!(result.entries_for_email("leo@example.com").count(), 0);
    }

    #[test]
    fn test_narrowed_to_email() {
        let stored = StoredHeat {
            id: 7,
            timestamp: "2026-03-14 09:30:01".to_string(),
            result: result(),
        };
        let narrowed = stored.narrowed_to_email("ana@example.com").unwrap();
        assert_eq!(narrowed.id, 7);
        assert_eq!(narrowed.result.entries.len(), 2);
        assert!(stored.narrowed_to_email("nobody@example.com").is_none());
    }

    #[test]
    fn test_stored_heat_flattens_result() {
        let stored = StoredHeat {
            id: 1,
            timestamp: "2026-03-14 09:30:01".to_string(),
            result: result(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["timestamp"], "2026-03-14 09:30:01");
        assert_eq!(json["distance"], "50 m");
        assert!(json["swimmers"].is_array());
    }
}
