// Per-category achievement details
//
// Known categories carry a typed field set; everything else is kept as an
// opaque JSON map so new categories never lose data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const CATEGORY_COMPETITION: &str = "competition";
pub const CATEGORY_PUBLICATION: &str = "publication";
pub const CATEGORY_ORGANIZATION: &str = "organization";
pub const CATEGORY_CERTIFICATION: &str = "certification";

#[derive(Debug, Error)]
#[error("invalid {category} details: {reason}")]
pub struct DetailsError {
    pub category: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionLevel {
    International,
    National,
    Regional,
    Local,
}

impl CompetitionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionLevel::International => "international",
            CompetitionLevel::National => "national",
            CompetitionLevel::Regional => "regional",
            CompetitionLevel::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationType {
    Journal,
    Conference,
    Book,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionDetails {
    pub competition_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competition_level: Option<CompetitionLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<PublicationType>,
    pub publication_title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationDetails {
    pub organization_name: String,
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificationDetails {
    pub certification_name: String,
    pub issued_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Category plus its detail payload.
///
/// Serialized as two sibling keys, `achievement_type` and `details`, so it can
/// be flattened into the surrounding document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDetails", into = "RawDetails")]
pub enum AchievementDetails {
    Competition(CompetitionDetails),
    Publication(PublicationDetails),
    Organization(OrganizationDetails),
    Certification(CertificationDetails),
    Opaque {
        category: String,
        fields: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDetails {
    achievement_type: String,
    #[serde(default)]
    details: Map<String, Value>,
}

impl AchievementDetails {
    /// Build details from a category name and an untyped field map.
    pub fn from_category(category: &str, fields: Map<String, Value>) -> Result<Self, DetailsError> {
        fn typed<T: serde::de::DeserializeOwned>(
            category: &str,
            fields: Map<String, Value>,
        ) -> Result<T, DetailsError> {
            serde_json::from_value(Value::Object(fields)).map_err(|e| DetailsError {
                category: category.to_string(),
                reason: e.to_string(),
            })
        }

        let details = match category {
            CATEGORY_COMPETITION => Self::Competition(typed(category, fields)?),
            CATEGORY_PUBLICATION => Self::Publication(typed(category, fields)?),
            CATEGORY_ORGANIZATION => Self::Organization(typed(category, fields)?),
            CATEGORY_CERTIFICATION => Self::Certification(typed(category, fields)?),
            other => Self::Opaque {
                category: other.to_string(),
                fields,
            },
        };
        Ok(details)
    }

    pub fn opaque(category: &str) -> Self {
        Self::Opaque {
            category: category.to_string(),
            fields: Map::new(),
        }
    }

    pub fn category(&self) -> &str {
        match self {
            Self::Competition(_) => CATEGORY_COMPETITION,
            Self::Publication(_) => CATEGORY_PUBLICATION,
            Self::Organization(_) => CATEGORY_ORGANIZATION,
            Self::Certification(_) => CATEGORY_CERTIFICATION,
            Self::Opaque { category, .. } => category,
        }
    }

    pub fn competition_level(&self) -> Option<CompetitionLevel> {
        match self {
            Self::Competition(details) => details.competition_level,
            _ => None,
        }
    }

    /// Names of category-specific required fields that are blank or absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            Self::Competition(d) => {
                if is_blank(&d.competition_name) {
                    missing.push("competition_name");
                }
                if d.competition_level.is_none() {
                    missing.push("competition_level");
                }
            }
            Self::Publication(d) => {
                if is_blank(&d.publication_title) {
                    missing.push("publication_title");
                }
                if d.publication_type.is_none() {
                    missing.push("publication_type");
                }
            }
            Self::Organization(d) => {
                if is_blank(&d.organization_name) {
                    missing.push("organization_name");
                }
                if is_blank(&d.position) {
                    missing.push("position");
                }
            }
            Self::Certification(d) => {
                if is_blank(&d.certification_name) {
                    missing.push("certification_name");
                }
                if is_blank(&d.issued_by) {
                    missing.push("issued_by");
                }
            }
            Self::Opaque { .. } => {}
        }
        missing
    }

    fn fields(&self) -> Map<String, Value> {
        fn as_map<T: Serialize>(value: &T) -> Map<String, Value> {
            match serde_json::to_value(value) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            }
        }

        match self {
            Self::Competition(d) => as_map(d),
            Self::Publication(d) => as_map(d),
            Self::Organization(d) => as_map(d),
            Self::Certification(d) => as_map(d),
            Self::Opaque { fields, .. } => fields.clone(),
        }
    }
}

impl TryFrom<RawDetails> for AchievementDetails {
    type Error = DetailsError;

    fn try_from(raw: RawDetails) -> Result<Self, Self::Error> {
        Self::from_category(&raw.achievement_type, raw.details)
    }
}

impl From<AchievementDetails> for RawDetails {
    fn from(details: AchievementDetails) -> Self {
        RawDetails {
            achievement_type: details.category().to_string(),
            details: details.fields(),
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn test_competition_details_are_typed() {
        let details = AchievementDetails::from_category(
            "competition",
            object(json!({
                "competition_name": "National Robotics Cup",
                "competition_level": "national",
                "rank": 2,
                "sponsor": "ACME"
            })),
        )
        .unwrap();

        match &details {
            AchievementDetails::Competition(d) => {
                assert_eq!(d.competition_name, "National Robotics Cup");
                assert_eq!(d.competition_level, Some(CompetitionLevel::National));
                assert_eq!(d.rank, Some(2));
                assert_eq!(d.extra.get("sponsor"), Some(&json!("ACME")));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(details.missing_fields().is_empty());
        assert_eq!(details.competition_level(), Some(CompetitionLevel::National));
    }

    #[test]
    fn test_unknown_category_falls_back_to_opaque() {
        let details =
            AchievementDetails::from_category("hackathon", object(json!({"team": "blue"}))).unwrap();

        assert_eq!(details.category(), "hackathon");
        assert!(matches!(details, AchievementDetails::Opaque { .. }));
        assert!(details.missing_fields().is_empty());
    }

    #[test]
    fn test_missing_required_fields_are_reported() {
        let details = AchievementDetails::Certification(CertificationDetails {
            certification_name: "  ".to_string(),
            ..Default::default()
        });

        assert_eq!(details.missing_fields(), vec!["certification_name", "issued_by"]);
    }

    #[test]
    fn test_invalid_enum_value_is_rejected() {
        let result = AchievementDetails::from_category(
            "competition",
            object(json!({"competition_name": "X", "competition_level": "galactic"})),
        );

        let err = result.unwrap_err();
        assert_eq!(err.category, "competition");
    }

    #[test]
    fn test_serializes_as_type_and_details_keys() {
        let details = AchievementDetails::Organization(OrganizationDetails {
            organization_name: "Student Senate".to_string(),
            position: "Treasurer".to_string(),
            ..Default::default()
        });

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["achievement_type"], "organization");
        assert_eq!(value["details"]["position"], "Treasurer");

        let back: AchievementDetails = serde_json::from_value(value).unwrap();
        assert_eq!(back, details);
    }
}
