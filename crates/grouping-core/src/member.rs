use crate::error::{GroupingError, Result};
use crate::label::GroupLabel;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// Opaque, store-assigned member identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a newly registered member.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MemberRecord (shape at rest)
// ---------------------------------------------------------------------------

/// A member as stored: `{name, birth?, group}` with `""` meaning unassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<String>,
    #[serde(default)]
    pub group: String,
}

impl MemberRecord {
    pub fn new(name: impl Into<String>, birth: Option<String>) -> Self {
        Self {
            name: name.into(),
            birth,
            group: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_tag: Option<String>,
    pub group: Option<GroupLabel>,
}

impl Member {
    pub fn from_record(id: MemberId, record: &MemberRecord) -> Self {
        Self {
            id,
            name: record.name.clone(),
            birth_tag: record.birth.clone().filter(|b| !b.is_empty()),
            group: GroupLabel::parse(&record.group),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.group.is_some()
    }

    /// `name(birth)` when a birth tag is present, otherwise just the name.
    pub fn display_name(&self) -> String {
        match &self.birth_tag {
            Some(birth) => format!("{}({birth})", self.name),
            None => self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registration input validation
// ---------------------------------------------------------------------------

pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GroupingError::InvalidMember("name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Birth tags are exactly two characters (e.g. the last two digits of a year).
pub fn validate_birth_tag(birth: Option<&str>) -> Result<Option<String>> {
    let Some(birth) = birth.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(None);
    };
    if birth.chars().count() != 2 {
        return Err(GroupingError::InvalidMember(format!(
            "birth tag '{birth}' must be exactly two characters"
        )));
    }
    Ok(Some(birth.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_without_group_is_unassigned() {
        let record: MemberRecord = serde_json::from_str(r#"{"name":"Mina"}"#).unwrap();
        let member = Member::from_record(MemberId::new("m1"), &record);
        assert!(!member.is_assigned());
        assert_eq!(member.birth_tag, None);
    }

    #[test]
    fn record_group_is_parsed() {
        let record = MemberRecord {
            name: "Jun".into(),
            birth: Some("92".into()),
            group: "Group C".into(),
        };
        let member = Member::from_record(MemberId::new("m2"), &record);
        assert_eq!(member.group, Some(GroupLabel::ordinal(2)));
        assert_eq!(member.display_name(), "Jun(92)");
    }

    #[test]
    fn record_omits_missing_birth() {
        let json = serde_json::to_string(&MemberRecord::new("Ari", None)).unwrap();
        assert_eq!(json, r#"{"name":"Ari","group":""}"#);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(MemberId::generate(), MemberId::generate());
    }

    #[test]
    fn name_validation_trims() {
        assert_eq!(validate_name("  Dana ").unwrap(), "Dana");
        assert!(matches!(
            validate_name("   "),
            Err(GroupingError::InvalidMember(_))
        ));
    }

    #[test]
    fn birth_tag_must_be_two_chars() {
        assert_eq!(validate_birth_tag(None).unwrap(), None);
        assert_eq!(validate_birth_tag(Some("")).unwrap(), None);
        assert_eq!(validate_birth_tag(Some("88")).unwrap(), Some("88".into()));
        assert!(validate_birth_tag(Some("1988")).is_err());
    }
}
