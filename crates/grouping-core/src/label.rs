use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const PREFIX: &str = "Group ";

// ---------------------------------------------------------------------------
// GroupLabel
// ---------------------------------------------------------------------------

/// Externally visible name of a group.
///
/// Labels the allocator creates are ordinal (`Group A`, `Group B`, …,
/// `Group Z`, `Group AA`, …) and order by that ordinal. Anything else read
/// back from the store is kept verbatim as `Named` and sorts after every
/// ordinal label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupLabel {
    Ordinal(usize),
    Named(String),
}

impl GroupLabel {
    pub fn ordinal(index: usize) -> Self {
        Self::Ordinal(index)
    }

    /// The first `count` ordinal labels.
    pub fn first(count: usize) -> impl Iterator<Item = GroupLabel> {
        (0..count).map(GroupLabel::Ordinal)
    }

    /// Parse a stored label. Empty strings mean "unassigned".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let ordinal = raw.strip_prefix(PREFIX).and_then(decode_letters);
        Some(match ordinal {
            Some(index) => Self::Ordinal(index),
            None => Self::Named(raw.to_string()),
        })
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(index) => write!(f, "{PREFIX}{}", encode_letters(*index)),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for GroupLabel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupLabel {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        GroupLabel::parse(&raw).ok_or_else(|| serde::de::Error::custom("empty group label"))
    }
}

// ---------------------------------------------------------------------------
// Bijective base-26 letters: 0 → A, 25 → Z, 26 → AA
// ---------------------------------------------------------------------------

fn encode_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn decode_letters(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut acc: usize = 0;
    for b in letters.bytes() {
        if !b.is_ascii_uppercase() {
            return None;
        }
        acc = acc.checked_mul(26)?.checked_add(usize::from(b - b'A') + 1)?;
    }
    Some(acc - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_labels_are_single_letters() {
        let labels: Vec<String> = GroupLabel::first(3).map(|l| l.to_string()).collect();
        assert_eq!(labels, ["Group A", "Group B", "Group C"]);
        assert_eq!(GroupLabel::ordinal(25).to_string(), "Group Z");
    }

    #[test]
    fn labels_continue_past_z() {
        assert_eq!(GroupLabel::ordinal(26).to_string(), "Group AA");
        assert_eq!(GroupLabel::ordinal(27).to_string(), "Group AB");
        assert_eq!(GroupLabel::ordinal(701).to_string(), "Group ZZ");
        assert_eq!(GroupLabel::ordinal(702).to_string(), "Group AAA");
    }

    #[test]
    fn parse_recovers_ordinals() {
        for index in [0, 1, 25, 26, 51, 702] {
            let label = GroupLabel::ordinal(index);
            assert_eq!(GroupLabel::parse(&label.to_string()), Some(label));
        }
    }

    #[test]
    fn parse_keeps_foreign_labels() {
        assert_eq!(
            GroupLabel::parse("Table 7"),
            Some(GroupLabel::Named("Table 7".into()))
        );
        assert_eq!(
            GroupLabel::parse("Group a"),
            Some(GroupLabel::Named("Group a".into()))
        );
        assert_eq!(GroupLabel::parse(""), None);
        assert_eq!(GroupLabel::parse("   "), None);
    }

    #[test]
    fn ordinal_labels_sort_before_named() {
        let mut labels = vec![
            GroupLabel::Named("Lobby".into()),
            GroupLabel::ordinal(26),
            GroupLabel::ordinal(2),
            GroupLabel::ordinal(0),
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![
                GroupLabel::ordinal(0),
                GroupLabel::ordinal(2),
                GroupLabel::ordinal(26),
                GroupLabel::Named("Lobby".into()),
            ]
        );
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&GroupLabel::ordinal(1)).unwrap();
        assert_eq!(json, "\"Group B\"");
        let parsed: GroupLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, GroupLabel::ordinal(1));
    }
}
