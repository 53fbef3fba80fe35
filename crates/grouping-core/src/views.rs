//! Read-only projections of the directory for admins and participants.

use crate::directory::MemberDirectory;
use crate::label::GroupLabel;
use crate::member::Member;
use serde::Serialize;

/// Who "I" am on the participant side: the name and optional birth tag the
/// participant registered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub birth: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, birth: Option<String>) -> Self {
        Self {
            name: name.into(),
            birth,
        }
    }

    fn matches(&self, member: &Member) -> bool {
        member.name == self.name.trim()
            && match &self.birth {
                Some(birth) => member.birth_tag.as_deref() == Some(birth.trim()),
                None => true,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub label: GroupLabel,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantView {
    pub me: Member,
    pub my_group: GroupView,
    pub other_groups: Vec<GroupView>,
}

/// Published groups in label order. Unassigned members are left out.
pub fn results_view(directory: &MemberDirectory) -> Vec<GroupView> {
    directory
        .grouped()
        .into_iter()
        .map(|(label, members)| GroupView { label, members })
        .collect()
}

pub fn unassigned(directory: &MemberDirectory) -> Vec<Member> {
    directory.unassigned().cloned().collect()
}

/// The participant's own group and everyone else's, or `None` while they
/// are not registered or still waiting for a group.
pub fn participant_view(directory: &MemberDirectory, identity: &Identity) -> Option<ParticipantView> {
    let me = directory
        .members()
        .find(|m| identity.matches(m) && m.is_assigned())?
        .clone();
    let my_label = me.group.clone()?;

    let mut my_group = None;
    let mut other_groups = Vec::new();
    for group in results_view(directory) {
        if group.label == my_label {
            my_group = Some(group);
        } else {
            other_groups.push(group);
        }
    }
    Some(ParticipantView {
        me,
        my_group: my_group?,
        other_groups,
    })
}

/// `mm:ss`; minutes keep counting past 59.
pub fn format_remaining(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{MemberId, MemberRecord};
    use crate::store::Snapshot;

    fn directory() -> MemberDirectory {
        let rows = [
            ("1", "Mina", Some("95"), "Group B"),
            ("2", "Jun", None, "Group A"),
            ("3", "Mina", Some("88"), "Group A"),
            ("4", "Ari", None, ""),
        ];
        let snapshot = Snapshot {
            revision: 1,
            members: rows
                .iter()
                .map(|(id, name, birth, group)| {
                    (
                        MemberId::new(*id),
                        MemberRecord {
                            name: name.to_string(),
                            birth: birth.map(str::to_string),
                            group: group.to_string(),
                        },
                    )
                })
                .collect(),
            next_expiry: None,
        };
        MemberDirectory::from_snapshot(&snapshot)
    }

    #[test]
    fn results_skip_unassigned() {
        let dir = directory();
        let groups = results_view(&dir);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, GroupLabel::ordinal(0));
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(unassigned(&dir).len(), 1);
    }

    #[test]
    fn participant_sees_own_group_first() {
        let dir = directory();
        let view = participant_view(&dir, &Identity::new("Mina", Some("95".into()))).unwrap();
        assert_eq!(view.my_group.label, GroupLabel::ordinal(1));
        assert_eq!(view.me.id, MemberId::new("1"));
        assert_eq!(view.other_groups.len(), 1);
        assert_eq!(view.other_groups[0].label, GroupLabel::ordinal(0));
    }

    #[test]
    fn birth_tag_disambiguates_same_name() {
        let dir = directory();
        let view = participant_view(&dir, &Identity::new("Mina", Some("88".into()))).unwrap();
        assert_eq!(view.my_group.label, GroupLabel::ordinal(0));
    }

    #[test]
    fn waiting_participant_has_no_view() {
        let dir = directory();
        assert!(participant_view(&dir, &Identity::new("Ari", None)).is_none());
        assert!(participant_view(&dir, &Identity::new("Nobody", None)).is_none());
    }

    #[test]
    fn remaining_time_format() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(59), "00:59");
        assert_eq!(format_remaining(600), "10:00");
        assert_eq!(format_remaining(3_725), "62:05");
    }
}
