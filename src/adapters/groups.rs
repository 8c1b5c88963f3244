//! In-memory group directory.

use super::GroupDirectory;
use crate::models::{CollaboratorError, GroupId, GroupRef, ParticipantId};
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct GroupEntry {
    name: String,
    leaders: HashSet<ParticipantId>,
}

/// Groups and memberships kept in memory; membership can change at any time.
#[derive(Debug, Default)]
pub struct InMemoryGroupDirectory {
    groups: DashMap<GroupId, GroupEntry>,
    members: DashMap<ParticipantId, GroupId>,
}

impl InMemoryGroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group and return its id.
    pub fn create_group(&self, name: impl Into<String>) -> GroupId {
        let id = Uuid::new_v4();
        self.groups.insert(
            id,
            GroupEntry {
                name: name.into(),
                leaders: HashSet::new(),
            },
        );
        id
    }

    pub fn add_member(&self, group: GroupId, participant: ParticipantId) {
        self.members.insert(participant, group);
    }

    pub fn add_leader(&self, group: GroupId, participant: ParticipantId) {
        self.add_member(group, participant);
        if let Some(mut entry) = self.groups.get_mut(&group) {
            entry.leaders.insert(participant);
        }
    }

    pub fn remove_member(&self, participant: ParticipantId) {
        self.members.remove(&participant);
    }
}

impl GroupDirectory for InMemoryGroupDirectory {
    fn group_of(&self, participant: ParticipantId) -> Result<Option<GroupRef>, CollaboratorError> {
        let Some(group) = self.members.get(&participant).map(|g| *g) else {
            return Ok(None);
        };
        match self.groups.get(&group) {
            Some(entry) => Ok(Some(GroupRef {
                id: group,
                name: entry.name.clone(),
            })),
            None => Err(CollaboratorError::new(
                "groups",
                format!("participant {} points at unknown group {}", participant, group),
            )),
        }
    }

    fn is_leader_or_officer(&self, group: GroupId, participant: ParticipantId) -> bool {
        self.groups
            .get(&group)
            .map(|g| g.leaders.contains(&participant))
            .unwrap_or(false)
    }
}
