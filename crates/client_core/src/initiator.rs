use std::sync::Arc;

use shared::{
    domain::{ConversationId, UserId},
    protocol::InitiateConversationRequest,
};
use tracing::info;

use crate::{
    api::ChatApi,
    error::{ClientError, ValidationError},
};

/// Group being composed in the "new group" dialog. Discarded on submit or cancel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDraft {
    name: String,
    members: Vec<UserId>,
}

impl GroupDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        let mut draft = Self {
            name: name.into(),
            members: Vec::new(),
        };
        for member in members {
            if !draft.members.contains(&member) {
                draft.members.push(member);
            }
        }
        draft
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    pub fn is_selected(&self, member: &UserId) -> bool {
        self.members.contains(member)
    }

    /// Adds `member` if absent, removes it otherwise. Returns whether it is now selected.
    pub fn toggle_member(&mut self, member: UserId) -> bool {
        if let Some(index) = self.members.iter().position(|known| known == &member) {
            self.members.remove(index);
            false
        } else {
            self.members.push(member);
            true
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyGroupName);
        }
        if self.members.is_empty() {
            return Err(ValidationError::NoGroupMembers);
        }
        Ok(())
    }
}

pub struct ConversationInitiator {
    api: Arc<dyn ChatApi>,
    current_user: UserId,
}

impl ConversationInitiator {
    pub fn new(api: Arc<dyn ChatApi>, current_user: UserId) -> Self {
        Self { api, current_user }
    }

    /// Creates or reuses the direct conversation with `peer`.
    pub async fn start_direct(&self, peer: &UserId) -> Result<ConversationId, ClientError> {
        if peer.is_blank() {
            return Err(ValidationError::EmptyPeer.into());
        }
        let request = InitiateConversationRequest {
            participants: vec![self.current_user.clone(), peer.clone()],
            is_group: false,
            group_name: None,
        };
        let conversation_id = self.api.initiate_conversation(&request).await?;
        info!(conversation_id = %conversation_id, peer = %peer, "initiator: direct conversation ready");
        Ok(conversation_id)
    }

    /// Creates a group from `draft`. The current user is always a participant.
    pub async fn create_group(&self, draft: &GroupDraft) -> Result<ConversationId, ClientError> {
        draft.validate()?;

        let mut participants = draft.members().to_vec();
        if !participants.contains(&self.current_user) {
            participants.push(self.current_user.clone());
        }
        let request = InitiateConversationRequest {
            participants,
            is_group: true,
            group_name: Some(draft.name().trim().to_string()),
        };
        let conversation_id = self.api.initiate_conversation(&request).await?;
        info!(
            conversation_id = %conversation_id,
            members = request.participants.len(),
            "initiator: group created"
        );
        Ok(conversation_id)
    }
}

#[cfg(test)]
#[path = "tests/initiator_tests.rs"]
mod tests;
