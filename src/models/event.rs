//! Domain events that inform another user.
//!
//! Each variant carries the facts the triggering feature already resolved
//! (actor, recipient, headline). Title and body are rendered here, once,
//! and stored verbatim on the notification record.

use serde::{Deserialize, Serialize};

use super::metadata::EventMetadata;
use super::notification::NewNotification;
use crate::errors::AppError;

// ── Category tags ─────────────────────────────────────────────

pub const CATEGORY_LIKE: &str = "like";
pub const CATEGORY_COMMENT: &str = "comment";
pub const CATEGORY_REPLY: &str = "reply";
pub const CATEGORY_INVITE: &str = "invite";
pub const CATEGORY_REQUEST: &str = "request";
pub const CATEGORY_RESPONSE: &str = "response";
pub const CATEGORY_MEMBER_JOINED: &str = "member-joined";
pub const CATEGORY_INVITE_DECLINED: &str = "invite-declined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipDecision {
    Accepted,
    Rejected,
}

impl MembershipDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipDecision::Accepted => "accepted",
            MembershipDecision::Rejected => "rejected",
        }
    }
}

/// Typed input for the domain-event endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Someone liked an idea; the idea owner is told.
    IdeaLiked {
        actor_id: String,
        actor_name: String,
        owner_id: String,
        idea_id: String,
        headline: String,
    },
    IdeaCommented {
        actor_id: String,
        actor_name: String,
        owner_id: String,
        idea_id: String,
        headline: String,
    },
    CommentReplied {
        actor_id: String,
        actor_name: String,
        replied_to_id: String,
        idea_id: String,
        comment_excerpt: String,
        headline: String,
    },
    GroupInvite {
        inviter_id: String,
        invitee_id: String,
        invitee_name: String,
        group_id: String,
        member_id: String,
        idea_id: String,
        headline: String,
    },
    JoinRequested {
        requester_id: String,
        requester_name: String,
        admin_id: String,
        group_id: String,
        member_id: String,
        idea_id: String,
        headline: String,
    },
    MembershipResponse {
        admin_id: String,
        admin_name: String,
        requester_id: String,
        group_id: String,
        member_id: String,
        idea_id: String,
        headline: String,
        decision: MembershipDecision,
    },
    MemberJoined {
        member_user_id: String,
        member_name: String,
        admin_id: String,
        group_id: String,
        member_id: String,
        idea_id: String,
        headline: String,
    },
    /// An invitee turned the invitation down; the group admin is told.
    InvitationDeclined {
        invitee_id: String,
        invitee_name: String,
        admin_id: String,
        group_id: String,
        member_id: String,
        idea_id: String,
        headline: String,
    },
}

/// First word of a display name, used in the shorter like/comment bodies.
fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

impl DomainEvent {
    pub fn category(&self) -> &'static str {
        match self {
            DomainEvent::IdeaLiked { .. } => CATEGORY_LIKE,
            DomainEvent::IdeaCommented { .. } => CATEGORY_COMMENT,
            DomainEvent::CommentReplied { .. } => CATEGORY_REPLY,
            DomainEvent::GroupInvite { .. } => CATEGORY_INVITE,
            DomainEvent::JoinRequested { .. } => CATEGORY_REQUEST,
            DomainEvent::MembershipResponse { .. } => CATEGORY_RESPONSE,
            DomainEvent::MemberJoined { .. } => CATEGORY_MEMBER_JOINED,
            DomainEvent::InvitationDeclined { .. } => CATEGORY_INVITE_DECLINED,
        }
    }

    /// Render title/body and build the metadata. Group events use the group
    /// id as `typeId`; idea events use the idea id.
    pub fn into_notification(self) -> Result<NewNotification, AppError> {
        let category = self.category();
        let (title, body, metadata) = match self {
            DomainEvent::IdeaLiked {
                actor_id,
                actor_name,
                owner_id,
                idea_id,
                headline,
            } => (
                "Your Idea Got A Like",
                format!("{} Just Liked Your Idea {}", first_name(&actor_name), headline),
                EventMetadata::builder(owner_id, idea_id.clone())
                    .idea_id(idea_id)
                    .initiator_id(actor_id)
                    .display_name(actor_name)
                    .build()?,
            ),
            DomainEvent::IdeaCommented {
                actor_id,
                actor_name,
                owner_id,
                idea_id,
                headline,
            } => (
                "New Comment on your Idea",
                format!("{} Just Commented On {}", first_name(&actor_name), headline),
                EventMetadata::builder(owner_id, idea_id.clone())
                    .idea_id(idea_id)
                    .initiator_id(actor_id)
                    .display_name(actor_name)
                    .build()?,
            ),
            DomainEvent::CommentReplied {
                actor_id,
                actor_name,
                replied_to_id,
                idea_id,
                comment_excerpt,
                headline,
            } => (
                "New Reply on your Comment",
                format!(
                    "{} Just Replied Your Comment: {} On {}",
                    actor_name, comment_excerpt, headline
                ),
                EventMetadata::builder(replied_to_id, idea_id.clone())
                    .idea_id(idea_id)
                    .initiator_id(actor_id)
                    .display_name(actor_name)
                    .build()?,
            ),
            DomainEvent::GroupInvite {
                inviter_id,
                invitee_id,
                invitee_name,
                group_id,
                member_id,
                idea_id,
                headline,
            } => (
                "Invitation to Join Group",
                format!("You have been invited to join the group: {}", headline),
                EventMetadata::builder(invitee_id, group_id.clone())
                    .group_id(group_id)
                    .idea_id(idea_id)
                    .member_id(member_id)
                    .initiator_id(inviter_id)
                    .display_name(invitee_name)
                    .build()?,
            ),
            DomainEvent::JoinRequested {
                requester_id,
                requester_name,
                admin_id,
                group_id,
                member_id,
                idea_id,
                headline,
            } => (
                "Request to Join Group",
                format!("{} has requested to join the group: {}", requester_name, headline),
                EventMetadata::builder(admin_id, group_id.clone())
                    .group_id(group_id)
                    .idea_id(idea_id)
                    .member_id(member_id)
                    .initiator_id(requester_id)
                    .display_name(requester_name)
                    .build()?,
            ),
            DomainEvent::MembershipResponse {
                admin_id,
                admin_name,
                requester_id,
                group_id,
                member_id,
                idea_id,
                headline,
                decision,
            } => (
                "Membership Request Update",
                format!(
                    "Your membership request to join the group: {} has been {}.",
                    headline,
                    decision.as_str()
                ),
                EventMetadata::builder(requester_id, group_id.clone())
                    .group_id(group_id)
                    .idea_id(idea_id)
                    .member_id(member_id)
                    .initiator_id(admin_id)
                    .display_name(admin_name)
                    .build()?,
            ),
            DomainEvent::MemberJoined {
                member_user_id,
                member_name,
                admin_id,
                group_id,
                member_id,
                idea_id,
                headline,
            } => (
                "New Member Joined",
                format!(
                    "{} has just accepted the invitation to join the group: {}",
                    member_name, headline
                ),
                EventMetadata::builder(admin_id, group_id.clone())
                    .group_id(group_id)
                    .idea_id(idea_id)
                    .member_id(member_id)
                    .initiator_id(member_user_id)
                    .display_name(member_name)
                    .build()?,
            ),
            DomainEvent::InvitationDeclined {
                invitee_id,
                invitee_name,
                admin_id,
                group_id,
                member_id,
                idea_id,
                headline,
            } => (
                "Invitation Declined",
                format!(
                    "{} has declined the invitation to join the group: {}",
                    invitee_name, headline
                ),
                EventMetadata::builder(admin_id, group_id.clone())
                    .group_id(group_id)
                    .idea_id(idea_id)
                    .member_id(member_id)
                    .initiator_id(invitee_id)
                    .display_name(invitee_name)
                    .build()?,
            ),
        };

        Ok(NewNotification::new(title, category, body, metadata))
    }
}
