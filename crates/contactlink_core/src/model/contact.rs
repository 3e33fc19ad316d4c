//! Contact domain model.
//!
//! # Responsibility
//! - Define the single persisted record behind every identity cluster.
//! - Provide validation shared by repository write and read paths.
//!
//! # Invariants
//! - At least one of `email` / `phone_number` is present.
//! - A primary never carries `linked_id`.
//! - A secondary always links to another contact, never to itself.
//! - `deleted_at` is the source of truth for tombstone state.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Role of a contact inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Canonical, oldest contact of the cluster.
    Primary,
    /// Fragment linked to the cluster primary.
    Secondary,
}

impl LinkPrecedence {
    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Model-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Neither email nor phone number is set.
    MissingIdentifier,
    /// A primary contact carries a `linked_id`.
    PrimaryWithLink { linked_id: ContactId },
    /// A secondary contact has no `linked_id`.
    SecondaryWithoutLink,
    /// A secondary contact links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => {
                write!(f, "contact must have at least one of email or phone number")
            }
            Self::PrimaryWithLink { linked_id } => {
                write!(f, "primary contact must not link to another contact ({linked_id})")
            }
            Self::SecondaryWithoutLink => write!(f, "secondary contact must link to a primary"),
            Self::SelfLink(id) => write!(f, "contact {id} cannot link to itself"),
        }
    }
}

impl Error for ContactValidationError {}

/// Persisted contact fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Cluster primary for secondaries, `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Unix epoch milliseconds, immutable. Drives primary election.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Soft delete tombstone, unix epoch milliseconds.
    pub deleted_at: Option<i64>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Id of the primary this contact hangs off (itself for primaries).
    pub fn cluster_root(&self) -> ContactId {
        match self.link_precedence {
            LinkPrecedence::Primary => self.id,
            LinkPrecedence::Secondary => self.linked_id.unwrap_or(self.id),
        }
    }

    /// Age ordering key: older first, lower id breaks ties.
    pub fn age_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            Some(self.id),
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )
    }
}

/// Field set for a contact that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// Starts a new cluster.
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// Extends the cluster rooted at `primary_id`.
    pub fn secondary(
        primary_id: ContactId,
        email: Option<String>,
        phone_number: Option<String>,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_fields(
            None,
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )
    }
}

/// Precedence/link change applied by primary election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkUpdate {
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl LinkUpdate {
    pub fn promote() -> Self {
        Self {
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn link_to(primary_id: ContactId) -> Self {
        Self {
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary_id),
        }
    }

    pub fn validate(&self, id: ContactId) -> Result<(), ContactValidationError> {
        validate_link(Some(id), self.link_precedence, self.linked_id)
    }
}

fn validate_fields(
    id: Option<ContactId>,
    email: Option<&str>,
    phone_number: Option<&str>,
    link_precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    if email.is_none() && phone_number.is_none() {
        return Err(ContactValidationError::MissingIdentifier);
    }
    validate_link(id, link_precedence, linked_id)
}

fn validate_link(
    id: Option<ContactId>,
    link_precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    match (link_precedence, linked_id) {
        (LinkPrecedence::Primary, Some(linked_id)) => {
            Err(ContactValidationError::PrimaryWithLink { linked_id })
        }
        (LinkPrecedence::Secondary, None) => Err(ContactValidationError::SecondaryWithoutLink),
        (LinkPrecedence::Secondary, Some(linked_id)) if Some(linked_id) == id => {
            Err(ContactValidationError::SelfLink(linked_id))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ContactValidationError, LinkPrecedence, LinkUpdate, NewContact};

    #[test]
    fn new_contact_requires_an_identifier() {
        let err = NewContact::primary(None, None).validate().unwrap_err();
        assert_eq!(err, ContactValidationError::MissingIdentifier);

        NewContact::primary(None, Some("123".to_string()))
            .validate()
            .unwrap();
    }

    #[test]
    fn link_rules_are_enforced() {
        let mut primary = NewContact::primary(Some("a@x.io".to_string()), None);
        primary.linked_id = Some(4);
        assert!(matches!(
            primary.validate(),
            Err(ContactValidationError::PrimaryWithLink { linked_id: 4 })
        ));

        let mut secondary = NewContact::secondary(1, Some("a@x.io".to_string()), None);
        secondary.linked_id = None;
        assert_eq!(
            secondary.validate(),
            Err(ContactValidationError::SecondaryWithoutLink)
        );

        assert_eq!(
            LinkUpdate::link_to(7).validate(7),
            Err(ContactValidationError::SelfLink(7))
        );
        LinkUpdate::promote().validate(7).unwrap();
    }

    #[test]
    fn precedence_storage_names_are_stable() {
        for precedence in [LinkPrecedence::Primary, LinkPrecedence::Secondary] {
            assert_eq!(LinkPrecedence::parse(precedence.as_str()), Some(precedence));
        }
        assert_eq!(LinkPrecedence::parse("tertiary"), None);
    }
}
