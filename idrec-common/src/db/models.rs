//! Contact data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Role of a contact within its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    /// Column value stored in `contacts.link_precedence`
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkPrecedence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "primary" => Ok(LinkPrecedence::Primary),
            "secondary" => Ok(LinkPrecedence::Secondary),
            other => Err(Error::Internal(format!("Unknown link precedence: {}", other))),
        }
    }
}

/// Link state written together, so a primary never carries a `linked_id`
/// and a secondary always does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Primary,
    SecondaryOf(i64),
}

impl Link {
    pub fn precedence(&self) -> LinkPrecedence {
        match self {
            Link::Primary => LinkPrecedence::Primary,
            Link::SecondaryOf(_) => LinkPrecedence::Secondary,
        }
    }

    pub fn linked_id(&self) -> Option<i64> {
        match self {
            Link::Primary => None,
            Link::SecondaryOf(id) => Some(*id),
        }
    }
}

/// One contact observation as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<i64>,
    pub link_precedence: LinkPrecedence,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Id of the cluster primary this contact belongs to
    ///
    /// A primary answers its own id, a secondary its `linked_id`.
    pub fn primary_id(&self) -> i64 {
        match self.link_precedence {
            LinkPrecedence::Primary => self.id,
            LinkPrecedence::Secondary => self.linked_id.unwrap_or(self.id),
        }
    }

    /// Ordering key for "oldest": `created_at` ascending, then `id`
    pub fn age_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }

    pub fn link(&self) -> Link {
        match (self.link_precedence, self.linked_id) {
            (LinkPrecedence::Secondary, Some(id)) => Link::SecondaryOf(id),
            _ => Link::Primary,
        }
    }
}

/// Fields for a contact about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link: Link,
}

impl NewContact {
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link: Link::Primary,
        }
    }

    pub fn secondary(email: Option<String>, phone_number: Option<String>, primary_id: i64) -> Self {
        Self {
            email,
            phone_number,
            link: Link::SecondaryOf(primary_id),
        }
    }
}

/// Partial update of one contact; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link: Option<Link>,
}

impl ContactUpdate {
    /// Raw field correction
    pub fn fields(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link: None,
        }
    }

    /// Demote or relink under `primary_id`
    pub fn link_to(primary_id: i64) -> Self {
        Self {
            link: Some(Link::SecondaryOf(primary_id)),
            ..Self::default()
        }
    }

    pub fn promote() -> Self {
        Self {
            link: Some(Link::Primary),
            ..Self::default()
        }
    }

    /// Apply to an in-memory row (used by stores to compute the new row)
    pub fn apply(&self, contact: &mut Contact, now: DateTime<Utc>) {
        if let Some(email) = &self.email {
            contact.email = Some(email.clone());
        }
        if let Some(phone_number) = &self.phone_number {
            contact.phone_number = Some(phone_number.clone());
        }
        if let Some(link) = self.link {
            contact.link_precedence = link.precedence();
            contact.linked_id = link.linked_id();
        }
        contact.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contact(id: i64, link: Link) -> Contact {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Contact {
            id,
            email: Some("a@x.com".to_string()),
            phone_number: None,
            linked_id: link.linked_id(),
            link_precedence: link.precedence(),
            created_at: t,
            updated_at: t,
            deleted_at: None,
        }
    }

    #[test]
    fn test_primary_id_resolution() {
        assert_eq!(contact(4, Link::Primary).primary_id(), 4);
        assert_eq!(contact(9, Link::SecondaryOf(4)).primary_id(), 4);
    }

    #[test]
    fn test_link_precedence_parse() {
        assert_eq!("primary".parse::<LinkPrecedence>().unwrap(), LinkPrecedence::Primary);
        assert_eq!("secondary".parse::<LinkPrecedence>().unwrap(), LinkPrecedence::Secondary);
        assert!("tertiary".parse::<LinkPrecedence>().is_err());
    }

    #[test]
    fn test_update_relink_clears_or_sets_linked_id() {
        let now = Utc::now();
        let mut c = contact(2, Link::Primary);
        ContactUpdate::link_to(1).apply(&mut c, now);
        assert_eq!(c.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(c.linked_id, Some(1));
        assert_eq!(c.updated_at, now);

        ContactUpdate::promote().apply(&mut c, now);
        assert!(c.is_primary());
        assert_eq!(c.linked_id, None);
    }

    #[test]
    fn test_update_fields_leaves_absent_columns() {
        let mut c = contact(1, Link::Primary);
        ContactUpdate::fields(None, Some("111".to_string())).apply(&mut c, Utc::now());
        assert_eq!(c.email.as_deref(), Some("a@x.com"));
        assert_eq!(c.phone_number.as_deref(), Some("111"));
    }

    #[test]
    fn test_contact_serializes_camel_case() {
        let json = serde_json::to_value(contact(3, Link::SecondaryOf(1))).unwrap();
        assert_eq!(json["linkPrecedence"], "secondary");
        assert_eq!(json["linkedId"], 1);
        assert!(json["phoneNumber"].is_null());
        assert!(json["deletedAt"].is_null());
        assert!(json["createdAt"].is_string());
    }
}
