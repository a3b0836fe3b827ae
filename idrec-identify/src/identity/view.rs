//! Consolidated view of one cluster
//!
//! Ordering is derived here at read time and never stored: the primary's
//! own values come first, then the other members' values oldest first,
//! each value listed once.

use idrec_common::Contact;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedContact {
    pub primary_contact_id: i64,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<i64>,
}

impl ConsolidatedContact {
    /// View of a fresh cluster that has only its primary
    pub fn singleton(primary: &Contact) -> Self {
        Self::project(primary, std::slice::from_ref(primary))
    }

    /// Project `primary` and the other `members` of its cluster
    ///
    /// `members` may or may not include `primary` itself.
    pub fn project(primary: &Contact, members: &[Contact]) -> Self {
        let mut others: Vec<&Contact> = members.iter().filter(|c| c.id != primary.id).collect();
        others.sort_by_key(|c| c.age_key());

        let ordered: Vec<&Contact> = std::iter::once(primary).chain(others.iter().copied()).collect();

        Self {
            primary_contact_id: primary.id,
            emails: distinct(ordered.iter().filter_map(|c| c.email.as_deref())),
            phone_numbers: distinct(ordered.iter().filter_map(|c| c.phone_number.as_deref())),
            secondary_contact_ids: others.iter().map(|c| c.id).collect(),
        }
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use idrec_common::Link;

    fn contact(id: i64, minutes: i64, email: Option<&str>, phone: Option<&str>, link: Link) -> Contact {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        Contact {
            id,
            email: email.map(String::from),
            phone_number: phone.map(String::from),
            linked_id: link.linked_id(),
            link_precedence: link.precedence(),
            created_at: t,
            updated_at: t,
            deleted_at: None,
        }
    }

    #[test]
    fn test_singleton_with_missing_phone() {
        let p = contact(1, 0, Some("a@x.com"), None, Link::Primary);
        let view = ConsolidatedContact::singleton(&p);
        assert_eq!(
            view,
            ConsolidatedContact {
                primary_contact_id: 1,
                emails: vec!["a@x.com".to_string()],
                phone_numbers: vec![],
                secondary_contact_ids: vec![],
            }
        );
    }

    #[test]
    fn test_primary_values_first_even_when_not_oldest_row() {
        // Contact 2 predates its primary (a demoted-then-relinked history)
        let p = contact(5, 10, Some("p@x.com"), Some("555"), Link::Primary);
        let members = vec![
            contact(2, 0, Some("old@x.com"), Some("222"), Link::SecondaryOf(5)),
            p.clone(),
            contact(7, 20, Some("p@x.com"), Some("777"), Link::SecondaryOf(5)),
        ];

        let view = ConsolidatedContact::project(&p, &members);
        assert_eq!(view.primary_contact_id, 5);
        assert_eq!(view.emails, vec!["p@x.com", "old@x.com"]);
        assert_eq!(view.phone_numbers, vec!["555", "222", "777"]);
        assert_eq!(view.secondary_contact_ids, vec![2, 7]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let p = contact(1, 0, None, Some("111"), Link::Primary);
        let json = serde_json::to_value(ConsolidatedContact::singleton(&p)).unwrap();
        assert_eq!(json["primaryContactId"], 1);
        assert_eq!(json["phoneNumbers"][0], "111");
        assert!(json["emails"].as_array().unwrap().is_empty());
        assert!(json["secondaryContactIds"].as_array().unwrap().is_empty());
    }
}
