//! Contact persons owned by a business

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{EntityKind, Identity, Record, text_field};
use crate::onboarding::snapshot::{ArrayFieldPolicy, MalformedFieldError, array_elements};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A contact person of the business being onboarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPerson {
    #[serde(default = "Identity::new_temporary")]
    pub id: Identity,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub secondary_phone: String,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub anniversary: Option<NaiveDate>,
    /// Communication channel tags (e.g. "email", "whatsapp")
    #[serde(default)]
    pub channels: Vec<String>,
}

impl ContactPerson {
    pub fn set_identity(&mut self, id: Identity) {
        self.id = id;
    }

    /// Payload fields; the identity is never part of the payload
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), Value::String(self.name.clone()));
        record.insert("phone".into(), Value::String(self.phone.clone()));
        record.insert("email".into(), Value::String(self.email.clone()));
        record.insert("designation".into(), Value::String(self.designation.clone()));
        record.insert(
            "secondary_phone".into(),
            Value::String(self.secondary_phone.clone()),
        );
        record.insert("birthday".into(), date_value(self.birthday));
        record.insert("anniversary".into(), date_value(self.anniversary));
        record.insert(
            "channels".into(),
            Value::Array(self.channels.iter().cloned().map(Value::String).collect()),
        );
        record
    }

    /// Build a contact from a backend record
    pub fn from_record(
        record: &Record,
        policy: ArrayFieldPolicy,
    ) -> Result<Self, MalformedFieldError> {
        let channels = match record.get("channels") {
            Some(raw) => array_elements(EntityKind::Contact, "channels", raw, policy)?,
            None => Vec::new(),
        };

        Ok(Self {
            id: Identity::from_record(record).unwrap_or_else(Identity::new_temporary),
            name: text_field(record, "name"),
            phone: text_field(record, "phone"),
            email: text_field(record, "email"),
            designation: text_field(record, "designation"),
            secondary_phone: text_field(record, "secondary_phone"),
            birthday: parse_date(record, "birthday"),
            anniversary: parse_date(record, "anniversary"),
            channels,
        })
    }
}

fn date_value(date: Option<NaiveDate>) -> Value {
    match date {
        Some(date) => Value::String(date.format(DATE_FORMAT).to_string()),
        None => Value::Null,
    }
}

/// Accepts plain dates and timestamps ("2024-03-01T00:00:00Z")
fn parse_date(record: &Record, field: &str) -> Option<NaiveDate> {
    let text = text_field(record, field);
    let day = text.get(..10)?;
    match NaiveDate::parse_from_str(day, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(err) => {
            log::debug!("Ignoring unparseable {} '{}': {}", field, text, err);
            None
        }
    }
}

/// Contact list as edited in the form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactBook {
    contacts: Vec<ContactPerson>,
}

impl ContactBook {
    pub fn new(contacts: Vec<ContactPerson>) -> Self {
        Self { contacts }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContactPerson> {
        self.contacts.iter()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn as_slice(&self) -> &[ContactPerson] {
        &self.contacts
    }
}

#[cfg(test)]
impl ContactPerson {
    /// Empty contact with a fresh temporary identity
    pub fn new_draft() -> Self {
        Self {
            id: Identity::new_temporary(),
            name: String::new(),
            phone: String::new(),
            email: String::new(),
            designation: String::new(),
            secondary_phone: String::new(),
            birthday: None,
            anniversary: None,
            channels: Vec::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_temporary()
    }
}

#[cfg(test)]
impl ContactBook {
    pub fn add_draft(&mut self) -> &mut ContactPerson {
        self.contacts.push(ContactPerson::new_draft());
        let last = self.contacts.len() - 1;
        &mut self.contacts[last]
    }

    pub fn get_mut(&mut self, id: &Identity) -> Option<&mut ContactPerson> {
        self.contacts.iter_mut().find(|c| &c.id == id)
    }
}
