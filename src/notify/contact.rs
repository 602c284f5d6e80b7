//! Contacts: keyed notification targets.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::ContactFields;
use crate::core::errors::Result;
use crate::core::keyed::{Entity, Keyed};

/// Field naming the dispatcher route for a contact.
pub const ROUTE_FIELD: &str = "use";

/// A notification target. The id (address) lives on the owning [`Entity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    fields: BTreeMap<String, String>,
}

/// Shared handle to a registered contact.
pub type ContactRef = Arc<Entity<Contact>>;

impl Contact {
    /// Dispatcher id this contact wants, from its `use` field.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.field(ROUTE_FIELD)
    }

    /// One contact field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// All contact fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl Keyed for Contact {
    /// Fields to merge; `None` leaves the contact as is.
    type Config = Option<ContactFields>;

    fn create(_id: &str) -> Self {
        Self::default()
    }

    fn configure(&mut self, _id: &str, config: Self::Config) -> Result<()> {
        if let Some(fields) = config {
            self.fields.extend(fields);
        }
        Ok(())
    }
}
