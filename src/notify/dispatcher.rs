//! Dispatchers: keyed, pluggable delivery backends.
//!
//! A dispatcher's id is the route a contact names in its `use` field. The
//! delivery implementation is bound once; binding the same id to a different
//! implementation is rejected.

use std::fmt;
use std::sync::Arc;

use crate::core::errors::{BodewellError, Result};
use crate::core::keyed::{Entity, Keyed};
use crate::notify::contact::ContactRef;
use crate::notify::message::Message;

/// Delivers a message to one contact.
pub trait Deliver: Send + Sync {
    /// Hand `message` to `contact`. Errors are reported per contact.
    fn deliver(&self, contact: &ContactRef, message: &Message) -> Result<()>;
}

impl<F> Deliver for F
where
    F: Fn(&ContactRef, &Message) -> Result<()> + Send + Sync,
{
    fn deliver(&self, contact: &ContactRef, message: &Message) -> Result<()> {
        self(contact, message)
    }
}

/// Keyed dispatcher state: the bound implementation.
#[derive(Default)]
pub struct Dispatcher {
    delivery: Option<Arc<dyn Deliver>>,
}

/// Shared handle to a registered dispatcher.
pub type DispatcherRef = Arc<Entity<Dispatcher>>;

impl Keyed for Dispatcher {
    type Config = Arc<dyn Deliver>;

    fn create(_id: &str) -> Self {
        Self::default()
    }

    fn configure(&mut self, id: &str, delivery: Self::Config) -> Result<()> {
        match &self.delivery {
            Some(existing) if !Arc::ptr_eq(existing, &delivery) => {
                Err(BodewellError::DispatcherConflict { id: id.to_string() })
            }
            _ => {
                self.delivery = Some(delivery);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bound", &self.delivery.is_some())
            .finish()
    }
}

impl Entity<Dispatcher> {
    /// Deliver `message` to `contact` through the bound implementation.
    pub fn dispatch(&self, contact: &ContactRef, message: &Message) -> Result<()> {
        let delivery = self.read().delivery.clone();
        match delivery {
            Some(delivery) => delivery.deliver(contact, message),
            None => Err(BodewellError::Delivery {
                dispatcher: self.id().to_string(),
                contact: contact.id().to_string(),
                details: "no delivery implementation bound".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Deliver, Dispatcher};
    use crate::core::errors::Result;
    use crate::core::keyed::KeyedRegistry;
    use crate::notify::contact::{Contact, ContactRef};
    use crate::notify::message::Message;

    fn noop() -> Arc<dyn Deliver> {
        Arc::new(|_: &ContactRef, _: &Message| -> Result<()> { Ok(()) })
    }

    #[test]
    fn rebinding_a_different_implementation_conflicts() {
        let dispatchers = KeyedRegistry::<Dispatcher>::new();
        let first = noop();
        let second = noop();

        let bound = dispatchers
            .get_or_create("mail", Arc::clone(&first))
            .expect("bind");
        let again = dispatchers
            .get_or_create("mail", Arc::clone(&first))
            .expect("same implementation is idempotent");
        assert!(Arc::ptr_eq(&bound, &again));

        let err = dispatchers
            .get_or_create("mail", second)
            .expect_err("conflict");
        assert_eq!(err.code(), "BW-1102");
    }

    #[test]
    fn dispatch_calls_bound_implementation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatchers = KeyedRegistry::<Dispatcher>::new();
        let contacts = KeyedRegistry::<Contact>::new();
        let delivery: Arc<dyn Deliver> = Arc::new(move |_: &ContactRef, _: &Message| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mail = dispatchers.get_or_create("mail", delivery).expect("bind");
        let contact = contacts.select(["ops@example.com"]).remove(0);
        mail.dispatch(&contact, &Message::new("hello")).expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
