//! Notification routing: contacts, dispatchers, messages and templates.

pub mod channels;
pub mod contact;
pub mod dispatcher;
pub mod message;
pub mod template;

pub use contact::{Contact, ContactRef};
pub use dispatcher::{Deliver, Dispatcher, DispatcherRef};
pub use message::Message;
