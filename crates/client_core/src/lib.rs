//! Messaging client core for the marketplace app: resolves a conversation
//! between a provider and a customer, loads and paginates history, sends
//! optimistically with rollback on failure, syncs read receipts, and projects
//! the timeline into a day-segmented render model.

pub mod backend;
pub mod client;
pub mod error;
pub mod store;
pub mod view;

pub use backend::{BackendConfig, ConversationBackend, HttpBackend};
pub use client::{
    ChatEvent, ConversationClient, ConversationTarget, SessionContext, DEFAULT_PAGE_SIZE,
};
pub use error::ChatError;
pub use store::MessageStore;
pub use view::{attribute, project_rows, Attribution, Row};

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod view_tests;

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod client_tests;

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod backend_tests;
