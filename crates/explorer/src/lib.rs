//! CiteWeave Explorer Library
//!
//! Conversation views and the controller that expands their nodes.

pub mod controller;
pub mod locks;
pub mod view;

pub use controller::{
    ExpandParams, ExpansionController, ExpansionEvent, ExpansionOutcome, ExpansionStatus,
    ExpansionTicket,
};
pub use locks::{ExpansionGuard, NodeLocks, NodeState};
pub use view::{ConversationRegistry, ConversationView, ViewSnapshot, ViewState};
