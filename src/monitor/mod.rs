//! Keyword monitoring.
//!
//! Watches incoming messages for short keyword triggers and relays a
//! formatted alert to the target group, suppressing repeats of the same
//! sender and text for a while.

mod dedup;
mod format;
mod handler;
mod matcher;

pub use dedup::{DedupKey, DedupStore};
pub use format::{AlertFormatter, UNKNOWN_SENDER, chat_link, display_name, message_link};
pub use handler::{InboundHandler, Outcome};
pub use matcher::{KeywordMatcher, matches, within_length};
