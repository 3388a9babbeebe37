//! Telegram access.
//!
//! Defines the [`MessagingGateway`] capability the rest of the agent relies
//! on, and its implementation on top of an `MTProto` user session.

mod client;
mod gateway;
mod rate_limiter;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    PwdToken as PasswordToken, RawUpdatesReceiver, TelegramBot, TelegramError,
    Token as LoginToken,
};
pub use gateway::{
    DialogInfo, EntityInfo, GatewayError, InboundMessage, MessagingGateway, StoredMessage,
};
pub use rate_limiter::RateLimiter;
