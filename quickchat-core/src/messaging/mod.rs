//! Point-to-point messaging

mod channel;

pub use channel::MessageChannel;
