//! Card discovery callback
//!
//! The reader layer calls [`ChannelHandler::on_channel_available`] each time
//! a contactless authenticator is presented. The handler owns the channel
//! from that point on and must close it when done.

use crate::channel::Channel;

/// Receiver of freshly connected channels
pub trait ChannelHandler {
    fn on_channel_available(&mut self, channel: Box<dyn Channel + Send>);
}

impl<F> ChannelHandler for F
where
    F: FnMut(Box<dyn Channel + Send>),
{
    fn on_channel_available(&mut self, channel: Box<dyn Channel + Send>) {
        self(channel)
    }
}
