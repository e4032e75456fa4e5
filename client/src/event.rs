use crate::{
    channel::ChannelEvent,
    input::InputEvent,
    scheduler::{Timer, TimerId},
};

/// everything the game loop reacts to. producers live on other threads, the loop owns all state.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Channel(ChannelEvent),
    Input(InputEvent),
    Timer(TimerId, Timer),
}
