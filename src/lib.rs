pub mod config;
pub mod connection;
pub mod controls;
pub mod drift;
pub mod error;
pub mod events;
pub mod media;
pub mod playback;
pub mod protocol;
pub mod render;
pub mod settings;
pub mod timer;

#[doc(hidden)]
pub mod testkit;

pub mod tasks {
    pub mod input;
    pub mod session;
    pub mod socket;
}
