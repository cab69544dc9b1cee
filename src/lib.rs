//! Registry of sound clips with favorites, persisted as JSON, and a single
//! session audio player on top of it.

pub mod backend;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod event;
pub mod media;
pub mod player;
pub mod service;
pub mod shared;
pub mod store;

pub use crate::{
    backend::Backend,
    event::{PlaybackEvent, SoundEvent},
    media::{SoundId, SoundRecord},
    service::{FilePicker, SoundService},
    store::Store,
};
