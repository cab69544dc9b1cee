use crate::media::{SoundId, SoundRecord};

/// Session changes reported by the playback backend over its channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(SoundId),
    Stopped(SoundId),
    Error(SoundId, String),
}

/// Notifications the sound service raises for presentation code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoundEvent {
    SoundAdded(SoundId, SoundRecord),
    SoundRemoved(SoundId),
    SoundUpdated(SoundId, SoundRecord),
    FavoriteAdded(SoundId),
    FavoriteRemoved(SoundId),
    SoundPlayed(SoundId),
    PlaybackStarted(SoundId),
    PlaybackStopped(SoundId),
    PlaybackError(SoundId, String),
}

impl From<PlaybackEvent> for SoundEvent {
    fn from(ev: PlaybackEvent) -> Self {
        match ev {
            PlaybackEvent::Started(id) => SoundEvent::PlaybackStarted(id),
            PlaybackEvent::Stopped(id) => SoundEvent::PlaybackStopped(id),
            PlaybackEvent::Error(id, message) => SoundEvent::PlaybackError(id, message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&SoundEvent)>;

/// Registered observers, called in subscription order.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn subscribe(&mut self, listener: impl FnMut(&SoundEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn emit(&mut self, event: &SoundEvent) {
        for (_, listener) in &mut self.entries {
            listener(event);
        }
    }
}
