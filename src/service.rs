use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    backend::Backend,
    event::{ListenerId, Listeners, PlaybackEvent, SoundEvent},
    media::{DEFAULT_CATEGORY, IdentifiedSound, SoundId, SoundRecord, format_duration, is_media_file},
    player::OutputDevice,
    store::Store,
};

/// Lets the user choose an audio file. `None` means the choice was cancelled.
pub trait FilePicker {
    fn pick_audio_file(&mut self) -> Option<PathBuf>;
}

impl<F> FilePicker for F
where
    F: FnMut() -> Option<PathBuf>,
{
    fn pick_audio_file(&mut self) -> Option<PathBuf> {
        self()
    }
}

/// Facade over the store and the playback backend used by presentation code.
///
/// The backend owns the session of file-backed sounds; the service only
/// tracks virtual sounds itself, so the two never disagree.
pub struct SoundService {
    store: Store,
    backend: Backend,
    playback_rx: Receiver<PlaybackEvent>,
    virtual_playing: Option<SoundId>,
    listeners: Listeners,
    default_category: u8,
}

impl SoundService {
    pub fn new(store: Store, device: Box<dyn OutputDevice>) -> Self {
        let (backend, playback_rx) = Backend::new(device);
        Self {
            store,
            backend,
            playback_rx,
            virtual_playing: None,
            listeners: Listeners::default(),
            default_category: DEFAULT_CATEGORY,
        }
    }

    pub fn with_default_category(mut self, category: u8) -> Self {
        self.default_category = category;
        self
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SoundEvent) + 'static) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn emit(&mut self, event: SoundEvent) {
        self.listeners.emit(&event);
    }

    /// Forwards what the backend reported since the last call.
    fn sync_playback(&mut self) {
        while let Ok(ev) = self.playback_rx.try_recv() {
            let started = match &ev {
                PlaybackEvent::Started(id) => {
                    self.virtual_playing = None;
                    Some(id.clone())
                }
                PlaybackEvent::Stopped(_) | PlaybackEvent::Error(..) => None,
            };

            self.emit(ev.into());
            if let Some(id) = started {
                self.emit(SoundEvent::SoundPlayed(id));
            }
        }
    }

    fn emit_updated(&mut self, id: &str) {
        if let Some(record) = self.store.get(id).cloned() {
            self.emit(SoundEvent::SoundUpdated(id.into(), record));
        }
    }

    pub fn add_sound(&mut self, id: SoundId, record: SoundRecord) {
        self.store.add_or_update(id.clone(), record.clone());
        self.emit(SoundEvent::SoundAdded(id, record));
    }

    /// Adds the file chosen by `picker` under a fresh id.
    ///
    /// The file is decoded right away to learn its duration; a file that fails
    /// to decode is still added, just without a duration.
    pub fn select_and_add_sound_file(&mut self, picker: &mut dyn FilePicker) -> Option<SoundId> {
        let Some(path) = picker.pick_audio_file() else {
            debug!("File selection cancelled");
            return None;
        };

        Some(self.add_sound_file(&path))
    }

    pub fn add_sound_file(&mut self, path: &Path) -> SoundId {
        let id = SoundId::generate();
        let mut record = SoundRecord::from_file(path, self.default_category);

        if self.backend.load(&id, path) {
            record.duration = self.backend.get_duration(id.as_str()).map(format_duration);
        }
        self.sync_playback();

        info!("Adding sound {id} ({})", path.display());
        self.add_sound(id.clone(), record);
        id
    }

    /// Adds every audio file below `dir`, in walk order.
    pub fn add_directory(&mut self, dir: &Path) -> Vec<SoundId> {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry below {}: {e}", dir.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_media_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        files.iter().map(|path| self.add_sound_file(path)).collect()
    }

    pub fn remove_sound(&mut self, id: &str) -> bool {
        if !self.store.contains(id) {
            return false;
        }

        if self.current_playing().is_some_and(|c| c.as_str() == id) {
            self.stop_sound();
        }
        self.backend.unload(id);
        self.sync_playback();

        self.store.remove(id);
        self.emit(SoundEvent::SoundRemoved(id.into()));
        true
    }

    /// Applies `edit` to a stored record. The id and favorite state stay as they are.
    pub fn update_sound(&mut self, id: &str, edit: impl FnOnce(&mut SoundRecord)) -> bool {
        let Some(mut record) = self.store.get(id).cloned() else {
            return false;
        };

        let favorite = record.favorite;
        let file_path = record.file_path.clone();
        edit(&mut record);
        // membership only changes through the favorite operations
        record.favorite = favorite;

        if record.file_path != file_path {
            debug!("Sound {id} now points at another file, dropping decoded samples");
            self.backend.unload(id);
            self.sync_playback();
        }

        self.store.add_or_update(id.into(), record.clone());
        self.emit(SoundEvent::SoundUpdated(id.into(), record));
        true
    }

    pub fn get_sound(&self, id: &str) -> Option<&SoundRecord> {
        self.store.get(id)
    }

    pub fn get_all_sounds(&self) -> &BTreeMap<SoundId, SoundRecord> {
        self.store.get_all()
    }

    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        if !self.store.contains(id) {
            return false;
        }

        let favorite = self.store.toggle_favorite(id);
        self.emit(if favorite {
            SoundEvent::FavoriteAdded(id.into())
        } else {
            SoundEvent::FavoriteRemoved(id.into())
        });
        self.emit_updated(id);
        favorite
    }

    pub fn add_to_favorites(&mut self, id: &str) -> bool {
        if !self.store.add_to_favorites(id) {
            return false;
        }

        self.emit(SoundEvent::FavoriteAdded(id.into()));
        self.emit_updated(id);
        true
    }

    pub fn remove_from_favorites(&mut self, id: &str) -> bool {
        if !self.store.remove_from_favorites(id) {
            return false;
        }

        self.emit(SoundEvent::FavoriteRemoved(id.into()));
        self.emit_updated(id);
        true
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.store.is_favorite(id)
    }

    pub fn list_favorites(&self) -> Vec<IdentifiedSound> {
        self.store.list_favorites()
    }

    /// Plays a stored sound, loading its file on first use.
    ///
    /// Virtual sounds only become the current session and raise
    /// [`SoundEvent::SoundPlayed`].
    pub fn play_sound(&mut self, id: &str) -> bool {
        let Some(record) = self.store.get(id) else {
            return false;
        };
        let id = SoundId::from(id);

        let Some(path) = record.file_path.clone() else {
            self.backend.stop();
            self.sync_playback();

            info!("Playing virtual sound {id}");
            self.virtual_playing = Some(id.clone());
            self.emit(SoundEvent::SoundPlayed(id));
            return true;
        };

        // Starting a file ends a virtual session even if the file then fails.
        self.virtual_playing = None;

        let cached = self
            .backend
            .loaded(id.as_str())
            .is_some_and(|audio| audio.file_path == path);
        let played = (cached || self.backend.load(&id, &path)) && self.backend.play(&id);
        self.sync_playback();
        played
    }

    pub fn stop_sound(&mut self) {
        self.backend.stop();
        self.virtual_playing = None;
        self.sync_playback();
    }

    /// Clears the session of a file-backed sound whose output has finished.
    pub fn poll_playback(&mut self) {
        self.backend.refresh();
        self.sync_playback();
    }

    pub fn current_playing(&self) -> Option<&SoundId> {
        self.backend
            .current_playing()
            .or(self.virtual_playing.as_ref())
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use tempfile::TempDir;

    use super::*;
    use crate::backend::tests::{DeviceCall, FakeDevice, write_wav};

    struct Fixture {
        dir: TempDir,
        device: FakeDevice,
        service: SoundService,
        events: Rc<RefCell<Vec<SoundEvent>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let device = FakeDevice::default();
            let store = Store::new(dir.path().join("data").join("sounds.json"));
            let mut service = SoundService::new(store, Box::new(device.clone()));

            let events = Rc::new(RefCell::new(Vec::new()));
            let sink = events.clone();
            service.subscribe(move |ev| sink.borrow_mut().push(ev.clone()));

            Self {
                dir,
                device,
                service,
                events,
            }
        }

        fn wav(&self, name: &str, frames: u32) -> PathBuf {
            let path = self.dir.path().join(name);
            write_wav(&path, 8000, frames);
            path
        }

        fn take_events(&self) -> Vec<SoundEvent> {
            self.events.borrow_mut().drain(..).collect()
        }
    }

    #[test]
    fn playing_unknown_sound_is_silent() {
        let mut fx = Fixture::new();
        assert!(!fx.service.play_sound("missing"));
        assert!(fx.take_events().is_empty());
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn picked_file_is_added_with_duration() {
        let mut fx = Fixture::new();
        let path = fx.wav("Air Horn.wav", 8000 * 65);

        let mut picker = || Some(path.clone());
        let id = fx.service.select_and_add_sound_file(&mut picker).unwrap();

        let record = fx.service.get_sound(id.as_str()).unwrap().clone();
        assert_eq!(record.title, "Air Horn");
        assert_eq!(record.category, DEFAULT_CATEGORY);
        assert_eq!(record.file_path.as_deref(), Some(path.as_path()));
        assert_eq!(record.duration.as_deref(), Some("1:05"));
        assert_eq!(fx.take_events(), vec![SoundEvent::SoundAdded(id, record)]);
    }

    #[test]
    fn cancelled_picker_adds_nothing() {
        let mut fx = Fixture::new();
        let mut picker = || None::<PathBuf>;
        assert_eq!(fx.service.select_and_add_sound_file(&mut picker), None);
        assert!(fx.service.get_all_sounds().is_empty());
        assert!(fx.take_events().is_empty());
    }

    #[test]
    fn undecodable_file_is_added_without_duration() {
        let mut fx = Fixture::new();
        let path = fx.dir.path().join("broken.mp3");
        std::fs::write(&path, b"garbage").unwrap();

        let id = fx.service.add_sound_file(&path);
        let record = fx.service.get_sound(id.as_str()).unwrap();
        assert_eq!(record.duration, None);

        let events = fx.take_events();
        assert!(matches!(&events[0], SoundEvent::PlaybackError(e, _) if *e == id));
        assert!(matches!(&events[1], SoundEvent::SoundAdded(e, _) if *e == id));
    }

    #[test]
    fn switching_sounds_stops_the_previous_one_once() {
        let mut fx = Fixture::new();
        let path = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&path, 1));
        fx.service.add_sound("b".into(), SoundRecord::from_file(&path, 1));
        fx.take_events();

        assert!(fx.service.play_sound("a"));
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::PlaybackStarted("a".into()),
                SoundEvent::SoundPlayed("a".into()),
            ]
        );

        assert!(fx.service.play_sound("b"));
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::PlaybackStopped("a".into()),
                SoundEvent::PlaybackStarted("b".into()),
                SoundEvent::SoundPlayed("b".into()),
            ]
        );
        assert_eq!(fx.service.current_playing(), Some(&SoundId::from("b")));
        assert_eq!(fx.service.backend().current_playing(), Some(&SoundId::from("b")));

        fx.service.stop_sound();
        assert_eq!(fx.take_events(), vec![SoundEvent::PlaybackStopped("b".into())]);
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn virtual_sound_play_is_simulated() {
        let mut fx = Fixture::new();
        fx.service.add_sound("v".into(), SoundRecord::new("Sample", 3));
        fx.take_events();

        assert!(fx.service.play_sound("v"));
        assert_eq!(fx.take_events(), vec![SoundEvent::SoundPlayed("v".into())]);
        assert_eq!(fx.service.current_playing(), Some(&SoundId::from("v")));
        assert!(fx.device.calls.borrow().is_empty());

        fx.service.stop_sound();
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn virtual_sound_interrupts_file_playback() {
        let mut fx = Fixture::new();
        let path = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&path, 1));
        fx.service.add_sound("v".into(), SoundRecord::new("Sample", 1));
        fx.service.play_sound("a");
        fx.take_events();

        assert!(fx.service.play_sound("v"));
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::PlaybackStopped("a".into()),
                SoundEvent::SoundPlayed("v".into()),
            ]
        );
        assert_eq!(fx.service.current_playing(), Some(&SoundId::from("v")));

        assert!(fx.service.play_sound("a"));
        assert_eq!(fx.service.current_playing(), Some(&SoundId::from("a")));
    }

    #[test]
    fn missing_file_fails_with_error() {
        let mut fx = Fixture::new();
        let path = fx.dir.path().join("gone.wav");
        fx.service.add_sound("g".into(), SoundRecord::from_file(&path, 1));
        fx.take_events();

        assert!(!fx.service.play_sound("g"));
        let events = fx.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SoundEvent::PlaybackError(id, _) if id.as_str() == "g"));
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn failed_file_play_ends_virtual_session() {
        let mut fx = Fixture::new();
        fx.service.add_sound("v".into(), SoundRecord::new("Sample", 1));
        let gone = fx.dir.path().join("gone.wav");
        fx.service.add_sound("g".into(), SoundRecord::from_file(&gone, 1));
        let clip = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&clip, 1));

        assert!(fx.service.play_sound("v"));
        assert!(!fx.service.play_sound("g"));
        assert_eq!(fx.service.current_playing(), None);

        assert!(fx.service.play_sound("v"));
        *fx.device.reject.borrow_mut() = true;
        assert!(!fx.service.play_sound("a"));
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn changed_file_path_is_decoded_again() {
        let mut fx = Fixture::new();
        let short = fx.wav("short.wav", 100);
        let long = fx.wav("long.wav", 999);
        fx.service.add_sound("s".into(), SoundRecord::from_file(&short, 1));

        assert!(fx.service.play_sound("s"));
        fx.take_events();

        assert!(fx.service.update_sound("s", |r| r.file_path = Some(long.clone())));
        assert_eq!(fx.take_events()[0], SoundEvent::PlaybackStopped("s".into()));
        assert_eq!(fx.service.current_playing(), None);
        assert!(!fx.service.backend().is_loaded("s"));

        assert!(fx.service.play_sound("s"));
        let played: Vec<_> = fx
            .device
            .calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Play { samples, .. } => Some(*samples),
                DeviceCall::StopAll => None,
            })
            .collect();
        assert_eq!(played, vec![100, 999]);
    }

    #[test]
    fn stale_cache_is_replaced_when_path_differs() {
        let mut fx = Fixture::new();
        let short = fx.wav("short.wav", 100);
        let long = fx.wav("long.wav", 999);
        fx.service.add_sound("s".into(), SoundRecord::from_file(&short, 1));
        assert!(fx.service.play_sound("s"));

        // bypasses update_sound, so the backend still holds the old samples
        fx.service.add_sound("s".into(), SoundRecord::from_file(&long, 1));
        assert!(fx.service.play_sound("s"));

        assert_eq!(fx.service.backend().loaded("s").unwrap().file_path, long);
        assert!(matches!(
            fx.device.calls.borrow().last(),
            Some(DeviceCall::Play { samples: 999, .. })
        ));
    }

    #[test]
    fn rejected_device_reports_error() {
        let mut fx = Fixture::new();
        let path = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&path, 1));
        fx.take_events();
        *fx.device.reject.borrow_mut() = true;

        assert!(!fx.service.play_sound("a"));
        assert!(matches!(&fx.take_events()[..], [SoundEvent::PlaybackError(id, _)] if id.as_str() == "a"));
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn favorite_changes_carry_the_updated_record() {
        let mut fx = Fixture::new();
        fx.service.add_sound("s1".into(), SoundRecord::new("Air Horn", 2));
        fx.take_events();

        assert!(fx.service.toggle_favorite("s1"));
        let starred = SoundRecord {
            favorite: true,
            ..SoundRecord::new("Air Horn", 2)
        };
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::FavoriteAdded("s1".into()),
                SoundEvent::SoundUpdated("s1".into(), starred),
            ]
        );

        assert!(!fx.service.add_to_favorites("s1"));
        assert!(fx.take_events().is_empty());

        assert!(fx.service.remove_from_favorites("s1"));
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::FavoriteRemoved("s1".into()),
                SoundEvent::SoundUpdated("s1".into(), SoundRecord::new("Air Horn", 2)),
            ]
        );

        assert!(!fx.service.toggle_favorite("unknown"));
        assert!(fx.take_events().is_empty());
    }

    #[test]
    fn removing_the_playing_sound_stops_it() {
        let mut fx = Fixture::new();
        let path = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&path, 1));
        fx.service.toggle_favorite("a");
        fx.service.play_sound("a");
        fx.take_events();

        assert!(fx.service.remove_sound("a"));
        assert_eq!(
            fx.take_events(),
            vec![
                SoundEvent::PlaybackStopped("a".into()),
                SoundEvent::SoundRemoved("a".into()),
            ]
        );
        assert_eq!(fx.service.current_playing(), None);
        assert!(!fx.service.backend().is_loaded("a"));
        assert!(fx.service.list_favorites().is_empty());
        assert!(!fx.service.remove_sound("a"));
    }

    #[test]
    fn edits_keep_id_and_favorite_state() {
        let mut fx = Fixture::new();
        fx.service.add_sound("s".into(), SoundRecord::new("Old", 1));
        fx.service.add_to_favorites("s");
        fx.take_events();

        assert!(fx.service.update_sound("s", |r| {
            r.title = "New".into();
            r.category = 5;
            r.favorite = false;
        }));

        let record = fx.service.get_sound("s").unwrap();
        assert_eq!(record.title, "New");
        assert_eq!(record.category, 5);
        assert!(record.favorite);
        assert!(fx.service.is_favorite("s"));
        assert!(matches!(&fx.take_events()[..], [SoundEvent::SoundUpdated(..)]));

        assert!(!fx.service.update_sound("nope", |r| r.title.clear()));
    }

    #[test]
    fn finished_output_clears_session_on_poll() {
        let mut fx = Fixture::new();
        let path = fx.wav("clip.wav", 800);
        fx.service.add_sound("a".into(), SoundRecord::from_file(&path, 1));
        fx.service.play_sound("a");
        fx.take_events();

        *fx.device.active.borrow_mut() = false;
        fx.service.poll_playback();
        assert_eq!(fx.take_events(), vec![SoundEvent::PlaybackStopped("a".into())]);
        assert_eq!(fx.service.current_playing(), None);
    }

    #[test]
    fn directory_import_adds_audio_files_only() {
        let mut fx = Fixture::new();
        let folder = fx.dir.path().join("folder");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        write_wav(&folder.join("b.wav"), 8000, 800);
        write_wav(&folder.join("nested").join("a.wav"), 8000, 800);
        std::fs::write(folder.join("readme.txt"), "hi").unwrap();

        let ids = fx.service.add_directory(&folder);
        assert_eq!(ids.len(), 2);

        let titles: Vec<_> = ids
            .iter()
            .map(|id| fx.service.get_sound(id.as_str()).unwrap().title.clone())
            .collect();
        assert_eq!(titles, vec!["b", "a"]);
    }
}
