use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        mpsc::{Receiver, Sender, channel},
    },
};

use log::{info, warn};
use thiserror::Error;

use crate::{
    decoder::{DecoderError, decode_file},
    event::PlaybackEvent,
    media::{MediaSpec, SoundId},
    player::{DeviceError, OutputDevice},
};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("sound file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: DecoderError,
    },
    #[error("sound not loaded: {0}")]
    NotLoaded(SoundId),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Decoded, in-memory form of a sound.
pub struct LoadedAudio {
    pub file_path: PathBuf,
    pub samples: Arc<[i32]>,
    pub spec: MediaSpec,
    pub duration: f64,
}

/// Decodes sound files and drives the output device, one session at a time.
///
/// Failures never escape: they turn into a `false` return plus a
/// [`PlaybackEvent::Error`] on the channel handed out by [`Backend::new`].
pub struct Backend {
    device: Box<dyn OutputDevice>,
    loaded: HashMap<SoundId, LoadedAudio>,
    current_playing: Option<SoundId>,
    tx: Sender<PlaybackEvent>,
}

impl Backend {
    pub fn new(device: Box<dyn OutputDevice>) -> (Self, Receiver<PlaybackEvent>) {
        let (tx, rx) = channel();
        let backend = Self {
            device,
            loaded: HashMap::new(),
            current_playing: None,
            tx,
        };
        (backend, rx)
    }

    fn emit(&self, event: PlaybackEvent) {
        // A dropped receiver only means nobody listens anymore.
        self.tx.send(event).ok();
    }

    fn fail(&self, id: &SoundId, err: &PlaybackError) {
        warn!("Playback error for sound {id}: {err}");
        self.emit(PlaybackEvent::Error(id.clone(), err.to_string()));
    }

    /// Decodes `file_path` and keeps it in memory under `id`.
    pub fn load(&mut self, id: &SoundId, file_path: &Path) -> bool {
        match Self::decode(file_path) {
            Ok(audio) => {
                info!(
                    "Loaded sound {id} from {} ({:.2}s)",
                    file_path.display(),
                    audio.duration
                );
                self.loaded.insert(id.clone(), audio);
                true
            }
            Err(e) => {
                self.fail(id, &e);
                false
            }
        }
    }

    fn decode(file_path: &Path) -> Result<LoadedAudio, PlaybackError> {
        if !file_path.is_file() {
            return Err(PlaybackError::FileNotFound(file_path.to_path_buf()));
        }

        let decoded = decode_file(file_path).map_err(|source| PlaybackError::Decode {
            path: file_path.to_path_buf(),
            source,
        })?;

        Ok(LoadedAudio {
            file_path: file_path.to_path_buf(),
            duration: decoded.duration_secs(),
            spec: decoded.spec,
            samples: decoded.samples.into(),
        })
    }

    /// Starts playing a loaded sound, stopping whatever plays now.
    pub fn play(&mut self, id: &SoundId) -> bool {
        let Some(audio) = self.loaded.get(id) else {
            self.fail(id, &PlaybackError::NotLoaded(id.clone()));
            return false;
        };
        let samples = audio.samples.clone();
        let spec = audio.spec;

        self.stop();

        if let Err(e) = self.device.play(samples, spec) {
            self.fail(id, &PlaybackError::from(e));
            return false;
        }

        info!("Playing sound {id}");
        self.current_playing = Some(id.clone());
        self.emit(PlaybackEvent::Started(id.clone()));
        true
    }

    pub fn stop(&mut self) {
        let Some(id) = self.current_playing.take() else {
            return;
        };

        self.device.stop_all();
        info!("Stopped sound {id}");
        self.emit(PlaybackEvent::Stopped(id));
    }

    /// Ends the session if the device ran out of samples on its own.
    pub fn refresh(&mut self) {
        if self.current_playing.is_some() && !self.device.is_active() {
            self.stop();
        }
    }

    pub fn get_duration(&self, id: &str) -> Option<f64> {
        self.loaded.get(id).map(|audio| audio.duration)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    pub fn loaded(&self, id: &str) -> Option<&LoadedAudio> {
        self.loaded.get(id)
    }

    /// Drops the decoded samples of `id`, stopping it first if it plays.
    pub fn unload(&mut self, id: &str) -> bool {
        if self.current_playing.as_ref().is_some_and(|c| c.as_str() == id) {
            self.stop();
        }
        self.loaded.remove(id).is_some()
    }

    pub fn current_playing(&self) -> Option<&SoundId> {
        self.current_playing.as_ref()
    }
}
