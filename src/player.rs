use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use thiserror::Error;

use crate::media::MediaSpec;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("output device unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Capability of submitting decoded samples to an audio output.
///
/// `play` returns once the device accepted the samples; output continues in
/// the background until it runs out or `stop_all` is called.
pub trait OutputDevice {
    fn play(&mut self, samples: Arc<[i32]>, spec: MediaSpec) -> Result<(), DeviceError>;
    fn stop_all(&mut self);
    /// Whether submitted samples are still being played.
    fn is_active(&self) -> bool;
}

/// Output used when no audio backend is compiled in. Rejects every request.
#[derive(Debug, Default)]
pub struct NoOutput;

impl OutputDevice for NoOutput {
    fn play(&mut self, _samples: Arc<[i32]>, _spec: MediaSpec) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable("no audio output backend compiled in".into()))
    }

    fn stop_all(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }
}

/// Waits while `running` holds, polling every `interval`.
///
/// Returns false when `stop` was raised before output ran out.
#[cfg_attr(not(feature = "alsa"), allow(dead_code))]
pub(crate) fn wait_for_tail(
    mut running: impl FnMut() -> bool,
    stop: &AtomicBool,
    interval: Duration,
) -> bool {
    while running() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(interval);
    }
    !stop.load(Ordering::Relaxed)
}

#[cfg(feature = "alsa")]
pub use self::alsa_output::AlsaOutput;

#[cfg(feature = "alsa")]
mod alsa_output {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread::JoinHandle,
        time::Duration,
    };

    use alsa::{
        Direction, PCM,
        pcm::{Access, Format, HwParams, State},
    };
    use anyhow::Result;
    use log::{debug, warn};

    use super::{DeviceError, OutputDevice, wait_for_tail};
    use crate::media::MediaSpec;

    // frames written per call, small enough to react to stop quickly
    const WRITE_CHUNK_FRAMES: usize = 1024;

    const TAIL_POLL: Duration = Duration::from_millis(10);

    struct ActivePlayback {
        stop: Arc<AtomicBool>,
        handle: JoinHandle<Result<()>>,
    }

    /// ALSA PCM output. Each submission opens the device, configures it for
    /// the clip and streams it from a worker thread.
    pub struct AlsaOutput {
        device_name: String,
        active: Option<ActivePlayback>,
    }

    impl AlsaOutput {
        pub fn new(device_name: impl Into<String>) -> Self {
            Self {
                device_name: device_name.into(),
                active: None,
            }
        }

        fn open(&self, spec: MediaSpec) -> Result<PCM, DeviceError> {
            let pcm = PCM::new(&self.device_name, Direction::Playback, false)
                .map_err(|e| DeviceError::Unavailable(format!("{}: {e}", self.device_name)))?;

            Self::pcm_hw_param(&pcm, spec.channel, spec.sample_rate)
                .map_err(|e| DeviceError::UnsupportedFormat(e.to_string()))?;
            Self::pcm_sw_param(&pcm).map_err(|e| DeviceError::UnsupportedFormat(e.to_string()))?;

            if !matches!(pcm.state(), State::Running | State::Prepared) {
                pcm.prepare()
                    .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
            }

            Ok(pcm)
        }

        fn pcm_hw_param(pcm: &PCM, channel: u32, rate: u32) -> Result<()> {
            let hwp = HwParams::any(pcm)?;
            hwp.set_channels(channel)?;
            hwp.set_rate(rate, alsa::ValueOr::Nearest)?;
            hwp.set_format(Format::S32LE)?;
            hwp.set_access(Access::RWInterleaved)?;
            pcm.hw_params(&hwp)?;
            Ok(())
        }

        fn pcm_sw_param(pcm: &PCM) -> Result<()> {
            let swp = pcm.sw_params_current()?;
            let hwp = pcm.hw_params_current()?;
            swp.set_start_threshold(hwp.get_buffer_size()?)?;
            pcm.sw_params(&swp)?;
            Ok(())
        }

        fn stream(pcm: PCM, samples: Arc<[i32]>, channel: usize, stop: Arc<AtomicBool>) -> Result<()> {
            let io = pcm.io_i32()?;
            let mut pos = 0;

            while pos < samples.len() {
                if stop.load(Ordering::Relaxed) {
                    pcm.drop()?;
                    return Ok(());
                }

                let end = samples.len().min(pos + WRITE_CHUNK_FRAMES * channel);
                match io.writei(&samples[pos..end]) {
                    Ok(frames) => pos += frames * channel,
                    Err(e) => pcm.try_recover(e, true)?,
                }
            }

            // Short clips may never reach the start threshold.
            if matches!(pcm.state(), State::Prepared) {
                pcm.start()?;
            }

            // Let the buffered tail play out without blocking in drain(), so a
            // stop still cuts it short. The stream ends in an underrun.
            wait_for_tail(|| matches!(pcm.state(), State::Running), &stop, TAIL_POLL);
            pcm.drop()?;
            Ok(())
        }
    }

    impl OutputDevice for AlsaOutput {
        fn play(&mut self, samples: Arc<[i32]>, spec: MediaSpec) -> Result<(), DeviceError> {
            self.stop_all();

            let pcm = self.open(spec)?;
            let stop = Arc::new(AtomicBool::new(false));
            let channel = spec.channel.max(1) as usize;

            let worker_stop = stop.clone();
            let handle = std::thread::Builder::new()
                .name("soundboard-output".into())
                .spawn(move || Self::stream(pcm, samples, channel, worker_stop))
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

            self.active = Some(ActivePlayback { stop, handle });
            Ok(())
        }

        fn stop_all(&mut self) {
            let Some(active) = self.active.take() else {
                return;
            };

            active.stop.store(true, Ordering::Relaxed);
            match active.handle.join() {
                Ok(Ok(())) => debug!("Output stopped"),
                Ok(Err(e)) => warn!("Output ended with error: {e:#}"),
                Err(_) => warn!("Output thread panicked"),
            }
        }

        fn is_active(&self) -> bool {
            self.active
                .as_ref()
                .is_some_and(|active| !active.handle.is_finished())
        }
    }

    impl Drop for AlsaOutput {
        fn drop(&mut self) {
            self.stop_all();
        }
    }
}
