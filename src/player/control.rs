use super::clock::SystemClock;
use super::config::{PlaybackSettings, PlayerConfig};
use super::scheduler::{Outcome, Scheduler};
use super::shared::{SpeedControl, StopFlag};
use super::status::Status;
use crate::keys::{EnigoBackend, OutputDevice, OutputError};
use crate::midi;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

/// Opens the output device on the playback thread.
pub type DeviceFactory =
    Arc<dyn Fn() -> Result<Box<dyn OutputDevice>, OutputError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("Choose a .mid/.midi file first.")]
    MissingFile,
    #[error("already playing")]
    AlreadyPlaying,
    #[error("could not start playback thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Start/stop handle used by the control panel.
///
/// Lives on the GUI thread. Each run happens on its own background thread;
/// progress comes back through a status channel that the owner drains with
/// [`Player::poll_status`].
pub struct Player {
    config: PlayerConfig,
    connect: DeviceFactory,
    speed: Arc<SpeedControl>,
    stop: StopFlag,
    status_sender: Sender<Status>,
    status_receiver: Receiver<Status>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(config: PlayerConfig, connect: DeviceFactory) -> Self {
        let (status_tx, status_rx) = std::sync::mpsc::channel();
        Self {
            config,
            connect,
            speed: Arc::new(SpeedControl::default()),
            stop: StopFlag::new(),
            status_sender: status_tx,
            status_receiver: status_rx,
            worker: None,
        }
    }

    /// Shared speed control; writes take effect while playing.
    pub fn speed(&self) -> Arc<SpeedControl> {
        self.speed.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Status updates sent since the last call, oldest first.
    pub fn poll_status(&self) -> impl Iterator<Item = Status> + '_ {
        self.status_receiver.try_iter()
    }

    /// Begin playing `settings.path` on a background thread.
    ///
    /// Returns at once. A file that cannot be loaded is reported through the
    /// status channel, since loading happens on the playback thread.
    pub fn start(&mut self, settings: &PlaybackSettings) -> Result<(), StartError> {
        if self.is_playing() {
            self.send(Status::AlreadyPlaying);
            return Err(StartError::AlreadyPlaying);
        }
        if settings.path.as_os_str().is_empty() {
            return Err(StartError::MissingFile);
        }

        if let Some(finished) = self.worker.take() {
            let _ = finished.join();
        }
        self.stop.reset();

        let job = Job {
            settings: settings.clone(),
            config: self.config.clone(),
            connect: self.connect.clone(),
            speed: self.speed.clone(),
            stop: self.stop.clone(),
            status: self.status_sender.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || job.run())?;
        self.worker = Some(worker);
        log::info!("Playback requested for {}", settings.path.display());
        Ok(())
    }

    /// Ask the running playback to stop. Never blocks.
    pub fn stop(&self) {
        self.stop.request();
        if self.is_playing() {
            self.send(Status::Stopping);
        }
    }

    /// Stop and wait for the playback thread to release its keys.
    pub fn shutdown(&mut self) {
        self.stop.request();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Playback thread panicked during shutdown");
            }
        }
    }

    fn send(&self, status: Status) {
        // The receiver lives in self, so this only fails during teardown
        let _ = self.status_sender.send(status);
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(PlayerConfig::default(), Arc::new(EnigoBackend::connect))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything one playback run needs, moved onto its thread.
struct Job {
    settings: PlaybackSettings,
    config: PlayerConfig,
    connect: DeviceFactory,
    speed: Arc<SpeedControl>,
    stop: StopFlag,
    status: Sender<Status>,
}

impl Job {
    fn run(self) {
        let status = self.play();
        log::info!("Playback ended: {}", status);
        let _ = self.status.send(status);
    }

    fn play(&self) -> Status {
        let song = match midi::load(&self.settings.path) {
            Ok(song) => song,
            Err(e) => {
                log::error!("{}", e);
                return Status::Error(format!("MIDI error: {}", e));
            }
        };
        let device = match (self.connect)() {
            Ok(device) => device,
            Err(e) => {
                log::error!("{}", e);
                return Status::Error(e.to_string());
            }
        };

        let mut scheduler = Scheduler::new(
            device,
            SystemClock,
            &self.config,
            &self.settings,
            self.speed.clone(),
            self.stop.clone(),
        );

        let _ = self.status.send(Status::Starting {
            seconds: self.config.pre_roll.as_secs_f64(),
        });
        if !scheduler.pre_roll(self.config.pre_roll) {
            return Status::Stopped;
        }
        let _ = self.status.send(Status::Playing {
            seconds: song.duration() * self.speed.get(),
        });

        match panic::catch_unwind(AssertUnwindSafe(|| scheduler.play(&song.events))) {
            Ok(Outcome::Finished) => Status::Finished,
            Ok(Outcome::Stopped) => Status::Stopped,
            Err(payload) => {
                scheduler.release_all();
                let message = panic_message(payload.as_ref());
                log::error!("Playback failed: {}", message);
                Status::Error(format!("Playback failed: {}", message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}
