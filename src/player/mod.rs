pub mod clock;
pub mod config;
pub mod control;
pub mod scheduler;
pub mod shared;
pub mod status;

pub use self::clock::{Clock, SystemClock};
pub use self::config::{Articulation, PlaybackSettings, PlayerConfig};
pub use self::control::{DeviceFactory, Player, StartError};
pub use self::scheduler::{Outcome, Scheduler};
pub use self::shared::{SpeedControl, StopFlag};
pub use self::status::Status;
