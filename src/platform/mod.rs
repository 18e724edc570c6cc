pub mod bridge;
pub mod timer_wheel;
pub mod types;

pub use bridge::ShellBridge;
pub use timer_wheel::ThreadTimers;
pub use types::{
    missing_permissions, AlertSurface, AudioError, AudioOutput, ChallengePresenter, Permission,
    PermissionProbe, Playback, SoundSource, TimerError, WakeLock, WakeLockProvider, WakeSlot,
    WakeTimerBackend,
};
