//! Sound selection with a fallback chain that always ends in something the
//! user notices: selected sound, default alarm, default notification, then
//! vibration alone.

use crate::models::SoundSelector;
use crate::platform::{AudioOutput, Playback, SoundSource};
use log::{info, warn};
use url::Url;

/// Bundled presets: selector name and resource name.
pub const PRESET_SOUNDS: &[(&str, &str)] = &[
    ("rock_guitar", "alarm_rock_guitar"),
    ("metal_riff", "alarm_metal_riff"),
    ("tough_times", "alarm_tough_times"),
];

pub fn preset_resource(name: &str) -> Option<&'static str> {
    PRESET_SOUNDS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, resource)| *resource)
}

/// Sources to try for a selector, most preferred first.
pub fn candidate_sources(selector: &SoundSelector) -> Vec<SoundSource> {
    let mut sources = Vec::with_capacity(3);
    match selector {
        SoundSelector::Ringtone(None) => {}
        SoundSelector::Ringtone(Some(name)) => match preset_resource(name) {
            Some(resource) => sources.push(SoundSource::Preset(resource.to_string())),
            None => warn!("Unknown preset sound '{name}', using default"),
        },
        SoundSelector::Custom(uri) => match Url::parse(uri) {
            Ok(url) => sources.push(SoundSource::Uri(url)),
            Err(e) => warn!("Custom sound '{uri}' is not a valid URL ({e}), using default"),
        },
    }
    sources.push(SoundSource::DefaultAlarm);
    sources.push(SoundSource::DefaultNotification);
    sources
}

/// Whatever is currently making the phone ring.
pub struct ActivePlayback {
    pub source: Option<SoundSource>,
    sound: Option<Box<dyn Playback>>,
    vibration: Option<Box<dyn Playback>>,
}

impl ActivePlayback {
    pub fn is_silent(&self) -> bool {
        self.sound.is_none()
    }

    pub fn is_vibrating(&self) -> bool {
        self.vibration.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(mut sound) = self.sound.take() {
            sound.stop();
        }
        if let Some(mut vibration) = self.vibration.take() {
            vibration.stop();
        }
    }
}

/// Start looping audio for a ring. Never fails: with no playable source the
/// ring continues on vibration alone.
pub fn start_playback(audio: &dyn AudioOutput, selector: &SoundSelector, vibrate: bool) -> ActivePlayback {
    let mut started = None;
    for source in candidate_sources(selector) {
        match audio.play_looping(&source) {
            Ok(handle) => {
                started = Some((source, handle));
                break;
            }
            Err(e) => warn!("Sound {source:?} failed: {e}"),
        }
    }

    let (source, sound) = if let Some((source, handle)) = started {
        info!("Ringing with {source:?}");
        (Some(source), Some(handle))
    } else {
        warn!("No playable sound, ringing on vibration only");
        (None, None)
    };

    let vibration = (vibrate || sound.is_none()).then(|| audio.start_vibration());
    ActivePlayback {
        source,
        sound,
        vibration,
    }
}
