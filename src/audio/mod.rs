//! # Audio Module
//!
//! Effect sink for spoken cues and the on-target confirmation tone.
//!
//! Speech and tone synthesis live outside this crate; the core only calls
//! an [`Announcer`]. The binary uses [`LogAnnouncer`].

use tracing::info;

/// Speech and tone sink.
#[cfg_attr(test, mockall::automock)]
pub trait Announcer {
    /// Speak `text` with the named voice (empty = sink default) at `rate`.
    fn speak(&self, text: &str, voice: &str, rate: f32);

    /// Short two-tone chime for an on-target lap.
    fn play_confirm_tone(&self);
}

/// Announcer that writes every cue to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn speak(&self, text: &str, voice: &str, rate: f32) {
        if voice.is_empty() {
            info!("Announce: \"{}\" (rate {:.1})", text, rate);
        } else {
            info!("Announce: \"{}\" (voice {}, rate {:.1})", text, voice, rate);
        }
    }

    fn play_confirm_tone(&self) {
        info!("Announce: <confirm tone>");
    }
}

/// Spoken form of a coach level, optionally followed by its band.
///
/// # Examples
///
/// ```
/// use fpv_aid::audio::level_announcement;
///
/// assert_eq!(level_announcement(0, None), "Level 0");
/// assert_eq!(level_announcement(2, Some("faster than 17.0")), "Level plus 2, faster than 17.0");
/// assert_eq!(level_announcement(-1, None), "Level minus 1");
/// ```
pub fn level_announcement(level: i8, band: Option<&str>) -> String {
    let mut text = match level {
        0 => "Level 0".to_string(),
        l if l > 0 => format!("Level plus {}", l),
        l => format!("Level minus {}", l.unsigned_abs()),
    };
    if let Some(band) = band.filter(|b| !b.is_empty()) {
        text.push_str(", ");
        text.push_str(band);
    }
    text
}
