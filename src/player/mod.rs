//! Playback controller for a single media element.
//!
//! The controller mirrors element events into its own state and turns user
//! intents (toggle, seek, skip, volume, fullscreen, quality) into element calls.
//! Element failures are logged and never change the last known state.

mod element;
mod keys;
mod quality;

pub use element::{MediaElement, MediaError};
pub use keys::{Key, KeyOutcome};
pub use quality::{
    source_url, PlaybackRequest, VideoQuality, VideoSource, DEFAULT_TITLE, DEFAULT_VIDEO_URL,
};

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const SKIP_SECONDS: f64 = 10.0;
pub const CONTROLS_IDLE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Loading,
    Playing,
    Paused,
    Ended,
}

/// Position and intent captured before a source swap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSwitch {
    time: f64,
    playing: bool,
}

#[derive(Debug)]
pub struct PlaybackController<E: MediaElement> {
    element: E,
    title: String,
    default_url: String,
    sources: Vec<VideoSource>,
    quality: VideoQuality,
    current_time: f64,
    duration: f64,
    progress: f64,
    buffered: f64,
    is_playing: bool,
    ended: bool,
    is_loaded: bool,
    volume: f64,
    is_muted: bool,
    is_fullscreen: bool,
    show_controls: bool,
    show_quality_menu: bool,
    controls_deadline: Option<Instant>,
    pending_switch: Option<PendingSwitch>,
}

impl<E: MediaElement> PlaybackController<E> {
    /// Starts loading the request's source at `auto` quality. Playback intent
    /// starts as "playing" so the first metadata event autoplays.
    pub fn new(mut element: E, request: &PlaybackRequest) -> Self {
        let sources = request.sources();
        let default_url = request.url().to_string();
        let quality = VideoQuality::Auto;
        element.load(source_url(&sources, quality, &default_url));
        info!("Opening player for '{}'", request.title());
        Self {
            element,
            title: request.title().to_string(),
            default_url,
            sources,
            quality,
            current_time: 0.0,
            duration: 0.0,
            progress: 0.0,
            buffered: 0.0,
            is_playing: true,
            ended: false,
            is_loaded: false,
            volume: 1.0,
            is_muted: false,
            is_fullscreen: false,
            show_controls: true,
            show_quality_menu: false,
            controls_deadline: None,
            pending_switch: None,
        }
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> PlaybackState {
        if !self.is_loaded {
            PlaybackState::Loading
        } else if self.ended {
            PlaybackState::Ended
        } else if self.is_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Playhead position in percent.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Buffered position in percent.
    pub fn buffered(&self) -> f64 {
        self.buffered
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn controls_visible(&self) -> bool {
        self.show_controls
    }

    pub fn quality_menu_open(&self) -> bool {
        self.show_quality_menu
    }

    pub fn quality(&self) -> VideoQuality {
        self.quality
    }

    pub fn current_url(&self) -> &str {
        source_url(&self.sources, self.quality, &self.default_url)
    }

    fn known_duration(&self) -> Option<f64> {
        (self.duration.is_finite() && self.duration > 0.0).then_some(self.duration)
    }

    fn ratio(&self, seconds: f64) -> f64 {
        match self.known_duration() {
            Some(d) => seconds / d * 100.0,
            None => 0.0,
        }
    }

    fn try_play(&mut self) {
        if let Err(e) = self.element.play() {
            warn!("Play failed: {}", e);
        }
    }

    // Element events

    pub fn on_loaded_metadata(&mut self) {
        self.duration = self.element.duration().unwrap_or(0.0);
        self.is_loaded = true;
        debug!(duration = self.duration, "Metadata loaded");

        if let Some(pending) = self.pending_switch.take() {
            let target = match self.known_duration() {
                Some(d) => pending.time.clamp(0.0, d),
                None => pending.time.max(0.0),
            };
            self.element.set_current_time(target);
            self.current_time = target;
            self.progress = self.ratio(target);
            if pending.playing {
                self.try_play();
            }
            self.is_playing = pending.playing;
        } else if self.element.is_paused() && self.is_playing {
            self.try_play();
        }
    }

    pub fn on_time_update(&mut self) {
        self.current_time = self.element.current_time();
        self.progress = self.ratio(self.current_time);
        if let Some(end) = self.element.buffered_end() {
            self.buffered = self.ratio(end);
        }
    }

    pub fn on_ended(&mut self) {
        self.is_playing = false;
        self.ended = true;
        self.show_controls = true;
        self.controls_deadline = None;
    }

    pub fn on_error(&mut self, error: &MediaError) {
        warn!("Media error for '{}': {}", self.title, error);
    }

    /// Host-side fullscreen change (e.g. the user pressed the browser's own exit).
    pub fn on_fullscreen_change(&mut self, active: bool) {
        self.is_fullscreen = active;
    }

    // User intents

    pub fn toggle_play(&mut self) {
        if self.is_playing {
            self.element.pause();
        } else {
            self.try_play();
            self.ended = false;
        }
        self.is_playing = !self.is_playing;
    }

    /// Seeks to `fraction` of the duration. No-op until the duration is known.
    pub fn seek_to_fraction(&mut self, fraction: f64) {
        let Some(duration) = self.known_duration() else {
            return;
        };
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let target = fraction * duration;
        self.element.set_current_time(target);
        self.current_time = target;
        self.progress = fraction * 100.0;
        self.ended = false;
    }

    /// Translates a click at `x` on a progress bar spanning `[left, left + width]`.
    pub fn seek_click(&mut self, x: f64, left: f64, width: f64) {
        if !(width.is_finite() && width > 0.0) {
            return;
        }
        self.seek_to_fraction((x - left) / width);
    }

    /// Moves the playhead by `delta` seconds, clamped to `[0, duration]`.
    pub fn skip(&mut self, delta: f64) {
        let Some(duration) = self.known_duration() else {
            return;
        };
        if !delta.is_finite() {
            return;
        }
        let target = (self.element.current_time() + delta).clamp(0.0, duration);
        self.element.set_current_time(target);
        self.current_time = target;
        self.progress = self.ratio(target);
        if target < duration {
            self.ended = false;
        }
    }

    pub fn skip_forward(&mut self) {
        self.skip(SKIP_SECONDS);
    }

    pub fn skip_backward(&mut self) {
        self.skip(-SKIP_SECONDS);
    }

    /// Zero mutes, anything above unmutes.
    pub fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.element.set_volume(volume);
        self.volume = volume;
        self.is_muted = volume == 0.0;
        self.element.set_muted(self.is_muted);
    }

    pub fn toggle_mute(&mut self) {
        self.is_muted = !self.is_muted;
        self.element.set_muted(self.is_muted);
    }

    pub fn toggle_fullscreen(&mut self) {
        if self.is_fullscreen {
            self.exit_fullscreen();
        } else {
            match self.element.request_fullscreen() {
                Ok(()) => self.is_fullscreen = true,
                Err(e) => warn!("{}", e),
            }
        }
    }

    pub fn exit_fullscreen(&mut self) {
        if !self.is_fullscreen {
            return;
        }
        match self.element.exit_fullscreen() {
            Ok(()) => self.is_fullscreen = false,
            Err(e) => warn!("{}", e),
        }
    }

    pub fn toggle_quality_menu(&mut self) {
        self.show_quality_menu = !self.show_quality_menu;
    }

    /// Swaps the source and restores position and play intent once the new
    /// source reports metadata.
    pub fn change_quality(&mut self, quality: VideoQuality) {
        self.show_quality_menu = false;
        if quality == self.quality {
            return;
        }
        // A switch that has not reached metadata yet already holds the
        // position; the element is back at zero after its load.
        if self.pending_switch.is_none() {
            self.pending_switch = Some(PendingSwitch {
                time: self.element.current_time(),
                playing: self.is_playing,
            });
        }
        self.quality = quality;
        self.is_loaded = false;
        let url = source_url(&self.sources, quality, &self.default_url).to_string();
        info!("Switching '{}' to {}", self.title, quality.label());
        self.element.load(&url);
    }

    // Controls overlay

    /// Shows the controls and re-arms the idle timer.
    pub fn pointer_moved(&mut self, now: Instant) {
        self.show_controls = true;
        self.controls_deadline = Some(now + CONTROLS_IDLE);
    }

    /// Clicking the surface closes the quality menu and reveals the controls.
    pub fn surface_clicked(&mut self, now: Instant) {
        self.show_quality_menu = false;
        self.pointer_moved(now);
    }

    /// Hides the controls (and the quality menu) once the idle window has
    /// passed while playing.
    pub fn tick(&mut self, now: Instant) {
        let Some(deadline) = self.controls_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        self.controls_deadline = None;
        if self.is_playing {
            self.show_controls = false;
            self.show_quality_menu = false;
        }
    }

    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        match key {
            Key::Escape => {
                if self.show_quality_menu {
                    self.show_quality_menu = false;
                } else if self.is_fullscreen {
                    self.exit_fullscreen();
                } else {
                    return KeyOutcome::Close;
                }
            }
            Key::Space | Key::Char('k') => self.toggle_play(),
            Key::Char('f') => self.toggle_fullscreen(),
            Key::Char('m') => self.toggle_mute(),
            Key::ArrowRight => self.skip_forward(),
            Key::ArrowLeft => self.skip_backward(),
            Key::Char(_) => return KeyOutcome::Ignored,
        }
        KeyOutcome::Handled
    }
}

/// `MM:SS`, minutes unbounded.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
