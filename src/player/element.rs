use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Playback was rejected: {0}")]
    PlayRejected(String),
    #[error("Fullscreen request failed: {0}")]
    Fullscreen(String),
    #[error("Media could not be decoded: {0}")]
    Decode(String),
    #[error("Media failed to load: {0}")]
    Network(String),
}

/// The native media element the controller drives. Times are in seconds.
pub trait MediaElement {
    /// Swaps the source URL. Metadata arrives later through
    /// `PlaybackController::on_loaded_metadata`.
    fn load(&mut self, url: &str);
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// `None` until metadata is available.
    fn duration(&self) -> Option<f64>;
    /// End of the last buffered range, if anything is buffered.
    fn buffered_end(&self) -> Option<f64>;
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    /// Fullscreen applies to the player container, not the bare element.
    fn request_fullscreen(&mut self) -> Result<(), MediaError>;
    fn exit_fullscreen(&mut self) -> Result<(), MediaError>;
}
