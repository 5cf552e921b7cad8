//! Proxy for the `org.amazzy24128.MusicInfoService.Player` interface published by the backend.

use zbus::proxy;

#[proxy(
    interface = "org.amazzy24128.MusicInfoService.Player",
    default_service = "org.amazzy24128.MusicInfoService",
    default_path = "/org/amazzy24128/MusicInfoService/Player",
    gen_blocking = false
)]
pub trait MusicInfo {
    #[zbus(property)]
    fn artist(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn title(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn is_playing(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn current_lyric(&self) -> zbus::Result<String>;

    /// Track length in seconds.
    #[zbus(property)]
    fn duration(&self) -> zbus::Result<f64>;

    /// Playback position in seconds.
    #[zbus(property)]
    fn position(&self) -> zbus::Result<f64>;

    /// Emitted on every state transition with the full state.
    #[zbus(signal)]
    fn state_changed(
        &self,
        artist: &str,
        title: &str,
        is_playing: bool,
        current_lyric: &str,
        duration: f64,
        position: f64,
    ) -> zbus::Result<()>;
}
