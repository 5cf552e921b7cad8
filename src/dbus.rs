use std::sync::Arc;

use futures_lite::StreamExt as _;
use tokio::task::{spawn, JoinHandle};
use tracing::instrument;
use zbus::{proxy::CacheProperties, Connection};

use crate::{
    error::{BusConnectionError, DecodeError},
    protocol::check_timing,
    state::{PlaybackState, StateModel},
};

pub mod music_info;

use music_info::{MusicInfoProxy, StateChangedArgs};

/// Typed mirror of the state published on the bus, either fetched as properties or carried by
/// `StateChanged`.
#[derive(Debug, Clone, PartialEq)]
pub struct BusSnapshot {
    pub artist: String,
    pub title: String,
    pub is_playing: bool,
    pub current_lyric: String,
    pub duration: f64,
    pub position: f64,
}

impl BusSnapshot {
    /// Read all properties of the remote object.
    pub async fn fetch(proxy: &MusicInfoProxy<'_>) -> zbus::Result<Self> {
        Ok(Self {
            artist: proxy.artist().await?,
            title: proxy.title().await?,
            is_playing: proxy.is_playing().await?,
            current_lyric: proxy.current_lyric().await?,
            duration: proxy.duration().await?,
            position: proxy.position().await?,
        })
    }
}

impl From<StateChangedArgs<'_>> for BusSnapshot {
    fn from(args: StateChangedArgs<'_>) -> Self {
        Self {
            artist: args.artist.to_owned(),
            title: args.title.to_owned(),
            is_playing: args.is_playing,
            current_lyric: args.current_lyric.to_owned(),
            duration: args.duration,
            position: args.position,
        }
    }
}

impl TryFrom<BusSnapshot> for PlaybackState {
    type Error = DecodeError;

    fn try_from(snapshot: BusSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            artist: snapshot.artist,
            title: snapshot.title,
            is_playing: snapshot.is_playing,
            current_lyric: snapshot.current_lyric,
            next_lyric: String::new(),
            position: check_timing("position", snapshot.position)?,
            duration: check_timing("duration", snapshot.duration)?,
            disconnected: false,
            last_updated_at: None,
        })
    }
}

fn apply(model: &StateModel, snapshot: BusSnapshot) {
    match PlaybackState::try_from(snapshot) {
        Ok(state) => model.update(state),
        Err(e) => tracing::warn!(%e, "Dropping invalid bus state"),
    }
}

/// Mirrors the remote MusicInfoService object into a [`StateModel`].
///
/// The signal listener runs until [`BusStateProxy::disconnect`] is called or the proxy is dropped.
pub struct BusStateProxy {
    listener: JoinHandle<()>,
}

impl BusStateProxy {
    /// Subscribe to `StateChanged` and seed the model from the current properties.
    ///
    /// A failed initial fetch (service not running yet) is logged and the proxy keeps waiting for
    /// signals. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy cannot be built or the signal subscription fails.
    #[instrument(skip_all, fields(name = %name, path = %path))]
    pub async fn connect(
        conn: &Connection,
        model: Arc<StateModel>,
        name: &str,
        path: &str,
    ) -> Result<Self, BusConnectionError> {
        let proxy: MusicInfoProxy<'static> = MusicInfoProxy::builder(conn)
            .destination(name.to_owned())
            .map_err(BusConnectionError::Proxy)?
            .path(path.to_owned())
            .map_err(BusConnectionError::Proxy)?
            .cache_properties(CacheProperties::No)
            .build()
            .await
            .map_err(BusConnectionError::Proxy)?;
        let mut state_changed = proxy
            .receive_state_changed()
            .await
            .map_err(BusConnectionError::Subscribe)?;
        tracing::info!("Subscribed to MusicInfoService");

        match BusSnapshot::fetch(&proxy).await {
            Ok(snapshot) => apply(&model, snapshot),
            Err(e) => tracing::warn!(?e, "Initial property fetch failed, waiting for StateChanged"),
        }

        let listener = spawn(async move {
            let _proxy = proxy;
            while let Some(signal) = state_changed.next().await {
                match signal.args() {
                    Ok(args) => apply(&model, args.into()),
                    Err(e) => tracing::warn!(?e, "Failed to parse StateChanged arguments"),
                }
            }
            tracing::warn!("StateChanged stream closed");
        });

        Ok(Self { listener })
    }

    pub fn disconnect(&self) {
        self.listener.abort();
    }
}

impl Drop for BusStateProxy {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
