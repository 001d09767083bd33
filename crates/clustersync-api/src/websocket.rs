//! Live alert channel transport.
//!
//! Opens a single WebSocket connection to the cluster's alert endpoint and
//! exposes it as a stream of text frames. The bearer credential travels as
//! the `token` query parameter of the upgrade request. Reconnection policy
//! is NOT handled here; `clustersync-core` supervises the connection and
//! decides when to dial again.
//!
//! # Example
//!
//! ```rust,ignore
//! use clustersync_api::websocket;
//! use futures_util::StreamExt;
//!
//! let url = Url::parse("wss://dashboard.example/ws/alerts")?;
//! let mut frames = websocket::connect(&url, &token).await?;
//!
//! while let Some(frame) = frames.next().await {
//!     match frame {
//!         Ok(text) => println!("{text}"),
//!         Err(e) => { eprintln!("channel lost: {e}"); break; }
//!     }
//! }
//! ```

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;

/// Close code reported when the server sends a close frame without payload.
const NO_STATUS_CODE: u16 = 1005;

/// Text frames from one live connection.
///
/// Yields `Ok(text)` per text frame. A server close frame or read failure
/// yields a single `Err` and then the stream ends. Dropping the stream
/// closes the socket.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// Append the credential to the channel address as `?token=...`.
pub fn channel_url(address: &Url, token: &SecretString) -> Url {
    let mut url = address.clone();
    url.query_pairs_mut()
        .append_pair("token", token.expose_secret());
    url
}

/// Establish one WebSocket connection and return its frame stream.
///
/// A handshake refused with an HTTP status maps to
/// [`Error::WebSocketRejected`] so callers can tell a bad credential from a
/// network failure.
pub async fn connect(address: &Url, token: &SecretString) -> Result<FrameStream, Error> {
    tracing::info!(url = %address, "Connecting to live channel");

    let target = channel_url(address, token);
    let uri: tungstenite::http::Uri = target
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(handshake_error)?;

    tracing::info!("Live channel connected");

    Ok(Box::pin(frames(ws_stream)))
}

fn handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => Error::WebSocketRejected {
            status: response.status().as_u16(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Frame decoding ───────────────────────────────────────────────────

/// Adapt raw tungstenite messages into text frames.
fn frames<S>(mut ws: S) -> impl Stream<Item = Result<String, Error>> + Send
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send,
{
    async_stream::stream! {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => yield Ok(text.as_str().to_owned()),
                Ok(Message::Ping(_)) => {
                    // tungstenite queues the pong reply itself
                    tracing::trace!("Live channel ping");
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_CODE, String::new()),
                        |cf| (u16::from(cf.code), cf.reason.as_str().to_owned()),
                    );
                    tracing::info!(code, reason = %reason, "Live channel close frame received");
                    yield Err(Error::WebSocketClosed { code, reason });
                    break;
                }
                Ok(_) => {
                    // Binary, Pong, Frame -- ignore
                }
                Err(e) => {
                    yield Err(Error::WebSocketConnect(e.to_string()));
                    break;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
