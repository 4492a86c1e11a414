// Push discovery feed over a websocket
//
// Disconnected → Connecting → Subscribed → Disconnected, reconnecting with
// exponential backoff capped at `MAX_BACKOFF`. Every inbound token event is
// forwarded on a channel that the candidate source drains into the same
// ingestion path the polled feeds use.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{parse_tokens, DiscoveredToken};

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Bound on the websocket handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Doubling reconnect delay with an upper bound
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following one doubles, up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

pub struct PushFeed {
    url: String,
    subscribe_message: Option<String>,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<DiscoveredToken>,
    state_tx: watch::Sender<FeedState>,
}

impl PushFeed {
    /// Feed plus the receiving end of its token events
    pub fn new(
        url: String,
        subscribe_message: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<DiscoveredToken>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(FeedState::Disconnected);
        (
            Self {
                url,
                subscribe_message,
                connect_timeout: CONNECT_TIMEOUT,
                events,
                state_tx,
            },
            events_rx,
        )
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: FeedState) {
        self.state_tx.send_replace(state);
    }

    /// Connect, stream and reconnect until shutdown or until nobody listens
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = Backoff::default();

        loop {
            self.set_state(FeedState::Connecting);

            let result = tokio::select! {
                r = self.connect_and_stream(&mut backoff) => r,
                _ = shutdown.recv() => break,
            };

            self.set_state(FeedState::Disconnected);
            if self.events.is_closed() {
                debug!("Push feed receiver dropped, stopping");
                break;
            }

            let delay = backoff.next_delay();
            match result {
                Ok(()) => info!("🔌 Push feed closed, reconnecting in {:?}", delay),
                Err(e) => warn!("⚠️ Push feed error: {:#}, reconnecting in {:?}", e, delay),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.set_state(FeedState::Disconnected);
        info!("🛑 Push feed stopped");
    }

    async fn connect_and_stream(&self, backoff: &mut Backoff) -> Result<()> {
        let handshake = connect_async(self.url.as_str());
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| {
                anyhow::anyhow!("push feed handshake timed out after {:?}", self.connect_timeout)
            })?
            .context("push feed connect failed")?;
        let (mut write, mut read) = ws_stream.split();

        if let Some(ref subscribe) = self.subscribe_message {
            write
                .send(Message::Text(subscribe.clone()))
                .await
                .context("push feed subscribe failed")?;
        }

        self.set_state(FeedState::Subscribed);
        backoff.reset();
        info!("📡 Push feed subscribed");

        while let Some(message) = read.next().await {
            match message.context("push feed read failed")? {
                Message::Text(text) => {
                    for token in parse_push_message(&text) {
                        if self.events.send(token).is_err() {
                            return Ok(());
                        }
                    }
                }
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .context("push feed pong failed")?;
                }
                Message::Close(frame) => {
                    debug!("Push feed closed by server: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Tokens carried by one text frame; control frames yield nothing
pub fn parse_push_message(text: &str) -> Vec<DiscoveredToken> {
    match serde_json::from_str::<Value>(text) {
        Ok(payload) => parse_tokens(&payload, "pushfeed"),
        Err(e) => {
            debug!("Ignoring non-JSON push frame: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_push_message() {
        let tokens = parse_push_message(
            r#"{"type":"token","data":{"mint":"MintX","symbol":"XX","liquidity":1000}}"#,
        );
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].source, "pushfeed");
        assert!(parse_push_message("not json").is_empty());
        assert!(parse_push_message(r#"{"status":"subscribed"}"#).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_feed_backs_off_until_shutdown() {
        let (feed, _rx) = PushFeed::new("ws://127.0.0.1:9/feed".to_string(), None);
        let mut state = feed.state();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(feed.run(shutdown_rx));

        // First attempt fails fast and the feed parks in Disconnected
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == FeedState::Disconnected {
                    break;
                }
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Accepts TCP but never answers the websocket upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (feed, _rx) = PushFeed::new(format!("ws://{}/feed", addr), None);
        let feed = feed.with_connect_timeout(Duration::from_millis(200));
        let mut state = feed.state();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(feed.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == FeedState::Connecting {
                    break;
                }
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                state.changed().await.unwrap();
                if *state.borrow() == FeedState::Disconnected {
                    break;
                }
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        server.abort();
    }
}
