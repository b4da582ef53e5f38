//! Bot sessions: accept loop, per-connection reader and writer.
//!
//! Each connection gets a reader loop and a writer task. Inbound messages are
//! handed to a [`BotEventHandler`] one at a time, in order; commands for the
//! bot go through the fleet registry to the writer.

use crate::fleet::{BotFleet, SessionId};
use crate::protocol::{read_inbound, write_outbound, BotStatus, Inbound, Outbound};
use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Receives what bots observe.
#[async_trait]
pub trait BotEventHandler: Send + Sync {
    /// A full status snapshot, already recorded in the fleet
    async fn on_status(&self, session: SessionId, status: &BotStatus);

    /// One slot of the bot's open remote storage
    async fn on_storage_slot(&self, session: SessionId, slot: i32, item: String);
}

/// Pause after a failed `accept` before trying again
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept bot connections until `shutdown` fires.
///
/// Sessions are spawned on `sessions`; close and wait on it to know every bot
/// handler has returned.
pub async fn listen(
    listener: TcpListener,
    fleet: Arc<BotFleet>,
    handler: Arc<dyn BotEventHandler>,
    sessions: TaskTracker,
    shutdown: CancellationToken,
) {
    info!(addr = ?listener.local_addr().ok(), "Listening for bots");
    accept_loop(|| listener.accept(), fleet, handler, sessions, shutdown).await;
}

async fn accept_loop<S, A, F>(
    mut accept: A,
    fleet: Arc<BotFleet>,
    handler: Arc<dyn BotEventHandler>,
    sessions: TaskTracker,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    A: FnMut() -> F,
    F: Future<Output = io::Result<(S, SocketAddr)>>,
{
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!(%peer, "Bot connected");
                let (reader, writer) = tokio::io::split(stream);
                sessions.spawn(serve_bot(
                    reader,
                    writer,
                    fleet.clone(),
                    handler.clone(),
                    shutdown.child_token(),
                ));
            },
            Err(e) => {
                warn!(error = %e, "Failed to accept bot connection");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {},
                }
            },
        }
    }
    info!("Bot listener stopped");
}

/// Run one bot connection to completion.
///
/// Ends when the bot disconnects, sends an unknown tag, or `shutdown` fires.
/// The session is removed from the fleet either way.
pub async fn serve_bot<R, W>(
    mut reader: R,
    writer: W,
    fleet: Arc<BotFleet>,
    handler: Arc<dyn BotEventHandler>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (commands, queue) = mpsc::unbounded_channel();
    let session = fleet.register(commands);
    let writer_task = tokio::spawn(write_commands(session, writer, queue));

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = read_inbound(&mut reader) => message,
        };

        match message {
            Ok(Inbound::Status(status)) => {
                fleet.record_status(session, (*status).clone());
                handler.on_status(session, &status).await;
            },
            Ok(Inbound::StorageSlot { slot, item }) => {
                handler.on_storage_slot(session, slot, item).await;
            },
            Err(e) if e.is_disconnect() => {
                info!(session, "Bot disconnected");
                break;
            },
            Err(e) => {
                warn!(session, error = %e, "Closing bot connection");
                break;
            },
        }
    }

    // dropping the registry's sender ends the writer
    fleet.unregister(session);
    if let Err(e) = writer_task.await {
        error!(session, error = %e, "Bot writer task failed");
    }
}

async fn write_commands<W>(session: SessionId, mut writer: W, mut queue: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = queue.recv().await {
        debug!(session, ?command, "Sending bot command");
        if let Err(e) = write_outbound(&mut writer, &command).await {
            warn!(session, error = %e, "Failed to write bot command");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::{sample_status, status_frame};
    use crate::protocol::{TAG_CHAT, TAG_STORAGE_SLOT};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::Notify;

    /// Records events and answers every status with a chat command
    struct Recorder {
        fleet: Arc<BotFleet>,
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BotEventHandler for Recorder {
        async fn on_status(&self, session: SessionId, status: &BotStatus) {
            self.events.lock().unwrap().push(format!("status {}", status.window_id));
            self.fleet.send(session, Outbound::goto_storage()).unwrap();
        }

        async fn on_storage_slot(&self, _session: SessionId, slot: i32, item: String) {
            self.events.lock().unwrap().push(format!("slot {} {}", slot, item));
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let recorder = Arc::new(Recorder {
            fleet: fleet.clone(),
            events: Mutex::new(Vec::new()),
        });

        let (bot_side, exchange_side) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(exchange_side);
        let serving = tokio::spawn(serve_bot(
            reader,
            writer,
            fleet.clone(),
            recorder.clone(),
            CancellationToken::new(),
        ));

        let (mut bot_reader, mut bot_writer) = tokio::io::split(bot_side);
        bot_writer.write_all(&status_frame(&sample_status())).await.unwrap();
        let mut slot_frame = vec![TAG_STORAGE_SLOT];
        slot_frame.extend_from_slice(&2i32.to_be_bytes());
        slot_frame.extend_from_slice(&5u16.to_be_bytes());
        slot_frame.extend_from_slice(b"empty");
        bot_writer.write_all(&slot_frame).await.unwrap();

        // the chat command sent in response to the status
        let mut reply = [0u8; 19];
        bot_reader.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], TAG_CHAT);
        assert_eq!(&reply[3..], b"goto ender_chest");

        // unknown tag ends the session
        bot_writer.write_all(&[42]).await.unwrap();
        serving.await.unwrap();

        assert!(fleet.is_empty());
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["status 7".to_string(), "slot 2 empty".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_ends_session() {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let recorder = Arc::new(Recorder {
            fleet: fleet.clone(),
            events: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();

        let (_bot_side, exchange_side) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(exchange_side);
        let serving = tokio::spawn(serve_bot(reader, writer, fleet.clone(), recorder, shutdown.clone()));

        tokio::task::yield_now().await;
        shutdown.cancel();
        serving.await.unwrap();
        assert!(fleet.is_empty());
    }

    /// Holds every status until `gate` is opened
    struct Gated {
        gate: Notify,
        handled: Mutex<Vec<i32>>,
    }

    #[async_trait]
    impl BotEventHandler for Gated {
        async fn on_status(&self, _session: SessionId, status: &BotStatus) {
            self.gate.notified().await;
            self.handled.lock().unwrap().push(status.window_id);
        }

        async fn on_storage_slot(&self, _session: SessionId, _slot: i32, _item: String) {}
    }

    type Accepted = io::Result<(DuplexStream, SocketAddr)>;

    /// Accept function fed from a channel; pends forever once it runs dry
    fn scripted(
        queue: mpsc::UnboundedReceiver<Accepted>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Accepted> + Send>> {
        let queue = Arc::new(tokio::sync::Mutex::new(queue));
        move || {
            let queue = queue.clone();
            Box::pin(async move {
                match queue.lock().await.recv().await {
                    Some(accepted) => accepted,
                    None => std::future::pending().await,
                }
            })
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_accept_error_does_not_stop_listener() {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let recorder = Arc::new(Recorder {
            fleet: fleet.clone(),
            events: Mutex::new(Vec::new()),
        });
        let (incoming, queue) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let sessions = TaskTracker::new();
        let listening = tokio::spawn(accept_loop(
            scripted(queue),
            fleet.clone(),
            recorder.clone(),
            sessions.clone(),
            shutdown.clone(),
        ));

        incoming
            .send(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "aborted")))
            .unwrap();
        let (mut bot_side, exchange_side) = tokio::io::duplex(64 * 1024);
        incoming.send(Ok((exchange_side, peer()))).unwrap();

        bot_side.write_all(&status_frame(&sample_status())).await.unwrap();
        let mut reply = [0u8; 19];
        tokio::time::timeout(Duration::from_secs(5), bot_side.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply[3..], b"goto ender_chest");

        shutdown.cancel();
        listening.await.unwrap();
        sessions.close();
        sessions.wait().await;
        assert!(fleet.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_finish_their_handler_before_wait_returns() {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let gated = Arc::new(Gated {
            gate: Notify::new(),
            handled: Mutex::new(Vec::new()),
        });
        let (incoming, queue) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let sessions = TaskTracker::new();
        let listening = tokio::spawn(accept_loop(
            scripted(queue),
            fleet.clone(),
            gated.clone(),
            sessions.clone(),
            shutdown.clone(),
        ));

        let (mut bot_side, exchange_side) = tokio::io::duplex(64 * 1024);
        incoming.send(Ok((exchange_side, peer()))).unwrap();
        bot_side.write_all(&status_frame(&sample_status())).await.unwrap();
        // recorded, so the handler is running and waits on the gate
        tokio::time::timeout(Duration::from_secs(5), async {
            while fleet.status(1).is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        listening.await.unwrap();
        sessions.close();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), sessions.wait()).await.is_err(),
            "session ended while its handler was still running"
        );

        gated.gate.notify_one();
        tokio::time::timeout(Duration::from_secs(5), sessions.wait()).await.unwrap();
        assert_eq!(*gated.handled.lock().unwrap(), vec![7]);
        assert!(fleet.is_empty());
    }
}
