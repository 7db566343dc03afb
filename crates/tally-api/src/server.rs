//! Sync server lifecycle
//!
//! Binds the LAN endpoint for one pairing window, auto-closes it when the
//! window ends, and supports explicit early shutdown. Each `start` owns
//! its own shutdown handle, so a stale auto-close timer can never tear
//! down a later server instance.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use tally_core::models::StartedSession;
use tally_core::sync::SyncEngine;
use tally_core::Result;

use crate::routes::{app_router, AppState};

type ShutdownSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

pub struct SyncServer {
    engine: Arc<SyncEngine>,
    shutdown: Mutex<Option<ShutdownSlot>>,
}

impl SyncServer {
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            shutdown: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Open a pairing session and serve the sync endpoint for it
    ///
    /// Port 0 binds an ephemeral port; the session records the actual one.
    pub async fn start(&self, port: u16) -> Result<StartedSession> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let actual_port = listener.local_addr()?.port();

        let session = self.engine.start_session(actual_port)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: ShutdownSlot = Arc::new(Mutex::new(Some(shutdown_tx)));
        *lock(&self.shutdown) = Some(slot.clone());

        let router = app_router(AppState {
            engine: self.engine.clone(),
        });
        self.engine.set_server_running(true);
        tracing::info!(port = actual_port, "Sync endpoint listening");

        let engine = self.engine.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(error) = serve.await {
                tracing::error!(%error, "Sync endpoint error");
            }
            engine.set_server_running(false);
            tracing::info!("Sync endpoint stopped");
        });

        // Auto-close when the pairing window ends. The timer holds this
        // session's shutdown slot only; a restarted server gets a new one.
        let ttl = self.engine.settings().session_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(sender) = lock(&slot).take() {
                tracing::info!("Auto-closing sync endpoint, pairing window ended");
                let _ = sender.send(());
            }
        });

        let expires_in = session.expires_at.saturating_sub(session.created_at) / 1_000;
        let host = local_ip().unwrap_or_else(|_| "localhost".to_string());
        Ok(StartedSession {
            pin: session.pin,
            url: format!("http://{host}:{actual_port}"),
            expires_in,
        })
    }

    /// Explicit early shutdown; idempotent
    pub fn stop(&self) {
        if let Some(slot) = lock(&self.shutdown).take() {
            if let Some(sender) = lock(&slot).take() {
                let _ = sender.send(());
            }
        }
        self.engine.stop_session();
        self.engine.set_server_running(false);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Best-effort LAN address for the connection URL shown next to the PIN
fn local_ip() -> std::io::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    let addr = socket.local_addr()?;
    Ok(addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use tally_core::config::SyncSettings;
    use tally_core::db::{Ledger, SqliteLedger};
    use tally_core::models::{SyncDataPayload, Transaction, TransactionItemRef};
    use tally_core::sync::client::SyncClient;

    use super::*;

    fn engine() -> (Arc<SyncEngine>, String) {
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let account = ledger.create_account("Checking", 100.0).unwrap();
        ledger.create_item("Oat Milk Barista", None).unwrap();
        (
            Arc::new(SyncEngine::new(ledger, SyncSettings::default())),
            account.id,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pair_and_sync_round_trip() {
        let (engine, account_id) = engine();
        let server = SyncServer::new(engine.clone());

        let started = server.start(0).await.unwrap();
        assert_eq!(started.pin.len(), 6);
        assert_eq!(started.expires_in, 900);

        let port = engine.status().port;
        let client = SyncClient::new(format!("http://127.0.0.1:{port}")).unwrap();

        // Wrong PIN is a terminal, message-carrying rejection
        let rejected = client.pair("000000", "Device B").await;
        assert!(rejected.is_err());

        let paired = client.pair(&started.pin, "Device B").await.unwrap();
        assert!(!paired.token.is_empty());

        let mut tx = Transaction::new(&account_id, 4.5, "morning shop");
        tx.items = Some(vec![TransactionItemRef {
            item_id: None,
            name: "Oat Milk".to_string(),
            quantity: Some(1),
            price: Some(4.5),
        }]);
        let response = client
            .push(
                &paired.token,
                &SyncDataPayload {
                    transactions: vec![tx],
                    device_name: "Device B".to_string(),
                    timestamp: 1,
                },
            )
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.pending_approval);
        assert_eq!(response.conflicts.len(), 1);

        let status = client.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.pending_approvals, 1);

        server.stop();
        server.stop();
        assert!(!engine.status().running);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_start_rejected_while_live() {
        let (engine, _) = engine();
        let server = SyncServer::new(engine);

        server.start(0).await.unwrap();
        let err = server.start(0).await.unwrap_err();
        assert!(matches!(err, tally_core::Error::AlreadyActive));
        server.stop();
    }
}
