//! Fire-and-forget calls to the control plane
//!
//! Neither the preference upload nor the balance refresh is awaited by a
//! turn, and their failures never surface to the user.

use std::sync::Arc;

use himmi_client::{ControlPlaneClient, PreferenceRecord};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Uploads shadow comparison votes from a background task
#[derive(Clone)]
pub struct PreferenceRecorder {
    tx: mpsc::UnboundedSender<PreferenceRecord>,
}

impl PreferenceRecorder {
    /// Create a recorder and spawn its upload task
    ///
    /// The task runs until every clone of the recorder is dropped.
    pub fn new(client: ControlPlaneClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(upload_preferences(rx, client));

        Self { tx }
    }

    /// A recorder whose records are delivered to the returned receiver
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<PreferenceRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a preference for upload
    pub fn record(&self, record: PreferenceRecord) {
        if let Err(e) = self.tx.send(record) {
            tracing::warn!(error = %e, "failed to enqueue preference, upload task stopped");
        }
    }
}

impl std::fmt::Debug for PreferenceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceRecorder").finish_non_exhaustive()
    }
}

async fn upload_preferences(mut rx: mpsc::UnboundedReceiver<PreferenceRecord>, client: ControlPlaneClient) {
    while let Some(record) = rx.recv().await {
        match client.submit_preference(&record).await {
            Ok(()) => tracing::debug!(
                primary_model = %record.primary_model,
                shadow_model = %record.shadow_model,
                preference = %record.user_preference,
                "preference recorded"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                primary_model = %record.primary_model,
                shadow_model = %record.shadow_model,
                "failed to record preference"
            ),
        }
    }

    tracing::debug!("preference recorder shutting down");
}

/// Latest known credit balance of the signed-in user
#[derive(Clone)]
pub struct BalanceTracker {
    client: ControlPlaneClient,
    user_id: u64,
    balance: Arc<watch::Sender<Option<f64>>>,
}

impl BalanceTracker {
    pub fn new(client: ControlPlaneClient, user_id: u64) -> Self {
        let (balance, _) = watch::channel(None);

        Self {
            client,
            user_id,
            balance: Arc::new(balance),
        }
    }

    pub const fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn current(&self) -> Option<f64> {
        *self.balance.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.balance.subscribe()
    }

    /// Fetch the balance in the background
    ///
    /// Callers may drop the handle; a failed fetch keeps the previous value.
    pub fn refresh(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let balance = Arc::clone(&self.balance);
        let user_id = self.user_id;

        tokio::spawn(async move {
            match client.user_status(user_id).await {
                Ok(status) => {
                    tracing::debug!(user_id, credits = status.credits, "balance refreshed");
                    balance.send_replace(Some(status.credits));
                }
                Err(e) => tracing::warn!(error = %e, user_id, "failed to refresh balance"),
            }
        })
    }
}

impl std::fmt::Debug for BalanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceTracker")
            .field("user_id", &self.user_id)
            .field("balance", &self.current())
            .finish_non_exhaustive()
    }
}
