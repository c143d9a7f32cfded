use std::sync::Arc;

use teloxide::prelude::*;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bot::{run_bot, staff::run_staff_bot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotKind {
    Customer,
    Staff,
}

impl BotKind {
    fn label(&self) -> &'static str {
        match self {
            BotKind::Customer => "customer",
            BotKind::Staff => "staff",
        }
    }
}

/// Runs the long-polling dispatchers and stops them together.
pub struct BotManager {
    shutdown_sender: broadcast::Sender<()>,
    handles: Arc<Mutex<Vec<(BotKind, JoinHandle<()>)>>>,
}

impl Default for BotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BotManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            shutdown_sender: tx,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn start(&self, kind: BotKind, bot: Bot, state: crate::AppState) -> bool {
        let mut handles = self.handles.lock().await;
        handles.retain(|(_, h)| !h.is_finished());
        if handles.iter().any(|(k, _)| *k == kind) {
            warn!("The {} bot is already running", kind.label());
            return false;
        }

        let shutdown_rx = self.shutdown_sender.subscribe();
        let handle = tokio::spawn(async move {
            info!("{} bot task started", kind.label());
            match kind {
                BotKind::Customer => run_bot(bot, shutdown_rx, state).await,
                BotKind::Staff => run_staff_bot(bot, shutdown_rx, state).await,
            }
            info!("{} bot task finished", kind.label());
        });
        handles.push((kind, handle));
        true
    }

    /// Starts whichever bots the state has tokens for.
    pub async fn start_configured(&self, state: &crate::AppState) {
        if let Some(bot) = state.customer_bot.clone() {
            self.start(BotKind::Customer, bot, state.clone()).await;
        }
        if let Some(bot) = state.staff_bot.clone() {
            self.start(BotKind::Staff, bot, state.clone()).await;
        }
    }

    pub async fn is_running(&self, kind: BotKind) -> bool {
        let mut handles = self.handles.lock().await;
        handles.retain(|(_, h)| !h.is_finished());
        handles.iter().any(|(k, _)| *k == kind)
    }

    /// Signals every dispatcher and waits for the tasks to end.
    pub async fn stop_all(&self) {
        let mut handles = self.handles.lock().await;
        if handles.is_empty() {
            return;
        }
        info!("Sending shutdown signal to {} bot(s)...", handles.len());
        let _ = self.shutdown_sender.send(());
        for (kind, handle) in handles.drain(..) {
            let _ = handle.await;
            info!("The {} bot stopped", kind.label());
        }
    }

    /// Blocks until all running bots finish or Ctrl+C is pressed.
    pub async fn wait(&self) {
        loop {
            let running = {
                let mut handles = self.handles.lock().await;
                handles.retain(|(_, h)| !h.is_finished());
                !handles.is_empty()
            };
            if !running {
                return;
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.stop_all().await;
                    return;
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            }
        }
    }
}
