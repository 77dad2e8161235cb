//! Async runtime: executes controller commands against a backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! A host (the CLI, an end-to-end test) owns one `ChatRuntime` per chat
//! session. It feeds user input in as [`ClientEvent`]s and renders the
//! controller's view after each applied event. Navigation and URL updates
//! are collected as [`HostEffect`]s for the host to drain.
//!
//! DESIGN
//! ======
//! Every command becomes a spawned task whose result is posted back onto a
//! single unbounded queue. Only `step` pulls from that queue and applies
//! events to the controller, so the controller sees one event at a time no
//! matter how many requests are in flight. The support channel task is the
//! only long-lived task; the runtime keeps its handle and aborts it on close,
//! on reconnect and on drop.

#[cfg(test)]
#[path = "runtime_test.rs"]
mod runtime_test;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wire::FeedbackRequest;

use crate::config::ChatClientConfig;
use crate::controller::{ChatController, ClientEvent, Command};
use crate::net::api::Backend;
use crate::net::support_channel::{ChannelEnd, run_support_channel};
use crate::state::session::bootstrap;
use crate::util::share_url::LaunchParams;
use crate::util::storage::ClientStorage;

/// Upper bound of the random delay added to each reconnect backoff.
const RECONNECT_JITTER_MS: u64 = 250;

/// Something the host must do outside the chat view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEffect {
    /// Replace the current URL in place.
    ShareUrl(String),
    /// Navigate to another page.
    Redirect(String),
}

pub struct ChatRuntime<B: Backend + 'static> {
    controller: ChatController,
    backend: Arc<B>,
    storage: Arc<dyn ClientStorage>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    support_task: Option<JoinHandle<()>>,
    effects: Vec<HostEffect>,
}

impl<B: Backend + 'static> ChatRuntime<B> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        storage: Arc<dyn ClientStorage>,
        config: ChatClientConfig,
        launch: LaunchParams,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            controller: ChatController::new(config, launch),
            backend,
            storage,
            events_tx,
            events_rx,
            support_task: None,
            effects: Vec::new(),
        }
    }

    /// Kick off the first bootstrap. Must be called inside a Tokio runtime.
    pub fn start(&mut self) {
        let commands = self.controller.start();
        self.execute(commands);
    }

    #[must_use]
    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    /// A handle hosts can use to post events from other tasks.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.events_tx.clone()
    }

    /// Apply `event` immediately and run the commands it produces.
    pub fn submit(&mut self, event: ClientEvent) {
        let commands = self.controller.dispatch(event);
        self.execute(commands);
    }

    /// Wait for the next queued event and apply it.
    ///
    /// Returns `false` only if the queue is closed, which cannot happen while
    /// the runtime holds its own sender.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.submit(event);
                true
            }
            None => false,
        }
    }

    /// Apply events until `done` holds or `limit` elapses.
    ///
    /// Returns whether `done` was reached.
    pub async fn run_until<F>(&mut self, limit: Duration, mut done: F) -> bool
    where
        F: FnMut(&ChatController) -> bool,
    {
        let wait = async {
            while !done(&self.controller) {
                if !self.step().await {
                    return false;
                }
            }
            true
        };
        tokio::time::timeout(limit, wait).await.unwrap_or(false)
    }

    /// Take the host effects collected since the last call.
    pub fn drain_effects(&mut self) -> Vec<HostEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Stop the support channel task, if any.
    pub fn shutdown(&mut self) {
        self.abort_support_task();
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.execute_one(command);
        }
    }

    fn execute_one(&mut self, command: Command) {
        match command {
            Command::Bootstrap { launch } => {
                let config = self.controller.config().clone();
                let storage = Arc::clone(&self.storage);
                self.spawn_io(move |backend| async move {
                    let boot = bootstrap(&*backend, &*storage, &config, &launch).await;
                    ClientEvent::Booted(Box::new(boot))
                });
            }
            Command::SendChat { request, body } => {
                self.spawn_io(move |backend| async move {
                    let result = backend.send_chat(&body).await;
                    ClientEvent::BotReplied { request, result }
                });
            }
            Command::PostSupportMessage { request_id, message } => {
                self.spawn_io(move |backend| async move {
                    let result = backend.post_support_message(&request_id, &message).await;
                    ClientEvent::SupportMessagePosted { request_id, result }
                });
            }
            Command::SubmitFeedback { change } => {
                self.spawn_io(move |backend| async move {
                    let request = FeedbackRequest { message_id: change.message_id, feedback_type: change.selected };
                    let result = backend.submit_feedback(&request).await;
                    ClientEvent::FeedbackSettled { change, result }
                });
            }
            Command::OpenSupportRequest(create) => {
                self.spawn_io(move |backend| async move {
                    ClientEvent::SupportOpened(backend.request_support(&create).await)
                });
            }
            Command::ConnectSupportChannel { request_id, delay } => self.connect_support(request_id, delay),
            Command::CloseSupportChannel => self.abort_support_task(),
            Command::UpdateShareUrl(url) => self.effects.push(HostEffect::ShareUrl(url)),
            Command::Redirect(target) => self.effects.push(HostEffect::Redirect(target)),
        }
    }

    /// Spawn one request task whose result event is queued on completion.
    fn spawn_io<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<B>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ClientEvent> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = task(backend).await;
            if tx.send(event).is_err() {
                tracing::debug!("runtime dropped before task finished");
            }
        });
    }

    fn connect_support(&mut self, request_id: String, delay: Duration) {
        self.abort_support_task();
        let tx = self.events_tx.clone();
        let url = match self.backend.support_channel_url(&request_id) {
            Ok(url) => url,
            Err(e) => {
                let end = ChannelEnd::ConnectFailed(e.to_string());
                forward(&tx, ClientEvent::SupportChannelClosed { request_id, end });
                return;
            }
        };
        let keepalive = self.controller.config().keepalive;
        let delay = if delay.is_zero() { delay } else { delay + jitter() };

        self.support_task = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tracing::info!(request_id = %request_id, delay_ms = delay.as_millis(), "reconnecting support channel");
                tokio::time::sleep(delay).await;
            }
            let events = tx.clone();
            let id = request_id.clone();
            let end = run_support_channel(&url, keepalive, move |event| {
                forward(&events, ClientEvent::SupportEvent { request_id: id.clone(), event });
            })
            .await;
            forward(&tx, ClientEvent::SupportChannelClosed { request_id, end });
        }));
    }

    fn abort_support_task(&mut self) {
        if let Some(task) = self.support_task.take() {
            task.abort();
        }
    }
}

impl<B: Backend + 'static> Drop for ChatRuntime<B> {
    fn drop(&mut self) {
        self.abort_support_task();
    }
}

fn forward(tx: &mpsc::UnboundedSender<ClientEvent>, event: ClientEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("runtime dropped; support event discarded");
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..=RECONNECT_JITTER_MS))
}
