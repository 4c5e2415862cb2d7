//! Helpers for adapter tests: a local mock provider and recording handlers.

use async_trait::async_trait;
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use switchboard_core::types::{InboundMessage, StatusCallback};

use crate::context::Context;
use crate::traits::{HandlerError, MessageHandler, StatusHandler};

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Records every event handed to it.
#[derive(Default)]
pub(crate) struct Collector {
    pub messages: Mutex<Vec<InboundMessage>>,
    pub statuses: Mutex<Vec<StatusCallback>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<StatusCallback> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for Collector {
    async fn on_message(&self, _ctx: &Context, message: InboundMessage) -> Result<(), HandlerError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl StatusHandler for Collector {
    async fn on_status(&self, _ctx: &Context, status: StatusCallback) -> Result<(), HandlerError> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

/// Shared log of request bodies seen by a mock provider.
pub(crate) type Captured = Arc<Mutex<Vec<String>>>;

pub(crate) fn captured() -> Captured {
    Arc::new(Mutex::new(Vec::new()))
}
