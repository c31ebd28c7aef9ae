use async_trait::async_trait;
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;

use super::{BridgeError, EventHandler, HostBridge, Subscription};
use crate::host::Host;

/// Bridge to a host running in the same process.
#[derive(Clone)]
pub struct LocalBridge {
    host: Arc<Host>,
}

impl LocalBridge {
    pub fn new(host: Arc<Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl HostBridge for LocalBridge {
    async fn listen(&self, event: &str, handler: EventHandler) -> Result<Subscription, BridgeError> {
        let id = self.host.listen(event, move |e| {
            handler(e);
            ControlFlow::Continue(())
        });

        let host = Arc::downgrade(&self.host);
        Ok(Subscription::new(event, move || {
            if let Some(host) = host.upgrade() {
                host.unlisten(id);
            }
        }))
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, BridgeError> {
        self.host.invoke(command, args)
    }
}
