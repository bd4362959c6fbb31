//! Command dispatch
//!
//! ```text
//!  {component}.command  (queue group "command")
//!        │ one tracked task per request
//!        ▼
//!   "json{...}" ──► cancel / quit handled here
//!        │          other operations ──► JsonHandler (child scope, cancelKey)
//!        │
//!   CLI text   ──► split_args ─► clap tree ─► CliHandler
//!        │
//!   reply on the request's inbox
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use marketbus_core::{
    Component, JsonCommand, JsonOperation, Reply, Response, Topic, strip_json_prefix,
};
use marketbus_transport::{Broker, BrokerMessage, Subscription};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::command::NO_RESPONSE;
use crate::command::cancel::CancelRegistry;
use crate::command::cli::{CliHandler, run_cli};
use crate::error::Result;
use crate::handler::HandlerContext;

/// Scope handed to command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    component: Component,
    token: CancellationToken,
    shutdown: CancellationToken,
    cancel_key: Option<String>,
}

impl CommandContext {
    pub fn new(
        component: Component,
        token: CancellationToken,
        shutdown: CancellationToken,
        cancel_key: Option<String>,
    ) -> Self {
        Self {
            component,
            token,
            shutdown,
            cancel_key,
        }
    }

    pub fn component(&self) -> Component {
        self.component
    }

    /// Scope of this command, cancelled by its cancel key or by shutdown
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn cancel_key(&self) -> Option<&str> {
        self.cancel_key.as_deref()
    }

    /// Stop the dispatcher, and with it the component
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Handles JSON commands other than `cancel` and `quit`. An empty return
/// value is reported to the caller as "no response".
#[async_trait]
pub trait JsonHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext, command: JsonCommand) -> String;
}

struct Dispatch {
    broker: Arc<dyn Broker>,
    component: Component,
    cli: Arc<dyn CliHandler>,
    json: Arc<dyn JsonHandler>,
    cancels: Arc<CancelRegistry>,
    shutdown: CancellationToken,
}

/// Running command listener of one component
pub struct CommandDispatcher {
    component: Component,
    topic: String,
    ctx: HandlerContext,
    cancels: Arc<CancelRegistry>,
}

impl CommandDispatcher {
    /// Subscribe to the component's command topic and start serving requests
    pub async fn start(
        broker: Arc<dyn Broker>,
        component: Component,
        queue_group: &str,
        cli: Arc<dyn CliHandler>,
        json: Arc<dyn JsonHandler>,
    ) -> Result<Arc<Self>> {
        let topic = Topic::command(component).generate();
        let subscription = broker.queue_subscribe(&topic, queue_group).await?;

        let ctx = HandlerContext::new();
        let cancels = Arc::new(CancelRegistry::new());
        let dispatch = Arc::new(Dispatch {
            broker,
            component,
            cli,
            json,
            cancels: cancels.clone(),
            shutdown: ctx.token().clone(),
        });

        ctx.spawn(run_listener(ctx.clone(), subscription, dispatch, topic.clone()));
        info!("[{}] command dispatcher started on {}", component, topic);

        Ok(Arc::new(Self {
            component,
            topic,
            ctx,
            cancels,
        }))
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn cancels(&self) -> &Arc<CancelRegistry> {
        &self.cancels
    }

    pub fn is_running(&self) -> bool {
        !self.ctx.is_cancelled()
    }

    /// Stop listening and wait for every in-flight command
    pub async fn stop(&self) {
        self.ctx.shutdown().await;
        info!("[{}] command dispatcher stopped", self.component);
    }

    /// Resolves once the dispatcher was stopped, by `stop` or a `quit` command,
    /// and every in-flight command finished
    pub async fn stopped(&self) {
        self.ctx.token().cancelled().await;
        self.ctx.wait().await;
    }
}

async fn run_listener(
    ctx: HandlerContext,
    mut subscription: Subscription,
    dispatch: Arc<Dispatch>,
    topic: String,
) {
    loop {
        tokio::select! {
            _ = ctx.token().cancelled() => break,
            request = subscription.next() => {
                let Some(request) = request else {
                    warn!("[{}] command subscription closed", topic);
                    break;
                };
                let dispatch = dispatch.clone();
                ctx.spawn(async move { dispatch.serve(request).await });
            }
        }
    }
    subscription.unsubscribe();
    debug!("[{}] unsubscribed from command topic", topic);
}

impl Dispatch {
    async fn serve(&self, request: BrokerMessage) {
        let reply = match strip_json_prefix(&request.payload).filter(|body| !body.is_empty()) {
            Some(body) => self.handle_json(body).await,
            None => self.handle_cli(&request.payload).await,
        };
        if let Err(e) = self.broker.respond(&request, reply.into_bytes()).await {
            error!("[{}] failed to reply to command: {}", self.component, e);
        }
    }

    async fn handle_json(&self, body: &[u8]) -> String {
        let command = match JsonCommand::from_json(body) {
            Ok(command) => command,
            Err(e) => return Response::failure(format!("invalid json command: {e}")).respond(),
        };

        match command.operation {
            JsonOperation::Cancel => return self.cancel(&command.cancel_key),
            JsonOperation::Quit => {
                info!("[{}] quit requested", self.component);
                self.shutdown.cancel();
                return Response::success(format!("Gracefully shutting down {}", self.component))
                    .respond();
            }
            _ => {}
        }

        let token = self.shutdown.child_token();
        let cancel_key = (!command.cancel_key.is_empty()).then(|| command.cancel_key.clone());
        let _guard = match &cancel_key {
            Some(key) => match self.cancels.register(key, token.clone()) {
                Ok(guard) => Some(guard),
                Err(e) => return Response::failure(e).respond(),
            },
            None => None,
        };

        let ctx = CommandContext::new(self.component, token.clone(), self.shutdown.clone(), cancel_key);
        let operation = command.operation;
        let response = tokio::select! {
            biased;
            response = self.json.handle(&ctx, command) => response,
            _ = token.cancelled() => String::new(),
        };

        if response.is_empty() {
            debug!("[{}] {} produced no response", self.component, operation);
            return Response::failure(NO_RESPONSE).respond();
        }
        response
    }

    fn cancel(&self, key: &str) -> String {
        match self.cancels.cancel(key) {
            Ok(()) => Response::success("Cancelled operation").respond(),
            Err(e) => Response::failure(e).respond(),
        }
    }

    async fn handle_cli(&self, payload: &[u8]) -> String {
        let input = String::from_utf8_lossy(payload);
        let ctx = CommandContext::new(
            self.component,
            self.shutdown.child_token(),
            self.shutdown.clone(),
            None,
        );
        run_cli(self.cli.as_ref(), &ctx, &input).await
    }
}
