//! Context-scoped handlers
//!
//! Every long-lived task in the substrate runs under a [`HandlerContext`]: a
//! cancellation token plus a task tracker so shutdown can wait for in-flight
//! work. Two handler flavours share that base:
//!
//! ```text
//!   SimpleHandler<T>            FanOutHandler<T>
//!   ┌──────────────┐            ┌──────────────────────┐
//!   │ ctx          │            │ ctx                  │
//!   │ tx ──► rx    │            │ agents[0..n] ──► rx_i│ ◄── next_agent()
//!   └──────────────┘            │ cursor, attached     │     round robin
//!    one consumer task          └──────────────────────┘
//!                                one worker per agent
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{BusError, Result};

/// Cancellation scope and wait-group shared by every handler
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl HandlerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope that cancels itself after `timeout`. Must be called within a
    /// Tokio runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        let ctx = Self::new();
        let token = ctx.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => token.cancel(),
                _ = token.cancelled() => {}
            }
        });
        ctx
    }

    /// Child scope, cancelled whenever `parent` is
    pub fn from_parent(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task counted by [`HandlerContext::wait`]
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tracked tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every tracked task has finished
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Cancel, then wait for every tracked task
    pub async fn shutdown(&self) {
        self.cancel();
        self.wait().await;
    }
}

/// Common surface of both handler flavours
pub trait Handler: Send + Sync {
    fn context(&self) -> &HandlerContext;

    fn cancel(&self) {
        self.context().cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.context().is_cancelled()
    }
}

/// Work performed by a fan-out agent for each item it receives
#[async_trait]
pub trait Worker<T: Send + 'static>: Send + Sync + 'static {
    async fn work(&self, item: T);
}

#[async_trait]
impl<T, F> Worker<T> for F
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    async fn work(&self, item: T) {
        self(item)
    }
}

/// Handler with a single input channel consumed by one task
#[derive(Debug)]
pub struct SimpleHandler<T> {
    ctx: HandlerContext,
    tx: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T: Send + 'static> SimpleHandler<T> {
    /// Handler without a deadline, plus the receiving end for its consumer task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        Self::with_context(HandlerContext::new(), capacity)
    }

    pub fn with_timeout(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<T>) {
        Self::with_context(HandlerContext::with_timeout(timeout), capacity)
    }

    pub fn from_parent(capacity: usize, parent: &CancellationToken) -> (Self, mpsc::Receiver<T>) {
        Self::with_context(HandlerContext::from_parent(parent), capacity)
    }

    fn with_context(ctx: HandlerContext, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                ctx,
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Hand an item to the consumer task. Fails once the handler is closed or
    /// cancelled.
    pub async fn send(&self, item: T) -> Result<()> {
        let tx = self.tx.lock().clone().ok_or(BusError::HandlerClosed)?;
        tokio::select! {
            biased;
            _ = self.ctx.token().cancelled() => Err(BusError::Cancelled),
            sent = tx.send(item) => sent.map_err(|_| BusError::HandlerClosed),
        }
    }

    /// Drop the input side; the consumer sees end-of-stream after draining
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().is_none_or(|tx| tx.is_closed())
    }
}

impl<T: Send + 'static> Handler for SimpleHandler<T> {
    fn context(&self) -> &HandlerContext {
        &self.ctx
    }
}

struct FanOutState<T> {
    cursor: usize,
    attached: bool,
    receivers: Vec<mpsc::Receiver<T>>,
}

/// Handler distributing items over a fixed pool of agent channels
pub struct FanOutHandler<T> {
    ctx: HandlerContext,
    agents: Vec<mpsc::Sender<T>>,
    state: Mutex<FanOutState<T>>,
}

impl<T: Send + 'static> FanOutHandler<T> {
    /// Allocates `max_agents` agent channels of `capacity` each
    pub fn new(max_agents: usize, capacity: usize) -> Self {
        Self::with_context(HandlerContext::new(), max_agents, capacity)
    }

    pub fn with_timeout(max_agents: usize, capacity: usize, timeout: Duration) -> Self {
        Self::with_context(HandlerContext::with_timeout(timeout), max_agents, capacity)
    }

    pub fn from_parent(max_agents: usize, capacity: usize, parent: &CancellationToken) -> Self {
        Self::with_context(HandlerContext::from_parent(parent), max_agents, capacity)
    }

    fn with_context(ctx: HandlerContext, max_agents: usize, capacity: usize) -> Self {
        let (agents, receivers) = (0..max_agents)
            .map(|_| mpsc::channel(capacity.max(1)))
            .unzip();
        Self {
            ctx,
            agents,
            state: Mutex::new(FanOutState {
                cursor: 0,
                attached: false,
                receivers,
            }),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Next agent in rotation. Every agent is returned once per `agent_count`
    /// consecutive calls, whatever the interleaving of callers.
    pub fn next_agent(&self) -> Result<mpsc::Sender<T>> {
        if self.agents.is_empty() {
            return Err(BusError::NoAgents);
        }
        let mut state = self.state.lock();
        let index = state.cursor;
        state.cursor = (index + 1) % self.agents.len();
        Ok(self.agents[index].clone())
    }

    /// Send `item` to the next agent, giving up if the handler is cancelled
    pub async fn dispatch(&self, item: T) -> Result<()> {
        let agent = self.next_agent()?;
        tokio::select! {
            biased;
            _ = self.ctx.token().cancelled() => Err(BusError::Cancelled),
            sent = agent.send(item) => sent.map_err(|_| BusError::HandlerClosed),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Start one worker task per agent channel. Returns false, and starts
    /// nothing, when workers are already attached.
    pub fn attach(&self, worker: Arc<dyn Worker<T>>, label: &str) -> bool {
        let receivers = {
            let mut state = self.state.lock();
            if state.attached {
                return false;
            }
            state.attached = true;
            std::mem::take(&mut state.receivers)
        };

        for (agent, mut rx) in receivers.into_iter().enumerate() {
            let token = self.ctx.token().clone();
            let worker = worker.clone();
            let label = label.to_string();
            self.ctx.spawn(async move {
                debug!("[{}] agent {} started", label, agent);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        item = rx.recv() => match item {
                            Some(item) => worker.work(item).await,
                            None => break,
                        },
                    }
                }
                debug!("[{}] agent {} stopped", label, agent);
            });
        }
        true
    }
}

impl<T: Send + 'static> Handler for FanOutHandler<T> {
    fn context(&self) -> &HandlerContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_round_robin_visits_agents_in_order() {
        let handler = FanOutHandler::<u32>::new(3, 4);
        let mut picks = Vec::new();
        for _ in 0..7 {
            let agent = handler.next_agent().unwrap();
            let index = handler
                .agents
                .iter()
                .position(|a| a.same_channel(&agent))
                .unwrap();
            picks.push(index);
        }
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_single_agent_always_selected() {
        let handler = FanOutHandler::<u32>::new(1, 1);
        for _ in 0..3 {
            assert!(handler.next_agent().unwrap().same_channel(&handler.agents[0]));
        }
    }

    #[test]
    fn test_no_agents_is_an_error() {
        let handler = FanOutHandler::<u32>::new(0, 1);
        assert!(matches!(handler.next_agent(), Err(BusError::NoAgents)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_round_robin_is_fair_under_concurrency() {
        let handler = Arc::new(FanOutHandler::<u32>::new(4, 1));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move {
                let mut local = Vec::new();
                for _ in 0..100 {
                    let agent = handler.next_agent().unwrap();
                    local.push(
                        handler
                            .agents
                            .iter()
                            .position(|a| a.same_channel(&agent))
                            .unwrap(),
                    );
                }
                local
            }));
        }

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for task in tasks {
            for index in task.await.unwrap() {
                *counts.entry(index).or_default() += 1;
            }
        }
        // 800 picks over 4 agents
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|c| *c == 200));
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let handler = FanOutHandler::<u32>::new(3, 8);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let worker: Arc<dyn Worker<u32>> = Arc::new(move |_item: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handler.attach(worker.clone(), "test"));
        assert!(!handler.attach(worker, "test"));
        assert!(handler.is_attached());
        assert_eq!(handler.context().active_tasks(), 3);

        for i in 0..6 {
            handler.dispatch(i).await.unwrap();
        }
        while seen.load(Ordering::SeqCst) < 6 {
            tokio::task::yield_now().await;
        }

        handler.context().shutdown().await;
        assert_eq!(handler.context().active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_simple_handler_send_and_close() {
        let (handler, mut rx) = SimpleHandler::<&'static str>::new(2);
        handler.send("a").await.unwrap();
        handler.close();
        assert!(matches!(handler.send("b").await, Err(BusError::HandlerClosed)));
        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, None);
        assert!(handler.is_closed());
    }

    #[tokio::test]
    async fn test_send_unblocks_on_cancel() {
        let (handler, _rx) = SimpleHandler::<u8>::new(1);
        let handler = Arc::new(handler);
        handler.send(1).await.unwrap();

        let blocked = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.send(2).await })
        };
        tokio::task::yield_now().await;
        handler.cancel();
        assert!(matches!(blocked.await.unwrap(), Err(BusError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_context_cancels_itself() {
        let ctx = HandlerContext::with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_cancelled());
        ctx.token().cancelled().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_timeout_closes_agents() {
        let handler = FanOutHandler::<u32>::with_timeout(2, 1, Duration::from_millis(100));
        assert_eq!(handler.agent_count(), 2);
        handler.context().token().cancelled().await;
        assert!(matches!(handler.dispatch(1).await, Err(BusError::Cancelled)));
    }

    #[test]
    fn test_child_context_follows_parent() {
        let parent = CancellationToken::new();
        let (handler, _rx) = SimpleHandler::<u8>::from_parent(1, &parent);
        parent.cancel();
        assert!(handler.is_cancelled());
    }
}
