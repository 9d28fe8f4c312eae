//! Queue-backed exchange bus.
//!
//! Each [`QueueDispatcher`] owns an input queue and, for services with a
//! request/reply operation, an output queue. One worker task per dispatcher
//! drains both, always preferring the input queue:
//!
//! ```text
//! dispatch(IN)  ──▶ <service>IN  ──┐
//!                                  ├──▶ worker ──▶ provider chain / reply chain
//! dispatch(OUT) ──▶ <service>OUT ──┘
//! ```
//!
//! `dispatch` returns as soon as the exchange is queued. An exchange is only
//! put on the output queue after its IN delivery reached the provider, so a
//! reply is never processed before the request it answers. A one-way service
//! has no output queue; its faults travel on the input queue behind the
//! request that caused them.
//!
//! The worker exits when the dispatcher is stopped or dropped.
//!
//! # Configuration
//!
//! | key                   | default | meaning                                    |
//! |-----------------------|---------|--------------------------------------------|
//! | `queue.drain-on-stop` | `false` | deliver queued exchanges when stopping     |

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use switchgear_core::{
    BoxedDispatcher, BusConfig, BusError, BusResult, DispatchChannel, Dispatcher, Exchange,
    ExchangeBus, ExchangePhase, ExchangeState, HandlerChain, QName, Service, deliver_input,
    deliver_output,
};

use crate::common::BusState;

/// Configuration key enabling delivery of queued exchanges on stop.
pub const DRAIN_ON_STOP: &str = "queue.drain-on-stop";

// ─── Worker ───────────────────────────────────────────────────────────────────

/// An item on the input queue.
enum Delivery {
    Request(Exchange),
    Fault(Exchange),
}

impl Delivery {
    async fn run(self, chain: &HandlerChain) {
        match self {
            Delivery::Request(exchange) => deliver_input(chain, &exchange).await,
            Delivery::Fault(exchange) => deliver_output(&exchange).await,
        }
    }
}

struct Queues {
    input: UnboundedSender<Delivery>,
    output: Option<UnboundedSender<Exchange>>,
    shutdown: CancellationToken,
}

struct Worker {
    chain: Arc<HandlerChain>,
    input: UnboundedReceiver<Delivery>,
    output: Option<UnboundedReceiver<Exchange>>,
    shutdown: CancellationToken,
    drain_on_stop: bool,
    service: String,
}

async fn recv_output(output: &mut Option<UnboundedReceiver<Exchange>>) -> Option<Exchange> {
    match output {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self) {
        debug!(service = %self.service, "Queue worker started");
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                delivery = self.input.recv() => match delivery {
                    Some(delivery) => delivery.run(&self.chain).await,
                    None => break,
                },
                Some(exchange) = recv_output(&mut self.output) => {
                    deliver_output(&exchange).await;
                }
            }
        }
        self.finish().await;
    }

    async fn finish(mut self) {
        self.input.close();
        if let Some(output) = &mut self.output {
            output.close();
        }

        let mut pending = 0usize;
        while let Ok(delivery) = self.input.try_recv() {
            if self.drain_on_stop {
                delivery.run(&self.chain).await;
            } else {
                pending += 1;
            }
        }
        if let Some(output) = &mut self.output {
            while let Ok(exchange) = output.try_recv() {
                if self.drain_on_stop {
                    deliver_output(&exchange).await;
                } else {
                    pending += 1;
                }
            }
        }

        if pending > 0 {
            warn!(service = %self.service, pending, "Queue worker stopped with undelivered exchanges");
        } else {
            debug!(service = %self.service, "Queue worker stopped");
        }
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// Dispatcher backed by per-channel queues and a worker task.
pub struct QueueDispatcher {
    service: Service,
    chain: Arc<HandlerChain>,
    channels: Vec<DispatchChannel>,
    drain_on_stop: bool,
    queues: Mutex<Option<Queues>>,
}

impl QueueDispatcher {
    /// Creates a stopped dispatcher for `service`.
    pub fn new(service: Service, chain: HandlerChain, drain_on_stop: bool) -> Self {
        let channels = DispatchChannel::provision(service.interface());
        Self {
            service,
            chain: Arc::new(chain),
            channels,
            drain_on_stop,
            queues: Mutex::new(None),
        }
    }

    /// Names of the queues this dispatcher provisions.
    pub fn queue_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.channel_name(self.service.name()))
            .collect()
    }

    fn transport_error(&self, reason: impl Into<String>) -> BusError {
        BusError::transport(self.service.name().to_string(), reason)
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    fn service(&self) -> &Service {
        &self.service
    }

    fn channels(&self) -> &[DispatchChannel] {
        &self.channels
    }

    fn start(&self) -> BusResult<()> {
        let mut queues = self.queues.lock();
        if queues.is_some() {
            return Err(BusError::AlreadyStarted(self.service.name().to_string()));
        }
        let runtime = Handle::try_current().map_err(|e| self.transport_error(e.to_string()))?;

        let (input_tx, input_rx) = unbounded_channel();
        let (output_tx, output_rx) = if self.has_channel(DispatchChannel::Output) {
            let (tx, rx) = unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let shutdown = CancellationToken::new();

        let worker = Worker {
            chain: self.chain.clone(),
            input: input_rx,
            output: output_rx,
            shutdown: shutdown.clone(),
            drain_on_stop: self.drain_on_stop,
            service: self.service.name().to_string(),
        };
        runtime.spawn(worker.run());

        *queues = Some(Queues {
            input: input_tx,
            output: output_tx,
            shutdown,
        });
        info!(queues = ?self.queue_names(), "Queue dispatcher started");
        Ok(())
    }

    fn stop(&self) -> BusResult<()> {
        if let Some(queues) = self.queues.lock().take() {
            queues.shutdown.cancel();
            info!(service = %self.service.name(), "Queue dispatcher stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.queues.lock().is_some()
    }

    async fn dispatch(&self, exchange: Exchange) -> BusResult<()> {
        let phase = exchange.phase().unwrap_or(ExchangePhase::In);
        let faulted = exchange.state() == ExchangeState::Fault;
        debug!(
            exchange_id = %exchange.id(),
            queue = %DispatchChannel::for_phase(phase).channel_name(self.service.name()),
            "Queueing exchange"
        );

        let guard = self.queues.lock();
        let Some(queues) = guard.as_ref() else {
            return Err(self.transport_error("dispatcher is stopped"));
        };
        let queued = match (phase, &queues.output) {
            (ExchangePhase::In, _) => queues.input.send(Delivery::Request(exchange)).is_ok(),
            (ExchangePhase::Out, Some(output)) => output.send(exchange).is_ok(),
            (ExchangePhase::Out, None) if faulted => {
                queues.input.send(Delivery::Fault(exchange)).is_ok()
            }
            (ExchangePhase::Out, None) => {
                return Err(BusError::NoChannel {
                    service: self.service.name().to_string(),
                    phase,
                });
            }
        };
        if queued {
            Ok(())
        } else {
            Err(self.transport_error("queue closed"))
        }
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("service", self.service.name())
            .field("queues", &self.queue_names())
            .field("running", &self.is_running())
            .finish()
    }
}

// ─── Bus ──────────────────────────────────────────────────────────────────────

/// Exchange bus delivering through per-service queues.
///
/// Dispatchers spawn their worker on the current tokio runtime, so
/// [`create_dispatcher`](ExchangeBus::create_dispatcher) must be called from
/// within one.
pub struct QueueExchangeBus {
    state: BusState<QueueDispatcher>,
}

impl QueueExchangeBus {
    /// Provider name of this bus.
    pub const NAME: &'static str = "queue";

    /// Creates an uninitialized bus.
    pub fn new() -> Self {
        Self {
            state: BusState::new(Self::NAME),
        }
    }

    fn drain_on_stop(&self) -> bool {
        self.state
            .property(DRAIN_ON_STOP)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

impl Default for QueueExchangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeBus for QueueExchangeBus {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init(&self, domain: &QName, config: &BusConfig) -> BusResult<()> {
        self.state.init(domain, config)
    }

    fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    fn create_dispatcher(&self, service: &Service, chain: HandlerChain) -> BusResult<BoxedDispatcher> {
        let dispatcher = Arc::new(QueueDispatcher::new(
            service.clone(),
            chain,
            self.drain_on_stop(),
        ));
        let dispatcher: BoxedDispatcher = self.state.attach(service, dispatcher)?;
        Ok(dispatcher)
    }

    fn get_dispatcher(&self, service: &Service) -> Option<BoxedDispatcher> {
        self.state.get(service).map(|d| d as BoxedDispatcher)
    }

    fn remove_dispatcher(&self, service: &Service) -> BusResult<Option<BoxedDispatcher>> {
        Ok(self.state.remove(service)?.map(|d| d as BoxedDispatcher))
    }

    fn destroy(&self) -> BusResult<()> {
        self.state.destroy()
    }
}

impl fmt::Debug for QueueExchangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueExchangeBus")
            .field("domain", &self.state.domain())
            .field("dispatchers", &self.state.len())
            .finish()
    }
}
