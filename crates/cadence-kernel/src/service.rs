//! The kernel: subsystem ownership and the block cycle loop.
//!
//! One cycle is one block slot. The loop alternates between a processing
//! slice (admit received blocks, generate the local block, hold outbound
//! broadcasts) and a maintenance slice (confirm blocks, re-evaluate the
//! competition, sample metrics). Holding broadcasts during processing
//! means a message created in a cycle cannot be observed or answered
//! within the same cycle; the processing timer paces cycles at the
//! configured block frequency even when generation is fast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::KernelConfig;
use crate::engine::BlockEngine;
use crate::error::Result;
use crate::metrics::KernelMetrics;
use crate::net::NetPort;
use crate::proc::ProcTable;
use crate::time::KernelTime;

enum CycleState {
    Proc,
    Maint,
}

/// The kernel. Owns every subsystem; build one with [`Kernel::init`] and
/// drive it with [`Kernel::start`] / [`Kernel::stop`].
pub struct Kernel {
    name: String,
    time: Arc<KernelTime>,
    metrics: Arc<KernelMetrics>,
    net: Arc<NetPort>,
    engine: Arc<BlockEngine>,
    proc_table: Arc<ProcTable>,
    started: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    cycle_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Kernel {
    /// Validate the configuration and build the subsystems in dependency
    /// order: time, metrics, net, block engine, process table. Runs the
    /// configured init hooks before returning.
    ///
    /// Must be called inside a Tokio runtime; queue workers are spawned
    /// during construction.
    pub fn init(mut config: KernelConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let name = config.blockchain_name.clone();
        // validate() guarantees the collaborators are present.
        let factory = config.block_factory.take().unwrap();
        let blockchain = config.blockchain.take().unwrap();
        let consensus = config.consensus.take().unwrap();
        let network_node = config.network_node.take().unwrap();

        let time = Arc::new(KernelTime::new(config.block_frequency_hz));
        let metrics = Arc::new(KernelMetrics::new());
        let net = NetPort::new(network_node, config.options.receive_concurrency);
        let engine = BlockEngine::new(
            &name,
            factory,
            blockchain,
            consensus,
            Arc::clone(&net),
            Arc::clone(&metrics),
            Arc::clone(&time),
            config.options.genesis,
        );
        let proc_table = Arc::new(ProcTable::new());

        let kernel = Arc::new(Self {
            name,
            time,
            metrics,
            net,
            engine,
            proc_table,
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            cycle_loop: Mutex::new(None),
        });

        for hook in config.on_init.drain(..) {
            hook(&kernel);
        }

        Ok(kernel)
    }

    /// Name of the blockchain this kernel drives.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kernel clock.
    pub fn time(&self) -> &Arc<KernelTime> {
        &self.time
    }

    /// The metrics registry.
    pub fn metrics(&self) -> &Arc<KernelMetrics> {
        &self.metrics
    }

    /// The network port.
    pub fn net(&self) -> &Arc<NetPort> {
        &self.net
    }

    /// The block engine.
    pub fn engine(&self) -> &Arc<BlockEngine> {
        &self.engine
    }

    /// The process table.
    pub fn proc_table(&self) -> &Arc<ProcTable> {
        &self.proc_table
    }

    /// Whether the cycle loop is running.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the receive queues and the block cycle loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(blockchain = %self.name, "starting kernel");

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);

        self.net.start();
        self.proc_table.run_all();

        let kernel = Arc::clone(self);
        let handle = tokio::spawn(async move { kernel.run_block_cycle(rx).await });
        *self.cycle_loop.lock() = Some(handle);
    }

    /// Signal the cycle loop to stop and halt the network port. In-flight
    /// queue work completes; held broadcasts are discarded. Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(blockchain = %self.name, "stopping kernel");

        self.net.stop();
        self.proc_table.stop_all();
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
    }

    /// Wait for the cycle loop task to finish after [`Kernel::stop`].
    pub async fn join(&self) {
        let handle = self.cycle_loop.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Text metrics snapshot.
    pub fn metrics_text(&self) -> String {
        self.metrics
            .text_snapshot(&self.time, self.engine.block_number())
    }

    /// JSON metrics snapshot.
    pub fn metrics_json(&self) -> Result<String> {
        self.metrics
            .json_snapshot(&self.time, self.engine.block_number())
    }

    async fn run_block_cycle(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut state = CycleState::Proc;
        loop {
            if *shutdown.borrow() {
                break;
            }
            match state {
                CycleState::Proc => {
                    self.proc_slice().await;
                    state = CycleState::Maint;
                }
                CycleState::Maint => {
                    self.maint_slice().await;
                    state = CycleState::Proc;
                }
            }
        }

        // Absorbing stop: halt intake and drop anything still held.
        self.engine.stop();
        self.net.discard_held();
        debug!(blockchain = %self.name, "block cycle stopped");
    }

    async fn proc_slice(&self) {
        let slice_started = Instant::now();
        self.time.start_cycle(&self.metrics);

        debug!("------------- proc slice --------------");
        debug!(uptime = ?self.time.up_time(), ktime = %self.time, "cycle started");

        // Anything broadcast during this slice is held until the slice is
        // over, so a message created in this cycle cannot be received and
        // answered within the same cycle.
        self.net.begin_proc();

        self.engine.start().await;

        let proc_time = self.metrics.compute_proc_time(&self.time);
        debug!(
            ktime = %self.time,
            computed_proc_ms = proc_time.as_millis() as u64,
            "computed process time"
        );
        let deadline = tokio::time::Instant::now() + proc_time;

        self.engine.generate().await;

        // The slice ends when the timer expires or generation returns,
        // whichever comes last.
        tokio::time::sleep_until(deadline).await;

        self.net.end_proc();

        let actual = slice_started.elapsed();
        self.metrics.set_actual_proc_time(actual.as_nanos() as f64);
        debug!(
            ktime = %self.time,
            actual_proc_ms = actual.as_millis() as u64,
            "actual process time"
        );
    }

    async fn maint_slice(&self) {
        let slice_started = Instant::now();

        debug!("------------- maint slice -------------");
        debug!(uptime = ?self.time.up_time(), ktime = %self.time, "maintenance started");

        self.engine.stop();
        self.engine.maint().await;

        self.net.sample_metrics(&self.metrics);

        self.metrics
            .set_maint_time(slice_started.elapsed().as_nanos() as f64);
    }
}
