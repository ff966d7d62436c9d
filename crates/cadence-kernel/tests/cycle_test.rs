//! End-to-end scheduler scenarios against stub blockchain, consensus, and
//! transport implementations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use cadence_kernel::domain::{PushQueue, QueueConsumer};
use cadence_kernel::{
    get_metrics, BlockchainPort, ConsensusPort, GetMetricsRequest, Kernel, KernelConfig,
    KernelError, MessageHandler, NetworkNode, Result, QUEUE_CAPACITY,
};
use cadence_types::{
    Block, BlockAddOutcome, BlockFactory, BlockHash, BranchSelection, CodecError, Competition,
    MessageProtocol, NetworkMessage,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ---------------------------------------------------------------------------
// Stub blockchain
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct SimBlock {
    number: u64,
    parent: BlockHash,
}

impl SimBlock {
    fn new(number: u64, parent: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            parent: BlockHash::new(parent.into()),
        }
    }
}

impl Block for SimBlock {
    fn hash(&self) -> BlockHash {
        BlockHash::new(format!("blk-{}", self.number).into_bytes())
    }
    fn parent_hash(&self) -> BlockHash {
        self.parent.clone()
    }
    fn block_number(&self) -> u64 {
        self.number
    }
    fn marshal(&self) -> std::result::Result<(Vec<u8>, Vec<String>), CodecError> {
        Ok((
            self.number.to_le_bytes().to_vec(),
            vec![String::from_utf8_lossy(self.parent.as_bytes()).into_owned()],
        ))
    }
    fn unmarshal(
        &mut self,
        data: &[u8],
        links: &[String],
    ) -> std::result::Result<(), CodecError> {
        let bytes: [u8; 8] = data
            .try_into()
            .map_err(|_| CodecError::Unmarshal("bad block payload".to_string()))?;
        self.number = u64::from_le_bytes(bytes);
        self.parent = BlockHash::new(
            links
                .first()
                .ok_or_else(|| CodecError::Unmarshal("missing parent link".to_string()))?
                .as_bytes()
                .to_vec(),
        );
        Ok(())
    }
}

struct SimFactory;

impl BlockFactory for SimFactory {
    fn make_empty_block(&self) -> Box<dyn Block> {
        Box::new(SimBlock::new(0, Vec::new()))
    }
}

#[derive(Default)]
struct ChainState {
    genesis_calls: usize,
    added: Vec<(Vec<u64>, bool)>,
    tip: Option<Arc<dyn Block>>,
}

struct SimChain {
    state: Arc<Mutex<ChainState>>,
}

#[async_trait]
impl BlockchainPort for SimChain {
    async fn generate_genesis(&self) -> Result<Arc<dyn Block>> {
        self.state.lock().genesis_calls += 1;
        Ok(Arc::new(SimBlock::new(1, &b"root"[..])))
    }

    async fn generate_block(
        &self,
        branch: Vec<Arc<dyn Block>>,
        _root_id: u64,
    ) -> Result<Arc<dyn Block>> {
        let head = &branch[0];
        Ok(Arc::new(SimBlock::new(
            head.block_number() + 1,
            head.hash().as_bytes().to_vec(),
        )))
    }

    async fn add_blocks(
        &self,
        blocks: Vec<Arc<dyn Block>>,
        local: bool,
    ) -> Result<BlockAddOutcome> {
        let mut state = self.state.lock();
        state
            .added
            .push((blocks.iter().map(|b| b.block_number()).collect(), local));
        state.tip = Some(Arc::clone(&blocks[0]));
        Ok(BlockAddOutcome {
            added_block: Some(Arc::clone(&blocks[0])),
        })
    }
}

/// Offers the chain tip as the only branch, up to a block-number limit.
/// `maint_delay` stretches the confirmation step to simulate heavy
/// maintenance work.
struct SimConsensus {
    state: Arc<Mutex<ChainState>>,
    max_block: u64,
    maint_delay: Duration,
}

struct TipCompetition {
    tip: Arc<dyn Block>,
}

impl Competition for TipCompetition {
    fn branch(&self, _gen_num: u64) -> Option<BranchSelection> {
        Some(BranchSelection {
            branch: vec![Arc::clone(&self.tip)],
            root_id: 1,
            switch_heads: false,
        })
    }
}

#[async_trait]
impl ConsensusPort for SimConsensus {
    async fn confirm_blocks(&self) {
        if !self.maint_delay.is_zero() {
            sleep(self.maint_delay).await;
        }
    }

    async fn evaluate(&self) -> Option<Box<dyn Competition>> {
        let state = self.state.lock();
        let tip = state.tip.as_ref()?;
        if tip.block_number() >= self.max_block {
            return None;
        }
        Some(Box::new(TipCompetition {
            tip: Arc::clone(tip),
        }))
    }
}

// ---------------------------------------------------------------------------
// Stub transport
// ---------------------------------------------------------------------------

struct SimNode {
    sent: Mutex<Vec<NetworkMessage>>,
    handler: Mutex<Option<MessageHandler>>,
}

impl SimNode {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
        })
    }

    fn deliver(&self, message: NetworkMessage) {
        let handler = self.handler.lock().clone().expect("handler registered");
        handler(message);
    }

    fn sent(&self) -> Vec<NetworkMessage> {
        self.sent.lock().clone()
    }
}

impl NetworkNode for SimNode {
    fn peer_id(&self) -> String {
        "QmSimPeer".to_string()
    }
    fn broadcast(&self, messages: Vec<NetworkMessage>) {
        self.sent.lock().extend(messages);
    }
    fn on_message_received(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Sim {
    kernel: Arc<Kernel>,
    node: Arc<SimNode>,
    state: Arc<Mutex<ChainState>>,
}

fn sim_kernel(genesis: bool, frequency_hz: f64, max_block: u64) -> Sim {
    sim_kernel_with_maint_delay(genesis, frequency_hz, max_block, Duration::ZERO)
}

fn sim_kernel_with_maint_delay(
    genesis: bool,
    frequency_hz: f64,
    max_block: u64,
    maint_delay: Duration,
) -> Sim {
    init_tracing();
    let state = Arc::new(Mutex::new(ChainState::default()));
    let node = SimNode::new();

    let mut config = KernelConfig::new("simchain", frequency_hz);
    config.block_factory = Some(Arc::new(SimFactory));
    config.blockchain = Some(Arc::new(SimChain {
        state: Arc::clone(&state),
    }));
    config.consensus = Some(Arc::new(SimConsensus {
        state: Arc::clone(&state),
        max_block,
        maint_delay,
    }));
    config.network_node = Some(node.clone());
    config.options.genesis = genesis;

    let kernel = Kernel::init(config).expect("kernel initializes");
    Sim {
        kernel,
        node,
        state,
    }
}

fn block_protocol() -> MessageProtocol {
    MessageProtocol::for_blocks("simchain", "simchain-block", "1")
}

fn message_for(block: &SimBlock, from: &str) -> NetworkMessage {
    let (data, links) = block.marshal().expect("marshal");
    NetworkMessage {
        data,
        links,
        hash: block.hash(),
        protocol: block_protocol(),
        from: from.to_string(),
    }
}

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !done() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_genesis_node_produces_the_first_five_blocks() {
    let sim = sim_kernel(true, 10.0, 5);

    sim.kernel.start();
    wait_for("five blocks admitted", || {
        sim.state.lock().added.len() >= 5
    })
    .await;
    wait_for("five cycles", || sim.kernel.time().cycle_number() >= 5).await;
    sim.kernel.stop();
    sim.kernel.join().await;

    let state = sim.state.lock();
    assert_eq!(state.genesis_calls, 1);

    // Blocks 1..5 admitted locally, in order.
    let local: Vec<u64> = state
        .added
        .iter()
        .filter(|(_, local)| *local)
        .map(|(numbers, _)| numbers[0])
        .collect();
    assert_eq!(local, vec![1, 2, 3, 4, 5]);

    // One priority broadcast per generated block.
    assert_eq!(sim.node.sent().len(), 5);
    assert!(sim.kernel.time().cycle_number() >= 5);
    assert!(!sim.kernel.started());
}

#[tokio::test]
async fn test_received_block_is_rebroadcast_with_identity_preserved() {
    let sim = sim_kernel(false, 10.0, 0);

    sim.kernel.start();
    // Let the receive queue workers come up, then deliver a remote block.
    let block = SimBlock::new(3, &b"remote-parent"[..]);
    let message = message_for(&block, "QmRemotePeer");
    sim.node.deliver(message.clone());

    wait_for("remote block admitted", || !sim.state.lock().added.is_empty()).await;
    wait_for("re-broadcast observed", || !sim.node.sent().is_empty()).await;
    sim.kernel.stop();
    sim.kernel.join().await;

    let state = sim.state.lock();
    assert_eq!(state.added[0], (vec![3], false));

    // The re-broadcast is the incoming message itself: same hash, payload,
    // protocol, and origin.
    let sent = sim.node.sent();
    assert_eq!(sent[0], message);
}

#[tokio::test]
async fn test_intake_admits_in_ascending_block_number_order() {
    let sim = sim_kernel(false, 10.0, 0);

    // Three parents queued out of order before any processing slice.
    for (number, parent) in [(5u64, &b"P1"[..]), (3, &b"P2"[..]), (4, &b"P3"[..])] {
        let block = SimBlock::new(number, parent);
        sim.kernel.engine().receive(message_for(&block, "QmRemotePeer"));
    }
    assert_eq!(sim.kernel.engine().queued_blocks(), 3);

    timeout(Duration::from_secs(1), sim.kernel.engine().start())
        .await
        .expect("intake sweep completes");

    let state = sim.state.lock();
    let order: Vec<u64> = state.added.iter().map(|(numbers, _)| numbers[0]).collect();
    assert_eq!(order, vec![3, 4, 5]);
}

#[tokio::test]
async fn test_unknown_protocol_is_never_dispatched() {
    let sim = sim_kernel(false, 10.0, 0);

    sim.kernel.start();
    let block = SimBlock::new(2, &b"parent"[..]);
    let mut message = message_for(&block, "QmRemotePeer");
    message.protocol = MessageProtocol::for_blocks("otherchain", "otherchain-block", "9");
    sim.node.deliver(message);

    // Give the kernel a few cycles; the message must not reach the chain.
    sleep(Duration::from_millis(300)).await;
    sim.kernel.stop();
    sim.kernel.join().await;

    assert!(sim.state.lock().added.is_empty());
}

#[tokio::test]
async fn test_overrun_clamps_the_proc_budget_and_cycles_continue() {
    // Maintenance takes twice the block interval, so the computed
    // processing budget is always negative.
    let sim = sim_kernel_with_maint_delay(false, 10.0, 0, Duration::from_millis(200));

    sim.kernel.start();
    wait_for("three cycles", || sim.kernel.time().cycle_number() >= 3).await;
    sim.kernel.stop();
    sim.kernel.join().await;

    // The budget went negative and was clamped to zero; processing slices
    // returned as soon as generation finished and cycles kept advancing.
    assert!(sim.kernel.metrics().computed_proc_time() < 0.0);
    assert!(sim.kernel.metrics().computed_proc_times()[0] < 0.0);
    assert!(sim.kernel.time().cycle_number() >= 3);
}

#[tokio::test]
async fn test_metrics_surface_formats() {
    let sim = sim_kernel(false, 10.0, 0);

    let text = get_metrics(
        Some(&sim.kernel),
        &GetMetricsRequest {
            format: "text".to_string(),
        },
    )
    .expect("text snapshot");
    assert!(text.metrics.contains("Moving average windows"));

    let json = get_metrics(
        Some(&sim.kernel),
        &GetMetricsRequest {
            format: "json".to_string(),
        },
    )
    .expect("json snapshot");
    assert!(json.metrics.contains("\"cycleNumber\""));

    let err = get_metrics(
        Some(&sim.kernel),
        &GetMetricsRequest {
            format: "xml".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, KernelError::UnknownMetricsFormat(_)));
}

#[tokio::test]
async fn test_full_queue_rejects_exactly_the_overflowing_item() {
    struct Sink;

    #[async_trait]
    impl QueueConsumer<usize> for Sink {
        async fn consume(&self, _item: usize) {}
    }

    let queue = PushQueue::new(1, QUEUE_CAPACITY, Arc::new(Sink));
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rejected);
    queue.on_overflow(move |item| sink.lock().push(item));

    // One more put than the queue holds; the worker is never started.
    for item in 0..=QUEUE_CAPACITY {
        queue.put(item);
    }

    assert_eq!(queue.count(), QUEUE_CAPACITY);
    assert_eq!(*rejected.lock(), vec![QUEUE_CAPACITY]);
}
