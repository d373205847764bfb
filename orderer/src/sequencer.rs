//! Single-writer sequencer
//!
//! Assigns every submitted payload a global sequence number, groups payloads
//! into batches and commits each batch to its own Merkle tree:
//! - One actor task owns all ordering state
//! - Bounded mailbox gives backpressure to broadcast streams
//! - Ordered transactions fan out to deliver streams over a broadcast channel
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Broadcast streams            Deliver streams   │
//! └───────────┬──────────────────────────────▲───────────┘
//!             │ submit()                     │ subscribe()
//!             ▼                              │
//! ┌──────────────────────────────────────────┴───────────┐
//! │              SequencerHandle (Clone)                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              Sequencer (Single Task)                  │
//! │  Pending: Vec<PendingTransaction>                     │
//! │  Cut: max_batch_size, batch_timeout, flush, shutdown  │
//! │                       │                               │
//! │                       ▼                               │
//! │   MerkleTree per batch → OrderedTransaction + witness │
//! │          broadcast::Sender<OrderedTransaction>        │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::config::OrderingConfig;
use crate::metrics::Metrics;
use crate::{Error, Result};
use merkle_core::{HashStrategy, MerkleTree, Witness};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};

/// A transaction after ordering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedTransaction {
    /// Global sequence number, starting at 0
    pub sequence: u64,

    /// Batch number, starting at 0
    pub batch: u64,

    /// Position of the payload in its batch tree
    pub leaf_index: u64,

    /// Submitted payload
    pub payload: Vec<u8>,

    /// Transaction id (tagged leaf digest of the payload)
    pub txid: Vec<u8>,

    /// Inclusion witness against the batch root
    pub witness: Witness,
}

/// Answer to a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Assigned sequence number
    pub sequence: u64,

    /// Transaction id
    pub txid: Vec<u8>,
}

/// Summary of a cut batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Batch number
    pub batch: u64,

    /// Root digest of the batch tree
    pub root: Vec<u8>,

    /// Number of transactions (padding excluded)
    pub size: usize,
}

/// Sequencer settings
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Cut a batch once it holds this many transactions
    pub max_batch_size: usize,

    /// Cut a non-empty batch this long after its first transaction
    pub batch_timeout: Duration,

    /// Mailbox capacity
    pub mailbox_capacity: usize,

    /// Ordered transactions buffered per subscriber
    pub subscriber_buffer: usize,

    /// Hash strategy for batch trees
    pub strategy: HashStrategy,
}

impl SequencerConfig {
    /// Build from the `[ordering]` configuration section
    pub fn from_ordering(config: &OrderingConfig) -> Result<Self> {
        Ok(Self {
            max_batch_size: config.max_batch_size,
            batch_timeout: config.batch_timeout(),
            mailbox_capacity: config.mailbox_capacity,
            subscriber_buffer: config.subscriber_buffer,
            strategy: config.hash_strategy()?,
        })
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout: Duration::from_millis(200),
            mailbox_capacity: 1000,
            subscriber_buffer: 1024,
            strategy: HashStrategy::default(),
        }
    }
}

/// Message sent to the sequencer
#[derive(Debug)]
pub enum SequencerMessage {
    /// Order a payload
    Submit {
        /// Transaction payload
        payload: Vec<u8>,
        /// Receipt once the payload is sequenced
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Receive ordered transactions cut from now on
    Subscribe {
        /// Receiver of ordered transactions
        response: oneshot::Sender<broadcast::Receiver<OrderedTransaction>>,
    },

    /// Cut the open batch immediately
    Flush {
        /// Summary of the cut batch, if one was open
        response: oneshot::Sender<Result<Option<BatchSummary>>>,
    },

    /// Cut the open batch and stop
    Shutdown {
        /// Summary of the final batch, if one was open
        response: oneshot::Sender<Result<Option<BatchSummary>>>,
    },
}

#[derive(Debug)]
struct PendingTransaction {
    sequence: u64,
    payload: Vec<u8>,
    txid: Vec<u8>,
}

/// Actor that orders transactions
#[derive(Debug)]
pub struct Sequencer {
    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<SequencerMessage>,

    /// Fan-out of ordered transactions
    publisher: broadcast::Sender<OrderedTransaction>,

    /// Open batch
    pending: Vec<PendingTransaction>,

    /// When the open batch must be cut
    deadline: Option<Instant>,

    next_sequence: u64,
    next_batch: u64,

    max_batch_size: usize,
    batch_timeout: Duration,
    strategy: HashStrategy,
    metrics: Metrics,
}

impl Sequencer {
    /// Create new actor
    pub fn new(
        config: &SequencerConfig,
        mailbox: mpsc::Receiver<SequencerMessage>,
        metrics: Metrics,
    ) -> Self {
        let (publisher, _) = broadcast::channel(config.subscriber_buffer.max(1));

        Self {
            mailbox,
            publisher,
            pending: Vec::with_capacity(config.max_batch_size),
            deadline: None,
            next_sequence: 0,
            next_batch: 0,
            max_batch_size: config.max_batch_size.max(1),
            batch_timeout: config.batch_timeout,
            strategy: config.strategy.clone(),
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        tracing::debug!(
            max_batch_size = self.max_batch_size,
            batch_timeout_ms = self.batch_timeout.as_millis() as u64,
            hash = self.strategy.name(),
            "Sequencer started"
        );

        loop {
            let deadline = self.deadline;

            tokio::select! {
                msg = self.mailbox.recv() => {
                    match msg {
                        Some(SequencerMessage::Shutdown { response }) => {
                            let _ = response.send(self.cut_batch());
                            break;
                        }
                        Some(msg) => self.handle_message(msg),
                        // Mailbox closed
                        None => {
                            if let Err(e) = self.cut_batch() {
                                tracing::error!("Error cutting final batch: {}", e);
                            }
                            break;
                        }
                    }
                }

                // Batch timeout expired
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Err(e) = self.cut_batch() {
                        tracing::error!("Error cutting batch on timeout: {}", e);
                    }
                }
            }
        }

        tracing::debug!(next_sequence = self.next_sequence, "Sequencer stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: SequencerMessage) {
        match msg {
            SequencerMessage::Submit { payload, response } => {
                let receipt = self.enqueue(payload);
                let admitted = receipt.is_ok();
                let _ = response.send(receipt);

                if admitted && self.pending.len() >= self.max_batch_size {
                    if let Err(e) = self.cut_batch() {
                        tracing::error!("Error cutting full batch: {}", e);
                    }
                }
            }

            SequencerMessage::Subscribe { response } => {
                let _ = response.send(self.publisher.subscribe());
            }

            SequencerMessage::Flush { response } => {
                let _ = response.send(self.cut_batch());
            }

            SequencerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Append a payload to the open batch
    fn enqueue(&mut self, payload: Vec<u8>) -> Result<Receipt> {
        let txid = self.strategy.leaf_hash(&payload)?;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.pending.is_empty() {
            self.deadline = Some(Instant::now() + self.batch_timeout);
        }
        self.pending.push(PendingTransaction {
            sequence,
            payload,
            txid: txid.clone(),
        });

        Ok(Receipt { sequence, txid })
    }

    /// Commit the open batch to a tree and publish its transactions
    ///
    /// On error the open batch is kept and retried on the next cut.
    fn cut_batch(&mut self) -> Result<Option<BatchSummary>> {
        if self.pending.is_empty() {
            self.deadline = None;
            return Ok(None);
        }

        let started = Instant::now();
        let committed = self.commit_pending();
        let (tree, witnesses) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                self.deadline = Some(Instant::now() + self.batch_timeout);
                return Err(e);
            }
        };
        let build_seconds = started.elapsed().as_secs_f64();

        self.deadline = None;
        let pending = std::mem::take(&mut self.pending);
        let batch = self.next_batch;
        self.next_batch += 1;

        let summary = BatchSummary {
            batch,
            root: tree.root()?,
            size: pending.len(),
        };

        for ((leaf_index, tx), witness) in pending.into_iter().enumerate().zip(witnesses) {
            // No subscribers is not an error
            let _ = self.publisher.send(OrderedTransaction {
                sequence: tx.sequence,
                batch,
                leaf_index: leaf_index as u64,
                payload: tx.payload,
                txid: tx.txid,
                witness,
            });
        }

        self.metrics.record_batch(summary.size, build_seconds);
        tracing::debug!(
            batch,
            size = summary.size,
            root = %tree,
            "Cut batch"
        );

        Ok(Some(summary))
    }

    /// Build the tree and one witness per real leaf without touching the open batch
    fn commit_pending(&self) -> Result<(MerkleTree, Vec<Witness>)> {
        let tree = MerkleTree::with_strategy(
            self.pending.iter().map(|tx| &tx.payload),
            self.strategy.clone(),
        )?;
        let witnesses = (0..self.pending.len())
            .map(|index| tree.prove_index(index))
            .collect::<merkle_core::Result<Vec<_>>>()?;

        Ok((tree, witnesses))
    }
}

/// Handle for sending messages to the sequencer
#[derive(Clone, Debug)]
pub struct SequencerHandle {
    sender: mpsc::Sender<SequencerMessage>,
}

impl SequencerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<SequencerMessage>) -> Self {
        Self { sender }
    }

    /// Submit a payload for ordering
    pub async fn submit(&self, payload: Vec<u8>) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.send(SequencerMessage::Submit {
            payload,
            response: tx,
        })
        .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Subscribe to ordered transactions
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<OrderedTransaction>> {
        let (tx, rx) = oneshot::channel();
        self.send(SequencerMessage::Subscribe { response: tx })
            .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Cut the open batch immediately
    pub async fn flush(&self) -> Result<Option<BatchSummary>> {
        let (tx, rx) = oneshot::channel();
        self.send(SequencerMessage::Flush { response: tx }).await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Cut the open batch and stop the sequencer
    pub async fn shutdown(&self) -> Result<Option<BatchSummary>> {
        let (tx, rx) = oneshot::channel();
        self.send(SequencerMessage::Shutdown { response: tx })
            .await?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    async fn send(&self, msg: SequencerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Sequencer mailbox closed".to_string()))
    }
}

/// Spawn the sequencer actor
pub fn spawn_sequencer(config: &SequencerConfig, metrics: Metrics) -> SequencerHandle {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let actor = Sequencer::new(config, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    SequencerHandle::new(tx)
}
