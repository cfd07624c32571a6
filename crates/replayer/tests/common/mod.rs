#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use evmload_common::{
    BigUint,
    types::{Block, BlockHeader, ChainConfig, Genesis, GenesisAccount, Transaction},
};
use evmload_ledger::{ExecutionOutcome, FunctionCall, LedgerClient, LedgerError};
use evmload_replayer::{
    ChainLocation, ReplayConfig, ReplayOptions,
    call::{CallKind, GeneratorEvent, Method},
    generator::CallGenerator,
    source::BlockSource,
};
use evmload_storage::{InMemoryStore, Store, StoreEngine, error::StoreError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

pub const CHAIN_ID: u64 = 5;

/// Store engine that counts block reads.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryStore,
    reads: AtomicU64,
}

impl CountingStore {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl StoreEngine for CountingStore {
    fn read_block(&self, hash: H256, height: u64) -> Result<Option<Block>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_block(hash, height)
    }
}

pub struct TestChain {
    pub store: Store,
    pub engine: Arc<CountingStore>,
    pub blocks: Vec<Block>,
}

impl TestChain {
    pub fn hashes(&self) -> Vec<H256> {
        self.blocks.iter().map(Block::hash).collect()
    }

    pub fn location(&self) -> ChainLocation {
        ChainLocation::new(self.hashes()).unwrap()
    }

    pub fn target(&self) -> (u64, H256) {
        let last = self.blocks.last().unwrap();
        (last.number(), last.hash())
    }
}

pub fn block_hash(number: u64) -> H256 {
    H256::from_low_u64_be(0x1000 + number)
}

/// Every third transaction of a block creates a contract.
pub fn sample_tx(block: u64, index: usize) -> Transaction {
    Transaction {
        hash: H256::from_low_u64_be(block * 1_000 + index as u64),
        raw: Bytes::from(vec![0xf8, block as u8, index as u8]),
        nonce: index as u64,
        gas_price: U256::from(1_000_000_000u64),
        gas_limit: 21_000 + index as u64,
        to: (index % 3 != 2).then(|| Address::from_low_u64_be(block + 1)),
        value: U256::from(block),
        data: Bytes::new(),
    }
}

/// Builds a linked chain where block `i` carries `tx_counts[i]` transactions.
pub fn build_chain(tx_counts: &[usize]) -> TestChain {
    build_chain_missing(tx_counts, &[])
}

/// Like [`build_chain`], but the blocks at `missing` heights never reach the store.
pub fn build_chain_missing(tx_counts: &[usize], missing: &[u64]) -> TestChain {
    let engine = Arc::new(CountingStore::default());
    let mut blocks = Vec::new();
    let mut parent_hash = H256::zero();
    for (number, tx_count) in tx_counts.iter().enumerate() {
        let number = number as u64;
        let block = Block::new(
            BlockHeader {
                hash: block_hash(number),
                parent_hash,
                coinbase: Address::from_low_u64_be(0xc0),
                difficulty: BigUint::from(131_072u32 + number as u32),
                number,
                gas_limit: 8_000_000,
                timestamp: 1_548_854_791 + number * 15,
            },
            (0..*tx_count).map(|index| sample_tx(number, index)).collect(),
        );
        parent_hash = block.hash();
        if !missing.contains(&number) {
            engine.inner.add_block(block.clone()).unwrap();
        }
        blocks.push(block);
    }
    TestChain {
        store: Store::from_engine(engine.clone()),
        engine,
        blocks,
    }
}

pub fn genesis() -> Genesis {
    let mut alloc = BTreeMap::new();
    alloc.insert(
        Address::from_low_u64_be(0xa1),
        GenesisAccount {
            balance: BigUint::from(10u32).pow(18),
        },
    );
    alloc.insert(
        Address::from_low_u64_be(0xa0),
        GenesisAccount {
            balance: BigUint::from(42u32),
        },
    );
    Genesis {
        config: ChainConfig { chain_id: CHAIN_ID },
        alloc,
    }
}

pub fn config(options: ReplayOptions) -> ReplayConfig {
    ReplayConfig::new(options).unwrap()
}

/// Runs the generator to completion without the async pipeline.
pub fn generate(chain: &TestChain, genesis: Genesis, config: &ReplayConfig) -> Vec<GeneratorEvent> {
    let source = BlockSource::new(chain.store.clone(), chain.location(), config.skip_empty());
    CallGenerator::new(source, CHAIN_ID, Arc::new(genesis), config).collect()
}

/// Compact rendering of a call stream: `begin_chain`, `skip`, `begin_block(b)`, `submit(b,t)`.
pub fn describe(events: &[GeneratorEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            GeneratorEvent::Call(call) => match &call.kind {
                CallKind::Comment => format!("# {}", call.comment),
                CallKind::Remote { method, .. } => match (method, call.block, call.tx) {
                    (Method::BeginChain, _, _) => "begin_chain".to_string(),
                    (Method::BeginBlock, Some(block), _) => format!("begin_block({block})"),
                    (Method::Submit, Some(block), Some(tx)) => format!("submit({block},{tx})"),
                    (method, block, tx) => format!("{method}({block:?},{tx:?})"),
                },
            },
            GeneratorEvent::Break(signal) => format!("break({})", signal.position),
            GeneratorEvent::Fault { error, .. } => format!("fault({})", error.error_code()),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Single(FunctionCall),
    Batch(Vec<FunctionCall>),
}

impl Submission {
    pub fn calls(&self) -> Vec<FunctionCall> {
        match self {
            Submission::Single(call) => vec![call.clone()],
            Submission::Batch(calls) => calls.clone(),
        }
    }
}

/// Ledger client that records submissions and fails on demand.
#[derive(Default)]
pub struct MockLedger {
    submissions: Mutex<Vec<Submission>>,
    /// Calls with these args report an execution failure.
    fail_args: Vec<Bytes>,
    /// 1-based submission numbers that fail at the transport level.
    fail_submissions: Vec<usize>,
    /// Token canceled while handling the given 1-based submission.
    cancel_on: Option<(usize, CancellationToken)>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_args(args: Vec<Bytes>) -> Self {
        Self {
            fail_args: args,
            ..Self::default()
        }
    }

    pub fn failing_on_submissions(numbers: Vec<usize>) -> Self {
        Self {
            fail_submissions: numbers,
            ..Self::default()
        }
    }

    pub fn canceling_on_submission(number: usize, cancel: CancellationToken) -> Self {
        Self {
            cancel_on: Some((number, cancel)),
            ..Self::default()
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Every call that reached the ledger, flattened in submission order.
    pub fn calls(&self) -> Vec<FunctionCall> {
        self.submissions()
            .iter()
            .flat_map(Submission::calls)
            .collect()
    }

    fn record(&self, submission: Submission) -> Result<ExecutionOutcome, LedgerError> {
        let mut submissions = self.submissions.lock().unwrap();
        let fails = submission
            .calls()
            .iter()
            .any(|call| self.fail_args.contains(&call.args));
        submissions.push(submission);
        if let Some((number, cancel)) = &self.cancel_on
            && *number == submissions.len()
        {
            cancel.cancel();
        }
        if self.fail_submissions.contains(&submissions.len()) {
            return Err(LedgerError::RPCError {
                method: "function_call".to_string(),
                code: -32000,
                message: "node unavailable".to_string(),
                data: None,
            });
        }
        if fails {
            return Ok(ExecutionOutcome::failure(
                json!({ "ActionError": { "kind": "FunctionCallError" } }),
            ));
        }
        Ok(ExecutionOutcome::success(Bytes::new()))
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn account_id(&self) -> &str {
        "replayer.test.near"
    }

    fn contract_id(&self) -> &str {
        "evm.test.near"
    }

    async fn submit(&self, call: FunctionCall) -> Result<ExecutionOutcome, LedgerError> {
        self.record(Submission::Single(call))
    }

    async fn submit_batch(
        &self,
        calls: Vec<FunctionCall>,
    ) -> Result<ExecutionOutcome, LedgerError> {
        self.record(Submission::Batch(calls))
    }
}
