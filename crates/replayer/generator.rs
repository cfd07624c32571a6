//! Call Generator: turns the block stream into the ordered sequence of remote calls.

use evmload_common::types::{Block, Genesis, Transaction};
use std::{collections::VecDeque, sync::Arc};
use tracing::trace;

use crate::{
    call::{BreakSignal, Call, GeneratorEvent, Method},
    config::{Position, ReplayConfig},
    encoding::{BeginBlockArgs, BeginChainArgs},
    errors::ReplayError,
    source::{BlockSource, SourceItem},
};

/// Lazily produces [`GeneratorEvent`]s.
///
/// The sequence always opens with `begin_chain`, and ends after the source is exhausted, with a
/// [`GeneratorEvent::Break`] at the break position, or with a [`GeneratorEvent::Fault`].
pub struct CallGenerator {
    source: BlockSource,
    chain_id: u64,
    genesis: Arc<Genesis>,
    start: Option<Position>,
    break_at: Option<Position>,
    pending: VecDeque<GeneratorEvent>,
    started: bool,
    done: bool,
    skipped_blocks: u64,
}

impl CallGenerator {
    pub fn new(
        source: BlockSource,
        chain_id: u64,
        genesis: Arc<Genesis>,
        config: &ReplayConfig,
    ) -> Self {
        Self {
            source,
            chain_id,
            genesis,
            start: config.start(),
            break_at: config.break_at(),
            pending: VecDeque::new(),
            started: false,
            done: false,
            skipped_blocks: 0,
        }
    }

    /// Empty blocks withheld so far.
    pub fn skipped_blocks(&self) -> u64 {
        self.skipped_blocks
    }

    fn emit(&mut self, call: Call) {
        trace!(block = ?call.block, tx = ?call.tx, comment = %call.comment, "Generated call");
        self.pending.push_back(GeneratorEvent::Call(call));
    }

    fn fault(&mut self, block: Option<u64>, tx: Option<usize>, error: ReplayError) {
        self.pending.push_back(GeneratorEvent::Fault { block, tx, error });
        self.done = true;
    }

    fn stop(&mut self, position: Position, trigger: Option<Transaction>) {
        self.emit(Call::comment(format!("breaking at {position}")));
        self.pending
            .push_back(GeneratorEvent::Break(BreakSignal { position, trigger }));
        self.done = true;
    }

    fn begin_chain(&mut self) {
        let args = BeginChainArgs::new(self.chain_id, &self.genesis).and_then(|args| args.encode());
        match args {
            Ok(args) => {
                let comment = format!(
                    "begin_chain: chain id {}, {} genesis accounts",
                    self.chain_id,
                    self.genesis.alloc.len()
                );
                self.emit(Call::remote(
                    None,
                    None,
                    comment,
                    Method::BeginChain,
                    args,
                    None,
                ));
            }
            Err(err) => self.fault(None, None, err.into()),
        }
    }

    fn on_skipped_empty(&mut self, first: u64, last: u64) {
        match self.break_at {
            Some(position) if (first..=last).contains(&position.block) => {
                if position.block > first {
                    self.skip_empty_range(first, position.block - 1);
                }
                self.stop(position, None);
            }
            _ => self.skip_empty_range(first, last),
        }
    }

    fn skip_empty_range(&mut self, first: u64, last: u64) {
        self.skipped_blocks += last - first + 1;
        self.emit(Call::comment(format!("skipping empty blocks [{first};{last}]")));
    }

    fn on_block(&mut self, height: u64, block: Block) {
        if let Some(position) = self.break_at {
            // Break positions before the first replayed block stop right after begin_chain.
            if position.block < height {
                self.stop(position, None);
                return;
            }
        }
        if let Some(start) = self.start {
            if height < start.block {
                self.emit(Call::comment(format!("skipping block {height}")));
                return;
            }
        }
        if let Some(position) = self.break_at {
            if position.block == height && position.tx.is_none() {
                let trigger = block.transactions.into_iter().next();
                self.stop(position, trigger);
                return;
            }
        }

        let args = BeginBlockArgs::new(&block.header).and_then(|args| args.encode());
        let args = match args {
            Ok(args) => args,
            Err(err) => return self.fault(Some(height), None, err.into()),
        };
        self.emit(Call::remote(
            Some(height),
            None,
            format!("begin_block {height}: {} txs", block.transactions.len()),
            Method::BeginBlock,
            args,
            None,
        ));

        let break_tx = self
            .break_at
            .filter(|position| position.block == height)
            .and_then(|position| position.tx);
        let start_tx = self
            .start
            .filter(|start| start.block == height)
            .and_then(|start| start.tx)
            .unwrap_or(0);

        for (index, tx) in block.transactions.into_iter().enumerate() {
            if break_tx == Some(index) {
                self.stop(Position::tx(height, index), Some(tx));
                return;
            }
            if index < start_tx {
                self.emit(Call::comment(format!("skipping block {height} tx {index}")));
                continue;
            }
            let comment = format!(
                "submit block {height} tx {index}: gas limit {}, {} bytes",
                tx.gas_limit,
                tx.raw.len()
            );
            self.emit(Call::remote(
                Some(height),
                Some(index),
                comment,
                Method::Submit,
                tx.raw.clone(),
                Some(tx),
            ));
        }

        // A tx offset past the end of the block stops at the end of that block.
        if let Some(tx) = break_tx {
            self.stop(Position::tx(height, tx), None);
        }
    }
}

impl Iterator for CallGenerator {
    type Item = GeneratorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.done {
                return None;
            }
            if !self.started {
                self.started = true;
                self.begin_chain();
                continue;
            }

            match self.source.next() {
                None => self.done = true,
                Some(Err(err)) => {
                    let block = match &err {
                        ReplayError::ChainGap { height, .. } => Some(*height),
                        _ => None,
                    };
                    self.fault(block, None, err);
                }
                Some(Ok(SourceItem::SkippedEmpty { first, last })) => {
                    self.on_skipped_empty(first, last)
                }
                Some(Ok(SourceItem::Block { height, block })) => self.on_block(height, block),
            }
        }
    }
}
