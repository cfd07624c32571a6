mod common;

use common::{CHAIN_ID, MockLedger, Submission, TestChain, build_chain, build_chain_missing, config, genesis};
use evmload_common::BigUint;
use evmload_replayer::{
    Network, Position, ReplayError, ReplayOptions, Replayer, RunState, config::DEFAULT_GAS,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn replayer(chain: &TestChain, client: Arc<MockLedger>) -> Replayer {
    Replayer::new(
        chain.store.clone(),
        chain.location(),
        genesis(),
        Network::from_chain_id(CHAIN_ID),
        client,
    )
}

fn methods(client: &MockLedger) -> Vec<String> {
    client
        .calls()
        .into_iter()
        .map(|call| call.method_name)
        .collect()
}

// ============================================================================
// Completed runs
// ============================================================================

#[tokio::test]
async fn three_block_chain_end_to_end() {
    let chain = build_chain(&[0, 0, 2]);
    let client = Arc::new(MockLedger::new());
    let options = ReplayOptions {
        skip_empty: true,
        ..ReplayOptions::default()
    };

    let report = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.calls_submitted, 4);
    assert_eq!(report.batches_submitted, 0);
    assert_eq!(report.skipped_blocks, 1);
    assert_eq!(report.break_position, None);
    assert_eq!(
        methods(&client),
        vec!["begin_chain", "begin_block", "submit", "submit"]
    );
    let calls = client.calls();
    assert_eq!(calls[2].args, chain.blocks[2].transactions[0].raw);
    assert_eq!(calls[3].args, chain.blocks[2].transactions[1].raw);
    assert!(calls.iter().all(|call| call.gas == DEFAULT_GAS));
}

#[tokio::test]
async fn unbatched_runs_submit_each_call_alone() {
    let chain = build_chain(&[0, 3, 2]);
    let client = Arc::new(MockLedger::new());

    let report = replayer(&chain, client.clone())
        .run(&config(ReplayOptions::default()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.calls_submitted, 8);
    let submissions = client.submissions();
    assert_eq!(submissions.len(), 8);
    assert!(
        submissions
            .iter()
            .all(|submission| matches!(submission, Submission::Single(_)))
    );
}

#[tokio::test]
async fn batches_flush_when_full_and_at_the_end() {
    let chain = build_chain(&[0, 3, 2]);
    let client = Arc::new(MockLedger::new());
    let options = ReplayOptions {
        batch_size: Some(3),
        ..ReplayOptions::default()
    };

    let report = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap();

    // 8 calls in batches of 3: two full batches and one partial.
    let sizes: Vec<usize> = client
        .submissions()
        .iter()
        .map(|submission| match submission {
            Submission::Batch(calls) => calls.len(),
            Submission::Single(_) => panic!("unexpected single submission"),
        })
        .collect();
    assert_eq!(sizes, vec![3, 3, 2]);
    assert_eq!(report.batches_submitted, 3);
    assert_eq!(report.calls_submitted, 8);
    assert!(client.calls().iter().all(|call| call.gas == DEFAULT_GAS / 3));
    assert_eq!(
        methods(&client),
        vec![
            "begin_chain",
            "begin_block",
            "submit",
            "submit",
            "submit",
            "begin_block",
            "submit",
            "submit",
        ]
    );
}

#[tokio::test]
async fn exact_multiple_leaves_no_partial_batch() {
    let chain = build_chain(&[0, 2, 1]);
    let client = Arc::new(MockLedger::new());
    let options = ReplayOptions {
        batch_size: Some(2),
        ..ReplayOptions::default()
    };

    let report = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.calls_submitted, 6);
    assert_eq!(report.batches_submitted, 3);
    assert!(
        client
            .submissions()
            .iter()
            .all(|submission| submission.calls().len() == 2)
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failed_submission_is_surfaced_with_the_transaction() {
    let chain = build_chain(&[0, 1, 2, 1]);
    let failing = chain.blocks[2].transactions[1].clone();
    let client = Arc::new(MockLedger::failing_on_args(vec![failing.raw.clone()]));

    let err = replayer(&chain, client.clone())
        .run(&config(ReplayOptions::default()), CancellationToken::new())
        .await
        .unwrap_err();

    let ReplayError::RemoteSubmission {
        block, tx, method, ..
    } = &err
    else {
        panic!("expected a remote submission error, got {err}");
    };
    assert_eq!((*block, *tx), (Some(2), Some(1)));
    assert_eq!(method, "submit");
    assert_eq!(err.diagnostic(), Some(failing.describe().as_str()));
    assert_eq!(err.exit_code(), 50);
    // Nothing after the failing call was sent.
    assert_eq!(client.calls().last().unwrap().args, failing.raw);
}

#[tokio::test]
async fn failed_batch_is_attributed_to_its_first_call() {
    let chain = build_chain(&[0, 1, 2]);
    let failing = chain.blocks[2].transactions[1].raw.clone();
    let client = Arc::new(MockLedger::failing_on_args(vec![failing]));
    let options = ReplayOptions {
        batch_size: Some(2),
        ..ReplayOptions::default()
    };

    let err = replayer(&chain, client)
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap_err();

    // Batches: [begin_chain, begin_block(1)], [submit(1,0), begin_block(2)], [submit(2,0), submit(2,1)]
    let ReplayError::RemoteSubmission { block, tx, .. } = &err else {
        panic!("expected a remote submission error, got {err}");
    };
    assert_eq!((*block, *tx), (Some(2), Some(0)));
    assert_eq!(err.diagnostic(), None);
}

#[tokio::test]
async fn transport_errors_fail_the_run() {
    let chain = build_chain(&[0, 1]);
    let client = Arc::new(MockLedger::failing_on_submissions(vec![1]));

    let err = replayer(&chain, client.clone())
        .run(&config(ReplayOptions::default()), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "remote/submission_failed");
    assert_eq!(client.submissions().len(), 1);
}

#[tokio::test]
async fn oversized_balance_aborts_before_any_remote_call() {
    let chain = build_chain(&[0, 1]);
    let client = Arc::new(MockLedger::new());
    let mut genesis = genesis();
    for account in genesis.alloc.values_mut() {
        account.balance = BigUint::from(1u32) << 256usize;
    }
    let replayer = Replayer::new(
        chain.store.clone(),
        chain.location(),
        genesis,
        Network::from_chain_id(CHAIN_ID),
        client.clone(),
    );

    let err = replayer
        .run(&config(ReplayOptions::default()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Aborted { block: None, .. }));
    assert_eq!(err.error_code(), "encoding/out_of_range");
    assert_eq!(err.exit_code(), 40);
    assert!(client.submissions().is_empty());
}

#[tokio::test]
async fn chain_gap_mid_run_aborts_after_earlier_calls() {
    let chain = build_chain_missing(&[0, 1, 1, 1], &[2]);
    let client = Arc::new(MockLedger::new());

    let err = replayer(&chain, client.clone())
        .run(&config(ReplayOptions::default()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Aborted { block: Some(2), .. }));
    assert_eq!(err.error_code(), "store/chain_gap");
    assert_eq!(methods(&client), vec!["begin_chain", "begin_block", "submit"]);
}

#[tokio::test]
async fn canceled_run_stops_without_submitting() {
    let chain = build_chain(&[0, 2, 2]);
    let client = Arc::new(MockLedger::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = replayer(&chain, client.clone())
        .run(&config(ReplayOptions::default()), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Canceled));
    assert!(client.submissions().is_empty());
}

#[tokio::test]
async fn cancel_mid_run_releases_a_blocked_producer() {
    // 30 transactions overflow the unbatched queue, so the producer is parked on a full
    // channel when the token fires.
    let chain = build_chain(&[0, 30]);
    let cancel = CancellationToken::new();
    let client = Arc::new(MockLedger::canceling_on_submission(3, cancel.clone()));

    let r = replayer(&chain, client.clone());
    let cfg = config(ReplayOptions::default());
    let run = r.run(&cfg, cancel);
    let err = tokio::time::timeout(std::time::Duration::from_secs(10), run)
        .await
        .expect("run did not return after cancellation")
        .unwrap_err();

    assert!(matches!(err, ReplayError::Canceled));
    assert_eq!(client.submissions().len(), 3);
}

// ============================================================================
// Autobreak
// ============================================================================

#[tokio::test]
async fn autobreak_reruns_up_to_the_failure() {
    let chain = build_chain(&[0, 2, 2]);
    let failing = chain.blocks[2].transactions[1].raw.clone();
    let client = Arc::new(MockLedger::failing_on_args(vec![failing.clone()]));
    let options = ReplayOptions {
        autobreak: true,
        ..ReplayOptions::default()
    };

    let report = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::BrokenExplicit);
    assert_eq!(report.autobreak_from, Some(Position::tx(2, 1)));
    assert_eq!(report.break_position, Some(Position::tx(2, 1)));
    // No bundle settings were given.
    assert_eq!(report.breakpoint, None);
    // First pass: 7 calls, the last one failing. Second pass: the 6 calls before it.
    assert_eq!(report.calls_submitted, 13);
    let calls = client.calls();
    assert_eq!(calls.iter().filter(|call| call.args == failing).count(), 1);
    assert_eq!(calls[..6], calls[7..]);
}

#[tokio::test]
async fn autobreak_retries_only_once() {
    let chain = build_chain(&[0, 2, 2]);
    // Fails submit(1,0) in the first pass, then begin_block(1) in the retry.
    let client = Arc::new(MockLedger::failing_on_submissions(vec![3, 5]));
    let options = ReplayOptions {
        autobreak: true,
        ..ReplayOptions::default()
    };

    let err = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap_err();

    let ReplayError::RemoteSubmission { block, tx, .. } = &err else {
        panic!("expected a remote submission error, got {err}");
    };
    assert_eq!((*block, *tx), (Some(1), None));
    assert_eq!(client.submissions().len(), 5);
}

#[tokio::test]
async fn failed_first_batch_autobreaks_at_its_first_block() {
    let chain = build_chain(&[0, 1, 1]);
    let client = Arc::new(MockLedger::failing_on_submissions(vec![1]));
    let options = ReplayOptions {
        batch_size: Some(2),
        autobreak: true,
        ..ReplayOptions::default()
    };

    let report = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap();

    // The failing batch is [begin_chain, begin_block(1)].
    assert_eq!(report.state, RunState::BrokenExplicit);
    assert_eq!(report.autobreak_from, Some(Position::block(1)));
    assert_eq!(report.break_position, Some(Position::block(1)));
    // The retry only sends begin_chain.
    let sizes: Vec<usize> = client
        .submissions()
        .iter()
        .map(|submission| submission.calls().len())
        .collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[tokio::test]
async fn begin_chain_failure_is_not_retried() {
    let chain = build_chain(&[0, 1]);
    let client = Arc::new(MockLedger::failing_on_submissions(vec![1]));
    let options = ReplayOptions {
        autobreak: true,
        ..ReplayOptions::default()
    };

    let err = replayer(&chain, client.clone())
        .run(&config(options), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReplayError::RemoteSubmission { block: None, .. }
    ));
    assert_eq!(client.submissions().len(), 1);
}
