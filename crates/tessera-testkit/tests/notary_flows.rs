//! End-to-end notarisation between mock nodes

use assert_matches::assert_matches;
use std::collections::BTreeSet;
use std::time::Duration;
use tessera_core::{PhysicalTime, TimeWindow};
use tessera_ledger::{SignedTransaction, StateRef};
use tessera_notary::{NotaryClientFlow, NotaryConfig, NotaryError, NotaryException};
use tessera_signature::SignedTransactionExt;
use tessera_testkit::{
    init_test_tracing, issue, spend, test_party, MockNetwork, MockNode, NETWORK_EPOCH,
};

async fn notarise(node: &MockNode, stx: SignedTransaction) -> Result<SignedTransaction, NotaryException> {
    node.start_flow(NotaryClientFlow::new(stx))
        .unwrap()
        .result()
        .await
}

fn committed_by(notary: &MockNode, state: StateRef) -> Option<tessera_core::SecureHash> {
    notary
        .notary_service()
        .unwrap()
        .uniqueness()
        .lookup(&[state])
        .get(&state)
        .map(|consumer| consumer.tx_id)
}

#[tokio::test]
async fn test_non_validating_notary_signs() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");

    let issued = issue(&alice, notary.party(), b"token").await;
    let input = issued.tx().output_ref(0);
    let stx = spend(&alice, &[input], notary.party(), None).await;

    let notarised = notarise(&alice, stx.clone()).await.unwrap();
    assert_eq!(notarised.id(), stx.id());
    assert_eq!(notarised.sigs().len(), 2);
    assert_eq!(notarised.sigs()[1].by, notary.party().owning_key);
    notarised.verify_required_signatures().unwrap();
    assert_eq!(committed_by(&notary, input), Some(stx.id()));
}

#[tokio::test]
async fn test_validating_notary_signs_with_dependencies() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::validating());
    let alice = network.create_node("Alice");

    let issued = issue(&alice, notary.party(), b"token").await;
    let stx = spend(&alice, &[issued.tx().output_ref(0)], notary.party(), None).await;

    let notarised = notarise(&alice, stx).await.unwrap();
    notarised.verify_required_signatures().unwrap();
}

#[tokio::test]
async fn test_repeated_request_is_idempotent() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");

    let issued = issue(&alice, notary.party(), b"token").await;
    let input = issued.tx().output_ref(0);
    let stx = spend(&alice, &[input], notary.party(), None).await;

    let first = notarise(&alice, stx.clone()).await.unwrap();
    let second = notarise(&alice, stx.clone()).await.unwrap();
    assert_eq!(first.sigs().last(), second.sigs().last());
    assert_eq!(committed_by(&notary, input), Some(stx.id()));
}

#[tokio::test]
async fn test_double_spend_conflict_names_the_consumed_state() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");

    let first_issue = issue(&alice, notary.party(), b"first").await;
    let second_issue = issue(&alice, notary.party(), b"second").await;
    let consumed = first_issue.tx().output_ref(0);
    let untouched = second_issue.tx().output_ref(0);

    let original = spend(&alice, &[consumed], notary.party(), None).await;
    notarise(&alice, original.clone()).await.unwrap();

    let double_spend = spend(&alice, &[consumed, untouched], notary.party(), None).await;
    let err = notarise(&alice, double_spend).await.unwrap_err();
    assert_matches!(
        err,
        NotaryException::Notary(NotaryError::Conflict { ref conflicts, .. }) => {
            assert_eq!(conflicts.keys().copied().collect::<BTreeSet<_>>(), BTreeSet::from([consumed]));
            let consumer = &conflicts[&consumed];
            assert_eq!(consumer.tx_id, original.id());
            assert_eq!(consumer.input_index, 0);
            assert_eq!(consumer.requesting_party, alice.party().name);
        }
    );
    assert_eq!(committed_by(&notary, untouched), None);
}

#[tokio::test]
async fn test_concurrent_double_spend_has_one_winner() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");

    let issued = issue(&alice, notary.party(), b"token").await;
    let input = issued.tx().output_ref(0);
    let left = spend(&alice, &[input], notary.party(), None).await;
    let window = TimeWindow::from_only(NETWORK_EPOCH);
    let right = spend(&alice, &[input], notary.party(), Some(window)).await;

    let (left, right) = tokio::join!(notarise(&alice, left), notarise(&alice, right));
    let outcomes = [left, right];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(NotaryException::Notary(NotaryError::Conflict { .. }))
    )));
}

#[tokio::test]
async fn test_expired_time_window_rejected() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");

    let issued = issue(&alice, notary.party(), b"token").await;
    let input = issued.tx().output_ref(0);
    let deadline = PhysicalTime::from_millis(NETWORK_EPOCH.ts_ms + 1_000);
    let stx = spend(&alice, &[input], notary.party(), Some(TimeWindow::until_only(deadline))).await;

    network.clock().advance(Duration::from_secs(120));
    let err = notarise(&alice, stx).await.unwrap_err();
    assert_matches!(
        err,
        NotaryException::Notary(NotaryError::TimeWindowInvalid { current_time, .. })
            if current_time.ts_ms == NETWORK_EPOCH.ts_ms + 120_000
    );
    assert_eq!(committed_by(&notary, input), None);
}

#[tokio::test]
async fn test_validating_notary_rejects_notary_change_in_general_transaction() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::validating());
    let alice = network.create_node("Alice");

    // Issued under a different notary, then spent under this one.
    let issued = issue(&alice, &test_party("Elsewhere"), b"token").await;
    let input = issued.tx().output_ref(0);
    let stx = spend(&alice, &[input], notary.party(), None).await;

    let err = notarise(&alice, stx).await.unwrap_err();
    assert_matches!(
        err,
        NotaryException::Notary(NotaryError::TransactionInvalid { .. })
    );
    assert_eq!(committed_by(&notary, input), None);
}

#[tokio::test]
async fn test_insufficiently_signed_transaction_never_reaches_notary() {
    init_test_tracing();
    let network = MockNetwork::new();
    let notary = network.create_notary_node("Notary", NotaryConfig::default());
    let alice = network.create_node("Alice");
    let bob = network.create_node("Bob");

    let issued = issue(&alice, notary.party(), b"token").await;
    let input = issued.tx().output_ref(0);
    // Signed by Bob only; the move command requires Alice.
    let stx = tessera_testkit::move_builder(alice.party().owning_key, &[input], notary.party())
        .sign_with(&**bob.crypto(), &[bob.party().owning_key])
        .await
        .unwrap();

    let err = notarise(&bob, stx).await.unwrap_err();
    assert_matches!(err, NotaryException::Signatures(_));
    assert_eq!(committed_by(&notary, input), None);
}
