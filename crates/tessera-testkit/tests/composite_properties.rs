//! Property tests for composite key satisfaction and signature requirements

use ed25519_dalek::Signer;
use proptest::prelude::*;
use std::collections::BTreeSet;
use tessera_core::crypto::missing;
use tessera_core::{CompositeKey, CompositeKeyBuilder, DigitalSignature};
use tessera_ledger::{Command, SignedTransaction, TransactionBuilder};
use tessera_signature::{SignatureError, SignedTransactionExt};
use tessera_testkit::strategies::{arb_composite_key, arb_signed_keys, pool_key};
use tessera_testkit::KeyFixture;

proptest! {
    #[test]
    fn satisfaction_is_monotonic(
        key in arb_composite_key(),
        signed in arb_signed_keys(),
        extra in arb_signed_keys(),
    ) {
        if key.is_satisfied_by(&signed) {
            let more: BTreeSet<_> = signed.union(&extra).copied().collect();
            prop_assert!(key.is_satisfied_by(&more));
        }
    }

    #[test]
    fn all_leaves_always_satisfy(key in arb_composite_key()) {
        prop_assert!(key.is_satisfied_by(&key.leaf_keys()));
    }

    #[test]
    fn missing_is_exactly_the_unsatisfied_requirements(
        requirements in prop::collection::vec(arb_composite_key(), 1..5),
        signed in arb_signed_keys(),
    ) {
        let reported = missing(&requirements, &signed);
        let expected: BTreeSet<CompositeKey> = requirements
            .iter()
            .filter(|r| !r.is_satisfied_by(&signed))
            .cloned()
            .collect();
        prop_assert_eq!(reported, expected);
    }

    #[test]
    fn excluding_every_requirement_always_verifies(
        requirements in prop::collection::vec(arb_composite_key(), 1..4),
    ) {
        let fixture = KeyFixture::from_seed("issuer");
        let mut builder = TransactionBuilder::new(None);
        for (i, signers) in requirements.iter().enumerate() {
            builder.add_command(Command::new(format!("cmd-{i}"), Vec::new(), vec![signers.clone()]));
        }
        let tx = builder.to_wire_transaction().unwrap();
        let signature = fixture.signing_key().sign(tx.id().as_bytes());
        let stx = SignedTransaction::new(
            tx,
            vec![DigitalSignature::new(fixture.public_key(), signature.to_bytes().to_vec())],
        )
        .unwrap();

        let all: BTreeSet<CompositeKey> = requirements.into_iter().collect();
        prop_assert!(stx.verify_signatures_except(&all).is_ok());
    }
}

#[test]
fn nested_threshold_example() {
    let (a, b, c) = (pool_key(0), pool_key(1), pool_key(2));
    let both = CompositeKeyBuilder::new().add_keys([a, b]).build(2).unwrap();
    let policy = CompositeKeyBuilder::new()
        .add_key(both)
        .add_key(c)
        .build(1)
        .unwrap();
    let requirements = [policy.clone()];

    let only_a = BTreeSet::from([a]);
    assert!(!policy.is_satisfied_by(&only_a));
    assert_eq!(missing(&requirements, &only_a), BTreeSet::from([policy.clone()]));

    assert!(policy.is_satisfied_by(&BTreeSet::from([a, b])));
    assert!(policy.is_satisfied_by(&BTreeSet::from([c])));
    assert!(missing(&requirements, &BTreeSet::from([c])).is_empty());
}

#[test]
fn unsigned_requirement_is_reported_whole() {
    let signer = KeyFixture::from_seed("signer");
    let other = KeyFixture::from_seed("other");
    let policy = CompositeKeyBuilder::new()
        .add_keys([signer.public_key(), other.public_key()])
        .build(2)
        .unwrap();

    let mut builder = TransactionBuilder::new(None);
    builder.add_command(Command::new("Issue", Vec::new(), vec![policy.clone()]));
    let tx = builder.to_wire_transaction().unwrap();
    let signature = signer.signing_key().sign(tx.id().as_bytes());
    let stx = SignedTransaction::new(
        tx,
        vec![DigitalSignature::new(signer.public_key(), signature.to_bytes().to_vec())],
    )
    .unwrap();

    match stx.verify_required_signatures() {
        Err(SignatureError::SignaturesMissing { missing, .. }) => {
            assert_eq!(missing, BTreeSet::from([policy]));
        }
        other => panic!("expected missing signatures, got {other:?}"),
    }
}
