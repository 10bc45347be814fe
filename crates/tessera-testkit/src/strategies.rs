//! Property test strategies
//!
//! Keys are drawn from a small fixed pool so that generated structures share
//! leaves and generated signer sets actually hit them.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tessera_core::{CompositeKey, CompositeKeyBuilder, PublicKey};

// Re-export proptest for convenience
pub use proptest;

/// Number of distinct keys strategies draw from
pub const KEY_POOL_SIZE: u8 = 8;

/// The `index`th pool key
pub fn pool_key(index: u8) -> PublicKey {
    PublicKey::from_bytes([index.wrapping_add(1); 32])
}

/// Every pool key
pub fn key_pool() -> Vec<PublicKey> {
    (0..KEY_POOL_SIZE).map(pool_key).collect()
}

/// Strategy for a single pool key
pub fn arb_public_key() -> impl Strategy<Value = PublicKey> {
    (0..KEY_POOL_SIZE).prop_map(pool_key)
}

/// Strategy for a subset of the pool, used as the set of signers
pub fn arb_signed_keys() -> impl Strategy<Value = BTreeSet<PublicKey>> {
    prop::collection::btree_set(arb_public_key(), 0..=usize::from(KEY_POOL_SIZE))
}

/// Strategy for composite keys up to three levels deep
///
/// Nodes have one to four children with weights 1 to 3 and any threshold
/// between 1 and the total weight.
pub fn arb_composite_key() -> impl Strategy<Value = CompositeKey> {
    let leaf = arb_public_key().prop_map(CompositeKey::Leaf);
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec((inner, 1u32..=3), 1..=4)
            .prop_flat_map(|children| {
                let total: u32 = children.iter().map(|(_, weight)| *weight).sum();
                (Just(children), 1..=total)
            })
            .prop_filter_map("composite node", |(children, threshold)| {
                children
                    .into_iter()
                    .fold(CompositeKeyBuilder::new(), |builder, (key, weight)| {
                        builder.add_weighted_key(key, weight)
                    })
                    .build(threshold)
                    .ok()
            })
    })
}
