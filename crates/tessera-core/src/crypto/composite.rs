//! Weighted threshold composite keys
//!
//! A composite key is an immutable tree. Leaves are single public keys; inner
//! nodes carry an ordered list of weighted children and a threshold. A node is
//! satisfied when the summed weight of its satisfied children reaches the
//! threshold, so `n`-of-`n` is an AND and a threshold equal to the smallest
//! weight is an OR.
//!
//! Evaluation is a pure recursive fold with no shared state, and children are
//! evaluated independently of one another.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::keys::PublicKey;
use crate::{Result, TesseraError};

/// A key-authorization structure: one key, or a weighted threshold over children
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompositeKey {
    /// A single verifying key
    Leaf(PublicKey),
    /// A weighted threshold over child structures
    Node(CompositeNode),
}

/// A child of a composite node together with its weight
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeightedKey {
    /// Child structure
    pub key: CompositeKey,
    /// Weight contributed when the child is satisfied
    pub weight: u32,
}

/// Inner node of a composite key
///
/// Invariants: at least one child, every weight > 0, and
/// `0 < threshold <= sum(weights)`. Enforced on construction and on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "CompositeNodeSerde")]
pub struct CompositeNode {
    children: Vec<WeightedKey>,
    threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct CompositeNodeSerde {
    children: Vec<WeightedKey>,
    threshold: u32,
}

impl TryFrom<CompositeNodeSerde> for CompositeNode {
    type Error = TesseraError;

    fn try_from(value: CompositeNodeSerde) -> std::result::Result<Self, Self::Error> {
        Self::new(value.children, value.threshold)
    }
}

impl CompositeNode {
    /// Create a node, validating weights and threshold
    pub fn new(children: Vec<WeightedKey>, threshold: u32) -> Result<Self> {
        if children.is_empty() {
            return Err(TesseraError::invalid(
                "Composite key requires at least one child",
            ));
        }

        if children.iter().any(|c| c.weight == 0) {
            return Err(TesseraError::invalid("Composite key weights must be >= 1"));
        }

        if threshold == 0 {
            return Err(TesseraError::invalid("Composite key threshold must be >= 1"));
        }

        let total: u64 = children.iter().map(|c| u64::from(c.weight)).sum();
        if u64::from(threshold) > total {
            return Err(TesseraError::invalid(format!(
                "Composite key threshold {threshold} exceeds total child weight {total}"
            )));
        }

        Ok(Self {
            children,
            threshold,
        })
    }

    /// Weighted children in declaration order
    pub fn children(&self) -> &[WeightedKey] {
        &self.children
    }

    /// Required weight
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Sum of all child weights
    pub fn total_weight(&self) -> u64 {
        self.children.iter().map(|c| u64::from(c.weight)).sum()
    }
}

impl CompositeKey {
    /// Whether the signers in `signed` satisfy this structure
    pub fn is_satisfied_by(&self, signed: &BTreeSet<PublicKey>) -> bool {
        match self {
            CompositeKey::Leaf(key) => signed.contains(key),
            CompositeKey::Node(node) => {
                let threshold = u64::from(node.threshold);
                let mut reached = 0u64;
                for child in &node.children {
                    if child.key.is_satisfied_by(signed) {
                        reached += u64::from(child.weight);
                        if reached >= threshold {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }

    /// All leaf keys appearing anywhere in the tree
    pub fn leaf_keys(&self) -> BTreeSet<PublicKey> {
        let mut keys = BTreeSet::new();
        self.collect_leaves(&mut keys);
        keys
    }

    fn collect_leaves(&self, out: &mut BTreeSet<PublicKey>) {
        match self {
            CompositeKey::Leaf(key) => {
                out.insert(*key);
            }
            CompositeKey::Node(node) => {
                for child in &node.children {
                    child.key.collect_leaves(out);
                }
            }
        }
    }

    /// The single key if this is a leaf
    pub fn as_leaf(&self) -> Option<&PublicKey> {
        match self {
            CompositeKey::Leaf(key) => Some(key),
            CompositeKey::Node(_) => None,
        }
    }
}

impl From<PublicKey> for CompositeKey {
    fn from(key: PublicKey) -> Self {
        CompositeKey::Leaf(key)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeKey::Leaf(key) => write!(f, "{key}"),
            CompositeKey::Node(node) => {
                write!(f, "{}-of(", node.threshold)?;
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if child.weight == 1 {
                        write!(f, "{}", child.key)?;
                    } else {
                        write!(f, "{}x{}", child.weight, child.key)?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// Top-level requirements not satisfied by `signed`
///
/// Each unsatisfied requirement is reported whole, never expanded into its
/// unsatisfied leaves. Structurally identical requirements appear once.
pub fn missing<'a, I>(requirements: I, signed: &BTreeSet<PublicKey>) -> BTreeSet<CompositeKey>
where
    I: IntoIterator<Item = &'a CompositeKey>,
{
    requirements
        .into_iter()
        .filter(|requirement| !requirement.is_satisfied_by(signed))
        .cloned()
        .collect()
}

/// Builder for composite keys
#[derive(Debug, Clone, Default)]
pub struct CompositeKeyBuilder {
    children: Vec<WeightedKey>,
}

impl CompositeKeyBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child with weight 1
    pub fn add_key(self, key: impl Into<CompositeKey>) -> Self {
        self.add_weighted_key(key, 1)
    }

    /// Add a child with an explicit weight
    pub fn add_weighted_key(mut self, key: impl Into<CompositeKey>, weight: u32) -> Self {
        self.children.push(WeightedKey {
            key: key.into(),
            weight,
        });
        self
    }

    /// Add several children with weight 1
    pub fn add_keys<K, I>(self, keys: I) -> Self
    where
        K: Into<CompositeKey>,
        I: IntoIterator<Item = K>,
    {
        keys.into_iter().fold(self, |builder, key| builder.add_key(key))
    }

    /// Build with the given threshold
    ///
    /// A single child whose weight alone meets the threshold collapses to that
    /// child, since the node would be equivalent to it.
    pub fn build(self, threshold: u32) -> Result<CompositeKey> {
        if let [only] = self.children.as_slice() {
            if only.weight > 0 && threshold > 0 && threshold <= only.weight {
                return Ok(only.key.clone());
            }
        }
        Ok(CompositeKey::Node(CompositeNode::new(self.children, threshold)?))
    }

    /// Build requiring every child (threshold = total weight)
    pub fn build_all(self) -> Result<CompositeKey> {
        let total: u64 = self.children.iter().map(|c| u64::from(c.weight)).sum();
        let threshold = u32::try_from(total)
            .map_err(|_| TesseraError::invalid("Composite key total weight overflows u32"))?;
        self.build(threshold)
    }
}
