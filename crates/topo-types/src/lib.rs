#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **topo-types** – Stream identity, tick/sequence, GUID ordering, and
//! capability primitives for the topology truth store.
//!
//! This crate is dependency-light and sits at the bottom of the crate graph:
//! every other crate in the workspace depends on it, and it depends on
//! nothing storage- or codec-related. It makes no assumptions about how
//! identifiers are generated, only about how they compare and how a stream
//! is named.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// 128-bit time-sortable event identifier (UUIDv7 layout per spec).
pub type EventId = Uuid;

/// Opaque 128-bit identifier for a tectonic plate.
pub type PlateId = Uuid;

/// Opaque 128-bit identifier for a plate boundary.
pub type BoundaryId = Uuid;

/// Opaque 128-bit identifier for a junction where boundaries meet.
pub type JunctionId = Uuid;

/// Monotonic per-stream event index; the primary ordering key.
pub type Sequence = i64;

/// Simulated-time index of an event; not necessarily monotonic with
/// [`Sequence`].
pub type CanonicalTick = i64;

/// A 32-byte SHA-256 digest, or 32 zero bytes for the genesis link.
pub type Hash32 = [u8; 32];

/// 32 zero bytes, the `previousHash` of every stream's genesis event.
pub const ZERO_HASH: Hash32 = [0u8; 32];

//─────────────────────────────
//  Stream identity
//─────────────────────────────

/// Errors raised while constructing or validating a [`StreamIdentity`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StreamIdentityError {
    /// A required text field was empty.
    #[error("stream identity field `{0}` must not be empty")]
    EmptyField(&'static str),
    /// `domain` was not a well-formed dotted lowercase path.
    #[error("stream identity domain `{0}` is not a well-formed dotted lowercase path")]
    InvalidDomain(String),
}

/// Immutable tuple addressing one truth stream: the primary isolation
/// boundary. No operation may read or write across streams.
///
/// `domain` must be one or more non-empty segments of lowercase ASCII
/// letters, digits, and hyphens, joined by `.` (e.g. `topology.plates`).
/// This is stricter than spec.md's bare "non-empty" requirement — see
/// DESIGN.md for why a concrete rule was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamIdentity {
    /// Simulation variant, e.g. a scenario or save-slot identifier.
    pub variant_id: String,
    /// Branch within the variant (for speculative/what-if timelines).
    pub branch_id: String,
    /// Level-of-detail index; 0 is the coarsest.
    pub l_level: u64,
    /// Dotted lowercase domain path, e.g. `topology.plates`.
    pub domain: String,
    /// Model name distinguishing alternative solvers sharing a domain.
    pub model: String,
}

impl StreamIdentity {
    /// Construct and validate a new stream identity.
    pub fn new(
        variant_id: impl Into<String>,
        branch_id: impl Into<String>,
        l_level: u64,
        domain: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, StreamIdentityError> {
        let me = Self {
            variant_id: variant_id.into(),
            branch_id: branch_id.into(),
            l_level,
            domain: domain.into(),
            model: model.into(),
        };
        me.validate()?;
        Ok(me)
    }

    /// Re-check validity, e.g. after deserializing from an untrusted source.
    pub fn validate(&self) -> Result<(), StreamIdentityError> {
        if self.variant_id.is_empty() {
            return Err(StreamIdentityError::EmptyField("variantId"));
        }
        if self.branch_id.is_empty() {
            return Err(StreamIdentityError::EmptyField("branchId"));
        }
        if self.model.is_empty() {
            return Err(StreamIdentityError::EmptyField("model"));
        }
        if !is_well_formed_domain(&self.domain) {
            return Err(StreamIdentityError::InvalidDomain(self.domain.clone()));
        }
        Ok(())
    }

    /// Build the KV key prefix for this stream:
    /// `S:{variantId}:{branchId}:L{lLevel}:{domain}:M{model}:`.
    pub fn key_prefix(&self) -> String {
        format!(
            "S:{}:{}:L{}:{}:M{}:",
            self.variant_id, self.branch_id, self.l_level, self.domain, self.model
        )
    }
}

fn is_well_formed_domain(domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    domain.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    })
}

//─────────────────────────────
//  Tick policy
//─────────────────────────────

/// Controls whether `tick` may decrease between consecutive events in a
/// batch passed to `append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickPolicy {
    /// Decreasing ticks are permitted without comment.
    Allow,
    /// Decreasing ticks are permitted but logged as a diagnostic.
    Warn,
    /// Decreasing ticks abort the append with `TickMonotonicityError`.
    Reject,
}

/// Selects how `materializeAtTick` treats ticks that are not monotone with
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickCutoffMode {
    /// Choose a strategy based on the stream's recorded capabilities.
    Auto,
    /// Fold every event, then discard any whose tick exceeds the target.
    FoldAllAndCutoffInMemory,
    /// Stop reading as soon as an event's tick exceeds the target.
    StopOnFirstTickGreaterThanTarget,
}

//─────────────────────────────
//  Capabilities bit-set
//─────────────────────────────

/// Bit position of `GenesisWithRejectPolicy` within byte 0.
const BIT_GENESIS_WITH_REJECT_POLICY: u8 = 0;
/// Bit position of `TickMonotoneFromGenesis` within byte 0.
const BIT_TICK_MONOTONE_FROM_GENESIS: u8 = 1;

/// Per-stream 9-byte bit-set of durable capability declarations.
///
/// Only `append`'s genesis branch may ever write this value (spec.md §4.3
/// step 10, §7); every other code path treats it as read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    bits: [u8; 9],
}

impl Capabilities {
    /// The all-zero capability set: no declarations.
    pub const NONE: Capabilities = Capabilities { bits: [0u8; 9] };

    /// The capability set written at genesis under `tickPolicy = Reject`:
    /// both `GenesisWithRejectPolicy` and `TickMonotoneFromGenesis` set.
    pub fn genesis_with_reject_policy() -> Self {
        let mut bits = [0u8; 9];
        bits[0] = (1 << BIT_GENESIS_WITH_REJECT_POLICY) | (1 << BIT_TICK_MONOTONE_FROM_GENESIS);
        Self { bits }
    }

    /// View as the 9 raw bytes stored under `Meta:Caps`.
    pub fn to_bytes(self) -> [u8; 9] {
        self.bits
    }

    /// Parse the 9 raw bytes stored under `Meta:Caps`.
    pub fn from_bytes(bits: [u8; 9]) -> Self {
        Self { bits }
    }

    /// Whether the genesis event was appended under `tickPolicy = Reject`.
    pub fn has_genesis_with_reject_policy(&self) -> bool {
        self.bits[0] & (1 << BIT_GENESIS_WITH_REJECT_POLICY) != 0
    }

    /// Whether ticks are guaranteed monotone from genesis onward.
    ///
    /// Defensive against corruption: the raw monotone bit is honoured only
    /// when the reject-policy bit is also set (spec.md §3.8); otherwise this
    /// reports `false` regardless of the raw bit.
    pub fn is_tick_monotone_from_genesis(&self) -> bool {
        let raw_monotone = self.bits[0] & (1 << BIT_TICK_MONOTONE_FROM_GENESIS) != 0;
        raw_monotone && self.has_genesis_with_reject_policy()
    }
}

//─────────────────────────────
//  Canonical GUID ordering
//─────────────────────────────

/// Reorder a 128-bit identifier's bytes into the canonical comparison form:
/// indices `0..8` are permuted `[3,2,1,0,5,4,7,6]`, indices `8..16` pass
/// through unchanged. See spec.md §4.10 — this is the single source of
/// truth for every cross-platform ordering in the system.
pub fn canonical_order_key(id: &Uuid) -> [u8; 16] {
    let b = id.as_bytes();
    [
        b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9], b[10], b[11], b[12], b[13],
        b[14], b[15],
    ]
}

/// Compare two identifiers using the canonical GUID byte order.
pub fn canonical_cmp(a: &Uuid, b: &Uuid) -> Ordering {
    canonical_order_key(a).cmp(&canonical_order_key(b))
}

/// Newtype wrapper giving a `Uuid` the canonical ordering as its `Ord`
/// implementation, for use as a `BTreeMap`/`sort` key without re-deriving
/// the comparator at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalGuid(pub Uuid);

impl PartialOrd for CanonicalGuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CanonicalGuid {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(&self.0, &other.0)
    }
}

impl fmt::Display for CanonicalGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CanonicalGuid {
    fn from(u: Uuid) -> Self {
        CanonicalGuid(u)
    }
}
