//! # multibit-lpm
//!
//! A fixed-stride multibit trie for longest-prefix-match (LPM) lookups over
//! 32-bit addresses, the lookup structure behind a packet forwarding table.
//!
//! Prefixes whose length is not a multiple of the stride are leaf-pushed into
//! every child consistent with their fixed bits, so a lookup is a plain
//! descent of at most `32 / stride` levels with no bit masking.
//!
//! ## Example
//!
//! ```rust
//! use multibit_lpm::{MultibitTrie, Stride};
//!
//! let mut trie = MultibitTrie::new(Stride::Four);
//! trie.insert(0x4000_0000, 13, 1262)?;
//! trie.insert(0x4080_0000, 17, 4513)?;
//! trie.insert(0x2044_0000, 20, 2964)?;
//!
//! assert_eq!(trie.lookup(0x4080_0000), Some(4513));
//! assert_eq!(trie.lookup(0x4000_0005), Some(1262));
//! assert_eq!(trie.lookup(0x2044_0001), Some(2964));
//! assert_eq!(trie.lookup(0x0a00_0001), None);
//! # Ok::<(), multibit_lpm::TrieError>(())
//! ```

#![forbid(unsafe_code)]

mod error;
pub mod parse;
mod reference;

pub use error::{ParseError, TrieError};
pub use reference::{check_correctness, CorrectnessReport, Mismatch, ReferenceLpm};

use std::fmt;
use std::mem;

use tracing::{debug, trace, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Width of a lookup key in bits.
pub const ADDRESS_BITS: u32 = 32;

/// Longest prefix the trie accepts.
pub const MAX_PREFIX_LEN: u8 = 32;

/// Integer stand-in for "no route" where callers need a plain integer answer.
pub const NO_ROUTE: NextHop = -1;

/// Identifier of the next hop a route forwards to.
pub type NextHop = i32;

/// Number of address bits consumed per trie level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Stride {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl Stride {
    pub const ALL: [Stride; 4] = [Stride::One, Stride::Two, Stride::Four, Stride::Eight];

    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Branching factor, `2^stride`.
    #[inline]
    pub const fn fanout(self) -> usize {
        1 << self.bits()
    }

    /// Levels below the root needed to consume a whole address.
    #[inline]
    pub const fn depth(self) -> u32 {
        (ADDRESS_BITS + self.bits() - 1) / self.bits()
    }
}

impl TryFrom<u32> for Stride {
    type Error = TrieError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Stride::One),
            2 => Ok(Stride::Two),
            4 => Ok(Stride::Four),
            8 => Ok(Stride::Eight),
            other => Err(TrieError::InvalidStride(other)),
        }
    }
}

impl fmt::Display for Stride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

// =============================================================================
// Bit utilities
// =============================================================================

/// Returns the `num_bits`-wide group of `value` starting `start_bit` bits from
/// the most significant end.
///
/// Only defined for `start_bit + num_bits <= 32`.
#[inline]
pub fn extract_bits(value: u32, start_bit: u32, num_bits: u32) -> u32 {
    debug_assert!(start_bit + num_bits <= ADDRESS_BITS);
    if num_bits == 0 {
        return 0;
    }
    (value << start_bit) >> (ADDRESS_BITS - num_bits)
}

/// Mask with the top `length` bits set.
#[inline]
pub fn prefix_mask(length: u8) -> u32 {
    debug_assert!(length <= MAX_PREFIX_LEN);
    match length {
        0 => 0,
        len => u32::MAX << (ADDRESS_BITS - u32::from(len)),
    }
}

// =============================================================================
// Routes
// =============================================================================

/// The best-known route for every address whose descent passes through the
/// node holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: NextHop,
    pub prefix_length: u8,
}

/// One line of a prefix table: the top `length` bits of `prefix` are
/// significant, trailing bits are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixRecord {
    pub prefix: u32,
    pub length: u8,
    pub next_hop: NextHop,
}

impl PrefixRecord {
    pub fn new(prefix: u32, length: u8, next_hop: NextHop) -> Result<Self, TrieError> {
        if length > MAX_PREFIX_LEN {
            return Err(TrieError::InvalidPrefixLength(i64::from(length)));
        }
        Ok(Self {
            prefix,
            length,
            next_hop,
        })
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        prefix_mask(self.length)
    }

    /// Whether `address` falls inside this prefix. Length 0 matches everything.
    #[inline]
    pub fn matches(&self, address: u32) -> bool {
        let mask = self.mask();
        address & mask == self.prefix & mask
    }
}

// =============================================================================
// Node arena
// =============================================================================
//
// Nodes live in two parallel vectors indexed by `NodeId`:
// - `children`: `fanout` slots per node, slot `node * fanout + branch`
// - `routes`:   the optional route stored at each node
//
// Node 0 is the root. Nodes are never freed, so ids stay valid for the
// lifetime of the trie and teardown is a plain vector drop.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct NodeId(u32);

impl NodeId {
    const ROOT: NodeId = NodeId(0);
    const NULL: NodeId = NodeId(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ids `0..MAX_NODES` are addressable; `u32::MAX` is the null slot.
const MAX_NODES: usize = u32::MAX as usize;

#[derive(Clone)]
struct NodeArena {
    fanout: usize,
    children: Vec<NodeId>,
    routes: Vec<Option<RouteEntry>>,
}

impl NodeArena {
    fn new(fanout: usize) -> Self {
        let mut arena = Self {
            fanout,
            children: Vec::new(),
            routes: Vec::new(),
        };
        arena.alloc();
        arena
    }

    #[inline]
    fn len(&self) -> usize {
        self.routes.len()
    }

    /// Callers check `len() < MAX_NODES` first.
    fn alloc(&mut self) -> NodeId {
        debug_assert!(self.len() < MAX_NODES);
        let id = NodeId(self.len() as u32);
        self.children
            .resize(self.children.len() + self.fanout, NodeId::NULL);
        self.routes.push(None);
        id
    }

    #[inline]
    fn slot(&self, node: NodeId, branch: u32) -> usize {
        debug_assert!((branch as usize) < self.fanout);
        node.index() * self.fanout + branch as usize
    }

    #[inline]
    fn child(&self, node: NodeId, branch: u32) -> NodeId {
        self.children[self.slot(node, branch)]
    }

    #[inline]
    fn set_child(&mut self, node: NodeId, branch: u32, child: NodeId) {
        let slot = self.slot(node, branch);
        self.children[slot] = child;
    }

    #[inline]
    fn route(&self, node: NodeId) -> Option<RouteEntry> {
        self.routes[node.index()]
    }

    #[inline]
    fn route_mut(&mut self, node: NodeId) -> &mut Option<RouteEntry> {
        &mut self.routes[node.index()]
    }

    fn capacity_bytes(&self) -> usize {
        self.children.capacity() * mem::size_of::<NodeId>()
            + self.routes.capacity() * mem::size_of::<Option<RouteEntry>>()
    }

    fn shrink_to_fit(&mut self) {
        self.children.shrink_to_fit();
        self.routes.shrink_to_fit();
    }
}

/// Size of one node in the pointer-per-slot layout that
/// [`MultibitTrie::estimate_memory_bytes`] models: a vector header for the
/// child slots, next hop, presence flag and prefix length, then one pointer
/// per branch, padded to 8 bytes.
fn modelled_node_bytes(fanout: usize) -> usize {
    let fixed = mem::size_of::<Vec<usize>>()
        + mem::size_of::<i32>()
        + mem::size_of::<bool>()
        + mem::size_of::<i32>();
    let bytes = fixed + fanout * mem::size_of::<usize>();
    (bytes + 7) & !7
}

// =============================================================================
// MultibitTrie
// =============================================================================

/// Longest-prefix-match table over 32-bit addresses with a fixed stride.
///
/// Routes are only ever added. Each node keeps at most one route and a new
/// route replaces it only when strictly longer, so among equal-length
/// prefixes the first insertion wins. The root holds the default route, and
/// only the first length-0 insertion is kept.
#[derive(Clone)]
pub struct MultibitTrie {
    stride: Stride,
    nodes: NodeArena,
}

impl MultibitTrie {
    pub fn new(stride: Stride) -> Self {
        debug!(stride = stride.bits(), "creating multibit trie");
        Self {
            stride,
            nodes: NodeArena::new(stride.fanout()),
        }
    }

    /// Builds a trie from a raw stride value, rejecting anything other than
    /// 1, 2, 4 or 8.
    pub fn with_stride(bits: u32) -> Result<Self, TrieError> {
        Stride::try_from(bits).map(Self::new)
    }

    /// Builds a trie holding every record, in order.
    pub fn from_records<I>(stride: Stride, records: I) -> Result<Self, TrieError>
    where
        I: IntoIterator<Item = PrefixRecord>,
    {
        let mut trie = Self::new(stride);
        for record in records {
            trie.insert_record(&record)?;
        }
        Ok(trie)
    }

    #[inline]
    pub fn stride(&self) -> Stride {
        self.stride
    }

    /// Allocated nodes, root included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True until the first route is stored.
    pub fn is_empty(&self) -> bool {
        self.node_count() == 1 && self.default_route().is_none()
    }

    pub fn default_route(&self) -> Option<NextHop> {
        self.nodes.route(NodeId::ROOT).map(|route| route.next_hop)
    }

    /// Adds `prefix/length -> next_hop`.
    ///
    /// Fails without touching the trie if `length` exceeds 32.
    pub fn insert(&mut self, prefix: u32, length: u8, next_hop: NextHop) -> Result<(), TrieError> {
        if length > MAX_PREFIX_LEN {
            warn!(prefix, length, next_hop, "rejecting prefix with invalid length");
            return Err(TrieError::InvalidPrefixLength(i64::from(length)));
        }
        self.reserve_for_insert()?;

        let route = RouteEntry {
            next_hop,
            prefix_length: length,
        };

        if length == 0 {
            match self.nodes.route(NodeId::ROOT) {
                None => *self.nodes.route_mut(NodeId::ROOT) = Some(route),
                Some(existing) => debug!(
                    kept = existing.next_hop,
                    ignored = next_hop,
                    "default route already set"
                ),
            }
            return Ok(());
        }

        let stride = self.stride.bits();
        let length = u32::from(length);
        let mut node = NodeId::ROOT;
        let mut consumed = 0;

        while consumed + stride <= length {
            node = self.child_or_insert(node, extract_bits(prefix, consumed, stride));
            consumed += stride;
        }

        if consumed == length {
            self.offer_route(node, route);
            return Ok(());
        }

        // Leaf-push: the top `length - consumed` bits of this level's group are
        // fixed, the rest are free. Store the route in every child they reach.
        let free_bits = stride - (length - consumed);
        let base = (extract_bits(prefix, consumed, stride) >> free_bits) << free_bits;
        for low in 0..(1u32 << free_bits) {
            let child = self.child_or_insert(node, base | low);
            self.offer_route(child, route);
        }
        Ok(())
    }

    pub fn insert_record(&mut self, record: &PrefixRecord) -> Result<(), TrieError> {
        self.insert(record.prefix, record.length, record.next_hop)
    }

    /// Next hop of the longest prefix covering `address`.
    #[inline]
    pub fn lookup(&self, address: u32) -> Option<NextHop> {
        self.lookup_route(address).map(|route| route.next_hop)
    }

    /// Like [`lookup`](Self::lookup), with [`NO_ROUTE`] for a miss.
    #[inline]
    pub fn lookup_or_no_route(&self, address: u32) -> NextHop {
        self.lookup(address).unwrap_or(NO_ROUTE)
    }

    /// The winning route for `address`, including its prefix length.
    pub fn lookup_route(&self, address: u32) -> Option<RouteEntry> {
        let stride = self.stride.bits();
        let mut best = self.nodes.route(NodeId::ROOT);
        let mut node = NodeId::ROOT;
        let mut consumed = 0;

        while consumed < ADDRESS_BITS {
            node = self.nodes.child(node, extract_bits(address, consumed, stride));
            if node.is_null() {
                break;
            }
            consumed += stride;
            if let Some(route) = self.nodes.route(node) {
                best = Some(route);
            }
        }
        best
    }

    /// Approximate footprint of a pointer-per-slot node layout; see
    /// [`heap_bytes`](Self::heap_bytes) for what this trie actually holds.
    pub fn estimate_memory_bytes(&self) -> usize {
        self.node_count() * modelled_node_bytes(self.stride.fanout())
    }

    /// Heap bytes reserved by the node arena.
    pub fn heap_bytes(&self) -> usize {
        self.nodes.capacity_bytes()
    }

    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
    }

    /// Depth-first walk of every node, children in ascending branch order.
    pub fn dump(&self) -> Dump<'_> {
        Dump {
            trie: self,
            stack: vec![(NodeId::ROOT, Vec::new())],
        }
    }

    /// Indented text rendering of [`dump`](Self::dump). For diagnostics only.
    pub fn structural_dump(&self) -> String {
        let mut out = format!("Trie structure (stride={}):\n", self.stride);
        for entry in self.dump() {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    fn reserve_for_insert(&self) -> Result<(), TrieError> {
        // Full groups on the way down, then at most half a level of pushed children.
        let worst_case = self.stride.depth() as usize + self.stride.fanout() / 2;
        if self.node_count() + worst_case > MAX_NODES {
            return Err(TrieError::NodeLimit(self.node_count()));
        }
        Ok(())
    }

    fn child_or_insert(&mut self, node: NodeId, branch: u32) -> NodeId {
        let child = self.nodes.child(node, branch);
        if !child.is_null() {
            return child;
        }
        let child = self.nodes.alloc();
        self.nodes.set_child(node, branch, child);
        trace!(parent = node.0, branch, child = child.0, "allocated trie node");
        child
    }

    /// Stores `route` at `node` unless the node already holds one at least as long.
    fn offer_route(&mut self, node: NodeId, route: RouteEntry) {
        let slot = self.nodes.route_mut(node);
        if slot.map_or(true, |existing| route.prefix_length > existing.prefix_length) {
            *slot = Some(route);
        }
    }
}

impl fmt::Debug for MultibitTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultibitTrie")
            .field("stride", &self.stride.bits())
            .field("node_count", &self.node_count())
            .field("estimated_bytes", &self.estimate_memory_bytes())
            .finish()
    }
}

// =============================================================================
// Structural dump
// =============================================================================

/// One node visited by [`MultibitTrie::dump`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpEntry {
    /// Branch indices taken from the root; empty for the root itself.
    pub path: Vec<u32>,
    pub route: Option<RouteEntry>,
    stride: Stride,
}

impl DumpEntry {
    #[inline]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for DumpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("root")?;
        } else {
            let separator = if self.stride == Stride::One { "/" } else { "-" };
            write!(f, "{:indent$}", "", indent = self.depth() * 2)?;
            for (i, branch) in self.path.iter().enumerate() {
                if i > 0 {
                    f.write_str(separator)?;
                }
                write!(f, "{branch}")?;
            }
        }
        if let Some(route) = self.route {
            write!(f, " [next_hop={}]", route.next_hop)?;
        }
        Ok(())
    }
}

/// Lazy pre-order traversal; clone it to restart from the same point.
#[derive(Clone)]
pub struct Dump<'a> {
    trie: &'a MultibitTrie,
    stack: Vec<(NodeId, Vec<u32>)>,
}

impl<'a> Iterator for Dump<'a> {
    type Item = DumpEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, path) = self.stack.pop()?;
        let nodes = &self.trie.nodes;
        for branch in (0..nodes.fanout as u32).rev() {
            let child = nodes.child(node, branch);
            if child.is_null() {
                continue;
            }
            let mut child_path = Vec::with_capacity(path.len() + 1);
            child_path.extend_from_slice(&path);
            child_path.push(branch);
            self.stack.push((child, child_path));
        }
        Some(DumpEntry {
            route: nodes.route(node),
            path,
            stride: self.trie.stride,
        })
    }
}


#[cfg(test)]
mod proptests;
