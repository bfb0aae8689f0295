//! Input routing: multicast key to (filter, dimension).
//!
//! Entries are scanned in declaration order and the first one whose masked
//! key matches wins. Well-formed tables never overlap, but first-match is
//! also the defined behaviour when they do.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::RoutingMiss;
use crate::numeric::{decode_payload, Fixed};

/// One line of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub key: u32,
    pub mask: u32,
    pub filter_index: usize,
    /// Extracts the dimension index from the packet key
    pub dimension_mask: u32,
}

impl RouteEntry {
    pub fn new(key: u32, mask: u32, filter_index: usize, dimension_mask: u32) -> Self {
        Self {
            key,
            mask,
            filter_index,
            dimension_mask,
        }
    }

    #[inline]
    pub fn matches(&self, key: u32) -> bool {
        (key & self.mask) == (self.key & self.mask)
    }
}

/// Resolved destination of an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub filter_index: usize,
    pub dimension: usize,
    pub value: Fixed,
}

#[derive(Debug, Clone, Default)]
pub struct InputRouter {
    routes: Vec<RouteEntry>,
}

impl InputRouter {
    pub fn new(routes: Vec<RouteEntry>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn lookup(&self, key: u32) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.matches(key))
    }

    /// Resolve a packet. The dimension is not bounds-checked here.
    pub fn route(&self, key: u32, payload: u32) -> Result<Routed, RoutingMiss> {
        let entry = self.lookup(key).ok_or(RoutingMiss::NoRoute { key })?;
        Ok(Routed {
            filter_index: entry.filter_index,
            dimension: (key & entry.dimension_mask) as usize,
            value: decode_payload(payload),
        })
    }
}
