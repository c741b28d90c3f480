//! Page map: an ordered list of page-map nodes, each owning one buddy pool
//! over one physical bank (§4.2).
//!
//! Grounded on `original_source/arch/sparc/kernel/bootmem.c`'s
//! `page_map_node`/`page_map_reserve_chunk`: lookup is linear over nodes, and
//! a node that drops below [`crate::config::PAGE_MAP_MOVE_NODE_AVAIL_THRESH`]
//! free pages is rotated to the back of the list so the next allocation tries
//! a fresher node first.

use crate::config::{PAGE_MAP_MOVE_NODE_AVAIL_THRESH, PAGE_SIZE};
use crate::mem::buddy::BuddyPool;
use alloc::vec::Vec;

/// One bank of physical memory managed as a buddy pool, with its page-frame
/// range recorded for address-to-node lookup.
pub struct PageMapNode {
    start_pfn: u64,
    end_pfn: u64,
    pool: BuddyPool,
}

impl PageMapNode {
    /// `max_order`/`min_order` are in bytes (as for [`BuddyPool::new`]); the
    /// node's pfn range is derived from `base` and the pool size.
    pub fn new(base: u64, max_order: u32, min_order: u32) -> Self {
        let pool = BuddyPool::new(base, max_order, min_order);
        let start_pfn = base / PAGE_SIZE as u64;
        let end_pfn = start_pfn + (pool.pool_size() / PAGE_SIZE as u64);
        Self { start_pfn, end_pfn, pool }
    }

    fn contains(&self, addr: u64) -> bool {
        let pfn = addr / PAGE_SIZE as u64;
        pfn >= self.start_pfn && pfn < self.end_pfn
    }

    pub fn free_pages(&self) -> usize {
        self.pool.free_granule_count()
    }

    pub fn start_pfn(&self) -> u64 {
        self.start_pfn
    }

    pub fn end_pfn(&self) -> u64 {
        self.end_pfn
    }
}

/// The page map: a vector of banks, searched in order with LRU-style
/// rotation away from exhausted nodes.
#[derive(Default)]
pub struct PageMap {
    nodes: Vec<PageMapNode>,
}

impl PageMap {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn add_node(&mut self, node: PageMapNode) {
        self.nodes.push(node);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rotates a node below the free-page threshold to the back of the
    /// search order, so the next lookup starts elsewhere.
    fn maybe_rotate(&mut self, index: usize) {
        if self.nodes[index].free_pages() < PAGE_MAP_MOVE_NODE_AVAIL_THRESH {
            let node = self.nodes.remove(index);
            self.nodes.push(node);
        }
    }

    /// Returns exactly one page (a minimum-order block) from the first node
    /// that has one.
    pub fn page_alloc(&mut self) -> Option<u64> {
        for i in 0..self.nodes.len() {
            if let Some(addr) = self.nodes[i].pool.alloc(PAGE_SIZE) {
                self.maybe_rotate(i);
                return Some(addr);
            }
        }
        None
    }

    /// Performs one multi-order allocation from the first node that can
    /// satisfy `size`.
    pub fn reserve_chunk(&mut self, size: usize) -> Option<u64> {
        for i in 0..self.nodes.len() {
            if let Some(addr) = self.nodes[i].pool.alloc(size) {
                self.maybe_rotate(i);
                return Some(addr);
            }
        }
        None
    }

    /// Locates the owning node by address range and returns the page/chunk.
    pub fn page_free(&mut self, addr: u64) -> crate::Result<()> {
        for node in self.nodes.iter_mut() {
            if node.contains(addr) {
                return node.pool.free(Some(addr));
            }
        }
        log::warn!("page_map: free of address {addr:#x} owned by no node");
        Err(crate::KernelError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_map() -> PageMap {
        let mut map = PageMap::new();
        map.add_node(PageMapNode::new(0, 16, 12)); // 16 pages
        map.add_node(PageMapNode::new(1 << 20, 16, 12));
        map
    }

    #[test]
    fn page_alloc_comes_from_first_node_with_room() {
        let mut map = two_node_map();
        let p = map.page_alloc().unwrap();
        assert!(p < (1 << 20));
    }

    #[test]
    fn page_free_locates_owning_node() {
        let mut map = two_node_map();
        let p = map.page_alloc().unwrap();
        assert!(map.page_free(p).is_ok());
    }

    #[test]
    fn free_of_unowned_address_is_reported() {
        let mut map = two_node_map();
        assert!(map.page_free(1 << 30).is_err());
    }

    #[test]
    fn exhausted_node_rotates_to_back() {
        let mut map = PageMap::new();
        map.add_node(PageMapNode::new(0, 12, 12)); // exactly 1 page
        map.add_node(PageMapNode::new(1 << 20, 16, 12));
        let first = map.page_alloc().unwrap();
        assert!(first < (1 << 20));
        // first node now has 0 free pages (< threshold), so it should have rotated
        assert!(map.nodes[0].start_pfn() == (1u64 << 20) / PAGE_SIZE as u64);
    }

    #[test]
    fn reserve_chunk_multi_order() {
        let mut map = two_node_map();
        let addr = map.reserve_chunk(4 * PAGE_SIZE).unwrap();
        assert!(map.page_free(addr).is_ok());
    }
}
