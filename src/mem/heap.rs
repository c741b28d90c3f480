//! Sequential-fit kernel heap layered on a moving program break (§4.2).
//!
//! Grounded on `original_source/kernel/kmem.c`'s `struct kmem` / `kmalloc` /
//! `kfree` / `krealloc`: each allocation is preceded by a header recording
//! `{free, prev, next, size, data_ptr}`; headers form a doubly-linked chain
//! in address order, plus a free-list anchor searched first-fit. This
//! allocator is bookkeeping-only — like [`crate::mem::buddy::BuddyPool`] it
//! tracks address ranges rather than owning physical storage, so `krealloc`
//! hands back the new address without copying payload bytes; the caller
//! performs that copy once it has mapped both addresses.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

const WORD: u64 = 8;
/// Fixed per-allocation bookkeeping overhead, matching `sizeof(struct kmem)`
/// in the grounding source closely enough to reason about break math.
const HEADER_SIZE: u64 = 32;

fn word_align(n: usize) -> usize {
    ((n as u64 + WORD - 1) & !(WORD - 1)) as usize
}

#[derive(Clone, Copy)]
struct KmemHeader {
    free: bool,
    size: usize,
    prev: Option<u64>,
    next: Option<u64>,
    data_ptr: u64,
}

/// A sequential-fit heap over `[base, base + capacity)`, grown on demand by
/// a simulated `sbrk`.
pub struct SequentialHeap {
    base: u64,
    capacity: u64,
    brk: u64,
    headers: BTreeMap<u64, KmemHeader>,
    free_list: Vec<u64>,
    tail: Option<u64>,
}

impl SequentialHeap {
    pub fn new(base: u64, capacity: u64) -> Self {
        Self { base, capacity, brk: base, headers: BTreeMap::new(), free_list: Vec::new(), tail: None }
    }

    /// Current program break, for tests and the heap-conservation invariant.
    pub fn brk(&self) -> u64 {
        self.brk
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    fn split_or_use(&mut self, addr: u64, req: usize) {
        let h = *self.headers.get(&addr).unwrap();
        let remainder = h.size - req;
        if (remainder as u64) > HEADER_SIZE + WORD {
            let new_hdr_addr = addr + HEADER_SIZE + req as u64;
            let new_size = remainder - HEADER_SIZE as usize;
            let next = h.next;
            let new_header =
                KmemHeader { free: true, size: new_size, prev: Some(addr), next, data_ptr: new_hdr_addr + HEADER_SIZE };
            self.headers.insert(new_hdr_addr, new_header);
            if let Some(n) = next {
                self.headers.get_mut(&n).unwrap().prev = Some(new_hdr_addr);
            } else {
                self.tail = Some(new_hdr_addr);
            }
            self.free_list.push(new_hdr_addr);

            let hm = self.headers.get_mut(&addr).unwrap();
            hm.size = req;
            hm.next = Some(new_hdr_addr);
        }
    }

    /// Allocates `size` bytes, word-aligned. Returns `None` if the break
    /// cannot be extended far enough within `capacity`.
    pub fn kmalloc(&mut self, size: usize) -> Option<u64> {
        let req = word_align(size);

        if let Some(&addr) = self.free_list.iter().find(|&&a| self.headers[&a].size >= req) {
            self.free_list.retain(|&a| a != addr);
            self.split_or_use(addr, req);
            let h = self.headers.get_mut(&addr).unwrap();
            h.free = false;
            return Some(h.data_ptr);
        }

        let needed = HEADER_SIZE + req as u64;
        if self.brk + needed > self.base + self.capacity {
            return None;
        }

        let hdr_addr = self.brk;
        let data_ptr = hdr_addr + HEADER_SIZE;
        let prev = self.tail;
        let header = KmemHeader { free: false, size: req, prev, next: None, data_ptr };
        self.headers.insert(hdr_addr, header);
        if let Some(p) = prev {
            self.headers.get_mut(&p).unwrap().next = Some(hdr_addr);
        }
        self.tail = Some(hdr_addr);
        self.brk += needed;
        Some(data_ptr)
    }

    /// Allocates `nmemb * size` bytes, reporting overflow rather than
    /// wrapping.
    pub fn kcalloc(&mut self, nmemb: usize, size: usize) -> crate::Result<Option<u64>> {
        let total = nmemb.checked_mul(size).ok_or(crate::KernelError::InvalidArgument)?;
        Ok(self.kmalloc(total))
    }

    fn validate(&self, ptr: u64) -> crate::Result<u64> {
        if ptr <= self.base || ptr >= self.brk {
            return Err(crate::KernelError::InvalidArgument);
        }
        let hdr_addr = ptr.checked_sub(HEADER_SIZE).ok_or(crate::KernelError::InvalidArgument)?;
        let Some(h) = self.headers.get(&hdr_addr) else {
            return Err(crate::KernelError::InvalidArgument);
        };
        if h.data_ptr != ptr || h.free {
            return Err(crate::KernelError::InvalidArgument);
        }
        Ok(hdr_addr)
    }

    fn merge_forward(&mut self, addr: u64) {
        loop {
            let h = *self.headers.get(&addr).unwrap();
            let Some(next_addr) = h.next else { break };
            let nh = *self.headers.get(&next_addr).unwrap();
            if !nh.free {
                break;
            }
            self.free_list.retain(|&a| a != next_addr);
            self.headers.remove(&next_addr);
            let new_next = nh.next;
            let merged_size = h.size + HEADER_SIZE as usize + nh.size;
            {
                let hm = self.headers.get_mut(&addr).unwrap();
                hm.size = merged_size;
                hm.next = new_next;
            }
            if let Some(nn) = new_next {
                self.headers.get_mut(&nn).unwrap().prev = Some(addr);
            } else {
                self.tail = Some(addr);
            }
        }
    }

    fn merge_backward(&mut self, addr: u64) -> u64 {
        let mut cur = addr;
        loop {
            let h = *self.headers.get(&cur).unwrap();
            let Some(prev_addr) = h.prev else { break };
            let ph = *self.headers.get(&prev_addr).unwrap();
            if !ph.free {
                break;
            }
            self.free_list.retain(|&a| a != cur);
            self.headers.remove(&cur);
            let merged_size = ph.size + HEADER_SIZE as usize + h.size;
            let cur_next = h.next;
            {
                let pm = self.headers.get_mut(&prev_addr).unwrap();
                pm.size = merged_size;
                pm.next = cur_next;
            }
            if let Some(n) = cur_next {
                self.headers.get_mut(&n).unwrap().prev = Some(prev_addr);
            } else {
                self.tail = Some(prev_addr);
            }
            cur = prev_addr;
        }
        cur
    }

    fn maybe_shrink_tail(&mut self, addr: u64) {
        if self.tail != Some(addr) {
            return;
        }
        let h = *self.headers.get(&addr).unwrap();
        if !h.free {
            return;
        }
        self.free_list.retain(|&a| a != addr);
        self.headers.remove(&addr);
        self.tail = h.prev;
        if let Some(p) = h.prev {
            self.headers.get_mut(&p).unwrap().next = None;
        }
        self.brk = addr;
    }

    /// Releases a block previously returned by `kmalloc`/`kcalloc`/
    /// `krealloc`. A `None` pointer is a no-op. A pointer that does not lie
    /// strictly inside the current heap range, or whose header's own
    /// `data_ptr` disagrees (foreign pointer, double free, corruption), is
    /// reported and leaves the heap untouched.
    pub fn kfree(&mut self, ptr: Option<u64>) -> crate::Result<()> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        let addr = self.validate(ptr)?;

        self.headers.get_mut(&addr).unwrap().free = true;
        self.free_list.push(addr);

        self.merge_forward(addr);
        let addr = self.merge_backward(addr);
        self.maybe_shrink_tail(addr);
        Ok(())
    }

    /// Always performs malloc-new/free-old; never grows in place. Preserves
    /// `min(old_size, new_size)` bytes of payload (the caller's
    /// responsibility, per the module-level note on physical backing).
    pub fn krealloc(&mut self, ptr: Option<u64>, size: usize) -> crate::Result<Option<u64>> {
        let Some(p) = ptr else {
            return Ok(self.kmalloc(size));
        };
        self.validate(p)?;
        let new_ptr = self.kmalloc(size);
        if new_ptr.is_some() {
            self.kfree(Some(p))?;
        }
        Ok(new_ptr)
    }
}
