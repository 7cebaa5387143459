use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counting allocator for heap budget tests.
pub struct BudgetAlloc {
    current: AtomicUsize,
    peak: AtomicUsize,
    count: AtomicUsize,
}

/// Heap use of one measured closure.
#[derive(Clone, Copy, Debug)]
pub struct HeapUsage {
    /// Peak bytes above the level at entry.
    pub peak_bytes: usize,
    pub allocations: usize,
}

impl BudgetAlloc {
    pub const fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        }
    }

    /// Run `op` and report the heap it used on top of what was live before.
    pub fn measure<T>(&self, op: impl FnOnce() -> T) -> (T, HeapUsage) {
        let baseline = self.current.load(Ordering::SeqCst);
        self.peak.store(baseline, Ordering::SeqCst);
        let count_before = self.count.load(Ordering::SeqCst);
        let out = op();
        let usage = HeapUsage {
            peak_bytes: self.peak.load(Ordering::SeqCst).saturating_sub(baseline),
            allocations: self.count.load(Ordering::SeqCst) - count_before,
        };
        (out, usage)
    }

    fn grow(&self, bytes: usize) {
        let now = self.current.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

unsafe impl GlobalAlloc for BudgetAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            match new_size.checked_sub(layout.size()) {
                Some(extra) => self.grow(extra),
                None => self.shrink(layout.size() - new_size),
            }
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        new_ptr
    }
}
