//! Process-wide dispatch table arena
//!
//! One address range of [`MAX_TABLE_SLOTS`] pointer-sized words is reserved at
//! first use and committed a page at a time as tables are handed out. Nothing
//! is ever released: native objects may keep pointing at a patched table after
//! the engine that built it is gone, so the memory must stay mapped for the
//! life of the process.
//!
//! Because the range is fixed, "is this table one of ours" is a bounds check
//! against the committed end.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Arena ceiling in pointer-sized words
pub const MAX_TABLE_SLOTS: usize = 1024 * 1024;

const WORD: usize = std::mem::size_of::<usize>();
const RESERVED_BYTES: usize = MAX_TABLE_SLOTS * WORD;

static ARENA: Lazy<SlotArena> = Lazy::new(SlotArena::reserve);

/// The process-wide arena, reserved on first access
pub fn arena() -> &'static SlotArena {
    &ARENA
}

/// Bump allocator over the reserved range
pub struct SlotArena {
    base: usize,
    page_words: usize,
    state: Mutex<ArenaState>,
    /// Committed end address, readable without the lock
    end: AtomicUsize,
}

#[derive(Debug, Default)]
struct ArenaState {
    used: usize,
    committed: usize,
}

impl SlotArena {
    fn reserve() -> Self {
        let page_size = platform::page_size().max(WORD);
        let base = platform::reserve(RESERVED_BYTES);
        Self {
            base,
            page_words: page_size / WORD,
            state: Mutex::new(ArenaState::default()),
            end: AtomicUsize::new(base),
        }
    }

    /// Hand out `words` zeroed words aligned to `align` bytes.
    ///
    /// # Panics
    ///
    /// Panics when the reservation is exhausted. There is no recovery: every
    /// patched table ever issued must stay where it is.
    pub fn allocate(&self, words: usize, align: usize) -> NonNull<usize> {
        let align_words = (align / WORD).max(1);
        let mut state = self.state.lock();

        let start = align_up(state.used, align_words);
        let end = start + words;
        if end > MAX_TABLE_SLOTS {
            let used = state.used;
            drop(state);
            panic!(
                "Dispatch table arena exhausted: {} of {} slots used, {} requested",
                used, MAX_TABLE_SLOTS, words
            );
        }

        if end > state.committed {
            let commit_end = align_up(end, self.page_words).min(MAX_TABLE_SLOTS);
            platform::commit(
                self.base + state.committed * WORD,
                (commit_end - state.committed) * WORD,
            );
            state.committed = commit_end;
            self.end
                .store(self.base + commit_end * WORD, Ordering::Release);
        }

        state.used = end;
        // SAFETY: base is the non-null start of the reservation
        unsafe { NonNull::new_unchecked((self.base + start * WORD) as *mut usize) }
    }

    /// Address lies inside the committed part of the arena
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end.load(Ordering::Acquire)
    }

    /// Words handed out so far
    pub fn used_slots(&self) -> usize {
        self.state.lock().used
    }

    /// Words committed so far
    pub fn committed_slots(&self) -> usize {
        self.state.lock().committed
    }
}

fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[cfg(unix)]
mod platform {
    use std::ffi::c_void;

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    }

    pub fn reserve(bytes: usize) -> usize {
        // SAFETY: anonymous private mapping with no backing file
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                bytes,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            panic!(
                "Failed to reserve {} bytes for dispatch tables: {}",
                bytes,
                std::io::Error::last_os_error()
            );
        }
        ptr as usize
    }

    pub fn commit(addr: usize, bytes: usize) {
        // SAFETY: the range lies inside our own reservation
        let rc = unsafe {
            libc::mprotect(
                addr as *mut c_void,
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            panic!(
                "Failed to commit {} bytes of dispatch tables: {}",
                bytes,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};

    const PAGE_SIZE: usize = 4096;

    pub fn page_size() -> usize {
        PAGE_SIZE
    }

    // No reserve/commit split here; the whole range is allocated zeroed up front.
    pub fn reserve(bytes: usize) -> usize {
        let layout = match Layout::from_size_align(bytes, PAGE_SIZE) {
            Ok(layout) => layout,
            Err(err) => panic!("Invalid dispatch table arena layout: {}", err),
        };
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        ptr as usize
    }

    pub fn commit(_addr: usize, _bytes: usize) {}
}
