//! Interned text for tree records.
//!
//! Strongly borrowed from `TypedArena`, but grows by fixed-size chunks
//! and only stores variable-sized strings. Nothing is ever removed, so
//! every interned string lives exactly as long as the pool.

use std::alloc::{self, Layout};
use std::borrow::Borrow;
use std::cell::{Cell, RefCell};
use std::cmp::max;
use std::collections::HashSet;
use std::{fmt, hash, ptr, slice, str};

struct Chunk {
    start: *mut u8,
    capacity: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Chunk {
        let layout = Chunk::layout(capacity);
        let start = unsafe { alloc::alloc(layout) };
        if start.is_null() {
            alloc::handle_alloc_error(layout);
        }

        Chunk { start, capacity }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::array::<u8>(capacity) {
            Ok(layout) => layout,
            Err(_) => panic!("string pool chunk of {} bytes is too large", capacity),
        }
    }

    fn start(&self) -> *mut u8 {
        self.start
    }

    fn end(&self) -> *const u8 {
        unsafe { self.start.add(self.capacity) }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.start, Chunk::layout(self.capacity)) }
    }
}

/// A view into text owned by a [`StringPool`].
///
/// The view does not track the pool's lifetime; holders must not
/// dereference it after the pool is dropped.
#[derive(Copy, Clone)]
pub struct InternedString {
    data: *const u8,
    len: usize,
}

impl InternedString {
    fn from_str(s: &str) -> InternedString {
        InternedString {
            data: s.as_ptr(),
            len: s.len(),
        }
    }

    pub(crate) fn as_str<'s>(&self) -> &'s str {
        unsafe {
            let bytes = slice::from_raw_parts(self.data, self.len);
            str::from_utf8_unchecked(bytes)
        }
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &InternedString) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for InternedString {}

impl hash::Hash for InternedString {
    fn hash<H>(&self, state: &mut H)
    where
        H: hash::Hasher,
    {
        self.as_str().hash(state)
    }
}

impl Borrow<str> for InternedString {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

pub struct StringPool {
    start: Cell<*mut u8>,
    end: Cell<*const u8>,
    chunks: RefCell<Vec<Chunk>>,
    index: RefCell<HashSet<InternedString>>,
}

const CAPACITY: usize = 10240;

impl StringPool {
    pub fn new() -> StringPool {
        StringPool {
            start: Cell::new(ptr::null_mut()),
            end: Cell::new(ptr::null()),
            chunks: RefCell::new(Vec::new()),
            index: RefCell::new(HashSet::new()),
        }
    }

    #[allow(dead_code)]
    pub fn intern<'s>(&'s self, s: &str) -> &'s str {
        self.intern_string(s).as_str()
    }

    pub(crate) fn intern_string(&self, s: &str) -> InternedString {
        if s.is_empty() {
            return InternedString::from_str("");
        }

        if let Some(interned) = self.index.borrow().get(s) {
            return *interned;
        }

        let interned = self.do_intern(s);
        self.index.borrow_mut().insert(interned);
        interned
    }

    /// Number of distinct non-empty strings stored.
    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    fn do_intern(&self, s: &str) -> InternedString {
        self.ensure_capacity(s.len());
        self.store(s)
    }

    fn ensure_capacity(&self, str_len: usize) {
        let remaining = self.end.get() as usize - self.start.get() as usize;
        if remaining < str_len {
            self.allocate_another(max(CAPACITY, str_len))
        }
    }

    fn allocate_another(&self, capacity: usize) {
        let chunk = Chunk::new(capacity);
        self.start.set(chunk.start());
        self.end.set(chunk.end());
        self.chunks.borrow_mut().push(chunk);
    }

    fn store(&self, s: &str) -> InternedString {
        let start = self.start.get();

        unsafe {
            ptr::copy_nonoverlapping(s.as_ptr(), start, s.len());
            self.start.set(start.add(s.len()));
        }

        InternedString {
            data: start,
            len: s.len(),
        }
    }
}

impl Default for StringPool {
    fn default() -> StringPool {
        StringPool::new()
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "StringPool {{ strings: {}, chunks: {} }}", self.len(), self.chunks.borrow().len())
    }
}
