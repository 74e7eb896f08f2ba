//! Manually managed records backing a package.
//!
//! Tree records are allocated in arenas owned by a [`Storage`] and are
//! reclaimed all at once when the storage is dropped. Namespace records
//! that a query copies out of the tree are individual heap allocations;
//! they belong to nobody until a wrapper claims them, and are released
//! only through [`free_copy`].

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use typed_arena::Arena;

use crate::string_pool::{InternedString, StringPool};

thread_local! {
    static LIVE_COPIES: Cell<usize> = const { Cell::new(0) };
}

/// Number of namespace copies allocated on this thread that have not
/// been released yet.
pub fn live_copies() -> usize {
    LIVE_COPIES.with(Cell::get)
}

enum Buffer {
    Pooled(InternedString),
    Heap(Box<str>),
}

impl Buffer {
    fn as_str(&self) -> &str {
        match self {
            Buffer::Pooled(s) => s.as_str(),
            Buffer::Heap(s) => s,
        }
    }
}

/// Where a namespace record was allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Declared on an element; lives in the storage arena.
    Tree,
    /// Copied out of the tree by a query; lives on the heap.
    Copy,
}

/// What follows a namespace record.
///
/// Declarations on an element form a chain of `Namespace` links ending in
/// `End`. A query copy instead points back at the element it was taken
/// from; that element pointer is never dereferenced through the link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Link {
    End,
    Namespace(*mut Namespace),
    Element(*mut Element),
}

pub struct Namespace {
    prefix: Option<Buffer>,
    href: Option<Buffer>,
    next: Cell<Link>,
    origin: Origin,
    user_data: RefCell<Option<Weak<dyn Any>>>,
}

impl Namespace {
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_ref().map(Buffer::as_str)
    }

    pub fn href(&self) -> &str {
        self.href.as_ref().map_or("", Buffer::as_str)
    }

    pub fn next(&self) -> Link {
        self.next.get()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The host object attached to this record, if it is still alive.
    pub fn user_data(&self) -> Option<Rc<dyn Any>> {
        self.user_data.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_user_data(&self, data: Weak<dyn Any>) {
        let mut slot = self.user_data.borrow_mut();
        debug_assert!(
            slot.as_ref().and_then(Weak::upgrade).is_none(),
            "namespace record already has a live host object"
        );
        *slot = Some(data);
    }

    #[cfg(test)]
    pub(crate) fn set_next(&self, link: Link) {
        self.next.set(link);
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Namespace {{ prefix: {:?}, href: {:?}, origin: {:?} }}",
            self.prefix(),
            self.href(),
            self.origin
        )
    }
}

pub struct Element {
    name: InternedString,
    parent: Cell<Option<*mut Element>>,
    children: RefCell<Vec<*mut Element>>,
    namespaces: Cell<Option<*mut Namespace>>,
}

impl Element {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

pub struct Storage {
    strings: StringPool,
    elements: Arena<Element>,
    namespaces: Arena<Namespace>,
}

impl Storage {
    pub fn new() -> Storage {
        Storage {
            strings: StringPool::new(),
            elements: Arena::new(),
            namespaces: Arena::new(),
        }
    }

    fn intern(&self, s: &str) -> InternedString {
        self.strings.intern_string(s)
    }

    pub fn create_element(&self, name: &str) -> *mut Element {
        let name = self.intern(name);

        self.elements.alloc(Element {
            name,
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
            namespaces: Cell::new(None),
        })
    }

    pub fn create_namespace(&self, prefix: Option<&str>, href: &str) -> *mut Namespace {
        let prefix = prefix.map(|p| Buffer::Pooled(self.intern(p)));
        let href = Buffer::Pooled(self.intern(href));

        self.namespaces.alloc(Namespace {
            prefix,
            href: Some(href),
            next: Cell::new(Link::End),
            origin: Origin::Tree,
            user_data: RefCell::new(None),
        })
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

impl Default for Storage {
    fn default() -> Storage {
        Storage::new()
    }
}

/// Iterates a chain of namespace declarations.
pub struct NamespaceIter {
    next: Option<*mut Namespace>,
}

impl Iterator for NamespaceIter {
    type Item = *mut Namespace;

    fn next(&mut self) -> Option<*mut Namespace> {
        let current = self.next.take()?;
        let current_r = unsafe { &*current };

        self.next = match current_r.next() {
            Link::Namespace(n) => Some(n),
            Link::End | Link::Element(_) => None,
        };

        Some(current)
    }
}

pub struct Connections {
    root: Cell<Option<*mut Element>>,
}

impl Connections {
    pub fn new() -> Connections {
        Connections {
            root: Cell::new(None),
        }
    }

    pub fn root(&self) -> Option<*mut Element> {
        self.root.get()
    }

    pub fn set_root(&self, element: *mut Element) {
        self.detach_element(element);
        self.root.set(Some(element));
    }

    pub fn element_parent(&self, child: *mut Element) -> Option<*mut Element> {
        let child_r = unsafe { &*child };
        child_r.parent.get()
    }

    pub fn append_element_child(&self, parent: *mut Element, child: *mut Element) {
        self.detach_element(child);

        let parent_r = unsafe { &*parent };
        let child_r = unsafe { &*child };

        parent_r.children.borrow_mut().push(child);
        child_r.parent.set(Some(parent));
    }

    fn detach_element(&self, element: *mut Element) {
        let element_r = unsafe { &*element };

        if let Some(prev_parent) = element_r.parent.take() {
            let prev_parent_r = unsafe { &*prev_parent };
            prev_parent_r.children.borrow_mut().retain(|c| *c != element);
        }

        if self.root.get() == Some(element) {
            self.root.set(None);
        }
    }

    pub fn element_children(&self, parent: *mut Element) -> Vec<*mut Element> {
        let parent_r = unsafe { &*parent };
        parent_r.children.borrow().clone()
    }

    /// Appends `namespace` to the end of the element's declaration chain.
    pub fn declare_namespace(&self, element: *mut Element, namespace: *mut Namespace) {
        let element_r = unsafe { &*element };
        assert_eq!(
            unsafe { &*namespace }.origin,
            Origin::Tree,
            "only records allocated by a package can be declared on its elements"
        );

        match self.element_namespaces(element).last() {
            Some(last) => {
                let last_r = unsafe { &*last };
                last_r.next.set(Link::Namespace(namespace));
            }
            None => element_r.namespaces.set(Some(namespace)),
        }
    }

    pub fn element_namespaces(&self, element: *mut Element) -> NamespaceIter {
        let element_r = unsafe { &*element };
        NamespaceIter {
            next: element_r.namespaces.get(),
        }
    }

    /// The declaration for `prefix` made directly on this element.
    pub fn element_namespace_for_prefix(
        &self,
        element: *mut Element,
        prefix: Option<&str>,
    ) -> Option<*mut Namespace> {
        self.element_namespaces(element).find(|n| {
            let n_r = unsafe { &**n };
            n_r.prefix() == prefix
        })
    }

    /// Every declaration visible from this element, nearest first. A
    /// declaration hides any declaration of the same prefix on an
    /// ancestor, and a default declaration with an empty URI removes the
    /// default namespace from scope.
    pub fn element_namespaces_in_scope(&self, element: *mut Element) -> Vec<*mut Namespace> {
        let mut seen: Vec<Option<&str>> = Vec::new();
        let mut in_scope = Vec::new();
        let mut current = Some(element);

        while let Some(e) = current {
            for n in self.element_namespaces(e) {
                let n_r = unsafe { &*n };
                let prefix = n_r.prefix();

                if seen.contains(&prefix) {
                    continue;
                }
                seen.push(prefix);

                if prefix.is_none() && n_r.href().is_empty() {
                    continue;
                }
                in_scope.push(n);
            }

            current = self.element_parent(e);
        }

        in_scope
    }
}

impl Default for Connections {
    fn default() -> Connections {
        Connections::new()
    }
}

/// Allocates a standalone copy of a namespace declaration, as produced by
/// a query over `owner`. The copy owns its text and must eventually be
/// handed to [`free_copy`].
pub fn copy_namespace(prefix: Option<&str>, href: &str, owner: *mut Element) -> *mut Namespace {
    let copy = Box::new(Namespace {
        prefix: prefix.map(|p| Buffer::Heap(p.into())),
        href: Some(Buffer::Heap(href.into())),
        next: Cell::new(Link::Element(owner)),
        origin: Origin::Copy,
        user_data: RefCell::new(None),
    });

    LIVE_COPIES.with(|c| c.set(c.get() + 1));
    Box::into_raw(copy)
}

/// Releases a copy made by [`copy_namespace`]: the href buffer, then the
/// prefix buffer, then the record itself.
///
/// # Safety
///
/// `namespace` must come from [`copy_namespace`] and must not have been
/// released already. Nothing may use the pointer afterwards.
pub unsafe fn free_copy(namespace: *mut Namespace) {
    let mut record = unsafe { Box::from_raw(namespace) };
    assert_eq!(
        record.origin,
        Origin::Copy,
        "attempted to release a namespace owned by a document tree"
    );

    drop(record.href.take());
    drop(record.prefix.take());
    drop(record);

    LIVE_COPIES.with(|c| {
        let live = c.get();
        debug_assert!(live > 0, "released more namespace copies than were made");
        c.set(live.saturating_sub(1));
    });
}

#[cfg(test)]
mod test {
    use std::ptr;

    use super::{copy_namespace, free_copy, live_copies, Connections, Link, Origin, Storage};

    #[test]
    fn declarations_are_chained_in_order() {
        let s = Storage::new();
        let c = Connections::new();

        let e = s.create_element("root");
        let a = s.create_namespace(None, "urn:a");
        let b = s.create_namespace(Some("b"), "urn:b");

        c.declare_namespace(e, a);
        c.declare_namespace(e, b);

        let declared: Vec<_> = c.element_namespaces(e).collect();
        assert_eq!(vec![a, b], declared);

        let a_r = unsafe { &*a };
        let b_r = unsafe { &*b };
        assert_eq!(Link::Namespace(b), a_r.next());
        assert_eq!(Link::End, b_r.next());
        assert_eq!(Origin::Tree, a_r.origin());
    }

    #[test]
    fn declarations_are_found_by_prefix() {
        let s = Storage::new();
        let c = Connections::new();

        let e = s.create_element("root");
        let a = s.create_namespace(None, "urn:a");
        let b = s.create_namespace(Some("b"), "urn:b");
        c.declare_namespace(e, a);
        c.declare_namespace(e, b);

        assert_eq!(Some(a), c.element_namespace_for_prefix(e, None));
        assert_eq!(Some(b), c.element_namespace_for_prefix(e, Some("b")));
        assert_eq!(None, c.element_namespace_for_prefix(e, Some("c")));
    }

    #[test]
    fn nearer_declarations_hide_ancestors() {
        let s = Storage::new();
        let c = Connections::new();

        let outer = s.create_element("outer");
        let inner = s.create_element("inner");
        c.append_element_child(outer, inner);

        let outer_p = s.create_namespace(Some("p"), "urn:outer");
        let outer_q = s.create_namespace(Some("q"), "urn:q");
        let inner_p = s.create_namespace(Some("p"), "urn:inner");
        c.declare_namespace(outer, outer_p);
        c.declare_namespace(outer, outer_q);
        c.declare_namespace(inner, inner_p);

        assert_eq!(vec![inner_p, outer_q], c.element_namespaces_in_scope(inner));
    }

    #[test]
    fn empty_default_declaration_removes_the_default() {
        let s = Storage::new();
        let c = Connections::new();

        let outer = s.create_element("outer");
        let inner = s.create_element("inner");
        c.append_element_child(outer, inner);

        c.declare_namespace(outer, s.create_namespace(None, "urn:default"));
        c.declare_namespace(inner, s.create_namespace(None, ""));

        assert!(c.element_namespaces_in_scope(inner).is_empty());
    }

    #[test]
    fn appending_to_a_new_parent_detaches_from_the_old_one() {
        let s = Storage::new();
        let c = Connections::new();

        let a = s.create_element("a");
        let b = s.create_element("b");
        let child = s.create_element("child");

        c.append_element_child(a, child);
        c.append_element_child(b, child);

        assert!(c.element_children(a).is_empty());
        assert_eq!(vec![child], c.element_children(b));
        assert_eq!(Some(b), c.element_parent(child));
    }

    #[test]
    fn copies_point_back_at_their_element_and_are_counted() {
        let s = Storage::new();
        let owner = s.create_element("owner");
        let before = live_copies();

        let copy = copy_namespace(Some("p"), "urn:p", owner);
        assert_eq!(before + 1, live_copies());

        let copy_r = unsafe { &*copy };
        assert_eq!(Some("p"), copy_r.prefix());
        assert_eq!("urn:p", copy_r.href());
        assert_eq!(Link::Element(owner), copy_r.next());
        assert_eq!(Origin::Copy, copy_r.origin());

        unsafe { free_copy(copy) };
        assert_eq!(before, live_copies());
    }

    #[test]
    #[should_panic(expected = "only records allocated by a package")]
    fn copies_cannot_be_declared_on_an_element() {
        let s = Storage::new();
        let c = Connections::new();
        let e = s.create_element("e");

        let copy = copy_namespace(Some("p"), "urn:p", e);
        c.declare_namespace(e, copy);
    }

    #[test]
    fn copies_do_not_need_a_live_element() {
        let before = live_copies();

        let copy = copy_namespace(None, "urn:orphan", ptr::null_mut());
        unsafe { free_copy(copy) };

        assert_eq!(before, live_copies());
    }
}
