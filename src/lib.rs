//! Namespace wrappers over a manually managed XML tree.
//!
//! A [`Package`] owns a native tree whose records are freed all at once.
//! Host code sees that tree through reference-counted handles. Namespace
//! declarations are the awkward case: a query may hand back standalone
//! copies of them, which no tree owns. [`namespace::wrap`] gives every
//! record exactly one host [`Namespace`] and decides, once, whether that
//! wrapper is responsible for freeing it.
//!
//! ```
//! use sxd_namespace::{Document, Ownership, Package};
//!
//! let document = Document::new(Package::new());
//! let root = document.create_element("root");
//! document.set_root(&root);
//!
//! let svg = root.declare_namespace(Some("svg"), "http://www.w3.org/2000/svg").unwrap();
//! assert_eq!(svg.prefix(), Some("svg"));
//! assert_eq!(svg.ownership(), Ownership::Document);
//!
//! let copies = root.namespace_axis().into_namespaces();
//! assert!(copies.iter().all(|ns| ns.ownership() == Ownership::Detached));
//! ```
//!
//! ### Design decisions
//!
//! Try to leverage the type system as much as possible. Only the
//! detached ownership variant can release a record, and every handle is
//! `!Send`, so all wrapping for a package happens on one thread.
//!
//! The records behind the handles are not reachable from outside the
//! crate, so safe code cannot keep a pointer past the tree's teardown:
//!
//! ```compile_fail
//! use sxd_namespace::Package;
//!
//! let package = Package::new();
//! let ns = package.storage().create_namespace(Some("p"), "urn:p");
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

mod string_pool;

pub mod dom;
pub mod error;
pub mod namespace;
pub mod nodeset;
mod raw;

pub use crate::dom::{Document, Element, Fragment};
pub use crate::error::NamespaceError;
pub use crate::namespace::{Context, Namespace, Ownership};
pub use crate::nodeset::NamespaceSet;

/// The two kinds of document a package can hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DocumentKind {
    #[default]
    Xml,
    Html,
}

/// Owns the native tree of one document.
///
/// Every record allocated for the tree lives until the package itself is
/// dropped. Handles that point into the tree hold an `Rc<Package>`, so the
/// package cannot be dropped out from under them.
pub struct Package {
    kind: DocumentKind,
    storage: raw::Storage,
    connections: raw::Connections,
    host: RefCell<Weak<dom::DocumentInner>>,
}

impl Package {
    pub fn new() -> Rc<Package> {
        Package::with_kind(DocumentKind::Xml)
    }

    pub fn with_kind(kind: DocumentKind) -> Rc<Package> {
        Rc::new(Package {
            kind,
            storage: raw::Storage::new(),
            connections: raw::Connections::new(),
            host: RefCell::new(Weak::new()),
        })
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Creates an element without requiring a host document, as a builder
    /// would while the tree is still under construction.
    pub fn create_element(self: &Rc<Self>, name: &str) -> Element {
        Element::wrap(self, self.storage.create_element(name))
    }

    pub fn root(self: &Rc<Self>) -> Option<Element> {
        self.connections.root().map(|n| Element::wrap(self, n))
    }

    pub fn set_root(&self, element: &Element) {
        assert!(
            std::ptr::eq(self, &**element.package()),
            "an element can only be the root of its own package"
        );
        self.connections.set_root(element.as_ptr());
    }

    pub(crate) fn storage(&self) -> &raw::Storage {
        &self.storage
    }

    pub(crate) fn connections(&self) -> &raw::Connections {
        &self.connections
    }

    pub(crate) fn host(&self) -> Option<Rc<dom::DocumentInner>> {
        self.host.borrow().upgrade()
    }

    pub(crate) fn set_host(&self, host: Weak<dom::DocumentInner>) {
        *self.host.borrow_mut() = host;
    }
}

impl Drop for Package {
    fn drop(&mut self) {
        tracing::debug!(
            "Releasing {:?} tree: {} elements, {} namespaces",
            self.kind,
            self.storage.element_count(),
            self.storage.namespace_count()
        );
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Package) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Package {{ kind: {:?} }}", self.kind)
    }
}

#[cfg(feature = "__internal_expose_string_pool")]
#[doc(hidden)]
pub mod __internal {
    pub use crate::string_pool::StringPool;
}
