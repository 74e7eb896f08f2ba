//! Host-side handles onto a package's tree.
//!
//! A [`Document`] is the host wrapper for a [`Package`]. Besides giving
//! access to the tree, it keeps a node cache: every document-scoped
//! namespace wrapper is retained there for as long as the document is,
//! so repeated lookups see the same wrapper.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::{fmt, hash};

use super::error::NamespaceError;
use super::namespace::{self, Context, Namespace, XMLNS_NAMESPACE_URI, XML_NAMESPACE_URI};
use super::nodeset::{self, NamespaceSet};
use super::raw;
use super::{DocumentKind, Package};

pub(crate) struct DocumentInner {
    package: Rc<Package>,
    node_cache: RefCell<Vec<Namespace>>,
}

impl Drop for DocumentInner {
    fn drop(&mut self) {
        tracing::debug!(
            "Tearing down document, releasing {} cached namespaces",
            self.node_cache.get_mut().len()
        );
    }
}

/// The host wrapper of a package
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Document {
    /// Wraps the package, or returns its existing wrapper if one is alive.
    pub fn new(package: Rc<Package>) -> Document {
        if let Some(existing) = Document::for_package(&package) {
            return existing;
        }

        let inner = Rc::new(DocumentInner {
            package,
            node_cache: RefCell::new(Vec::new()),
        });
        inner.package.set_host(Rc::downgrade(&inner));

        Document { inner }
    }

    /// The live wrapper of `package`, if there is one.
    pub fn for_package(package: &Package) -> Option<Document> {
        package.host().map(|inner| Document { inner })
    }

    pub(crate) fn from_inner(inner: Rc<DocumentInner>) -> Document {
        Document { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<DocumentInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn package(&self) -> &Rc<Package> {
        &self.inner.package
    }

    pub fn kind(&self) -> DocumentKind {
        self.inner.package.kind()
    }

    pub fn root(&self) -> Option<Element> {
        self.inner.package.root()
    }

    pub fn set_root(&self, element: &Element) {
        self.inner.package.set_root(element)
    }

    pub fn create_element(&self, name: &str) -> Element {
        self.inner.package.create_element(name)
    }

    pub fn create_fragment(&self) -> Fragment {
        Fragment::new(Rc::clone(&self.inner.package))
    }

    /// Namespace wrappers retained by this document, in creation order.
    pub fn node_cache(&self) -> Vec<Namespace> {
        self.inner.node_cache.borrow().clone()
    }

    pub fn node_cache_len(&self) -> usize {
        self.inner.node_cache.borrow().len()
    }

    pub(crate) fn retain(&self, namespace: Namespace) {
        self.inner.node_cache.borrow_mut().push(namespace);
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Document {{ {:?} }}", Rc::as_ptr(&self.inner))
    }
}

/// A handle to an element in a package's tree
#[derive(Clone)]
pub struct Element {
    package: Rc<Package>,
    node: *mut raw::Element,
}

impl Element {
    pub(crate) fn wrap(package: &Rc<Package>, node: *mut raw::Element) -> Element {
        Element {
            package: Rc::clone(package),
            node,
        }
    }

    // The package keeps every element it allocated alive.
    fn node(&self) -> &raw::Element {
        unsafe { &*self.node }
    }

    pub fn package(&self) -> &Rc<Package> {
        &self.package
    }

    pub(crate) fn as_ptr(&self) -> *mut raw::Element {
        self.node
    }

    pub fn name(&self) -> &str {
        self.node().name()
    }

    pub fn parent(&self) -> Option<Element> {
        self.package
            .connections()
            .element_parent(self.node)
            .map(|n| Element::wrap(&self.package, n))
    }

    pub fn append_child(&self, child: &Element) {
        assert!(
            Rc::ptr_eq(&self.package, &child.package),
            "elements from different packages cannot be connected"
        );

        let connections = self.package.connections();
        let mut ancestor = Some(self.node);
        while let Some(node) = ancestor {
            assert!(
                node != child.node,
                "an element cannot be appended to itself or its descendants"
            );
            ancestor = connections.element_parent(node);
        }

        connections.append_element_child(self.node, child.node);
    }

    pub fn children(&self) -> Vec<Element> {
        self.package
            .connections()
            .element_children(self.node)
            .into_iter()
            .map(|n| Element::wrap(&self.package, n))
            .collect()
    }

    /// Declares a namespace on this element and returns its wrapper.
    pub fn declare_namespace(
        &self,
        prefix: Option<&str>,
        href: &str,
    ) -> Result<Namespace, NamespaceError> {
        validate_declaration(prefix, href)?;

        let connections = self.package.connections();
        if connections
            .element_namespace_for_prefix(self.node, prefix)
            .is_some()
        {
            return Err(NamespaceError::DuplicatePrefix {
                prefix: prefix.map(String::from),
                element: self.name().to_string(),
            });
        }

        let ns = self.package.storage().create_namespace(prefix, href);
        connections.declare_namespace(self.node, ns);

        // The record was just allocated in this package's arena.
        Ok(unsafe { namespace::wrap(&self.package, ns) })
    }

    /// Wrappers for the declarations made directly on this element.
    pub fn namespace_definitions(&self) -> Vec<Namespace> {
        self.namespace_definitions_in(Context::Document(&self.package))
    }

    fn namespace_definitions_in(&self, context: Context) -> Vec<Namespace> {
        self.package
            .connections()
            .element_namespaces(self.node)
            .map(|n| unsafe { namespace::wrap(context, n) })
            .collect()
    }

    /// Wrappers for every declaration in scope at this element, nearest
    /// first. These are the tree's own records, not copies.
    pub fn namespaces_in_scope(&self) -> Vec<Namespace> {
        self.package
            .connections()
            .element_namespaces_in_scope(self.node)
            .into_iter()
            .map(|n| unsafe { namespace::wrap(&self.package, n) })
            .collect()
    }

    /// Evaluates the namespace axis at this element, which yields fresh
    /// copies of the in-scope declarations.
    pub fn namespace_axis(&self) -> NamespaceSet {
        nodeset::namespace_axis(self)
    }
}

fn validate_declaration(prefix: Option<&str>, href: &str) -> Result<(), NamespaceError> {
    if href == XMLNS_NAMESPACE_URI {
        return Err(NamespaceError::ReservedUri(href.to_string()));
    }

    match prefix {
        None if href == XML_NAMESPACE_URI => Err(NamespaceError::ReservedUri(href.to_string())),
        None => Ok(()),
        Some(p) if p.is_empty() || p.contains(|c: char| c == ':' || c.is_whitespace()) => {
            Err(NamespaceError::InvalidPrefix(p.to_string()))
        }
        Some("xmlns") => Err(NamespaceError::ReservedPrefix("xmlns".to_string())),
        Some("xml") if href != XML_NAMESPACE_URI => {
            Err(NamespaceError::ReservedPrefix("xml".to_string()))
        }
        Some("xml") => Ok(()),
        Some(_) if href == XML_NAMESPACE_URI => {
            Err(NamespaceError::ReservedUri(href.to_string()))
        }
        Some(p) if href.is_empty() => Err(NamespaceError::EmptyHref(p.to_string())),
        Some(_) => Ok(()),
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Element) -> bool {
        self.node == other.node
    }
}

impl Eq for Element {}

impl hash::Hash for Element {
    fn hash<H>(&self, state: &mut H)
    where
        H: hash::Hasher,
    {
        self.node.hash(state)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Element {{ name: {:?} }}", self.name())
    }
}

/// Elements held outside the document's root, still backed by the
/// document's package.
pub struct Fragment {
    package: Rc<Package>,
    children: RefCell<Vec<*mut raw::Element>>,
}

impl Fragment {
    pub fn new(package: Rc<Package>) -> Fragment {
        Fragment {
            package,
            children: RefCell::new(Vec::new()),
        }
    }

    /// The package of the document this fragment belongs to.
    pub fn owner(&self) -> &Rc<Package> {
        &self.package
    }

    pub fn append_child(&self, child: &Element) {
        assert!(
            Rc::ptr_eq(&self.package, child.package()),
            "a fragment can only hold elements of its own package"
        );
        self.children.borrow_mut().push(child.as_ptr());
    }

    pub fn children(&self) -> Vec<Element> {
        self.children
            .borrow()
            .iter()
            .map(|n| Element::wrap(&self.package, *n))
            .collect()
    }

    /// Wrappers for the declarations made on the fragment's top-level
    /// elements.
    pub fn namespace_definitions(&self) -> Vec<Namespace> {
        self.children()
            .iter()
            .flat_map(|e| e.namespace_definitions_in(Context::Fragment(self)))
            .collect()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fragment {{ children: {} }}", self.children.borrow().len())
    }
}
