//! Host wrappers for namespace declaration records.
//!
//! Most records belong to a package's tree and are freed with it. A
//! namespace query, however, hands back standalone copies that no tree
//! owns. [`wrap`] decides once, on first wrap, which of the two a record
//! is, and picks the wrapper's ownership accordingly:
//!
//! - [`Ownership::Document`]: the wrapper is retained in its document's
//!   node cache and never frees the record.
//! - [`Ownership::Detached`]: the wrapper is the sole owner of a copy and
//!   releases it when the last handle is dropped.
//! - [`Ownership::Unattached`]: the package had no live document when the
//!   record was first wrapped. Nothing is freed.
//!
//! Handles are reference counted and cannot leave the thread that made
//! them:
//!
//! ```compile_fail
//! use sxd_namespace::{Document, Package};
//!
//! let document = Document::new(Package::new());
//! let root = document.create_element("root");
//! let ns = root.declare_namespace(Some("p"), "urn:p").unwrap();
//!
//! std::thread::spawn(move || ns.href().len());
//! ```

use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use std::{fmt, hash};

use super::dom::{Document, DocumentInner, Fragment};
use super::raw::{self, Link, Origin};
use super::Package;

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE_URI: &str = "http://www.w3.org/2000/xmlns/";

/// What a record was reached through.
#[derive(Copy, Clone)]
pub enum Context<'a> {
    Document(&'a Rc<Package>),
    Fragment(&'a Fragment),
}

impl<'a> Context<'a> {
    /// The package that owns the record, following a fragment to its
    /// document.
    pub fn owning_package(self) -> &'a Rc<Package> {
        match self {
            Context::Document(package) => package,
            Context::Fragment(fragment) => fragment.owner(),
        }
    }
}

impl<'a> From<&'a Rc<Package>> for Context<'a> {
    fn from(package: &'a Rc<Package>) -> Context<'a> {
        Context::Document(package)
    }
}

impl<'a> From<&'a Document> for Context<'a> {
    fn from(document: &'a Document) -> Context<'a> {
        Context::Document(document.package())
    }
}

impl<'a> From<&'a Fragment> for Context<'a> {
    fn from(fragment: &'a Fragment) -> Context<'a> {
        Context::Fragment(fragment)
    }
}

/// Who is responsible for a wrapped record's memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Ownership {
    Document,
    Detached,
    Unattached,
}

/// Sole owner of a copied record.
struct Detached(NonNull<raw::Namespace>);

impl Drop for Detached {
    fn drop(&mut self) {
        tracing::trace!("Releasing detached namespace copy {:?}", self.0);
        // Only `wrap` builds this, and only for records allocated by
        // `raw::copy_namespace` that nothing else has claimed.
        unsafe { raw::free_copy(self.0.as_ptr()) }
        tracing::trace!("{} namespace copies still live", raw::live_copies());
    }
}

enum Scope {
    Document {
        document: Weak<DocumentInner>,
        // Keeps the tree, and so the record, alive.
        package: Rc<Package>,
    },
    Unattached {
        package: Rc<Package>,
    },
    Detached(Detached),
}

struct NamespaceInner {
    node: NonNull<raw::Namespace>,
    scope: Scope,
}

impl Drop for NamespaceInner {
    fn drop(&mut self) {
        // The detached release happens when `scope` itself is dropped.
        if !matches!(self.scope, Scope::Detached(_)) {
            tracing::trace!("Dropping namespace wrapper, record stays with its tree");
        }
    }
}

/// The host wrapper for one namespace record.
///
/// Clones are additional handles to the same wrapper; equality is
/// identity.
#[derive(Clone)]
pub struct Namespace(Rc<NamespaceInner>);

impl Namespace {
    fn from_user_data(record: &raw::Namespace) -> Option<Namespace> {
        let data = record.user_data()?;
        data.downcast::<NamespaceInner>().ok().map(Namespace)
    }

    // Every scope keeps the record alive for as long as the wrapper.
    fn record(&self) -> &raw::Namespace {
        unsafe { self.0.node.as_ref() }
    }

    /// `None` for the default namespace.
    pub fn prefix(&self) -> Option<&str> {
        self.record().prefix()
    }

    pub fn href(&self) -> &str {
        self.record().href()
    }

    pub fn ownership(&self) -> Ownership {
        match self.0.scope {
            Scope::Document { .. } => Ownership::Document,
            Scope::Unattached { .. } => Ownership::Unattached,
            Scope::Detached(_) => Ownership::Detached,
        }
    }

    /// The document whose node cache retains this wrapper, while that
    /// document is alive.
    pub fn document(&self) -> Option<Document> {
        match &self.0.scope {
            Scope::Document { document, .. } => document.upgrade().map(Document::from_inner),
            Scope::Unattached { .. } | Scope::Detached(_) => None,
        }
    }

    /// The package whose tree holds the record. Copies belong to none.
    pub fn package(&self) -> Option<&Rc<Package>> {
        match &self.0.scope {
            Scope::Document { package, .. } | Scope::Unattached { package } => Some(package),
            Scope::Detached(_) => None,
        }
    }

    #[doc(hidden)]
    pub fn as_ptr(&self) -> *mut raw::Namespace {
        self.0.node.as_ptr()
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Namespace {}

impl hash::Hash for Namespace {
    fn hash<H>(&self, state: &mut H)
    where
        H: hash::Hasher,
    {
        Rc::as_ptr(&self.0).hash(state)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Namespace {{ prefix: {:?}, href: {:?}, ownership: {:?} }}",
            self.prefix(),
            self.href(),
            self.ownership()
        )
    }
}

/// Whether a record is a standalone copy made by a query.
///
/// The allocation origin is authoritative, but it is cross-checked
/// against the shape of the record: a copy's `next` link points at the
/// element it was copied from, while a tree record's link is either the
/// end of the chain or another declaration. A copy with no element is
/// not trusted. Disagreement resolves to the tree side, which can only
/// leak.
fn classify(record: &raw::Namespace) -> Ownership {
    let tagged_copy = record.origin() == Origin::Copy;
    let shaped_like_copy = match record.next() {
        Link::Element(owner) => !owner.is_null(),
        Link::End | Link::Namespace(_) => false,
    };

    match (tagged_copy, shaped_like_copy) {
        (true, true) => Ownership::Detached,
        (false, false) => Ownership::Document,
        _ => {
            tracing::warn!(
                "Namespace record {:?} has origin {:?} but next link {:?}; leaving it to the tree",
                record,
                record.origin(),
                record.next()
            );
            Ownership::Document
        }
    }
}

/// Returns the one wrapper for `node`, creating it on first use.
///
/// A wrapper that is still alive is returned unchanged. Otherwise the
/// record is classified against the package reached through `context`:
/// tree records are retained in the document's node cache, copies get a
/// wrapper that releases them on drop. If the package has no live
/// [`Document`] yet, the wrapper frees nothing and has no document.
///
/// # Panics
///
/// If `node` is null.
///
/// # Safety
///
/// `node` must point either to a record allocated by the package that
/// `context` resolves to, or to a copy made by a query over that package
/// that has not been released. A copy must not be wrapped through any
/// other path once a [`NamespaceSet`](crate::NamespaceSet) has handed it
/// out, except while its wrapper is still alive.
pub unsafe fn wrap<'a, C>(context: C, node: *mut raw::Namespace) -> Namespace
where
    C: Into<Context<'a>>,
{
    let node = match NonNull::new(node) {
        Some(node) => node,
        None => panic!("cannot wrap a null namespace record"),
    };
    let record = unsafe { node.as_ref() };

    if let Some(existing) = Namespace::from_user_data(record) {
        tracing::trace!("Reusing wrapper for namespace {:?}", record.prefix());
        return existing;
    }

    let package = context.into().owning_package();
    let document = package.host().map(Document::from_inner);

    let (scope, retain_in) = match document {
        Some(document) => match classify(record) {
            Ownership::Detached => (Scope::Detached(Detached(node)), None),
            Ownership::Document | Ownership::Unattached => {
                let scope = Scope::Document {
                    document: document.downgrade(),
                    package: Rc::clone(package),
                };
                (scope, Some(document))
            }
        },
        None => {
            let scope = Scope::Unattached {
                package: Rc::clone(package),
            };
            (scope, None)
        }
    };

    let namespace = Namespace(Rc::new(NamespaceInner { node, scope }));
    tracing::debug!(
        "Wrapped namespace {:?} -> {:?} as {:?}",
        record.prefix(),
        record.href(),
        namespace.ownership()
    );

    if let Some(document) = retain_in {
        document.retain(namespace.clone());
    }

    let identity: Weak<NamespaceInner> = Rc::downgrade(&namespace.0);
    record.set_user_data(identity);

    namespace
}
