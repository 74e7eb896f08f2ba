//! Results of the namespace axis.
//!
//! Unlike every other query over a tree, the namespace axis does not
//! return records from the tree itself: each in-scope declaration is
//! copied into a standalone record whose `next` link points back at the
//! element it was found on. The copies are owned by the
//! [`NamespaceSet`] until they are handed to wrappers.

use std::fmt;
use std::mem;
use std::rc::Rc;

use super::dom::Element;
use super::namespace::{self, Namespace, XML_NAMESPACE_URI};
use super::raw;
use super::Package;

/// Copies of the namespace declarations in scope at one element.
pub struct NamespaceSet {
    package: Rc<Package>,
    nodes: Vec<*mut raw::Namespace>,
}

impl NamespaceSet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The `(prefix, href)` pairs in axis order.
    pub fn declarations(&self) -> Vec<(Option<&str>, &str)> {
        self.nodes
            .iter()
            .map(|n| {
                let n_r = unsafe { &**n };
                (n_r.prefix(), n_r.href())
            })
            .collect()
    }

    /// Hands every copy to a wrapper. Once the package has a document,
    /// each wrapper is detached and frees its copy when dropped.
    pub fn into_namespaces(mut self) -> Vec<Namespace> {
        let nodes = mem::take(&mut self.nodes);

        // Every copy was made for this set and nothing has claimed it.
        nodes
            .into_iter()
            .map(|n| unsafe { namespace::wrap(&self.package, n) })
            .collect()
    }
}

impl Drop for NamespaceSet {
    fn drop(&mut self) {
        if !self.nodes.is_empty() {
            tracing::trace!("Releasing {} unclaimed namespace copies", self.nodes.len());
        }

        for n in self.nodes.drain(..) {
            unsafe { raw::free_copy(n) }
        }
    }
}

impl fmt::Debug for NamespaceSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.declarations()).finish()
    }
}

/// Copies the namespaces in scope at `element`. The implicit `xml`
/// binding always comes first, followed by the element's declarations and
/// then those of its ancestors that are not hidden.
pub fn namespace_axis(element: &Element) -> NamespaceSet {
    let package = element.package();
    let owner = element.as_ptr();

    let mut nodes = vec![raw::copy_namespace(Some("xml"), XML_NAMESPACE_URI, owner)];

    for n in package.connections().element_namespaces_in_scope(owner) {
        let n_r = unsafe { &*n };
        if n_r.prefix() == Some("xml") {
            continue;
        }
        nodes.push(raw::copy_namespace(n_r.prefix(), n_r.href(), owner));
    }

    tracing::debug!(
        "Namespace axis of <{}> produced {} copies",
        element.name(),
        nodes.len()
    );

    NamespaceSet {
        package: Rc::clone(package),
        nodes,
    }
}
