//! Query engine: lazy, scoped element lookup.
//!
//! A [`Locator`] stores only the selector chain. Every call to
//! [`Locator::resolve`] walks the current document again, so results always
//! reflect the latest DOM mutation.

use std::fmt;

use crate::dom::{Document, NodeId};
use crate::result::{LanecheckError, LanecheckResult};
use crate::selector::Selector;

/// Live reference to one rendered node in one document generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    node: NodeId,
    generation: u64,
}

impl ElementHandle {
    pub(crate) const fn new(node: NodeId, generation: u64) -> Self {
        Self { node, generation }
    }

    /// Node the handle points at
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Document generation the handle was resolved in
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Fail with `StaleHandle` unless the handle belongs to `doc` and is still attached
    pub fn check(&self, doc: &Document) -> LanecheckResult<()> {
        if self.generation != doc.generation() || !doc.is_attached(self.node) {
            return Err(LanecheckError::StaleHandle {
                handle_generation: self.generation,
                current_generation: doc.generation(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Document,
    Handle(ElementHandle),
    Locator(Box<Locator>),
}

/// Lazy selector chain resolved against the current document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    selector: Selector,
    scope: Scope,
    index: Option<usize>,
}

impl Locator {
    /// Match `selector` anywhere in the document
    #[must_use]
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            scope: Scope::Document,
            index: None,
        }
    }

    /// Match `selector` among the descendants of `handle`
    #[must_use]
    pub fn within(handle: ElementHandle, selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            scope: Scope::Handle(handle),
            index: None,
        }
    }

    /// Narrow to the `index`-th match
    #[must_use]
    pub fn nth(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Narrow to the first match
    #[must_use]
    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Match `selector` among the descendants of this locator's matches
    #[must_use]
    pub fn find(self, selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            scope: Scope::Locator(Box::new(self)),
            index: None,
        }
    }

    /// Selector at the end of the chain
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// All matching handles, in document order
    pub fn resolve(&self, doc: &Document) -> LanecheckResult<Vec<ElementHandle>> {
        let compiled = self.selector.compile()?;
        let scopes: Option<Vec<NodeId>> = match &self.scope {
            Scope::Document => None,
            Scope::Handle(handle) => {
                handle.check(doc)?;
                Some(vec![handle.node])
            }
            Scope::Locator(parent) => Some(
                parent
                    .resolve(doc)?
                    .into_iter()
                    .map(|h| h.node)
                    .collect(),
            ),
        };

        let generation = doc.generation();
        let matched: Vec<ElementHandle> = doc
            .walk()
            .into_iter()
            .filter(|node| match &scopes {
                None => true,
                Some(scopes) => {
                    let ancestors = doc.ancestors(*node);
                    scopes.iter().any(|s| ancestors.contains(s))
                }
            })
            .filter(|node| compiled.matches(doc, *node))
            .map(|node| ElementHandle::new(node, generation))
            .collect();

        match self.index {
            None => Ok(matched),
            Some(index) => match matched.get(index) {
                Some(handle) => Ok(vec![*handle]),
                None => Err(LanecheckError::OutOfRange {
                    index,
                    len: matched.len(),
                    selector: self.to_string(),
                }),
            },
        }
    }

    /// Number of matches; zero is not an error
    pub fn count(&self, doc: &Document) -> LanecheckResult<usize> {
        Ok(self.resolve(doc)?.len())
    }

    /// Exactly one handle: the indexed match, or the first match
    ///
    /// Fails with `OutOfRange` when nothing matches.
    pub fn one(&self, doc: &Document) -> LanecheckResult<ElementHandle> {
        let handles = self.resolve(doc)?;
        handles.first().copied().ok_or_else(|| LanecheckError::OutOfRange {
            index: self.index.unwrap_or(0),
            len: 0,
            selector: self.to_string(),
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Document => {}
            Scope::Handle(handle) => write!(f, "<node {}> ", handle.node.index())?,
            Scope::Locator(parent) => write!(f, "{parent} ")?,
        }
        write!(f, "{}", self.selector)?;
        if let Some(index) = self.index {
            write!(f, " >> nth={index}")?;
        }
        Ok(())
    }
}

/// A locator bound to the document it resolves against
#[derive(Debug, Clone)]
pub struct Query<'d> {
    doc: &'d Document,
    locator: Locator,
}

impl<'d> Query<'d> {
    /// Bind a locator to a document
    #[must_use]
    pub const fn new(doc: &'d Document, locator: Locator) -> Self {
        Self { doc, locator }
    }

    /// The underlying locator
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Give up the borrow, keeping the selector chain
    #[must_use]
    pub fn into_locator(self) -> Locator {
        self.locator
    }

    /// Number of matches
    pub fn count(&self) -> LanecheckResult<usize> {
        self.locator.count(self.doc)
    }

    /// All matching handles
    pub fn all(&self) -> LanecheckResult<Vec<ElementHandle>> {
        self.locator.resolve(self.doc)
    }

    /// First match; `OutOfRange` when nothing matches
    pub fn first(&self) -> LanecheckResult<ElementHandle> {
        self.locator.clone().first().one(self.doc)
    }

    /// `index`-th match; `OutOfRange` past the end
    pub fn nth(&self, index: usize) -> LanecheckResult<ElementHandle> {
        self.locator.clone().nth(index).one(self.doc)
    }

    /// Narrow to descendants of every match
    #[must_use]
    pub fn find(self, selector: impl Into<Selector>) -> Self {
        Self {
            doc: self.doc,
            locator: self.locator.find(selector),
        }
    }
}
