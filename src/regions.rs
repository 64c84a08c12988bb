//! Nesting tree over a method's exception-handling table.
//!
//! The input clause list is trusted to be inner-first, as the bytecode
//! standard mandates (inner `try`s precede outer ones). Each clause
//! contributes up to three byte ranges — try, filter, handler — and the
//! innermost range containing an offset decides which protected context the
//! offset runs in.
//!
//! The tree answers one question for the importer's variable analysis:
//! do two offsets run in the same protected context? Variables whose uses
//! span distinct contexts cannot be promoted to SSA values.

use crate::types::Type;

/// The kind of an exception-handling clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Typed catch handler.
    Catch,
    /// Filter handler: a filter expression decides whether to handle.
    Filter,
    /// Finally handler.
    Finally,
    /// Fault handler.
    Fault,
}

/// One exception-handling clause as supplied by the metadata reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    /// Clause kind.
    pub kind: RegionKind,
    /// First byte offset of the protected range.
    pub try_start: u32,
    /// One past the last byte offset of the protected range.
    pub try_end: u32,
    /// First byte offset of the handler.
    pub handler_start: u32,
    /// One past the last byte offset of the handler.
    pub handler_end: u32,
    /// First byte offset of the filter expression, for `Filter` clauses.
    /// The filter range ends where the handler starts.
    pub filter_start: Option<u32>,
    /// Caught exception type, for `Catch` clauses.
    pub catch_type: Option<Type>,
}

/// Which range of a clause an offset falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionPart {
    /// Inside the protected (try) range.
    Try,
    /// Inside the filter expression.
    Filter,
    /// Inside the handler.
    Handler,
}

/// Nesting tree over the clause list.
///
/// Nodes are clauses in input (inner-first) order; each node's parent is the
/// nearest later clause whose protected range properly contains it.
#[derive(Debug)]
pub struct RegionTree {
    regions: Vec<ExceptionRegion>,
    parents: Vec<Option<usize>>,
}

impl RegionTree {
    /// Builds the tree, trusting the inner-first input ordering.
    #[must_use]
    pub fn build(regions: Vec<ExceptionRegion>) -> Self {
        let parents = regions
            .iter()
            .enumerate()
            .map(|(i, region)| {
                regions
                    .iter()
                    .enumerate()
                    .skip(i + 1)
                    .find(|(_, outer)| {
                        // Proper containment; clauses sharing one try range
                        // (multi-catch) are siblings, not ancestors.
                        outer.try_start <= region.try_start
                            && region.try_end <= outer.try_end
                            && (outer.try_start < region.try_start
                                || region.try_end < outer.try_end)
                    })
                    .map(|(j, _)| j)
            })
            .collect();
        Self { regions, parents }
    }

    /// Returns the clauses in input order.
    #[must_use]
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// Returns the parent clause index of node `index`.
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents[index]
    }

    /// Returns the innermost clause (and which of its ranges) containing
    /// `offset`, or `None` when the offset lies outside all regions.
    #[must_use]
    pub fn enclosing(&self, offset: u32) -> Option<(usize, RegionPart)> {
        for (index, region) in self.regions.iter().enumerate() {
            if region.try_start <= offset && offset < region.try_end {
                return Some((index, RegionPart::Try));
            }
            if let Some(filter_start) = region.filter_start {
                if filter_start <= offset && offset < region.handler_start {
                    return Some((index, RegionPart::Filter));
                }
            }
            if region.handler_start <= offset && offset < region.handler_end {
                return Some((index, RegionPart::Handler));
            }
        }
        None
    }

    /// Returns `true` if the two offsets run in the same protected context.
    ///
    /// Two offsets outside all regions share the (absent) root context.
    #[must_use]
    pub fn are_on_same_region(&self, a: u32, b: u32) -> bool {
        self.enclosing(a) == self.enclosing(b)
    }

    /// Walks the ancestor chain of a node, innermost first, excluding the
    /// node itself.
    pub fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let mut cur = self.parents[index];
        std::iter::from_fn(move || {
            let next = cur?;
            cur = self.parents[next];
            Some(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(kind: RegionKind, try_range: (u32, u32), handler: (u32, u32)) -> ExceptionRegion {
        ExceptionRegion {
            kind,
            try_start: try_range.0,
            try_end: try_range.1,
            handler_start: handler.0,
            handler_end: handler.1,
            filter_start: None,
            catch_type: None,
        }
    }

    #[test]
    fn test_nested_trys_inner_first() {
        // inner try [4, 8) inside outer try [2, 12)
        let tree = RegionTree::build(vec![
            region(RegionKind::Catch, (4, 8), (8, 10)),
            region(RegionKind::Catch, (2, 12), (12, 16)),
        ]);

        assert_eq!(tree.parent(0), Some(1));
        assert_eq!(tree.parent(1), None);
        assert_eq!(tree.ancestors(0).collect::<Vec<_>>(), vec![1]);

        assert_eq!(tree.enclosing(5), Some((0, RegionPart::Try)));
        assert_eq!(tree.enclosing(3), Some((1, RegionPart::Try)));
        assert_eq!(tree.enclosing(0), None);
    }

    #[test]
    fn test_same_region() {
        let tree = RegionTree::build(vec![region(RegionKind::Finally, (2, 8), (8, 12))]);

        // Both inside the try.
        assert!(tree.are_on_same_region(3, 6));
        // Try versus handler: distinct contexts.
        assert!(!tree.are_on_same_region(3, 9));
        // Both outside all regions.
        assert!(tree.are_on_same_region(0, 20));
        // Inside versus outside.
        assert!(!tree.are_on_same_region(3, 0));
    }

    #[test]
    fn test_filter_range() {
        let tree = RegionTree::build(vec![ExceptionRegion {
            kind: RegionKind::Filter,
            try_start: 0,
            try_end: 4,
            handler_start: 8,
            handler_end: 12,
            filter_start: Some(4),
            catch_type: None,
        }]);

        assert_eq!(tree.enclosing(5), Some((0, RegionPart::Filter)));
        assert_eq!(tree.enclosing(9), Some((0, RegionPart::Handler)));
        assert!(!tree.are_on_same_region(5, 9));
    }

    #[test]
    fn test_sibling_regions() {
        let tree = RegionTree::build(vec![
            region(RegionKind::Catch, (0, 4), (4, 6)),
            region(RegionKind::Catch, (10, 14), (14, 16)),
        ]);

        assert_eq!(tree.parent(0), None);
        assert_eq!(tree.parent(1), None);
        assert!(!tree.are_on_same_region(1, 11));
    }
}
