//! Dependency resolution
//!
//! Orders a batch of relations so that every relation is built after the
//! relations it reads from. Resolution works purely on the declared
//! dependency sets; it never talks to the warehouse.
//!
//! The algorithm runs a priority queue keyed on `(minimum order, position
//! in the input)`. A relation whose dependencies are all ordered gets the
//! next order; one with unordered dependencies is pushed back with a
//! higher minimum. Once a relation's minimum exceeds twice the batch size
//! it can never be ordered, which only happens when the graph has a cycle.

use crate::relation::{DesignError, RelationDescriptor};
use granary_core::{Diagnostic, DiagnosticCode, Severity};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use thiserror::Error;

/// Result of a successful resolution.
#[derive(Debug)]
pub struct Resolution {
    /// Relations sorted into build order, each with `order()` set
    pub relations: Vec<RelationDescriptor>,

    /// Findings about dependencies outside the batch
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot determine order, suspect cycle in DAG of dependencies")]
    CyclicDependency,

    #[error(transparent)]
    Design(#[from] DesignError),
}

/// Order relations so that dependencies come before dependents
///
/// Dependencies on identifiers outside the batch are reported as warnings
/// and ignored for ordering purposes. Relations that do not constrain each
/// other keep their relative input order.
pub fn order_by_dependencies(
    mut relations: Vec<RelationDescriptor>,
) -> Result<Resolution, ResolveError> {
    let identifiers: Vec<String> = relations
        .iter()
        .map(|relation| relation.identifier())
        .collect();
    let known: BTreeSet<&str> = identifiers.iter().map(String::as_str).collect();
    let index_of: HashMap<&str, usize> = identifiers
        .iter()
        .enumerate()
        .map(|(idx, identifier)| (identifier.as_str(), idx))
        .collect();

    // Dependency sets narrowed to relations that are actually in the batch.
    let mut narrowed: Vec<BTreeSet<String>> = Vec::with_capacity(relations.len());
    let mut with_unknowns: BTreeSet<String> = BTreeSet::new();
    let mut unknowns: BTreeSet<String> = BTreeSet::new();
    for (idx, relation) in relations.iter().enumerate() {
        let mut kept = BTreeSet::new();
        for dependency in relation.dependencies()? {
            if known.contains(dependency.as_str()) {
                kept.insert(dependency.clone());
            } else {
                unknowns.insert(dependency.clone());
                with_unknowns.insert(identifiers[idx].clone());
            }
        }
        narrowed.push(kept);
    }

    let mut warnings = Vec::new();
    if !with_unknowns.is_empty() {
        let relation_list = quoted_list(&with_unknowns);
        let unknown_list = quoted_list(&unknowns);
        tracing::warn!(
            "these relations have dependencies that are not part of any design file: {relation_list}"
        );
        tracing::warn!("these dependencies are not part of any design file: {unknown_list}");
        warnings.push(Diagnostic::new(
            DiagnosticCode::UnknownDependency,
            Severity::Warn,
            format!(
                "these relations have dependencies that are not part of any design file: {relation_list}"
            ),
        ));
        warnings.push(Diagnostic::new(
            DiagnosticCode::UnknownDependency,
            Severity::Warn,
            format!("these dependencies are not part of any design file: {unknown_list}"),
        ));
    }

    let count = relations.len() as u32;
    let mut orders: Vec<Option<u32>> = vec![None; relations.len()];
    let mut latest: u32 = 0;

    let mut queue: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();
    for idx in 0..relations.len() {
        queue.push(Reverse((1, idx)));
    }

    while let Some(Reverse((minimum, idx))) = queue.pop() {
        if minimum > 2 * count {
            return Err(ResolveError::CyclicDependency);
        }
        let dependencies = &narrowed[idx];
        if dependencies.is_empty() {
            latest += 1;
            orders[idx] = Some(latest);
            continue;
        }
        let dependency_orders: Vec<Option<u32>> = dependencies
            .iter()
            .map(|dependency| orders[index_of[dependency.as_str()]])
            .collect();
        let highest = dependency_orders
            .iter()
            .map(|order| order.unwrap_or(0))
            .max()
            .unwrap_or(0);
        if dependency_orders.iter().all(Option::is_some) {
            latest = highest.max(latest) + 1;
            orders[idx] = Some(latest);
        } else if dependency_orders.iter().any(Option::is_some) {
            queue.push(Reverse((highest.max(latest).max(minimum) + 1, idx)));
        } else {
            queue.push(Reverse((latest.max(minimum) + 1, idx)));
        }
    }

    for (idx, relation) in relations.iter_mut().enumerate() {
        if let Some(order) = orders[idx] {
            relation.set_order(order);
        }
    }
    relations.sort_by_key(RelationDescriptor::order);
    Ok(Resolution {
        relations,
        warnings,
    })
}

fn quoted_list(items: &BTreeSet<String>) -> String {
    items
        .iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
