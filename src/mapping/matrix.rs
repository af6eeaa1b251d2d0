use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::{MappingContext, MappingEdge, MappingStore};
use crate::error::StoreError;
use crate::outcome::{Outcome, OutcomeProvider, order_by_reference};
use crate::session::{ContextTracker, Ticket};

/// Source outcomes as rows, target outcomes as columns, one cell per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingMatrix {
    pub context: MappingContext,
    pub rows: Vec<Outcome>,
    pub columns: Vec<Outcome>,
    pub cells: Vec<Vec<Option<MappingEdge>>>,
}

impl MappingMatrix {
    pub fn cell(&self, row: usize, column: usize) -> Option<&MappingEdge> {
        self.cells.get(row)?.get(column)?.as_ref()
    }

    pub fn edge_for(&self, source_id: &str, target_id: &str) -> Option<&MappingEdge> {
        let row = self.rows.iter().position(|outcome| outcome.id == source_id)?;
        let column = self
            .columns
            .iter()
            .position(|outcome| outcome.id == target_id)?;
        self.cell(row, column)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn mapped_count(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_some()).count()
    }
}

/// Lays out a matrix from provider outcomes and stored edges.
///
/// Outcomes on other levels are ignored, as are edges whose endpoints the
/// provider no longer lists.
pub fn assemble(
    context: &MappingContext,
    outcomes: Vec<Outcome>,
    edges: Vec<MappingEdge>,
) -> MappingMatrix {
    let (mut rows, mut columns): (Vec<Outcome>, Vec<Outcome>) = outcomes
        .into_iter()
        .filter(|outcome| {
            outcome.level == context.pair.source() || outcome.level == context.pair.target()
        })
        .partition(|outcome| outcome.level == context.pair.source());
    order_by_reference(&mut rows);
    order_by_reference(&mut columns);

    let mut by_pair: HashMap<(String, String), MappingEdge> = edges
        .into_iter()
        .map(|edge| ((edge.source_id.clone(), edge.target_id.clone()), edge))
        .collect();

    let cells = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| by_pair.remove(&(row.id.clone(), column.id.clone())))
                .collect()
        })
        .collect();

    MappingMatrix {
        context: context.clone(),
        rows,
        columns,
        cells,
    }
}

/// Rebuilds the matrix for `context` from scratch.
pub fn build<P, S>(
    provider: &P,
    store: &S,
    context: &MappingContext,
) -> Result<MappingMatrix, StoreError>
where
    P: OutcomeProvider + ?Sized,
    S: MappingStore + ?Sized,
{
    let outcomes = provider.list(&context.id)?;
    let edges = store.get_all(context)?;
    let matrix = assemble(context, outcomes, edges);
    debug!(
        context = %context.id,
        pair = %context.pair,
        rows = matrix.rows.len(),
        columns = matrix.columns.len(),
        mapped = matrix.mapped_count(),
        "rebuilt mapping matrix"
    );
    Ok(matrix)
}

/// The matrix on screen for the context the user is looking at.
#[derive(Debug, Default)]
pub struct MatrixView {
    tracker: ContextTracker,
    current: Option<MappingMatrix>,
}

impl MatrixView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches context; the previous matrix is dropped, not patched.
    pub fn navigate(&mut self, context: &MappingContext) -> Ticket {
        self.current = None;
        self.tracker.navigate(&view_key(context))
    }

    /// Installs a matrix built for `ticket`; stale builds are ignored.
    pub fn apply(&mut self, ticket: &Ticket, matrix: MappingMatrix) -> bool {
        if ticket.context() != view_key(&matrix.context) {
            return false;
        }
        match self.tracker.accept(ticket, matrix) {
            Some(matrix) => {
                self.current = Some(matrix);
                true
            }
            None => false,
        }
    }

    pub fn refresh<P, S>(&mut self, provider: &P, store: &S) -> Result<bool, StoreError>
    where
        P: OutcomeProvider + ?Sized,
        S: MappingStore + ?Sized,
    {
        let Some(context) = self.current.as_ref().map(|matrix| matrix.context.clone()) else {
            return Ok(false);
        };
        let Some(ticket) = self.tracker.ticket() else {
            return Ok(false);
        };
        let matrix = build(provider, store, &context)?;
        Ok(self.apply(&ticket, matrix))
    }

    pub fn matrix(&self) -> Option<&MappingMatrix> {
        self.current.as_ref()
    }
}

fn view_key(context: &MappingContext) -> String {
    format!("{}/{}", context.id, context.pair)
}
