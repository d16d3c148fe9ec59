//! Orchestration of one layout invocation.
//!
//! The pipeline is an explicit phase machine. `Transform` classifies
//! elements and prepares port candidates, `Layer` ranks the graph and
//! inserts grouping and normalization dummies, the engine sequences and
//! routes, and `Restore` puts the original edges back. Phases run strictly
//! in the order of [`Phase::next`]; restoration also runs when an earlier
//! phase failed, so no transformed graph state outlives the invocation.

use crate::alignment::{self, EdgeLengths};
use crate::elements::TypeTags;
use crate::engine::{Engine, RoutingHints};
use crate::error::{Error, Result};
use crate::{FlowGraph, elements, layerer, normalize, ports, transformer, util};

/// Pipeline phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Transform,
    Layer,
    Sequence,
    Align,
    OptimizePorts,
    Route,
    Restore,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Transform,
        Phase::Layer,
        Phase::Sequence,
        Phase::Align,
        Phase::OptimizePorts,
        Phase::Route,
        Phase::Restore,
    ];

    /// Successor in the fixed phase order.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Transform => Some(Phase::Layer),
            Phase::Layer => Some(Phase::Sequence),
            Phase::Sequence => Some(Phase::Align),
            Phase::Align => Some(Phase::OptimizePorts),
            Phase::OptimizePorts => Some(Phase::Route),
            Phase::Route => Some(Phase::Restore),
            Phase::Restore => None,
        }
    }
}

/// Per-invocation state threaded through the phases. A fresh context is
/// built for every `run`; nothing leaks across invocations.
#[derive(Debug)]
pub struct LayoutContext {
    pub phase: Phase,
    edge_lengths: EdgeLengths,
}

impl LayoutContext {
    pub fn new() -> Self {
        LayoutContext {
            phase: Phase::Transform,
            edge_lengths: EdgeLengths::default(),
        }
    }
}

impl Default for LayoutContext {
    fn default() -> Self {
        LayoutContext::new()
    }
}

/// Runs the whole pipeline over `g` with the given engine.
///
/// On failure the first error is returned, but only after the restore phase
/// has removed dummies and re-attached original edges; its undo steps are
/// no-ops for anything an earlier failure kept from being built.
pub fn run(g: &mut FlowGraph, tags: &TypeTags, engine: &mut dyn Engine) -> Result<()> {
    let mut ctx = LayoutContext::new();
    let mut outcome: Result<()> = Ok(());

    loop {
        let phase = ctx.phase;
        if outcome.is_ok() || phase == Phase::Restore {
            let result = step(&mut ctx, g, tags, engine);
            if outcome.is_ok() {
                outcome = result;
            } else if let Err(e) = result {
                tracing::debug!(error = %e, "restore after failed layout also failed");
            }
        }
        match phase.next() {
            Some(next) => ctx.phase = next,
            None => break,
        }
    }

    outcome
}

fn step(
    ctx: &mut LayoutContext,
    g: &mut FlowGraph,
    tags: &TypeTags,
    engine: &mut dyn Engine,
) -> Result<()> {
    tracing::debug!(phase = ?ctx.phase, "phase start");
    match ctx.phase {
        Phase::Transform => {
            elements::run(g, tags);
            transformer::configure_preferred_directions(g);
        }
        Phase::Layer => {
            layerer::run(g)?;
            transformer::run_grouping(g);
            normalize::run(g);
            engine.optimize_port_lists(g)?;
        }
        Phase::Sequence => {
            // The engine's port-list pass may have grown the graph; sequencing
            // must only ever see fully layered nodes.
            if let Some(v) = g
                .node_ids()
                .into_iter()
                .find(|v| util::rank_of(g, v).is_none())
            {
                return Err(Error::MissingLayer { node: v });
            }
            engine.sequence(g)?
        }
        Phase::Align => ctx.edge_lengths = alignment::run(g)?,
        Phase::OptimizePorts => ports::run(g, &ctx.edge_lengths),
        Phase::Route => {
            let hints = RoutingHints::new(g);
            engine.route(g, &hints)?;
        }
        Phase::Restore => {
            normalize::undo(g);
            transformer::undo_grouping(g)?;
            transformer::remove_collinear_bends(g);
        }
    }
    Ok(())
}
