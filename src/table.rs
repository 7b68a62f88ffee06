//! ACTION/GOTO table emission with precedence conflict resolution.

use crate::grammar::{Assoc, Grammar, ProductionID, SymbolID};
use crate::lr0::{StateGraph, StateID};
use crate::report::{ErrorCode, ErrorSink};
use crate::types::Map;
use crate::util::display_fn;
use std::{cmp::Ordering, fmt};

/// The action the parser performs in a state on a particular lookahead
/// terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Consume the lookahead and move to the given state.
    Shift(StateID),
    /// Reduce by the given production.
    Reduce(ProductionID),
    /// Parsing is complete.
    Accept,
    /// Reject the lookahead.
    Error,
}

impl Action {
    fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| match self {
            Action::Shift(next) => write!(f, "shift({})", next.into_raw()),
            Action::Reduce(p) => write!(f, "reduce({})", g.production(*p).display(g)),
            Action::Accept => f.write_str("accept"),
            Action::Error => f.write_str("error"),
        })
    }
}

/// One state's ACTION and GOTO rows.
#[derive(Debug)]
pub struct Row {
    actions: Map<SymbolID, Action>,
    gotos: Map<SymbolID, StateID>,
}

impl Row {
    /// The action for a terminal. Terminals without an explicit entry are
    /// rejected, so the ACTION row is total.
    pub fn action(&self, terminal: SymbolID) -> Action {
        self.actions
            .get(&terminal)
            .copied()
            .unwrap_or(Action::Error)
    }

    /// Explicit (non-`Error`) entries, in ascending terminal order.
    pub fn actions(&self) -> impl Iterator<Item = (SymbolID, Action)> + '_ {
        self.actions.iter().map(|(t, a)| (*t, *a))
    }

    pub fn goto(&self, nonterminal: SymbolID) -> Option<StateID> {
        self.gotos.get(&nonterminal).copied()
    }

    pub fn gotos(&self) -> impl Iterator<Item = (SymbolID, StateID)> + '_ {
        self.gotos.iter().map(|(n, s)| (*n, *s))
    }
}

/// The deterministic shift/reduce tables driving the generated parser.
#[derive(Debug)]
pub struct ParseTable {
    rows: Map<StateID, Row>,
    start: StateID,
}

impl ParseTable {
    pub fn start_state(&self) -> StateID {
        self.start
    }

    pub fn row(&self, id: StateID) -> &Row {
        &self.rows[&id]
    }

    pub fn rows(&self) -> impl Iterator<Item = (StateID, &Row)> + '_ {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (id, row) in &self.rows {
                writeln!(f, "{:?}:", id)?;
                for (terminal, action) in &row.actions {
                    writeln!(f, "  {} => {}", g.symbol(*terminal), action.display(g))?;
                }
                for (nonterminal, next) in &row.gotos {
                    writeln!(f, "  {} => goto({})", g.symbol(*nonterminal), next.into_raw())?;
                }
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct PendingAction {
    shift: Option<StateID>,
    accept: bool,
    reduces: Vec<ProductionID>,
}

/// Emit the ACTION and GOTO tables for the graph, resolving conflicts by
/// precedence where possible. Unresolved conflicts are reported through
/// `sink` and a default action is installed; emission always runs to
/// completion.
pub fn emit_tables(g: &Grammar, graph: &StateGraph, sink: &mut dyn ErrorSink) -> ParseTable {
    let mut rows = Map::default();
    let mut conflicts = 0;

    for (&id, state) in &graph.states {
        let mut pending = Map::<SymbolID, PendingAction>::default();
        let mut gotos = Map::default();

        for (&symbol, &next) in &state.transitions {
            if g.symbol(symbol).is_terminal() {
                let entry = pending.entry(symbol).or_default();
                if symbol == SymbolID::END {
                    // The only transition on `$` is the one of `S' → S $`.
                    entry.accept = true;
                } else {
                    entry.shift = Some(next);
                }
            } else {
                gotos.insert(symbol, next);
            }
        }

        for reduce in &state.reduces {
            if reduce.production == g.accept_production() {
                continue;
            }
            for t in reduce.lookaheads.iter() {
                pending
                    .entry(t)
                    .or_default()
                    .reduces
                    .push(reduce.production);
            }
        }

        pending.sort_keys();

        let mut actions = Map::default();
        for (symbol, entry) in pending {
            let action = resolve(g, id, symbol, &entry, sink, &mut conflicts);
            actions.insert(symbol, action);
        }

        rows.insert(id, Row { actions, gotos });
    }

    tracing::debug!(
        states = rows.len(),
        conflicts,
        "emitted ACTION/GOTO tables"
    );

    ParseTable {
        rows,
        start: graph.start,
    }
}

fn resolve(
    g: &Grammar,
    state: StateID,
    symbol: SymbolID,
    entry: &PendingAction,
    sink: &mut dyn ErrorSink,
    conflicts: &mut usize,
) -> Action {
    if entry.accept {
        if let Some(&reduce) = entry.reduces.first() {
            report_conflict(
                g,
                state,
                symbol,
                Action::Accept,
                Action::Reduce(reduce),
                Action::Accept,
                sink,
                conflicts,
            );
        }
        return Action::Accept;
    }

    match (entry.shift, &entry.reduces[..]) {
        (Some(next), []) => Action::Shift(next),
        (None, &[reduce]) => Action::Reduce(reduce),
        (None, reduces) => {
            // reduce/reduce: no precedence rule applies; the earliest
            // production in the grammar wins.
            let chosen = reduces.iter().copied().min().expect("at least one reduce");
            let other = reduces
                .iter()
                .copied()
                .find(|r| *r != chosen)
                .expect("at least two reduces");
            report_conflict(
                g,
                state,
                symbol,
                Action::Reduce(chosen),
                Action::Reduce(other),
                Action::Reduce(chosen),
                sink,
                conflicts,
            );
            Action::Reduce(chosen)
        }
        (Some(next), reduces) => {
            // Resolve each reduction against the shift; reductions that
            // outrank it survive.
            let mut winners = Vec::new();
            for &reduce in reduces {
                match shift_or_reduce(g, symbol, reduce) {
                    Resolution::Shift => {}
                    Resolution::Reduce => winners.push(reduce),
                    Resolution::Unresolved => {
                        report_conflict(
                            g,
                            state,
                            symbol,
                            Action::Shift(next),
                            Action::Reduce(reduce),
                            Action::Shift(next),
                            sink,
                            conflicts,
                        );
                    }
                }
            }
            match winners[..] {
                [] => Action::Shift(next),
                [reduce] => Action::Reduce(reduce),
                _ => {
                    let chosen = winners.iter().copied().min().expect("nonempty winners");
                    let other = winners
                        .iter()
                        .copied()
                        .find(|r| *r != chosen)
                        .expect("at least two winners");
                    report_conflict(
                        g,
                        state,
                        symbol,
                        Action::Reduce(chosen),
                        Action::Reduce(other),
                        Action::Reduce(chosen),
                        sink,
                        conflicts,
                    );
                    Action::Reduce(chosen)
                }
            }
        }
    }
}

enum Resolution {
    Shift,
    Reduce,
    Unresolved,
}

/// Arbitrate one shift/reduce pair. Defined precedence on both sides
/// decides by rank, then by the terminal's associativity; anything else is
/// unresolved and falls back to shifting.
fn shift_or_reduce(g: &Grammar, terminal: SymbolID, reduce: ProductionID) -> Resolution {
    let shift_prec = g.symbol(terminal).precedence;
    let reduce_prec = g.production(reduce).precedence(g);
    match (shift_prec, reduce_prec) {
        (Some(s), Some(r)) => match Ord::cmp(&s.level, &r.level) {
            Ordering::Greater => Resolution::Shift,
            Ordering::Less => Resolution::Reduce,
            Ordering::Equal => match s.assoc {
                Assoc::Left => Resolution::Reduce,
                Assoc::Right => Resolution::Shift,
                Assoc::Nonassoc => Resolution::Unresolved,
            },
        },
        _ => Resolution::Unresolved,
    }
}

#[allow(clippy::too_many_arguments)]
fn report_conflict(
    g: &Grammar,
    state: StateID,
    symbol: SymbolID,
    first: Action,
    second: Action,
    kept: Action,
    sink: &mut dyn ErrorSink,
    conflicts: &mut usize,
) {
    *conflicts += 1;
    let kind = match (first, second) {
        (Action::Reduce(_), Action::Reduce(_)) => "reduce/reduce",
        _ => "shift/reduce",
    };
    let line = [first, second]
        .iter()
        .find_map(|a| match a {
            Action::Reduce(p) => Some(g.production(*p).line),
            _ => None,
        })
        .unwrap_or(0);
    sink.report(
        line,
        0,
        ErrorCode::ParseTableConflict,
        &format!(
            "{} conflict on {} in state {}: {} vs {}; keeping {}",
            kind,
            g.symbol(symbol),
            state.into_raw(),
            first.display(g),
            second.display(g),
            kept.display(g),
        ),
    );
}
