//! LALR(1) lookahead propagation.
//!
//! Kernel lookaheads are discovered with the probe technique: every kernel
//! item is closed under LR(1) expansion carrying the reserved ε symbol as
//! its only lookahead. A real terminal surfacing on a closure item is a
//! spontaneously generated lookahead for the advanced item in the successor
//! state; the probe surfacing instead marks a propagation edge from the
//! probed kernel item. Seeding the start item with `$` and iterating the
//! edges to a fixed point then yields the full LALR(1) lookahead sets
//! without ever materializing canonical LR(1) item sets.

use crate::first_sets::FirstSets;
use crate::grammar::{Grammar, SymbolID, TerminalSet};
use crate::lr0::{ItemCore, Reduce, StateGraph, StateID};
use crate::types::{Map, Queue};

/// Attach LALR(1) lookahead sets to every kernel and closure item of the
/// graph and derive the per-state reducing items.
pub fn propagate_lookaheads(g: &Grammar, firsts: &FirstSets, graph: &mut StateGraph) {
    // Kernel lookaheads live in one flat arena during propagation so an
    // edge is just a pair of slots.
    let mut offsets = Map::<StateID, usize>::default();
    let mut total = 0;
    for (&id, state) in &graph.states {
        offsets.insert(id, total);
        total += state.kernel.len();
    }

    let mut lookaheads = vec![TerminalSet::default(); total];
    let mut edges = Vec::<(usize, usize)>::new();

    let probe_seed: TerminalSet = Some(SymbolID::EPSILON).into_iter().collect();

    for (&id, state) in &graph.states {
        for (k, kernel) in state.kernel.iter().enumerate() {
            let source = offsets[&id] + k;
            let probed = lr1_closure(g, firsts, [(kernel.core, probe_seed.clone())]);
            for (core, la) in &probed {
                let Some(symbol) = core.next_symbol(g) else {
                    continue;
                };
                let to = state.transitions[&symbol];
                let j = graph.states[&to]
                    .kernel_position(core.advanced())
                    .expect("goto image must be a kernel item of the successor");
                let target = offsets[&to] + j;
                for t in la.iter() {
                    if t == SymbolID::EPSILON {
                        if source != target {
                            edges.push((source, target));
                        }
                    } else {
                        lookaheads[target].insert(t);
                    }
                }
            }
        }
    }

    // The start item expects end-of-input.
    lookaheads[offsets[&graph.start]].insert(SymbolID::END);

    let mut passes = 0;
    let mut changed = true;
    while changed {
        changed = false;
        passes += 1;
        for &(source, target) in &edges {
            let (from, to) = get_two_mut(&mut lookaheads, source, target);
            changed |= to.union_with(from);
        }
    }
    tracing::debug!(
        edges = edges.len(),
        passes,
        "lookahead propagation reached fixed point"
    );

    for (&id, state) in graph.states.iter_mut() {
        let base = offsets[&id];
        for (k, item) in state.kernel.iter_mut().enumerate() {
            item.lookaheads = std::mem::take(&mut lookaheads[base + k]);
        }
    }

    // With the kernel lookaheads settled, close each state once more to
    // obtain the closure items' lookaheads and the reducing items.
    for (_, state) in graph.states.iter_mut() {
        let seed: Vec<_> = state
            .kernel
            .iter()
            .map(|item| (item.core, item.lookaheads.clone()))
            .collect();
        let closed = lr1_closure(g, firsts, seed);
        for item in state.closure.iter_mut() {
            if let Some(la) = closed.get(&item.core) {
                item.lookaheads = la.clone();
            }
        }

        let mut reduces: Vec<Reduce> = state
            .kernel
            .iter()
            .chain(&state.closure)
            .filter(|item| item.core.next_symbol(g).is_none())
            .map(|item| Reduce {
                production: item.core.production,
                lookaheads: item.lookaheads.clone(),
            })
            .collect();
        reduces.sort_by_key(|r| r.production);
        state.reduces = reduces;
    }
}

/// LR(1) closure over `(core, lookahead-set)` items: a nonterminal at a dot
/// expands to all of its productions, each carrying
/// `FIRST(tail lookaheads)`. Items whose sets grow are revisited, so the
/// result is the least fixed point.
fn lr1_closure(
    g: &Grammar,
    firsts: &FirstSets,
    seed: impl IntoIterator<Item = (ItemCore, TerminalSet)>,
) -> Map<ItemCore, TerminalSet> {
    let mut items = Map::<ItemCore, TerminalSet>::default();
    let mut queue = Queue::default();
    for (core, la) in seed {
        items.entry(core).or_default().union_with(&la);
        queue.push(core);
    }

    while let Some(core) = queue.pop() {
        let Some(symbol) = core.next_symbol(g) else {
            continue;
        };
        if !g.symbol(symbol).is_nonterminal() {
            continue;
        }
        let right = &g.production(core.production).right;
        let la = firsts.first_of_sequence(right, usize::from(core.position) + 1, &items[&core]);
        for &p in g.productions_of(symbol) {
            let expanded = ItemCore {
                production: p,
                position: 0,
            };
            if items.entry(expanded).or_default().union_with(&la) {
                queue.push(expanded);
            }
        }
    }

    items
}

fn get_two_mut<T>(slice: &mut [T], x: usize, y: usize) -> (&mut T, &mut T) {
    assert!(
        x != y && x.max(y) < slice.len(),
        "index condition not satisfied"
    );
    let (a, b) = slice.split_at_mut(x.max(y));
    if x < y {
        (&mut a[x], &mut b[0])
    } else {
        (&mut b[0], &mut a[y])
    }
}
