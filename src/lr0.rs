//! Canonical LR(0) item set construction.
//!
//! States are deduplicated by kernel: two item sets are the same state iff
//! their kernels agree on the `(production, position)` cores. Kernels are
//! kept sorted so the canonical form doubles as the hash key, and successor
//! symbols are processed in ascending index order, which makes the state
//! numbering deterministic.

use crate::grammar::{Grammar, ProductionID, SymbolID, TerminalSet};
use crate::types::{Map, Set};
use crate::util::display_fn;
use std::{collections::VecDeque, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID(u16);

impl StateID {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}

/// An LR(0) item core: a production with a dot position in its right-hand
/// side. Cores order lexicographically on `(production, position)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemCore {
    pub production: ProductionID,
    pub position: u16,
}

impl ItemCore {
    /// The symbol right after the dot, if the dot is not at the end.
    pub fn next_symbol(&self, g: &Grammar) -> Option<SymbolID> {
        g.production(self.production)
            .right
            .get(usize::from(self.position))
            .copied()
    }

    /// This core with the dot advanced over one symbol.
    pub fn advanced(self) -> Self {
        Self {
            position: self.position + 1,
            ..self
        }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let production = g.production(self.production);
            write!(f, "{} :", g.symbol(production.left).name)?;
            for (i, symbol) in production.right.iter().enumerate() {
                if i == usize::from(self.position) {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol(*symbol))?;
            }
            if usize::from(self.position) == production.right.len() {
                f.write_str(" .")?;
            }
            Ok(())
        })
    }
}

/// An item: an immutable core plus the lookahead set attached to it by the
/// propagation pass.
#[derive(Debug, Clone)]
pub struct Item {
    pub core: ItemCore,
    pub lookaheads: TerminalSet,
}

impl Item {
    fn new(core: ItemCore) -> Self {
        Self {
            core,
            lookaheads: TerminalSet::default(),
        }
    }
}

/// A reduction available in a state: the production to reduce by and the
/// terminals on which the reduction applies.
#[derive(Debug, Clone)]
pub struct Reduce {
    pub production: ProductionID,
    pub lookaheads: TerminalSet,
}

#[derive(Debug)]
pub struct State {
    /// Items with the dot past position zero, plus the start item. Sorted
    /// by core.
    pub kernel: Vec<Item>,
    /// Position-zero items generated by ε-expansion, sorted by core.
    pub closure: Vec<Item>,
    /// Shift edges (terminals) and goto edges (nonterminals), in ascending
    /// symbol order. No two edges share a symbol.
    pub transitions: Map<SymbolID, StateID>,
    /// Items with the dot at the end, filled in by the propagation pass.
    pub reduces: Vec<Reduce>,
}

impl State {
    /// Kernel and closure items together.
    pub fn items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.kernel.iter().chain(&self.closure)
    }

    /// Index of `core` within the (sorted) kernel.
    pub fn kernel_position(&self, core: ItemCore) -> Option<usize> {
        self.kernel
            .binary_search_by(|item| item.core.cmp(&core))
            .ok()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for item in self.items() {
                write!(f, "  {}", item.core.display(g))?;
                if !item.lookaheads.is_empty() {
                    f.write_str(" [")?;
                    for (i, t) in item.lookaheads.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", g.symbol(t))?;
                    }
                    f.write_str("]")?;
                }
                writeln!(f)?;
            }
            for (symbol, next) in &self.transitions {
                writeln!(f, "  {} => {:?}", g.symbol(*symbol), next)?;
            }
            Ok(())
        })
    }
}

/// The canonical collection of LR(0) item sets and the goto function.
#[derive(Debug)]
pub struct StateGraph {
    pub states: Map<StateID, State>,
    pub start: StateID,
}

impl StateGraph {
    pub fn state(&self, id: StateID) -> &State {
        &self.states[&id]
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (id, state) in &self.states {
                writeln!(f, "{:?}:", id)?;
                write!(f, "{}", state.display(g))?;
            }
            Ok(())
        })
    }
}

/// Build the canonical LR(0) state graph for the grammar.
pub fn build_states(g: &Grammar) -> StateGraph {
    let nonkernels = nonkernels(g);

    let mut states = Map::<StateID, State>::default();
    let mut state_id = {
        let mut next_state_id = 0;
        move || {
            let id = StateID(next_state_id);
            next_state_id += 1;
            id
        }
    };

    let start_kernel = vec![ItemCore {
        production: g.accept_production(),
        position: 0,
    }];
    let start = state_id();

    let mut isocores = Map::<Vec<ItemCore>, StateID>::default();
    isocores.insert(start_kernel.clone(), start);

    let mut pending = VecDeque::new();
    pending.push_back((start, start_kernel));

    while let Some((current, kernel)) = pending.pop_front() {
        let mut closure = Set::<ItemCore>::default();
        for core in &kernel {
            if let Some(symbol) = core.next_symbol(g) {
                if g.symbol(symbol).is_nonterminal() {
                    closure.extend(nonkernels[&symbol].iter().copied());
                }
            }
        }
        let mut closure: Vec<ItemCore> = closure.into_iter().collect();
        closure.sort();

        let mut successors = Map::<SymbolID, Vec<ItemCore>>::default();
        for core in kernel.iter().chain(&closure) {
            if let Some(symbol) = core.next_symbol(g) {
                successors.entry(symbol).or_default().push(core.advanced());
            }
        }
        // ascending symbol order keeps the state numbering reproducible
        successors.sort_keys();

        let mut transitions = Map::default();
        for (symbol, mut new_kernel) in successors {
            new_kernel.sort();
            let next = match isocores.get(&new_kernel) {
                Some(&id) => id,
                None => {
                    let id = state_id();
                    isocores.insert(new_kernel.clone(), id);
                    pending.push_back((id, new_kernel));
                    id
                }
            };
            transitions.insert(symbol, next);
        }

        states.insert(
            current,
            State {
                kernel: kernel.into_iter().map(Item::new).collect(),
                closure: closure.into_iter().map(Item::new).collect(),
                transitions,
                reduces: Vec::new(),
            },
        );
    }

    tracing::debug!(states = states.len(), "constructed LR(0) state graph");

    StateGraph { states, start }
}

/// For each nonterminal, the position-zero items its ε-expansion produces,
/// transitively. Closing a state is then a union over the nonterminals at
/// kernel dots.
fn nonkernels(g: &Grammar) -> Map<SymbolID, Vec<ItemCore>> {
    let mut result = Map::default();
    for (n, symbol) in g.symbols() {
        if !symbol.is_nonterminal() {
            continue;
        }
        let mut seen = Set::default();
        seen.insert(n);
        let mut queue: VecDeque<_> = Some(n).into_iter().collect();
        let mut items = Vec::new();
        while let Some(m) = queue.pop_front() {
            for &p in g.productions_of(m) {
                items.push(ItemCore {
                    production: p,
                    position: 0,
                });
                if let Some(&first) = g.production(p).right.first() {
                    if g.symbol(first).is_nonterminal() && seen.insert(first) {
                        queue.push_back(first);
                    }
                }
            }
        }
        items.sort();
        result.insert(n, items);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarDef;
    use crate::report::Diagnostics;

    // E → E + T | T ; T → a
    fn left_recursive() -> Grammar {
        let mut def = GrammarDef::default();
        let plus = def.literal_ref("+", 1);
        let a = def.literal_ref("a", 1);
        def.begin_production("e", 1);
        let e = def.identifier_ref("e", 1);
        let t = def.identifier_ref("t", 1);
        def.add_rhs_symbol(e, 1);
        def.add_rhs_symbol(plus, 1);
        def.add_rhs_symbol(t, 1);
        def.end_alternative();
        def.add_rhs_symbol(t, 1);
        def.end_alternative();
        def.end_production();
        def.begin_production("t", 2);
        def.add_rhs_symbol(a, 2);
        def.end_alternative();
        def.end_production();
        def.finalize(&mut Diagnostics::default()).unwrap()
    }

    #[test]
    fn start_state_holds_the_start_item() {
        let g = left_recursive();
        let graph = build_states(&g);
        let start = graph.state(graph.start);
        assert_eq!(start.kernel.len(), 1);
        assert_eq!(start.kernel[0].core.production, g.accept_production());
        assert_eq!(start.kernel[0].core.position, 0);
        // ε-expansion pulls in every production of E and T
        assert_eq!(start.closure.len(), 3);
    }

    #[test]
    fn transitions_are_unique_per_symbol_and_sorted() {
        let g = left_recursive();
        let graph = build_states(&g);
        for (_, state) in &graph.states {
            let symbols: Vec<_> = state.transitions.keys().copied().collect();
            let mut sorted = symbols.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(symbols, sorted);
        }
    }

    #[test]
    fn isocore_states_are_merged() {
        let g = left_recursive();
        let graph = build_states(&g);
        // T → a . is reached both from the start state and after "E +"; the
        // kernels are core-equal so only one state may exist for it.
        let t_done = graph
            .states
            .values()
            .filter(|s| {
                s.kernel.iter().any(|item| {
                    item.core.position == 1
                        && g.production(item.core.production).right
                            == vec![g.find_symbol("a").unwrap()]
                })
            })
            .count();
        assert_eq!(t_done, 1);
    }
}
