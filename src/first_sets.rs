//! Nullable and FIRST set computation.

use crate::grammar::{Grammar, SymbolID, TerminalSet};
use crate::types::{Map, Set};

/// Per-symbol nullability and FIRST sets, computed once per grammar and
/// queried by the closure operations.
#[derive(Debug)]
pub struct FirstSets {
    nullable: Set<SymbolID>,
    firsts: Map<SymbolID, TerminalSet>,
}

impl FirstSets {
    pub fn new(g: &Grammar) -> Self {
        let nullable = nullable_set(g);
        let firsts = first_sets(g, &nullable);
        Self { nullable, firsts }
    }

    pub fn nullable(&self, symbol: SymbolID) -> bool {
        self.nullable.contains(&symbol)
    }

    pub fn first(&self, symbol: SymbolID) -> &TerminalSet {
        &self.firsts[&symbol]
    }

    /// `FIRST(rhs[from..] terminator)`: the terminals that can begin the
    /// given suffix, falling through to `terminator` when the whole suffix
    /// derives ε.
    pub fn first_of_sequence(
        &self,
        rhs: &[SymbolID],
        from: usize,
        terminator: &TerminalSet,
    ) -> TerminalSet {
        let mut result = TerminalSet::default();
        for &symbol in &rhs[from.min(rhs.len())..] {
            result.union_with(self.first(symbol));
            if !self.nullable(symbol) {
                return result;
            }
        }
        result.union_with(terminator);
        result
    }
}

/// The nonterminals that derive ε, by fixed point: a symbol is nullable iff
/// some production for it has an all-nullable (possibly empty) right-hand
/// side.
fn nullable_set(g: &Grammar) -> Set<SymbolID> {
    let mut nullable = Set::default();
    let mut changed = true;
    while changed {
        changed = false;
        for (_, p) in g.productions() {
            if nullable.contains(&p.left) {
                continue;
            }
            if p.right.iter().all(|s| nullable.contains(s)) {
                nullable.insert(p.left);
                changed = true;
            }
        }
    }
    nullable
}

fn first_sets(g: &Grammar, nullable: &Set<SymbolID>) -> Map<SymbolID, TerminalSet> {
    let mut firsts: Map<SymbolID, TerminalSet> = Map::default();
    for (id, symbol) in g.symbols() {
        let mut first = TerminalSet::default();
        if symbol.is_terminal() {
            first.insert(id);
        }
        firsts.insert(id, first);
    }

    // For A → X₁…Xₖ, FIRST(A) absorbs FIRST(Xᵢ) along the leading nullable
    // chain. Monotone over a finite universe, so iteration terminates.
    let mut changed = true;
    while changed {
        changed = false;
        for (_, p) in g.productions() {
            let mut absorbed = TerminalSet::default();
            for &symbol in &p.right {
                absorbed.union_with(&firsts[&symbol]);
                if !nullable.contains(&symbol) {
                    break;
                }
            }
            changed |= firsts[&p.left].union_with(&absorbed);
        }
    }

    firsts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarDef;
    use crate::report::Diagnostics;

    // S → a S b | ε
    fn matched_pairs() -> Grammar {
        let mut def = GrammarDef::default();
        let a = def.literal_ref("a", 1);
        let b = def.literal_ref("b", 1);
        def.begin_production("s", 1);
        let s = def.identifier_ref("s", 1);
        def.add_rhs_symbol(a, 1);
        def.add_rhs_symbol(s, 1);
        def.add_rhs_symbol(b, 1);
        def.end_alternative();
        def.end_alternative();
        def.end_production();
        def.finalize(&mut Diagnostics::default()).unwrap()
    }

    #[test]
    fn nullable_and_first_of_recursive_grammar() {
        let g = matched_pairs();
        let s = g.find_symbol("s").unwrap();
        let a = g.find_symbol("a").unwrap();

        let firsts = FirstSets::new(&g);
        assert!(firsts.nullable(s));
        assert!(!firsts.nullable(a));
        let first_s: Vec<_> = firsts.first(s).iter().collect();
        assert_eq!(first_s, vec![a]);
    }

    #[test]
    fn sequence_falls_through_nullable_prefix() {
        let g = matched_pairs();
        let s = g.find_symbol("s").unwrap();
        let a = g.find_symbol("a").unwrap();
        let b = g.find_symbol("b").unwrap();

        let firsts = FirstSets::new(&g);
        let terminator: TerminalSet = Some(SymbolID::END).into_iter().collect();

        // FIRST(s b $) = {a, b}: s is nullable, b is not.
        let seq = firsts.first_of_sequence(&[s, b], 0, &terminator);
        assert!(seq.contains(a) && seq.contains(b));
        assert!(!seq.contains(SymbolID::END));

        // FIRST(s $) = {a, $}.
        let seq = firsts.first_of_sequence(&[s], 0, &terminator);
        assert!(seq.contains(a) && seq.contains(SymbolID::END));

        // An exhausted suffix is just the terminator.
        let seq = firsts.first_of_sequence(&[s, b], 2, &terminator);
        assert_eq!(seq.iter().collect::<Vec<_>>(), vec![SymbolID::END]);
    }
}
