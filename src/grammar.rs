//! Grammar model: symbols, productions, and precedence classes.
//!
//! A grammar is assembled through [`GrammarDef`] by the external grammar
//! source parser and frozen by [`GrammarDef::finalize`]. All cross-entity
//! references are dense integer indices, so the frozen model can be shared
//! freely between the analysis passes.

use crate::report::{Diagnostic, ErrorCode, ErrorSink};
use crate::types::{Map, Set};
use crate::util::display_fn;
use std::{collections::VecDeque, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolID(u16);

impl SymbolID {
    /// The end-of-input marker `$`.
    pub const END: Self = Self(0);
    /// The `error` pseudo terminal.
    pub const ERROR: Self = Self(1);
    /// The ε symbol. Doubles as the lookahead probe, which is why it is
    /// reserved outside the real terminal range.
    pub const EPSILON: Self = Self(2);

    const OFFSET: u16 = 3;

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Self::END => write!(f, "Y#End"),
            &Self::ERROR => write!(f, "Y#Error"),
            &Self::EPSILON => write!(f, "Y#Eps"),
            _ => write!(f, "Y#{:03}", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A terminal defined by a literal such as `'+'`.
    Literal,
    /// A terminal defined by a regular expression such as `"[0-9]+"`.
    Regex,
    Nonterminal,
    /// The end-of-input marker.
    End,
    /// The `error` pseudo terminal.
    Error,
    /// The ε/probe symbol.
    Epsilon,
}

impl SymbolKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Literal | Self::Regex | Self::End | Self::Error)
    }

    /// Terminals the lexer builder has to produce a pattern for.
    pub fn is_lexical(self) -> bool {
        matches!(self, Self::Literal | Self::Regex)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

/// A precedence class: a rank and an associativity shared by the terminals
/// listed in one `%left`/`%right`/`%none` directive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Precedence {
    pub level: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(level: u16, assoc: Assoc) -> Self {
        Self { level, assoc }
    }
}

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub precedence: Option<Precedence>,
    /// Line the symbol was defined on (first reference for terminals).
    pub line: u32,
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn is_nonterminal(&self) -> bool {
        matches!(self.kind, SymbolKind::Nonterminal)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Literal => write!(f, "'{}'", self.name),
            SymbolKind::Regex => write!(f, "\"{}\"", self.name),
            _ => f.write_str(&self.name),
        }
    }
}

/// A set of terminal symbol indices, backed by a bit set.
#[derive(Debug, Default, Clone)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub fn contains(&self, id: SymbolID) -> bool {
        self.inner.contains(id.into_raw().into())
    }

    pub fn insert(&mut self, id: SymbolID) -> bool {
        self.inner.insert(id.into_raw().into())
    }

    /// Merge `other` into `self`, reporting whether anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.inner.len();
        self.inner.union_with(&other.inner);
        self.inner.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Members in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = SymbolID> + '_ {
        self.inner
            .iter()
            .map(|raw| raw.try_into().map(SymbolID::from_raw).unwrap())
    }
}

impl FromIterator<SymbolID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = SymbolID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.into_raw().into()).collect(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProductionID(u16);

impl ProductionID {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ProductionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P#{:03}", self.0)
    }
}

/// A production rule.
#[derive(Debug)]
pub struct Production {
    pub left: SymbolID,
    pub right: Vec<SymbolID>,
    /// Semantic action identifier attached to this alternative, if any.
    pub action: Option<String>,
    /// Symbol named by an explicit `%precedence` directive.
    pub prec_symbol: Option<SymbolID>,
    pub line: u32,
}

impl Production {
    /// The effective precedence: the explicitly named symbol's class if the
    /// production carries a `%precedence` directive, otherwise the class of
    /// the rightmost terminal in the right-hand side.
    pub fn precedence(&self, g: &Grammar) -> Option<Precedence> {
        match self.prec_symbol {
            Some(symbol) => g.symbol(symbol).precedence,
            None => self
                .right
                .iter()
                .rev()
                .find(|s| g.symbol(**s).is_terminal())
                .and_then(|s| g.symbol(*s).precedence),
        }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} :", g.symbol(self.left).name)?;
            if self.right.is_empty() {
                f.write_str(" ε")?;
            }
            for symbol in &self.right {
                write!(f, " {}", g.symbol(*symbol))?;
            }
            Ok(())
        })
    }
}

/// The frozen grammar model shared by all analysis passes.
#[derive(Debug)]
pub struct Grammar {
    name: String,
    symbols: Map<SymbolID, Symbol>,
    productions: Map<ProductionID, Production>,
    by_left: Map<SymbolID, Vec<ProductionID>>,
    whitespace: Vec<String>,
    start_symbol: SymbolID,
    accept_symbol: SymbolID,
    accept_production: ProductionID,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols.iter().map(|(id, sym)| (*id, sym))
    }

    pub fn symbol(&self, id: SymbolID) -> &Symbol {
        &self.symbols[&id]
    }

    pub fn find_symbol(&self, name: &str) -> Option<SymbolID> {
        self.symbols
            .iter()
            .find_map(|(id, sym)| (sym.name == name).then_some(*id))
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.productions.iter().map(|(id, p)| (*id, p))
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    /// Productions with the given nonterminal on the left-hand side, in
    /// declaration order.
    pub fn productions_of(&self, left: SymbolID) -> &[ProductionID] {
        self.by_left.get(&left).map_or(&[], |ids| &ids[..])
    }

    /// The user's declared start symbol `S`.
    pub fn start_symbol(&self) -> SymbolID {
        self.start_symbol
    }

    /// The synthesized start symbol `S'` of `S' → S $`.
    pub fn accept_symbol(&self) -> SymbolID {
        self.accept_symbol
    }

    pub fn accept_production(&self) -> ProductionID {
        self.accept_production
    }

    /// The `%whitespace` patterns, in declaration order.
    pub fn whitespace(&self) -> &[String] {
        &self.whitespace
    }

    /// Nonterminals reachable from the start symbol.
    pub fn reachable_symbols(&self) -> Set<SymbolID> {
        let mut reachable = Set::default();
        reachable.insert(self.start_symbol);
        let mut queue: VecDeque<_> = Some(self.start_symbol).into_iter().collect();
        while let Some(n) = queue.pop_front() {
            for &p in self.productions_of(n) {
                for &symbol in &self.productions[&p].right {
                    if self.symbols[&symbol].is_nonterminal() && reachable.insert(symbol) {
                        queue.push_back(symbol);
                    }
                }
            }
        }
        reachable
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "grammar {} {{", self.name)?;
        for (id, production) in self.productions() {
            writeln!(f, "  [{:02}] {}", id.into_raw(), production.display(self))?;
        }
        f.write_str("}")
    }
}

/// Structural failure of grammar finalization. The individual problems are
/// reported through the error sink; this only carries the count.
#[derive(Debug, thiserror::Error)]
#[error("grammar is structurally invalid ({errors} error(s) reported)")]
pub struct GrammarError {
    pub errors: usize,
}

/// Builder contract consumed by the external grammar source parser.
///
/// Symbol references are interned by lexeme: one lexeme names one symbol,
/// which is how a name used both as a terminal and as a production
/// left-hand side is detected.
#[derive(Debug)]
pub struct GrammarDef {
    name: String,
    symbols: Map<SymbolID, Symbol>,
    by_name: Map<String, SymbolID>,
    productions: Map<ProductionID, Production>,
    whitespace: Vec<String>,
    defined: Set<SymbolID>,
    conflicted: Set<SymbolID>,
    pending: Vec<Diagnostic>,
    start: Option<SymbolID>,
    next_symbol_id: u16,
    next_production_id: u16,
    next_precedence: u16,
    current_left: Option<SymbolID>,
    current_right: Vec<SymbolID>,
    current_action: Option<String>,
    current_prec: Option<SymbolID>,
    current_line: u32,
    alt_line: Option<u32>,
}

impl Default for GrammarDef {
    fn default() -> Self {
        let mut def = GrammarDef {
            name: String::new(),
            symbols: Map::default(),
            by_name: Map::default(),
            productions: Map::default(),
            whitespace: Vec::new(),
            defined: Set::default(),
            conflicted: Set::default(),
            pending: Vec::new(),
            start: None,
            next_symbol_id: SymbolID::OFFSET,
            next_production_id: 0,
            next_precedence: 1,
            current_left: None,
            current_right: Vec::new(),
            current_action: None,
            current_prec: None,
            current_line: 1,
            alt_line: None,
        };

        def.insert_reserved(SymbolID::END, "$end", SymbolKind::End);
        def.insert_reserved(SymbolID::ERROR, "error", SymbolKind::Error);
        def.insert_reserved(SymbolID::EPSILON, "$empty", SymbolKind::Epsilon);

        def
    }
}

impl GrammarDef {
    fn insert_reserved(&mut self, id: SymbolID, name: &str, kind: SymbolKind) {
        self.symbols.insert(
            id,
            Symbol {
                name: name.to_owned(),
                kind,
                precedence: None,
                line: 0,
            },
        );
        self.by_name.insert(name.to_owned(), id);
    }

    fn intern(&mut self, name: &str, kind: SymbolKind, line: u32) -> SymbolID {
        if let Some(&id) = self.by_name.get(name) {
            let existing = &self.symbols[&id];
            if existing.kind != kind && self.conflicted.insert(id) {
                self.pending.push(Diagnostic::new(
                    line,
                    0,
                    ErrorCode::SymbolKindConflict,
                    format!("'{}' is used as both a terminal and a nonterminal", name),
                ));
            }
            return id;
        }

        let id = SymbolID(self.next_symbol_id);
        self.next_symbol_id += 1;
        self.symbols.insert(
            id,
            Symbol {
                name: name.to_owned(),
                kind,
                precedence: None,
                line,
            },
        );
        self.by_name.insert(name.to_owned(), id);
        id
    }

    fn verify_ident(&mut self, name: &str, line: u32) {
        if !is_ident(name) {
            self.pending.push(Diagnostic::new(
                line,
                0,
                ErrorCode::Syntax,
                format!("invalid identifier '{}'", name),
            ));
        }
    }

    /// Record the grammar's name.
    pub fn set_identity(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Collect a `%whitespace` pattern for the lexer builder.
    pub fn declare_whitespace(&mut self, regex: &str) {
        self.whitespace.push(regex.to_owned());
    }

    /// Assign the next precedence level to the listed symbols. Levels grow
    /// monotonically with each call, so later classes bind tighter.
    pub fn declare_precedence_class(&mut self, assoc: Assoc, symbols: &[SymbolID]) -> u16 {
        let level = self.next_precedence;
        self.next_precedence += 1;
        for &symbol in symbols {
            self.symbols[&symbol].precedence = Some(Precedence::new(level, assoc));
        }
        level
    }

    /// Intern a literal terminal such as `'+'`.
    pub fn literal_ref(&mut self, text: &str, line: u32) -> SymbolID {
        self.intern(text, SymbolKind::Literal, line)
    }

    /// Intern a regular-expression terminal such as `"[0-9]+"`.
    pub fn regex_ref(&mut self, text: &str, line: u32) -> SymbolID {
        self.intern(text, SymbolKind::Regex, line)
    }

    /// Intern an identifier, provisionally a nonterminal. Identifiers that
    /// never gain a production are rejected at finalization.
    pub fn identifier_ref(&mut self, name: &str, line: u32) -> SymbolID {
        self.verify_ident(name, line);
        self.intern(name, SymbolKind::Nonterminal, line)
    }

    /// The `error` pseudo terminal.
    pub fn error_ref(&self) -> SymbolID {
        SymbolID::ERROR
    }

    /// Open a production statement for `left`. The first statement's
    /// left-hand side becomes the start symbol.
    pub fn begin_production(&mut self, left: &str, line: u32) {
        self.verify_ident(left, line);
        let id = self.intern(left, SymbolKind::Nonterminal, line);
        self.symbols[&id].line = line;
        self.defined.insert(id);
        if self.start.is_none() {
            self.start = Some(id);
        }
        self.current_left = Some(id);
        self.current_line = line;
    }

    pub fn add_rhs_symbol(&mut self, symbol: SymbolID, line: u32) {
        if self.alt_line.is_none() {
            self.alt_line = Some(line);
        }
        self.current_right.push(symbol);
    }

    /// Override the current alternative's precedence with `symbol`'s class.
    pub fn set_production_precedence(&mut self, symbol: SymbolID) {
        self.current_prec = Some(symbol);
    }

    /// Attach a semantic action identifier to the current alternative.
    pub fn set_action(&mut self, name: &str, line: u32) {
        self.verify_ident(name, line);
        if self.alt_line.is_none() {
            self.alt_line = Some(line);
        }
        self.current_action = Some(name.to_owned());
    }

    /// Close the current alternative. An alternative with no right-hand
    /// side symbols is an ε-production.
    pub fn end_alternative(&mut self) {
        let Some(left) = self.current_left else { return };
        let right = std::mem::take(&mut self.current_right);
        let action = self.current_action.take();
        let prec_symbol = self.current_prec.take();
        let line = self.alt_line.take().unwrap_or(self.current_line);

        let duplicate = self
            .productions
            .values()
            .any(|p| p.left == left && p.right == right);
        if duplicate {
            tracing::debug!(?left, "dropping duplicate production");
            return;
        }

        let id = ProductionID(self.next_production_id);
        self.next_production_id += 1;
        self.productions.insert(
            id,
            Production {
                left,
                right,
                action,
                prec_symbol,
                line,
            },
        );
    }

    /// Close the current production statement.
    pub fn end_production(&mut self) {
        if !self.current_right.is_empty()
            || self.current_action.is_some()
            || self.current_prec.is_some()
        {
            self.end_alternative();
        }
        self.current_left = None;
        self.alt_line = None;
    }

    /// Validate and freeze the grammar. All structural problems are
    /// reported through `sink`; if any of them is an error the grammar is
    /// rejected and analysis must not proceed.
    pub fn finalize(mut self, sink: &mut dyn ErrorSink) -> Result<Grammar, GrammarError> {
        let mut errors = 0;

        for diagnostic in self.pending.drain(..) {
            if !diagnostic.code.is_warning() {
                errors += 1;
            }
            sink.report(
                diagnostic.line,
                diagnostic.column,
                diagnostic.code,
                &diagnostic.message,
            );
        }

        if self.productions.is_empty() {
            errors += 1;
            sink.report(
                1,
                0,
                ErrorCode::EmptyGrammar,
                &format!("grammar '{}' contains no productions", self.name),
            );
        }

        for (id, symbol) in &self.symbols {
            if symbol.is_nonterminal() && !self.defined.contains(id) {
                errors += 1;
                sink.report(
                    symbol.line,
                    0,
                    ErrorCode::UndefinedSymbol,
                    &format!("undefined symbol '{}'", symbol.name),
                );
            }
        }

        if errors > 0 {
            return Err(GrammarError { errors });
        }

        let start = self.start.expect("productions imply a start symbol");

        // Synthesize S' → S $ as the last production.
        let accept_symbol = SymbolID(self.next_symbol_id);
        self.next_symbol_id += 1;
        self.symbols.insert(
            accept_symbol,
            Symbol {
                name: "$accept".to_owned(),
                kind: SymbolKind::Nonterminal,
                precedence: None,
                line: self.symbols[&start].line,
            },
        );
        let accept_production = ProductionID(self.next_production_id);
        self.next_production_id += 1;
        self.productions.insert(
            accept_production,
            Production {
                left: accept_symbol,
                right: vec![start, SymbolID::END],
                action: None,
                prec_symbol: None,
                line: self.symbols[&start].line,
            },
        );

        let mut by_left: Map<SymbolID, Vec<ProductionID>> = Map::default();
        for (&id, production) in &self.productions {
            by_left.entry(production.left).or_default().push(id);
        }

        Ok(Grammar {
            name: self.name,
            symbols: self.symbols,
            productions: self.productions,
            by_left,
            whitespace: self.whitespace,
            start_symbol: start,
            accept_symbol,
            accept_production,
        })
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || unicode_ident::is_xid_start(c) => {}
        _ => return false,
    }
    chars.all(unicode_ident::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Diagnostics;

    #[test]
    fn empty_grammar_is_rejected() {
        let def = GrammarDef::default();
        let mut diags = Diagnostics::default();
        let err = def.finalize(&mut diags).unwrap_err();
        assert_eq!(err.errors, 1);
        assert_eq!(diags.reports()[0].code, ErrorCode::EmptyGrammar);
    }

    #[test]
    fn undefined_symbol_is_rejected() {
        let mut def = GrammarDef::default();
        def.set_identity("calc");
        let missing = def.identifier_ref("expr", 2);
        def.begin_production("unit", 2);
        def.add_rhs_symbol(missing, 2);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        def.finalize(&mut diags).unwrap_err();
        assert_eq!(diags.reports().len(), 1);
        assert_eq!(diags.reports()[0].code, ErrorCode::UndefinedSymbol);
        assert_eq!(diags.reports()[0].line, 2);
    }

    #[test]
    fn terminal_reused_as_lhs_is_a_kind_conflict() {
        let mut def = GrammarDef::default();
        let x = def.literal_ref("x", 1);
        def.begin_production("s", 2);
        def.add_rhs_symbol(x, 2);
        def.end_alternative();
        def.end_production();
        // 'x' now reopened as a production LHS.
        def.begin_production("x", 3);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        def.finalize(&mut diags).unwrap_err();
        assert!(diags
            .reports()
            .iter()
            .any(|d| d.code == ErrorCode::SymbolKindConflict));
    }

    #[test]
    fn invalid_identifier_is_a_syntax_error() {
        let mut def = GrammarDef::default();
        def.begin_production("9lives", 1);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        def.finalize(&mut diags).unwrap_err();
        assert_eq!(diags.reports()[0].code, ErrorCode::Syntax);
    }

    #[test]
    fn duplicate_alternatives_collapse() {
        let mut def = GrammarDef::default();
        let a = def.literal_ref("a", 1);
        def.begin_production("s", 1);
        def.add_rhs_symbol(a, 1);
        def.end_alternative();
        def.add_rhs_symbol(a, 1);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        let grammar = def.finalize(&mut diags).unwrap();
        // one user production plus the synthesized start production
        assert_eq!(grammar.productions().count(), 2);
    }

    #[test]
    fn precedence_levels_grow_per_class() {
        let mut def = GrammarDef::default();
        let plus = def.literal_ref("+", 1);
        let star = def.literal_ref("*", 2);
        assert_eq!(def.declare_precedence_class(Assoc::Left, &[plus]), 1);
        assert_eq!(def.declare_precedence_class(Assoc::Left, &[star]), 2);
        def.begin_production("e", 3);
        def.add_rhs_symbol(plus, 3);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        let grammar = def.finalize(&mut diags).unwrap();
        let plus = grammar.find_symbol("+").unwrap();
        let star = grammar.find_symbol("*").unwrap();
        assert_eq!(
            grammar.symbol(plus).precedence,
            Some(Precedence::new(1, Assoc::Left))
        );
        assert_eq!(
            grammar.symbol(star).precedence,
            Some(Precedence::new(2, Assoc::Left))
        );
    }

    #[test]
    fn production_precedence_defaults_to_rightmost_terminal() {
        let mut def = GrammarDef::default();
        let plus = def.literal_ref("+", 1);
        let num = def.regex_ref("[0-9]+", 1);
        def.declare_precedence_class(Assoc::Left, &[plus]);
        def.begin_production("e", 2);
        let e = def.identifier_ref("e", 2);
        def.add_rhs_symbol(e, 2);
        def.add_rhs_symbol(plus, 2);
        def.add_rhs_symbol(e, 2);
        def.end_alternative();
        def.add_rhs_symbol(num, 3);
        def.end_alternative();
        def.end_production();

        let mut diags = Diagnostics::default();
        let grammar = def.finalize(&mut diags).unwrap();
        let (_, add) = grammar
            .productions()
            .find(|(_, p)| p.right.len() == 3)
            .unwrap();
        assert_eq!(
            add.precedence(&grammar),
            Some(Precedence::new(1, Assoc::Left))
        );
        let (_, leaf) = grammar
            .productions()
            .find(|(_, p)| p.right.len() == 1)
            .unwrap();
        assert_eq!(leaf.precedence(&grammar), None);
    }
}
