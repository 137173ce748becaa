//! Grammar model
//!
//! The grammar is an authored YAML file listing every symbol (node type)
//! with its return type, ordered child parameters and terminal values,
//! together with the subtype relation, storage scopes, symbol groups and
//! per-profile weight tables.
//!
//! ```yaml
//! root: Int
//! symbols:
//!   - id: Add
//!     returns: Int
//!     params:
//!       - { name: left, accepts: Int }
//!       - { name: right, accepts: Int }
//!     weight: 2
//!   - id: Const
//!     returns: Int
//!     terminals:
//!       - { name: value, kind: int, range: [0, 9] }
//!     weight: 1
//! ```
//!
//! Loading derives, per symbol, the arity bounds, the minimal subtree size
//! and the minimal subtree depth. Symbols that can never be completed are
//! rejected at load time.

use crate::error::{Error, Result};
use crate::tree::{SlotRef, TreeNode, Value};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Behavioural marker of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Children execute repeatedly
    Loop,
    /// One child is a condition, the rest are alternative bodies
    Branch,
    /// Reads a storage slot
    Read,
    /// Writes a storage slot
    Write,
    /// Reads a function argument; always satisfied
    Argument,
}

/// Kind of a terminal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    Int,
    Float,
    Bool,
    Text,
    Slot,
}

impl TerminalKind {
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (TerminalKind::Int, Value::Int(_))
                | (TerminalKind::Float, Value::Float(_))
                | (TerminalKind::Bool, Value::Bool(_))
                | (TerminalKind::Text, Value::Text(_))
                | (TerminalKind::Slot, Value::Slot(_))
        )
    }
}

/// Child parameter of a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParamDescriptor {
    pub name: String,
    /// Type a child must return (or be a subtype of)
    pub accepts: String,
    /// Whether the parameter holds a variable number of children
    #[serde(default)]
    pub array: bool,
    /// Minimum children of an array parameter
    #[serde(default = "default_array_min")]
    pub min: usize,
    /// Maximum children of an array parameter, bounded by the width budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

fn default_array_min() -> usize {
    1
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, accepts: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: accepts.into(),
            array: false,
            min: default_array_min(),
            max: None,
        }
    }

    pub fn array(name: impl Into<String>, accepts: impl Into<String>, min: usize, max: Option<usize>) -> Self {
        Self {
            name: name.into(),
            accepts: accepts.into(),
            array: true,
            min,
            max,
        }
    }

    /// Children this parameter needs at minimum
    pub fn required(&self) -> usize {
        if self.array {
            self.min
        } else {
            1
        }
    }

    /// Children this parameter admits at most (`None` = unbounded)
    pub fn capacity(&self) -> Option<usize> {
        if self.array {
            self.max
        } else {
            Some(1)
        }
    }
}

/// Terminal value slot of a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TerminalDescriptor {
    pub name: String,
    pub kind: TerminalKind,
    /// Inclusive numeric range for int/float terminals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    /// Fixed set of admissible values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

impl TerminalDescriptor {
    pub fn new(name: impl Into<String>, kind: TerminalKind) -> Self {
        Self {
            name: name.into(),
            kind,
            range: None,
            values: Vec::new(),
        }
    }
}

/// Field of a symbol's serialization descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Child { accepts: String, array: bool },
    Terminal(TerminalKind),
}

/// A typed node kind of the grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Symbol {
    pub id: String,
    pub returns: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terminals: Vec<TerminalDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub kinds: BTreeSet<SymbolKind>,
    /// Static weight, overridden by profile tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Symbol {
    pub fn new(id: impl Into<String>, returns: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            returns: returns.into(),
            params: Vec::new(),
            terminals: Vec::new(),
            kinds: BTreeSet::new(),
            weight: None,
            group: None,
        }
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn terminal(mut self, terminal: TerminalDescriptor) -> Self {
        self.terminals.push(terminal);
        self
    }

    pub fn kind(mut self, kind: SymbolKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn is(&self, kind: SymbolKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn min_arity(&self) -> usize {
        self.params.iter().map(ParamDescriptor::required).sum()
    }

    /// `None` when an array parameter is unbounded
    pub fn max_arity(&self) -> Option<usize> {
        self.params
            .iter()
            .try_fold(0usize, |acc, p| p.capacity().map(|c| acc + c))
    }

    pub fn param_named(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn terminal_named(&self, name: &str) -> Option<&TerminalDescriptor> {
        self.terminals.iter().find(|t| t.name == name)
    }

    /// The slot terminal of a storage symbol
    pub fn slot_terminal(&self) -> Option<&TerminalDescriptor> {
        self.terminals.iter().find(|t| t.kind == TerminalKind::Slot)
    }

    /// Serialization descriptor: children first, then terminals
    pub fn fields(&self) -> Vec<(String, FieldKind)> {
        let children = self.params.iter().map(|p| {
            (
                p.name.clone(),
                FieldKind::Child {
                    accepts: p.accepts.clone(),
                    array: p.array,
                },
            )
        });
        let terminals = self
            .terminals
            .iter()
            .map(|t| (t.name.clone(), FieldKind::Terminal(t.kind)));
        children.chain(terminals).collect()
    }

    /// Field labels for `count` children in parameter order; surplus
    /// children go to the first array parameter
    pub fn child_labels(&self, count: usize) -> Vec<String> {
        let fixed = self.params.iter().filter(|p| !p.array).count();
        let mut surplus = count.saturating_sub(fixed);
        let mut labels = Vec::with_capacity(count);
        for p in &self.params {
            if p.array {
                labels.extend(std::iter::repeat_n(p.name.clone(), surplus));
                surplus = 0;
            } else {
                labels.push(p.name.clone());
            }
        }
        labels
    }
}

/// Grammar file as authored
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GrammarFile {
    /// Default root type of generated programs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// Subtype relation: `type -> [supertypes]`
    #[serde(default)]
    pub types: BTreeMap<String, Vec<String>>,

    /// Storage scopes and their slots
    #[serde(default)]
    pub storage: BTreeMap<String, Vec<String>>,

    pub symbols: Vec<Symbol>,

    /// Named symbol groups
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,

    /// Weight tables per deployment profile
    #[serde(default)]
    pub weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Derived bounds of one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolBounds {
    pub min_size: usize,
    pub min_depth: usize,
}

/// Loaded, validated grammar
#[derive(Debug, Clone)]
pub struct Grammar {
    file: GrammarFile,
    index: HashMap<String, usize>,
    supertypes: HashMap<String, BTreeSet<String>>,
    producers: HashMap<String, Vec<usize>>,
    bounds: Vec<SymbolBounds>,
    groups: BTreeMap<String, Vec<String>>,
}

/// Pattern every symbol id, type name and template id must match
pub fn identifier_regex() -> Result<Regex> {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| Error::Other(e.to_string()))
}

impl Grammar {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: GrammarFile = serde_norway::from_str(yaml)?;
        Self::new(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content)
    }

    /// Build from symbols only
    pub fn from_symbols(symbols: Vec<Symbol>) -> Result<Self> {
        Self::new(GrammarFile {
            symbols,
            ..GrammarFile::default()
        })
    }

    pub fn new(file: GrammarFile) -> Result<Self> {
        let identifier = identifier_regex()?;
        let mut index = HashMap::new();
        for (i, symbol) in file.symbols.iter().enumerate() {
            if !identifier.is_match(&symbol.id) {
                return Err(Error::GrammarInvalid(format!("invalid symbol id '{}'", symbol.id)));
            }
            if index.insert(symbol.id.clone(), i).is_some() {
                return Err(Error::GrammarInvalid(format!("duplicate symbol '{}'", symbol.id)));
            }
        }

        let mut declared: BTreeSet<String> = file.symbols.iter().map(|s| s.returns.clone()).collect();
        for (ty, supers) in &file.types {
            declared.insert(ty.clone());
            declared.extend(supers.iter().cloned());
        }
        for ty in &declared {
            if !identifier.is_match(ty) {
                return Err(Error::GrammarInvalid(format!("invalid type name '{}'", ty)));
            }
        }

        let supertypes = close_supertypes(&declared, &file.types);

        for symbol in &file.symbols {
            Self::check_symbol(symbol, &declared, &file.storage)?;
        }
        if let Some(root) = &file.root {
            if !declared.contains(root) {
                return Err(Error::GrammarInvalid(format!("root type '{}' is not declared", root)));
            }
        }

        let mut producers: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, symbol) in file.symbols.iter().enumerate() {
            if let Some(supers) = supertypes.get(&symbol.returns) {
                for ty in supers {
                    producers.entry(ty.clone()).or_default().push(i);
                }
            }
        }

        let mut groups = file.groups.clone();
        for symbol in &file.symbols {
            if let Some(group) = &symbol.group {
                let members = groups.entry(group.clone()).or_default();
                if !members.contains(&symbol.id) {
                    members.push(symbol.id.clone());
                }
            }
        }
        for (group, members) in &groups {
            for member in members {
                if !index.contains_key(member) {
                    return Err(Error::GrammarInvalid(format!(
                        "group '{}' lists unknown symbol '{}'",
                        group, member
                    )));
                }
            }
        }
        for (profile, table) in &file.weights {
            for id in table.keys() {
                if !index.contains_key(id) {
                    log::warn!("weight profile '{}' lists unknown symbol '{}'", profile, id);
                }
            }
        }

        let bounds = compute_bounds(&file.symbols, &producers)?;

        Ok(Self {
            file,
            index,
            supertypes,
            producers,
            bounds,
            groups,
        })
    }

    fn check_symbol(
        symbol: &Symbol,
        declared: &BTreeSet<String>,
        storage: &BTreeMap<String, Vec<String>>,
    ) -> Result<()> {
        let mut names = BTreeSet::new();
        for p in &symbol.params {
            if !names.insert(p.name.as_str()) {
                return Err(Error::GrammarInvalid(format!("{}: duplicate field '{}'", symbol.id, p.name)));
            }
            if !declared.contains(&p.accepts) {
                return Err(Error::GrammarInvalid(format!(
                    "{}.{} accepts undeclared type '{}'",
                    symbol.id, p.name, p.accepts
                )));
            }
            if let Some(max) = p.max {
                if p.array && max < p.min {
                    return Err(Error::GrammarInvalid(format!(
                        "{}.{}: max {} below min {}",
                        symbol.id, p.name, max, p.min
                    )));
                }
            }
        }
        for t in &symbol.terminals {
            if !names.insert(t.name.as_str()) {
                return Err(Error::GrammarInvalid(format!("{}: duplicate field '{}'", symbol.id, t.name)));
            }
            if t.kind == TerminalKind::Slot && storage.values().all(Vec::is_empty) {
                return Err(Error::GrammarInvalid(format!(
                    "{}.{} is a slot terminal but no storage is declared",
                    symbol.id, t.name
                )));
            }
            if let Some(bad) = t.values.iter().find(|v| !t.kind.accepts(v)) {
                return Err(Error::GrammarInvalid(format!(
                    "{}.{}: value {} does not fit the terminal kind",
                    symbol.id, t.name, bad
                )));
            }
            if let Some(range) = t.range {
                check_range(symbol, t, range)?;
            }
        }
        let storage_kind = symbol.is(SymbolKind::Read) || symbol.is(SymbolKind::Write) || symbol.is(SymbolKind::Argument);
        if storage_kind && symbol.slot_terminal().is_none() {
            return Err(Error::GrammarInvalid(format!(
                "{} reads or writes storage but has no slot terminal",
                symbol.id
            )));
        }
        if let Some(w) = symbol.weight {
            if w.is_nan() || w < 0.0 {
                return Err(Error::GrammarInvalid(format!("{}: negative weight", symbol.id)));
            }
        }
        Ok(())
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.file.symbols
    }

    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.index.get(id).map(|&i| &self.file.symbols[i])
    }

    pub fn require(&self, id: &str) -> Result<&Symbol> {
        self.symbol(id).ok_or_else(|| Error::UnknownSymbol(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Whether a value of type `from` may fill a slot expecting `to`
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        from == to || self.supertypes.get(from).is_some_and(|s| s.contains(to))
    }

    /// Symbols able to fill a slot of type `ty`
    pub fn candidates(&self, ty: &str) -> Vec<&Symbol> {
        self.producers
            .get(ty)
            .map(|ids| ids.iter().map(|&i| &self.file.symbols[i]).collect())
            .unwrap_or_default()
    }

    pub fn bounds(&self, id: &str) -> Option<SymbolBounds> {
        self.index.get(id).map(|&i| self.bounds[i])
    }

    /// Fewest nodes any complete subtree rooted at `id` can have
    pub fn min_subtree_size(&self, id: &str) -> Option<usize> {
        self.bounds(id).map(|b| b.min_size)
    }

    /// Smallest depth any complete subtree rooted at `id` can have
    pub fn min_subtree_depth(&self, id: &str) -> Option<usize> {
        self.bounds(id).map(|b| b.min_depth)
    }

    pub fn root_type(&self) -> Option<&str> {
        self.file.root.as_deref()
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn storage(&self) -> &BTreeMap<String, Vec<String>> {
        &self.file.storage
    }

    /// Every declared storage slot
    pub fn slots(&self) -> Vec<SlotRef> {
        self.file
            .storage
            .iter()
            .flat_map(|(scope, slots)| slots.iter().map(move |s| SlotRef::new(scope.clone(), s.clone())))
            .collect()
    }

    /// Weight table for a profile: static symbol weights overlaid with the
    /// profile's entries. Symbols without any weight are absent.
    pub fn weight_table(&self, profile: &str) -> HashMap<String, f64> {
        let mut table: HashMap<String, f64> = self
            .file
            .symbols
            .iter()
            .filter_map(|s| s.weight.map(|w| (s.id.clone(), w)))
            .collect();
        if let Some(overrides) = self.file.weights.get(profile) {
            for (id, w) in overrides {
                table.insert(id.clone(), *w);
            }
        }
        table
    }

    pub fn file(&self) -> &GrammarFile {
        &self.file
    }

    /// Check a tree against the grammar: known symbols, field names, arity,
    /// child types and terminal kinds
    pub fn check_tree(&self, tree: &TreeNode) -> Result<()> {
        for (path, node) in tree.walk() {
            let symbol = self.require(&node.symbol)?;
            let at = |msg: String| Error::Other(format!("{} at {}: {}", node.symbol, path, msg));

            for param in &symbol.params {
                let count = node.children.iter().filter(|c| c.field == param.name).count();
                if count < param.required() {
                    return Err(at(format!("'{}' needs {} children, has {}", param.name, param.required(), count)));
                }
                if param.capacity().is_some_and(|cap| count > cap) {
                    return Err(at(format!("'{}' has too many children ({})", param.name, count)));
                }
            }
            for child in &node.children {
                let param = symbol
                    .param_named(&child.field)
                    .ok_or_else(|| at(format!("unknown field '{}'", child.field)))?;
                let child_symbol = self.require(&child.node.symbol)?;
                if !self.is_assignable(&child_symbol.returns, &param.accepts) {
                    return Err(at(format!(
                        "'{}' expects {}, got {} ({})",
                        param.name, param.accepts, child_symbol.id, child_symbol.returns
                    )));
                }
            }
            for terminal in &symbol.terminals {
                match node.values.get(&terminal.name) {
                    Some(v) if terminal.kind.accepts(v) => {}
                    Some(v) => return Err(at(format!("'{}' holds mismatched value {}", terminal.name, v))),
                    None => return Err(at(format!("missing terminal '{}'", terminal.name))),
                }
            }
        }
        Ok(())
    }
}

/// 2^63, the first float outside `i64`
const I64_SPAN: f64 = 9_223_372_036_854_775_808.0;

fn check_range(symbol: &Symbol, terminal: &TerminalDescriptor, [lo, hi]: [f64; 2]) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::GrammarInvalid(format!(
            "{}.{}: range [{}, {}] {}",
            symbol.id, terminal.name, lo, hi, reason
        )))
    };
    if !lo.is_finite() || !hi.is_finite() {
        return invalid("has a non-finite bound");
    }
    if lo > hi {
        return invalid("is reversed");
    }
    if !(hi - lo).is_finite() {
        return invalid("is wider than a float can hold");
    }
    if terminal.kind == TerminalKind::Int {
        if lo < -I64_SPAN || hi >= I64_SPAN {
            return invalid("does not fit a 64-bit integer");
        }
        if lo.ceil() > hi.floor() {
            return invalid("contains no integer");
        }
    }
    Ok(())
}

fn close_supertypes(
    declared: &BTreeSet<String>,
    edges: &BTreeMap<String, Vec<String>>,
) -> HashMap<String, BTreeSet<String>> {
    let mut closure = HashMap::new();
    for ty in declared {
        let mut seen = BTreeSet::new();
        let mut stack = vec![ty.clone()];
        while let Some(current) = stack.pop() {
            if seen.insert(current.clone()) {
                if let Some(supers) = edges.get(&current) {
                    stack.extend(supers.iter().cloned());
                }
            }
        }
        closure.insert(ty.clone(), seen);
    }
    closure
}

fn compute_bounds(symbols: &[Symbol], producers: &HashMap<String, Vec<usize>>) -> Result<Vec<SymbolBounds>> {
    const UNKNOWN: usize = usize::MAX;
    let mut size = vec![UNKNOWN; symbols.len()];
    let mut depth = vec![UNKNOWN; symbols.len()];

    let mut changed = true;
    while changed {
        changed = false;
        for (i, symbol) in symbols.iter().enumerate() {
            let mut total = 1usize;
            let mut deepest = 0usize;
            let mut complete = true;
            for param in &symbol.params {
                let required = param.required();
                if required == 0 {
                    continue;
                }
                let options = producers.get(&param.accepts).map(Vec::as_slice).unwrap_or(&[]);
                let best_size = options.iter().map(|&j| size[j]).min().unwrap_or(UNKNOWN);
                let best_depth = options.iter().map(|&j| depth[j]).min().unwrap_or(UNKNOWN);
                if best_size == UNKNOWN {
                    complete = false;
                    break;
                }
                total = total.saturating_add(best_size.saturating_mul(required));
                deepest = deepest.max(best_depth);
            }
            if complete {
                let d = deepest + 1;
                if total < size[i] || d < depth[i] {
                    size[i] = size[i].min(total);
                    depth[i] = depth[i].min(d);
                    changed = true;
                }
            }
        }
    }

    let mut bounds = Vec::with_capacity(symbols.len());
    for (i, symbol) in symbols.iter().enumerate() {
        if size[i] == UNKNOWN {
            return Err(Error::GrammarInvalid(format!(
                "symbol '{}' can never be completed",
                symbol.id
            )));
        }
        bounds.push(SymbolBounds {
            min_size: size[i],
            min_depth: depth[i],
        });
    }
    Ok(bounds)
}
