//! Terminal value strategies
//!
//! One strategy per [`TerminalKind`]; descriptors listing explicit values
//! are served by [`KnownValueStrategy`] regardless of their kind.

use super::CreationInformation;
use crate::grammar::{Grammar, Symbol, SymbolKind, TerminalDescriptor, TerminalKind};
use crate::tree::{SlotRef, Value};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::fmt;

/// Draws attempted before an open domain gives up on avoiding forbidden
/// values
const SAMPLE_ATTEMPTS: usize = 16;

pub trait TerminalStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> TerminalKind;

    /// Every value the strategy could produce, for finite domains
    fn domain(&self, _descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation) -> Option<Vec<Value>> {
        None
    }

    /// Draw one value
    fn sample(&self, descriptor: &TerminalDescriptor, symbol: &Symbol, info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value>;

    /// Whether `value` lies in the strategy's domain
    fn admits(&self, descriptor: &TerminalDescriptor, value: &Value) -> bool {
        descriptor.kind.accepts(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntRangeStrategy {
    default_range: (i64, i64),
}

impl Default for IntRangeStrategy {
    fn default() -> Self {
        Self { default_range: (0, 10) }
    }
}

impl IntRangeStrategy {
    fn range(&self, descriptor: &TerminalDescriptor) -> (i64, i64) {
        match descriptor.range {
            Some([lo, hi]) => (lo.ceil() as i64, hi.floor() as i64),
            None => self.default_range,
        }
    }
}

impl TerminalStrategy for IntRangeStrategy {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Int
    }

    fn domain(&self, descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation) -> Option<Vec<Value>> {
        let (lo, hi) = self.range(descriptor);
        // small ranges are enumerated so forbidden values can be excluded exactly
        if hi >= lo && (hi as i128 - lo as i128) < 64 {
            Some((lo..=hi).map(Value::Int).collect())
        } else {
            None
        }
    }

    fn sample(&self, descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value> {
        let (lo, hi) = self.range(descriptor);
        (hi >= lo).then(|| Value::Int(rng.gen_range(lo..=hi)))
    }

    fn admits(&self, descriptor: &TerminalDescriptor, value: &Value) -> bool {
        let (lo, hi) = self.range(descriptor);
        matches!(value, Value::Int(v) if (lo..=hi).contains(v))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FloatRangeStrategy {
    default_range: (f64, f64),
}

impl Default for FloatRangeStrategy {
    fn default() -> Self {
        Self { default_range: (0.0, 1.0) }
    }
}

impl FloatRangeStrategy {
    fn range(&self, descriptor: &TerminalDescriptor) -> (f64, f64) {
        descriptor.range.map(|[lo, hi]| (lo, hi)).unwrap_or(self.default_range)
    }
}

impl TerminalStrategy for FloatRangeStrategy {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Float
    }

    fn sample(&self, descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value> {
        let (lo, hi) = self.range(descriptor);
        if !(hi - lo).is_finite() {
            None
        } else if hi > lo {
            Some(Value::Float(rng.gen_range(lo..hi)))
        } else if hi == lo {
            Some(Value::Float(lo))
        } else {
            None
        }
    }

    fn admits(&self, descriptor: &TerminalDescriptor, value: &Value) -> bool {
        let (lo, hi) = self.range(descriptor);
        matches!(value, Value::Float(v) if *v >= lo && *v <= hi)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolStrategy;

impl TerminalStrategy for BoolStrategy {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Bool
    }

    fn domain(&self, _descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation) -> Option<Vec<Value>> {
        Some(vec![Value::Bool(false), Value::Bool(true)])
    }

    fn sample(&self, _descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value> {
        Some(Value::Bool(rng.gen_bool(0.5)))
    }
}

/// Picks from the values listed on the descriptor; text terminals without
/// a list produce the empty string
#[derive(Debug, Clone, Copy, Default)]
pub struct KnownValueStrategy;

impl TerminalStrategy for KnownValueStrategy {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Text
    }

    fn domain(&self, descriptor: &TerminalDescriptor, _symbol: &Symbol, _info: &CreationInformation) -> Option<Vec<Value>> {
        if descriptor.values.is_empty() {
            Some(vec![Value::Text(String::new())])
        } else {
            Some(descriptor.values.clone())
        }
    }

    fn sample(&self, descriptor: &TerminalDescriptor, symbol: &Symbol, info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value> {
        let domain = self.domain(descriptor, symbol, info)?;
        if domain.is_empty() {
            return None;
        }
        Some(domain[rng.gen_range(0..domain.len())].clone())
    }

    fn admits(&self, descriptor: &TerminalDescriptor, value: &Value) -> bool {
        if descriptor.values.is_empty() {
            descriptor.kind.accepts(value)
        } else {
            descriptor.values.contains(value)
        }
    }
}

/// Storage slots: reads only see slots written earlier, writes may target
/// any declared slot
#[derive(Debug, Clone, Default)]
pub struct StorageSlotStrategy {
    slots: Vec<SlotRef>,
}

impl StorageSlotStrategy {
    pub fn new(slots: Vec<SlotRef>) -> Self {
        Self { slots }
    }
}

impl TerminalStrategy for StorageSlotStrategy {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Slot
    }

    fn domain(&self, _descriptor: &TerminalDescriptor, symbol: &Symbol, info: &CreationInformation) -> Option<Vec<Value>> {
        let slots = if symbol.is(SymbolKind::Read) {
            info.available.slots()
        } else {
            self.slots.clone()
        };
        Some(slots.into_iter().map(Value::Slot).collect())
    }

    fn sample(&self, descriptor: &TerminalDescriptor, symbol: &Symbol, info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Value> {
        let domain = self.domain(descriptor, symbol, info)?;
        if domain.is_empty() {
            return None;
        }
        Some(domain[rng.gen_range(0..domain.len())].clone())
    }

    fn admits(&self, _descriptor: &TerminalDescriptor, value: &Value) -> bool {
        value.as_slot().is_some_and(|s| self.slots.contains(s))
    }
}

/// Registry of terminal strategies by kind
#[derive(Debug)]
pub struct TerminalStrategies {
    by_kind: HashMap<TerminalKind, Box<dyn TerminalStrategy>>,
    known: KnownValueStrategy,
}

impl TerminalStrategies {
    /// Default strategies; slots come from the grammar's storage
    pub fn for_grammar(grammar: &Grammar) -> Self {
        let mut by_kind: HashMap<TerminalKind, Box<dyn TerminalStrategy>> = HashMap::new();
        by_kind.insert(TerminalKind::Int, Box::new(IntRangeStrategy::default()));
        by_kind.insert(TerminalKind::Float, Box::new(FloatRangeStrategy::default()));
        by_kind.insert(TerminalKind::Bool, Box::new(BoolStrategy));
        by_kind.insert(TerminalKind::Text, Box::new(KnownValueStrategy));
        by_kind.insert(TerminalKind::Slot, Box::new(StorageSlotStrategy::new(grammar.slots())));
        Self {
            by_kind,
            known: KnownValueStrategy,
        }
    }

    /// Replace the strategy serving its kind
    pub fn register(&mut self, strategy: Box<dyn TerminalStrategy>) {
        self.by_kind.insert(strategy.kind(), strategy);
    }

    fn strategy_for(&self, descriptor: &TerminalDescriptor) -> Option<&dyn TerminalStrategy> {
        if !descriptor.values.is_empty() {
            return Some(&self.known as &dyn TerminalStrategy);
        }
        self.by_kind.get(&descriptor.kind).map(Box::as_ref)
    }

    /// Whether some value other than `forbidden` remains for the terminal
    pub fn can_fill(&self, descriptor: &TerminalDescriptor, symbol: &Symbol, info: &CreationInformation, forbidden: &[&Value]) -> bool {
        let Some(strategy) = self.strategy_for(descriptor) else {
            return false;
        };
        match strategy.domain(descriptor, symbol, info) {
            Some(domain) => domain.iter().any(|v| !forbidden.contains(&v)),
            None => true,
        }
    }

    /// Pick a value for one terminal. A `required` value wins when the
    /// terminal admits it and it is not forbidden.
    pub fn value_for(
        &self,
        descriptor: &TerminalDescriptor,
        symbol: &Symbol,
        info: &CreationInformation,
        required: Option<&Value>,
        forbidden: &[&Value],
        rng: &mut dyn RngCore,
    ) -> Option<Value> {
        let strategy = self.strategy_for(descriptor)?;
        if let Some(value) = required {
            let usable = strategy.admits(descriptor, value)
                && !forbidden.contains(&value)
                && strategy
                    .domain(descriptor, symbol, info)
                    .is_none_or(|d| d.contains(value));
            if usable {
                return Some(value.clone());
            }
        }
        if let Some(domain) = strategy.domain(descriptor, symbol, info) {
            let open: Vec<&Value> = domain.iter().filter(|v| !forbidden.contains(v)).collect();
            if open.is_empty() {
                return None;
            }
            return Some(open[rng.gen_range(0..open.len())].clone());
        }
        for _ in 0..SAMPLE_ATTEMPTS {
            let value = strategy.sample(descriptor, symbol, info, rng)?;
            if !forbidden.contains(&&value) {
                return Some(value);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreationConfiguration;
    use crate::grammar::tests::arithmetic;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn info() -> CreationInformation {
        CreationInformation::new("Int", CreationConfiguration::default())
    }

    #[test]
    fn test_int_range_respects_descriptor() {
        let g = arithmetic();
        let terminals = TerminalStrategies::for_grammar(&g);
        let constant = g.symbol("Const").unwrap();
        let descriptor = constant.terminal_named("value").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let v = terminals.value_for(descriptor, constant, &info(), None, &[], &mut rng).unwrap();
            assert!(matches!(v, Value::Int(0..=9)));
        }
    }

    #[test]
    fn test_forbidden_values_are_avoided() {
        let g = arithmetic();
        let terminals = TerminalStrategies::for_grammar(&g);
        let constant = g.symbol("Const").unwrap();
        let descriptor = constant.terminal_named("value").unwrap();
        let zero = Value::Int(0);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let v = terminals.value_for(descriptor, constant, &info(), None, &[&zero], &mut rng).unwrap();
            assert_ne!(v, zero);
        }
        let all: Vec<Value> = (0..=9).map(Value::Int).collect();
        let all_refs: Vec<&Value> = all.iter().collect();
        assert!(!terminals.can_fill(descriptor, constant, &info(), &all_refs));
    }

    #[test]
    fn test_wide_ranges_sample_in_bounds() {
        let yaml = "root: T\nsymbols:\n  - id: Leaf\n    returns: T\n    terminals:\n      - { name: i, kind: int, range: [-9.0e18, 9.0e18] }\n      - { name: f, kind: float, range: [-1.0e300, 1.0e300] }\n";
        let g = Grammar::from_yaml(yaml).unwrap();
        let terminals = TerminalStrategies::for_grammar(&g);
        let leaf = g.symbol("Leaf").unwrap();
        let int = leaf.terminal_named("i").unwrap();
        let float = leaf.terminal_named("f").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            match terminals.value_for(int, leaf, &info(), None, &[], &mut rng) {
                Some(Value::Int(v)) => assert!((-9_000_000_000_000_000_000..=9_000_000_000_000_000_000).contains(&v)),
                other => panic!("unexpected {:?}", other),
            }
            match terminals.value_for(float, leaf, &info(), None, &[], &mut rng) {
                Some(Value::Float(v)) => assert!(v.abs() <= 1.0e300),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_required_value_wins() {
        let g = arithmetic();
        let terminals = TerminalStrategies::for_grammar(&g);
        let constant = g.symbol("Const").unwrap();
        let descriptor = constant.terminal_named("value").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let seven = Value::Int(7);
        assert_eq!(
            terminals.value_for(descriptor, constant, &info(), Some(&seven), &[], &mut rng),
            Some(seven)
        );
        // outside the declared range: ignored
        let big = Value::Int(70);
        let v = terminals.value_for(descriptor, constant, &info(), Some(&big), &[], &mut rng).unwrap();
        assert_ne!(v, big);
    }

    #[test]
    fn test_reads_only_see_written_slots() {
        let g = arithmetic();
        let terminals = TerminalStrategies::for_grammar(&g);
        let read = g.symbol("Read").unwrap();
        let assign = g.symbol("Assign").unwrap();
        let descriptor = read.slot_terminal().unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        assert_eq!(terminals.value_for(descriptor, read, &info(), None, &[], &mut rng), None);

        let mut written = info();
        written.available.add(&SlotRef::new("main", "y"));
        for _ in 0..20 {
            let v = terminals.value_for(descriptor, read, &written, None, &[], &mut rng).unwrap();
            assert_eq!(v, Value::Slot(SlotRef::new("main", "y")));
        }

        let v = terminals
            .value_for(assign.slot_terminal().unwrap(), assign, &info(), None, &[], &mut rng)
            .unwrap();
        assert!(g.slots().contains(v.as_slot().unwrap()));
    }
}
