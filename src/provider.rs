//! Seams to the outside world
//!
//! The library never executes programs. A [`NodeFactory`] turns finished
//! trees into executable nodes, [`Describe`] lets an execution engine hand
//! its nodes back as [`TreeNode`]s, and an [`Evaluator`] scores trees.

use crate::error::{Error, Result};
use crate::grammar::{Grammar, Symbol};
use crate::identity::content_hash;
use crate::tree::{TreeNode, Value};
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Instantiation factory of an execution engine
pub trait NodeFactory {
    type Node;

    /// Build one node from its already-built children, in tree order and
    /// tagged with their parameter names
    fn instantiate(&self, symbol: &Symbol, children: Vec<(String, Self::Node)>, values: &BTreeMap<String, Value>) -> Result<Self::Node>;
}

/// Build `tree` bottom-up through `factory`
pub fn materialize<F: NodeFactory>(tree: &TreeNode, grammar: &Grammar, factory: &F) -> Result<F::Node> {
    let symbol = grammar.require(&tree.symbol)?;
    let children = tree
        .children
        .iter()
        .map(|c| materialize(&c.node, grammar, factory).map(|n| (c.field.clone(), n)))
        .collect::<Result<Vec<_>>>()?;
    factory.instantiate(symbol, children, &tree.values)
}

/// Self-description of a foreign node
pub trait Describe {
    fn symbol(&self) -> &str;

    /// Terminal values by name
    fn fields(&self) -> BTreeMap<String, Value>;

    /// Children in order, tagged with their parameter names
    fn children(&self) -> Vec<(String, &dyn Describe)>;
}

/// Convert a described node into a [`TreeNode`]. With a grammar, unknown
/// symbols are rejected.
pub fn wrap(node: &dyn Describe, grammar: Option<&Grammar>) -> Result<TreeNode> {
    if let Some(g) = grammar {
        g.require(node.symbol())?;
    }
    let mut tree = TreeNode::new(node.symbol());
    tree.values = node.fields();
    for (field, child) in node.children() {
        tree.push_child(field, wrap(child, grammar)?);
    }
    Ok(tree)
}

/// Opaque fitness of a tree
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, tree: &TreeNode) -> Result<f64>;
}

impl<F> Evaluator for F
where
    F: Fn(&TreeNode) -> Result<f64> + Send + Sync,
{
    fn evaluate(&self, tree: &TreeNode) -> Result<f64> {
        self(tree)
    }
}

/// Evaluator deduplicating structurally equal trees
pub struct CachedEvaluator<E> {
    inner: E,
    scores: Mutex<LruCache<String, f64>>,
}

impl<E: Evaluator> CachedEvaluator<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            scores: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Number of scores currently cached
    pub fn cached(&self) -> usize {
        self.scores.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<E: Evaluator> Evaluator for CachedEvaluator<E> {
    fn evaluate(&self, tree: &TreeNode) -> Result<f64> {
        let key = content_hash(tree);
        {
            let mut scores = self
                .scores
                .lock()
                .map_err(|_| Error::Other("evaluation cache poisoned".into()))?;
            if let Some(score) = scores.get(&key) {
                return Ok(*score);
            }
        }
        // failed evaluations are not cached
        let score = self.inner.evaluate(tree)?;
        if let Ok(mut scores) = self.scores.lock() {
            scores.put(key, score);
        }
        Ok(score)
    }
}

impl<E> std::fmt::Debug for CachedEvaluator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEvaluator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::tests::arithmetic;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Evaluates arithmetic trees directly
    struct Interpreter;

    impl NodeFactory for Interpreter {
        type Node = i64;

        fn instantiate(&self, symbol: &Symbol, children: Vec<(String, i64)>, values: &BTreeMap<String, Value>) -> Result<i64> {
            let arg = |i: usize| children.get(i).map(|(_, v)| *v).unwrap_or(0);
            match symbol.id.as_str() {
                "Const" => match values.get("value") {
                    Some(Value::Int(v)) => Ok(*v),
                    _ => Err(Error::Other("Const without value".into())),
                },
                "Add" => Ok(arg(0) + arg(1)),
                "Neg" => Ok(-arg(0)),
                other => Err(Error::UnknownSymbol(other.to_string())),
            }
        }
    }

    struct Foreign {
        symbol: &'static str,
        value: Option<i64>,
        children: Vec<(&'static str, Foreign)>,
    }

    impl Describe for Foreign {
        fn symbol(&self) -> &str {
            self.symbol
        }

        fn fields(&self) -> BTreeMap<String, Value> {
            self.value
                .map(|v| BTreeMap::from([("value".to_string(), Value::Int(v))]))
                .unwrap_or_default()
        }

        fn children(&self) -> Vec<(String, &dyn Describe)> {
            self.children
                .iter()
                .map(|(f, c)| (f.to_string(), c as &dyn Describe))
                .collect()
        }
    }

    fn leaf(v: i64) -> Foreign {
        Foreign {
            symbol: "Const",
            value: Some(v),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_materialize_bottom_up() {
        let g = arithmetic();
        let tree = TreeNode::parse("Add(Neg(Const[value=4]), Const[value=9])", Some(&g)).unwrap();
        assert_eq!(materialize(&tree, &g, &Interpreter).unwrap(), 5);
    }

    #[test]
    fn test_wrap_round_trips_text() {
        let g = arithmetic();
        let foreign = Foreign {
            symbol: "Add",
            value: None,
            children: vec![("left", leaf(1)), ("right", leaf(2))],
        };
        let tree = wrap(&foreign, Some(&g)).unwrap();
        assert_eq!(tree, TreeNode::parse("Add(Const[value=1], Const[value=2])", Some(&g)).unwrap());

        let unknown = Foreign {
            symbol: "Mul",
            value: None,
            children: Vec::new(),
        };
        assert!(matches!(wrap(&unknown, Some(&g)), Err(Error::UnknownSymbol(_))));
        assert!(wrap(&unknown, None).is_ok());
    }

    #[test]
    fn test_cached_evaluator_deduplicates() {
        let g = arithmetic();
        let calls = AtomicUsize::new(0);
        let eval = CachedEvaluator::new(
            |t: &TreeNode| {
                calls.fetch_add(1, Ordering::SeqCst);
                materialize(t, &g, &Interpreter).map(|v| v as f64)
            },
            8,
        );
        let a = TreeNode::parse("Add(Const[value=1], Const[value=2])", Some(&g)).unwrap();
        let b = a.clone();
        assert_eq!(eval.evaluate(&a).unwrap(), 3.0);
        assert_eq!(eval.evaluate(&b).unwrap(), 3.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(eval.cached(), 1);
    }
}
