//! Requirement engine
//!
//! Templates become [`Requirement`]s once they are anchored at a node under
//! construction. A requirement points at one node of its template
//! (`position`) and, for templates with several children, remembers how
//! many of those children have already been matched left to right (`ltr`).
//!
//! Antipatterns are hard: a symbol that would complete one is rejected, and
//! once all but the last template child have been matched, every remaining
//! child slot must avoid the last one. Patterns are soft: they are handed
//! to one child slot at a time, and their degree of freedom counts the
//! slots that could still take them.

use crate::config::PatternConfig;
use crate::error::Result;
use crate::grammar::{Grammar, Symbol};
use crate::template::{PatternTemplate, TemplateKind, TemplateNode};
use crate::tree::{NodePath, SlotRef, TreeNode, Value};
use rand::{Rng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_REQUIREMENT: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_REQUIREMENT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequirementKind {
    /// Should match somewhere at or below the anchor
    Pattern,
    /// Must never match
    Antipattern,
    /// A terminal of this node must not hold the value
    ValueRestricted { key: String, value: Value },
    /// A terminal of this node must hold the value
    ValueRequired { key: String, value: Value },
    /// A read of this slot has no preceding write
    DataWrite { slot: SlotRef },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStatus {
    Open,
    Satisfied,
    Failed,
}

/// Active template instance
#[derive(Debug, Clone)]
pub struct Requirement {
    pub id: u64,
    pub kind: RequirementKind,
    pub template: Option<Arc<PatternTemplate>>,
    /// Node of the template this requirement stands for
    pub position: Vec<usize>,
    /// Template children of that node matched so far
    pub ltr: usize,
    /// Remaining places this requirement could still be met
    pub dof: usize,
    pub status: RequirementStatus,
}

impl Requirement {
    /// Requirement for the whole template, anchored at its root
    pub fn anchored(template: Arc<PatternTemplate>) -> Self {
        Self::at(template, Vec::new())
    }

    /// Requirement for one node of the template
    pub fn at(template: Arc<PatternTemplate>, position: Vec<usize>) -> Self {
        let kind = match template.kind {
            TemplateKind::Pattern => RequirementKind::Pattern,
            TemplateKind::Antipattern => RequirementKind::Antipattern,
        };
        Self {
            id: next_id(),
            kind,
            template: Some(template),
            position,
            ltr: 0,
            dof: 1,
            status: RequirementStatus::Open,
        }
    }

    pub fn value_restricted(key: impl Into<String>, value: Value, template: Option<Arc<PatternTemplate>>) -> Self {
        Self::auxiliary(RequirementKind::ValueRestricted { key: key.into(), value }, template)
    }

    pub fn value_required(key: impl Into<String>, value: Value, template: Option<Arc<PatternTemplate>>) -> Self {
        Self::auxiliary(RequirementKind::ValueRequired { key: key.into(), value }, template)
    }

    pub fn data_write(slot: SlotRef) -> Self {
        let mut req = Self::auxiliary(RequirementKind::DataWrite { slot }, None);
        req.dof = 0;
        req
    }

    fn auxiliary(kind: RequirementKind, template: Option<Arc<PatternTemplate>>) -> Self {
        Self {
            id: next_id(),
            kind,
            template,
            position: Vec::new(),
            ltr: 0,
            dof: 1,
            status: RequirementStatus::Open,
        }
    }

    fn child(&self, index: usize) -> Option<Self> {
        let template = self.template.clone()?;
        let mut position = self.position.clone();
        position.push(index);
        Some(Self::at(template, position))
    }

    /// Same template position under a fresh id
    fn fork(&self) -> Self {
        let mut copy = self.clone();
        copy.id = next_id();
        copy
    }

    /// Template node this requirement stands for
    pub fn node(&self) -> Option<&TemplateNode> {
        self.template.as_ref()?.node_at(&self.position)
    }

    pub fn is_hard(&self) -> bool {
        matches!(
            self.kind,
            RequirementKind::Antipattern | RequirementKind::ValueRestricted { .. }
        )
    }

    /// Identity ignoring the instance id, for caching
    pub fn signature(&self) -> String {
        let template = self.template.as_ref().map(|t| t.id.as_str()).unwrap_or("-");
        let kind = match &self.kind {
            RequirementKind::Pattern => "p".to_string(),
            RequirementKind::Antipattern => "a".to_string(),
            RequirementKind::ValueRestricted { key, value } => format!("vr:{}={}", key, value),
            RequirementKind::ValueRequired { key, value } => format!("vq:{}={}", key, value),
            RequirementKind::DataWrite { slot } => format!("dw:{}", slot),
        };
        format!("{}:{}:{:?}:{}:{}", kind, template, self.position, self.ltr, self.dof)
    }
}

/// Requirements live at one construction point
#[derive(Debug, Clone, Default)]
pub struct RequirementInformation {
    requirements: Vec<Requirement>,
}

impl RequirementInformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, requirement: Requirement) -> u64 {
        let id = requirement.id;
        self.requirements.push(requirement);
        id
    }

    pub fn add_degree_of_freedom(&mut self, id: u64, amount: usize) {
        if let Some(r) = self.requirements.iter_mut().find(|r| r.id == id) {
            r.dof += amount;
        }
    }

    /// Mark satisfied and remove
    pub fn fulfill(&mut self, id: u64) -> Option<Requirement> {
        let index = self.requirements.iter().position(|r| r.id == id)?;
        let mut r = self.requirements.remove(index);
        r.status = RequirementStatus::Satisfied;
        Some(r)
    }

    pub fn fail(&mut self, id: u64) {
        if let Some(r) = self.requirements.iter_mut().find(|r| r.id == id) {
            r.status = RequirementStatus::Failed;
            r.dof = 0;
        }
    }

    /// Every requirement can still be met
    pub fn fulfills_all(&self) -> bool {
        self.requirements
            .iter()
            .all(|r| r.status != RequirementStatus::Failed && r.dof > 0)
    }

    /// Requirements that cannot be met
    pub fn unmet(&self) -> usize {
        self.requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::Failed || r.dof == 0)
            .count()
    }

    /// Sum of all degrees of freedom
    pub fn degrees_of_freedom(&self) -> usize {
        self.requirements.iter().map(|r| r.dof).sum()
    }

    /// Requirements with no alternative left: they must be met here
    pub fn necessary(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements
            .iter()
            .filter(|r| r.status == RequirementStatus::Open && r.dof == 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn merge(&mut self, other: RequirementInformation) {
        self.requirements.extend(other.requirements);
    }

    /// Order-independent identity for caching
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.requirements.iter().map(Requirement::signature).collect();
        parts.sort();
        parts.join("|")
    }
}

impl FromIterator<Requirement> for RequirementInformation {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        Self {
            requirements: iter.into_iter().collect(),
        }
    }
}

/// Outcome of testing one candidate symbol against the incoming
/// requirements
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// The symbol would complete an antipattern
    pub blocked: bool,
    /// Requirements with their degrees of freedom for this symbol
    pub info: RequirementInformation,
    pub forbidden_values: Vec<(String, Value)>,
    /// Terminal assignments that must not all hold at once
    pub forbidden_combinations: Vec<BTreeMap<String, Value>>,
    pub required_values: Vec<(String, Value)>,
    /// Requirements whose template node matched the head and whose
    /// template children still need to be matched by the children
    pub partials: Vec<Requirement>,
    /// Star antipatterns handed to every child
    pub broadcast: Vec<Requirement>,
    /// Star patterns that may resolve here or in one child, with whether
    /// the inner template fits this symbol
    pub roaming: Vec<(Requirement, bool)>,
}

/// Active templates plus the propagation rules
#[derive(Debug, Clone, Default)]
pub struct RequirementEngine {
    antipatterns: Vec<Arc<PatternTemplate>>,
    patterns: Vec<Arc<PatternTemplate>>,
    /// Antipatterns enforced by restricted candidate sets instead of
    /// anchored requirements
    compiled: BTreeSet<String>,
}

impl RequirementEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate every configured template
    pub fn from_config(config: &PatternConfig, grammar: &Grammar) -> Result<Self> {
        let mut engine = Self::new();
        for entry in &config.antipatterns {
            engine.add(PatternTemplate::parse(&entry.id, TemplateKind::Antipattern, &entry.shape, grammar)?);
        }
        for entry in &config.patterns {
            let chance = entry.chance.unwrap_or(config.activation_chance);
            if chance <= 0.0 {
                log::debug!("pattern '{}' has no activation chance, skipping", entry.id);
                continue;
            }
            engine.add(
                PatternTemplate::parse(&entry.id, TemplateKind::Pattern, &entry.shape, grammar)?
                    .with_chance(chance.min(1.0)),
            );
        }
        Ok(engine)
    }

    pub fn add(&mut self, template: PatternTemplate) {
        match template.kind {
            TemplateKind::Antipattern => self.antipatterns.push(Arc::new(template)),
            TemplateKind::Pattern => self.patterns.push(Arc::new(template)),
        }
    }

    /// Stop anchoring the antipattern `id` during construction. It still
    /// counts towards [`violations`](Self::violations).
    pub fn mark_compiled(&mut self, id: &str) {
        self.compiled.insert(id.to_string());
    }

    pub fn is_compiled(&self, id: &str) -> bool {
        self.compiled.contains(id)
    }

    pub fn clear_patterns(&mut self) {
        self.patterns.clear();
    }

    pub fn antipatterns(&self) -> &[Arc<PatternTemplate>] {
        &self.antipatterns
    }

    pub fn patterns(&self) -> &[Arc<PatternTemplate>] {
        &self.patterns
    }

    /// Antipattern matches over the whole tree
    pub fn violations(&self, tree: &TreeNode) -> usize {
        crate::template::count_violations(self.antipatterns.iter().map(Arc::as_ref), tree)
    }

    /// An antipattern matches when anchored exactly at `node`
    pub fn violated_at(&self, node: &TreeNode) -> bool {
        self.antipatterns.iter().any(|t| t.root.matches_at(node))
    }

    /// Roll the activation of patterns at a construction point. `heads`
    /// are the symbols that could be placed there. At most one pattern
    /// wins; star-rooted patterns only compete at the root of a request.
    pub fn activate(&self, heads: &[&Symbol], at_root: bool, rng: &mut dyn RngCore) -> Option<Requirement> {
        let fired: Vec<&Arc<PatternTemplate>> = self
            .patterns
            .iter()
            .filter(|t| {
                if t.root.is_anywhere() {
                    at_root
                } else {
                    heads.iter().any(|s| t.root.head_accepts(&s.id))
                }
            })
            .filter(|t| rng.gen_bool(t.chance.clamp(0.0, 1.0)))
            .collect();
        if fired.is_empty() {
            return None;
        }
        let winner = fired[rng.gen_range(0..fired.len())];
        log::debug!("pattern '{}' activated ({} competing)", winner.id, fired.len());
        Some(Requirement::anchored(Arc::clone(winner)))
    }

    /// Test a candidate symbol. `slots` is the number of children the
    /// symbol could receive at this point. Fresh antipattern anchors are
    /// added for the symbol itself.
    pub fn evaluate(&self, symbol: &Symbol, incoming: &RequirementInformation, slots: usize) -> Evaluation {
        let mut eval = Evaluation::default();
        let mut work: Vec<Requirement> = incoming.iter().cloned().collect();
        work.extend(
            self.antipatterns
                .iter()
                .filter(|t| !self.compiled.contains(&t.id))
                .map(|t| Requirement::anchored(Arc::clone(t))),
        );

        while let Some(req) = work.pop() {
            match &req.kind {
                RequirementKind::ValueRestricted { key, value } => {
                    eval.forbidden_values.push((key.clone(), value.clone()));
                    eval.info.add(req);
                }
                RequirementKind::ValueRequired { key, value } => {
                    eval.required_values.push((key.clone(), value.clone()));
                    eval.info.add(req);
                }
                RequirementKind::DataWrite { .. } => {}
                RequirementKind::Antipattern => self.evaluate_antipattern(symbol, req, &mut eval, &mut work),
                RequirementKind::Pattern => Self::evaluate_pattern(symbol, req, slots, &mut eval),
            }
            if eval.blocked {
                break;
            }
        }
        eval
    }

    fn evaluate_antipattern(&self, symbol: &Symbol, req: Requirement, eval: &mut Evaluation, work: &mut Vec<Requirement>) {
        let Some(t) = req.node() else {
            return;
        };
        if t.is_anywhere() {
            match req.child(0) {
                Some(inner) => {
                    work.push(inner);
                    eval.broadcast.push(req);
                }
                // a bare star matches everything
                None => eval.blocked = true,
            }
            return;
        }
        if !t.head_accepts(&symbol.id) {
            return;
        }
        if t.values.keys().any(|k| symbol.terminal_named(k).is_none()) {
            return;
        }
        if t.children.is_empty() {
            let mut values = t.values.iter();
            match (values.next(), values.next()) {
                (None, _) => eval.blocked = true,
                (Some((key, value)), None) => {
                    let restriction = Requirement::value_restricted(key.clone(), value.clone(), req.template.clone());
                    eval.forbidden_values.push((key.clone(), value.clone()));
                    eval.info.add(restriction);
                }
                // only the terminal drawn last may be restricted
                _ => eval.forbidden_combinations.push(t.values.clone()),
            }
            return;
        }
        if symbol.max_arity().is_some_and(|max| max < t.children.len()) {
            return;
        }
        eval.info.add(req.clone());
        eval.partials.push(req);
    }

    fn evaluate_pattern(symbol: &Symbol, mut req: Requirement, slots: usize, eval: &mut Evaluation) {
        let Some(t) = req.node() else {
            return;
        };
        // places elsewhere that could still take this requirement
        let elsewhere = req.dof.saturating_sub(1);
        if t.is_anywhere() {
            let here = t.children.first().is_none_or(|c| Self::pattern_fits(c, symbol));
            req.dof = elsewhere + usize::from(here) + slots;
            eval.info.add(req.clone());
            eval.roaming.push((req, here));
            return;
        }
        if !Self::pattern_fits(t, symbol) || t.children.len() > slots {
            req.dof = elsewhere;
            if req.dof == 0 {
                req.status = RequirementStatus::Failed;
            }
            eval.info.add(req);
            return;
        }
        for (key, value) in &t.values {
            eval.required_values.push((key.clone(), value.clone()));
            eval.info.add(Requirement::value_required(key.clone(), value.clone(), req.template.clone()));
        }
        if t.children.is_empty() {
            return;
        }
        req.dof = elsewhere + slots + 1 - t.children.len();
        eval.info.add(req.clone());
        eval.partials.push(req);
    }

    fn pattern_fits(t: &TemplateNode, symbol: &Symbol) -> bool {
        t.is_anywhere()
            || (t.head_accepts(&symbol.id)
                && t.values.keys().all(|k| symbol.terminal_named(k).is_some())
                && symbol.max_arity().is_none_or(|max| max >= t.children.len()))
    }

    /// Plan the children of a node built from `eval`, with the given child
    /// field labels in order
    pub fn plan(&self, eval: Evaluation, slots: Vec<String>, rng: &mut dyn RngCore) -> NodePlan {
        let mut plan = NodePlan {
            slots,
            partials: eval.partials,
            broadcast: eval.broadcast,
            roaming: Vec::new(),
            forbidden: eval.forbidden_values,
            combinations: eval.forbidden_combinations,
            required: eval.required_values,
            outcome: RequirementInformation::new(),
        };
        for (req, here) in eval.roaming {
            plan.place_roaming(req, here, rng);
        }
        plan
    }

    /// Incoming requirements for each child of an existing node, given the
    /// node's own incoming requirements
    pub fn replay(&self, grammar: &Grammar, node: &TreeNode, incoming: &RequirementInformation) -> Replay {
        let Some(symbol) = grammar.symbol(&node.symbol) else {
            return Replay {
                evaluation: Evaluation {
                    blocked: true,
                    ..Evaluation::default()
                },
                children: vec![RequirementInformation::new(); node.children.len()],
            };
        };
        let evaluation = self.evaluate(symbol, incoming, node.children.len());
        let mut children = vec![RequirementInformation::new(); node.children.len()];

        for req in &evaluation.broadcast {
            for info in children.iter_mut() {
                info.add(req.fork());
            }
        }

        for (req, _) in &evaluation.roaming {
            let Some(t) = req.node() else {
                continue;
            };
            let here = t.children.first().is_none_or(|c| c.matches_at(node));
            if here {
                continue;
            }
            let target = node
                .children
                .iter()
                .position(|c| t.matches_at(&c.node))
                .or(if node.children.is_empty() { None } else { Some(0) });
            if let Some(i) = target {
                children[i].add(req.fork());
            }
        }

        for req in &evaluation.partials {
            let Some(t) = req.node() else {
                continue;
            };
            let mut ltr = 0;
            for (i, child) in node.children.iter().enumerate() {
                let Some(c) = t.children.get(ltr) else {
                    break;
                };
                if !c.admits_field(&child.field) {
                    continue;
                }
                // matching here would let the right siblings finish the
                // template
                if t.children_match(node, ltr + 1, i + 1) {
                    if let Some(r) = req.child(ltr) {
                        children[i].add(r);
                    }
                }
                if c.matches_at(&child.node) {
                    ltr += 1;
                }
            }
        }

        Replay { evaluation, children }
    }

    /// Incoming requirements of the node at `path`, derived from its
    /// ancestors
    pub fn requirements_at(&self, grammar: &Grammar, tree: &TreeNode, path: &NodePath) -> RequirementInformation {
        let mut incoming = RequirementInformation::new();
        let mut node = tree;
        for &i in path.indices() {
            let replay = self.replay(grammar, node, &incoming);
            incoming = replay.children.into_iter().nth(i).unwrap_or_default();
            match node.children.get(i) {
                Some(child) => node = &child.node,
                None => break,
            }
        }
        incoming
    }

    /// Requirements per node of an existing tree; `failed` marks nodes
    /// where an antipattern is anchored or completed
    pub fn load(&self, grammar: &Grammar, tree: &TreeNode) -> BTreeMap<NodePath, LoadedRequirements> {
        let mut out = BTreeMap::new();
        let mut stack = vec![(NodePath::root(), tree, RequirementInformation::new())];
        while let Some((path, node, incoming)) = stack.pop() {
            let replay = self.replay(grammar, node, &incoming);
            let forbidden_hit = replay
                .evaluation
                .forbidden_values
                .iter()
                .any(|(k, v)| node.values.get(k) == Some(v))
                || replay
                    .evaluation
                    .forbidden_combinations
                    .iter()
                    .any(|combo| combo.iter().all(|(k, v)| node.values.get(k) == Some(v)));
            let failed = replay.evaluation.blocked || forbidden_hit || self.violated_at(node);
            for (i, (child, info)) in node.children.iter().zip(replay.children).enumerate() {
                stack.push((path.child(i), &child.node, info));
            }
            out.insert(
                path,
                LoadedRequirements {
                    info: replay.evaluation.info,
                    failed,
                },
            );
        }
        out
    }
}

/// Child requirements derived from an existing node
#[derive(Debug, Clone)]
pub struct Replay {
    pub evaluation: Evaluation,
    pub children: Vec<RequirementInformation>,
}

/// Requirements of one node of an existing tree
#[derive(Debug, Clone, Default)]
pub struct LoadedRequirements {
    pub info: RequirementInformation,
    pub failed: bool,
}

/// Per-child bookkeeping while the children of one node are built
#[derive(Debug, Clone)]
pub struct NodePlan {
    slots: Vec<String>,
    partials: Vec<Requirement>,
    broadcast: Vec<Requirement>,
    roaming: Vec<(usize, Requirement)>,
    forbidden: Vec<(String, Value)>,
    combinations: Vec<BTreeMap<String, Value>>,
    required: Vec<(String, Value)>,
    outcome: RequirementInformation,
}

impl NodePlan {
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn forbidden_values(&self) -> &[(String, Value)] {
        &self.forbidden
    }

    /// Values `terminal` must avoid once the terminals in `chosen` are set:
    /// the plain restrictions plus the last missing member of any
    /// forbidden combination
    pub fn forbidden_for(&self, terminal: &str, chosen: &BTreeMap<String, Value>) -> Vec<&Value> {
        let plain = self.forbidden.iter().filter(|(k, _)| k == terminal).map(|(_, v)| v);
        let completing = self.combinations.iter().filter_map(|combo| {
            let value = combo.get(terminal)?;
            combo
                .iter()
                .filter(|(k, _)| k.as_str() != terminal)
                .all(|(k, v)| chosen.get(k) == Some(v))
                .then_some(value)
        });
        plain.chain(completing).collect()
    }

    pub fn required_values(&self) -> &[(String, Value)] {
        &self.required
    }

    fn place_roaming(&mut self, mut req: Requirement, here: bool, rng: &mut dyn RngCore) {
        let Some(t) = req.node() else {
            return;
        };
        let options = usize::from(here) + self.slots.len();
        if t.children.is_empty() {
            // a bare star is met by any node
            self.outcome.add(req);
            return;
        }
        if options == 0 {
            req.status = RequirementStatus::Failed;
            req.dof = 0;
            self.outcome.add(req);
            return;
        }
        let pick = rng.gen_range(0..options);
        if here && pick == 0 {
            if let Some(resolved) = req.child(0) {
                self.resolve_here(resolved);
            }
        } else {
            let slot = pick - usize::from(here);
            req.dof = 1;
            self.roaming.push((slot, req));
        }
    }

    /// A star pattern chose this node: apply its inner template here
    fn resolve_here(&mut self, req: Requirement) {
        let Some(t) = req.node() else {
            return;
        };
        for (key, value) in &t.values {
            self.required.push((key.clone(), value.clone()));
        }
        if t.children.is_empty() {
            self.outcome.add(req);
        } else {
            self.partials.push(req);
        }
    }

    /// Drop partials whose template values disagree with the chosen
    /// terminal values
    pub fn settle_values(&mut self, values: &BTreeMap<String, Value>) {
        let mut kept = Vec::with_capacity(self.partials.len());
        for mut req in self.partials.drain(..) {
            let agrees = req.node().is_some_and(|t| t.values_match(values));
            if agrees {
                kept.push(req);
            } else if req.kind == RequirementKind::Pattern {
                req.status = RequirementStatus::Failed;
                req.dof = 0;
                self.outcome.add(req);
            }
        }
        self.partials = kept;
    }

    /// Whether template children `from..` can still be placed, in order,
    /// on slots `start..`
    fn fits(&self, t: &TemplateNode, from: usize, start: usize) -> bool {
        let mut want = from;
        for field in self.slots.iter().skip(start) {
            match t.children.get(want) {
                Some(c) if c.admits_field(field) => want += 1,
                Some(_) => {}
                None => break,
            }
        }
        want >= t.children.len()
    }

    /// Requirements for the child about to be built in `slot`
    pub fn child_requirements(&mut self, slot: usize, rng: &mut dyn RngCore) -> RequirementInformation {
        let mut info = RequirementInformation::new();
        let Some(field) = self.slots.get(slot).cloned() else {
            return info;
        };

        for req in &self.broadcast {
            info.add(req.fork());
        }
        for (target, req) in &self.roaming {
            if *target == slot {
                info.add(req.fork());
            }
        }

        let mut kept = Vec::with_capacity(self.partials.len());
        for mut req in std::mem::take(&mut self.partials) {
            let Some(t) = req.node().cloned() else {
                continue;
            };
            if !self.fits(&t, req.ltr, slot) {
                // cannot complete any more: avoided, or failed
                if req.kind == RequirementKind::Pattern {
                    req.status = RequirementStatus::Failed;
                    req.dof = 0;
                    self.outcome.add(req);
                }
                continue;
            }
            let Some(c) = t.children.get(req.ltr) else {
                continue;
            };
            if c.admits_field(&field) {
                match req.kind {
                    RequirementKind::Antipattern if req.ltr + 1 == t.children.len() => {
                        if let Some(r) = req.child(req.ltr) {
                            info.add(r);
                        }
                    }
                    RequirementKind::Pattern if self.fits(&t, req.ltr + 1, slot + 1) => {
                        // later slots that could take this template child
                        let options = (slot..self.slots.len())
                            .filter(|&s| c.admits_field(&self.slots[s]) && self.fits(&t, req.ltr + 1, s + 1))
                            .count()
                            .max(1);
                        if options == 1 || rng.gen_range(0..options) == 0 {
                            if let Some(mut r) = req.child(req.ltr) {
                                r.dof = options;
                                info.add(r);
                            }
                        }
                    }
                    _ => {}
                }
            }
            kept.push(req);
        }
        self.partials = kept;
        info
    }

    /// Record the finished child in `slot`. Returns false when the child
    /// completed an antipattern of this node.
    pub fn observe(&mut self, slot: usize, child: &TreeNode) -> bool {
        let Some(field) = self.slots.get(slot).cloned() else {
            return true;
        };
        let mut clean = true;

        let mut roaming = Vec::with_capacity(self.roaming.len());
        for (target, req) in std::mem::take(&mut self.roaming) {
            if target != slot {
                roaming.push((target, req));
                continue;
            }
            let met = req.node().is_some_and(|t| t.matches_at(child));
            let mut done = req;
            done.status = if met {
                RequirementStatus::Satisfied
            } else {
                RequirementStatus::Failed
            };
            if !met {
                done.dof = 0;
            }
            self.outcome.add(done);
        }
        self.roaming = roaming;

        let mut kept = Vec::with_capacity(self.partials.len());
        for mut req in std::mem::take(&mut self.partials) {
            let Some(t) = req.node() else {
                continue;
            };
            let total = t.children.len();
            let advanced = t
                .children
                .get(req.ltr)
                .is_some_and(|c| c.admits_field(&field) && c.matches_at(child));
            if advanced {
                req.ltr += 1;
            }
            if req.ltr >= total {
                match req.kind {
                    RequirementKind::Antipattern => {
                        clean = false;
                    }
                    _ => {
                        req.status = RequirementStatus::Satisfied;
                        self.outcome.add(req);
                    }
                }
                continue;
            }
            kept.push(req);
        }
        self.partials = kept;
        clean
    }

    /// Soft outcome once all children exist: patterns still pending are
    /// failed
    pub fn finish(mut self) -> RequirementInformation {
        for (_, mut req) in self.roaming.drain(..) {
            req.status = RequirementStatus::Failed;
            req.dof = 0;
            self.outcome.add(req);
        }
        for mut req in self.partials.drain(..) {
            if req.kind == RequirementKind::Pattern {
                req.status = RequirementStatus::Failed;
                req.dof = 0;
                self.outcome.add(req);
            }
        }
        self.outcome
    }
}
