//! Static state hierarchy: parent links, default substates and roles.
//!
//! The hierarchy is a lookup table from kind to declaration, validated
//! once when it is built. Ancestry is resolved by walking the table; no
//! state object ever constructs its own parent.

use super::state::{Role, StateKind};
use crate::builder::error::{ConfigError, HierarchyViolation};
use std::collections::{HashMap, HashSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<HierarchyViolation>>;

/// Structural declaration of one state kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration<K: StateKind> {
    pub kind: K,
    pub role: Role,
    pub parent: Option<K>,
    pub default_substate: Option<K>,
}

#[derive(Clone, Debug)]
struct Node<K> {
    role: Role,
    parent: Option<K>,
    default_substate: Option<K>,
    depth: usize,
}

/// Validated, immutable state hierarchy.
#[derive(Clone, Debug)]
pub struct Hierarchy<K: StateKind> {
    nodes: HashMap<K, Node<K>>,
    order: Vec<K>,
    root: K,
    max_depth: usize,
}

impl<K: StateKind> Hierarchy<K> {
    /// Validate declarations and build the hierarchy.
    ///
    /// Every violation is reported, not only the first one found.
    pub fn new(declarations: Vec<Declaration<K>>) -> Result<Self, ConfigError> {
        into_result(validate_declarations(&declarations))?;

        let mut nodes = HashMap::with_capacity(declarations.len());
        let mut order = Vec::with_capacity(declarations.len());
        for declaration in &declarations {
            order.push(declaration.kind);
            nodes.insert(
                declaration.kind,
                Node {
                    role: declaration.role,
                    parent: declaration.parent,
                    default_substate: declaration.default_substate,
                    depth: 0,
                },
            );
        }

        into_result(validate_ancestry(&declarations, &nodes))?;

        let mut root = None;
        let mut max_depth = 0;
        for kind in &order {
            let depth = chain(&nodes, *kind).len() - 1;
            max_depth = max_depth.max(depth);
            if let Some(node) = nodes.get_mut(kind) {
                node.depth = depth;
                if node.role == Role::Root {
                    root = Some(*kind);
                }
            }
        }
        let root = root.ok_or(ConfigError::InvalidHierarchy(vec![
            HierarchyViolation::MissingRoot,
        ]))?;

        Ok(Self {
            nodes,
            order,
            root,
            max_depth,
        })
    }

    /// The unique root kind.
    pub fn root(&self) -> K {
        self.root
    }

    /// Whether the kind is declared.
    pub fn contains(&self, kind: K) -> bool {
        self.nodes.contains_key(&kind)
    }

    /// All declared kinds in declaration order.
    pub fn kinds(&self) -> &[K] {
        &self.order
    }

    pub fn role(&self, kind: K) -> Result<Role, ConfigError> {
        Ok(self.node(kind)?.role)
    }

    pub fn parent(&self, kind: K) -> Result<Option<K>, ConfigError> {
        Ok(self.node(kind)?.parent)
    }

    pub fn default_substate(&self, kind: K) -> Result<Option<K>, ConfigError> {
        Ok(self.node(kind)?.default_substate)
    }

    /// Distance from the root; the root has depth zero.
    pub fn depth(&self, kind: K) -> Result<usize, ConfigError> {
        Ok(self.node(kind)?.depth)
    }

    /// Depth of the deepest declared state.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Ancestry of `kind`, from itself up to and including the root.
    pub fn branch(&self, kind: K) -> Result<Vec<K>, ConfigError> {
        self.node(kind)?;
        Ok(chain(&self.nodes, kind))
    }

    /// Whether `ancestor` appears in the branch of `kind` (inclusive).
    pub fn is_within(&self, kind: K, ancestor: K) -> Result<bool, ConfigError> {
        Ok(self.branch(kind)?.contains(&ancestor))
    }

    /// Fail unless `kind` may be an entity's current state.
    pub fn ensure_leaf(&self, kind: K) -> Result<Role, ConfigError> {
        let role = self.role(kind)?;
        if role.is_leaf() {
            Ok(role)
        } else {
            Err(ConfigError::NotActivatable {
                state: kind.name().to_string(),
                role: role.to_string(),
            })
        }
    }

    fn node(&self, kind: K) -> Result<&Node<K>, ConfigError> {
        self.nodes
            .get(&kind)
            .ok_or_else(|| ConfigError::UnknownState(kind.name().to_string()))
    }
}

/// Walk parent links; only called on validated, acyclic tables.
fn chain<K: StateKind>(nodes: &HashMap<K, Node<K>>, kind: K) -> Vec<K> {
    let mut branch = vec![kind];
    let mut current = nodes.get(&kind).and_then(|node| node.parent);
    while let Some(parent) = current {
        if branch.len() > nodes.len() {
            break;
        }
        branch.push(parent);
        current = nodes.get(&parent).and_then(|node| node.parent);
    }
    branch
}

fn check(ok: bool, violation: impl FnOnce() -> HierarchyViolation) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation())
    }
}

fn into_result(validation: Check) -> Result<(), ConfigError> {
    match validation {
        Validation::Success(()) => Ok(()),
        Validation::Failure(violations) => Err(ConfigError::InvalidHierarchy(
            violations.iter().cloned().collect(),
        )),
    }
}

/// Per-declaration checks that need no ancestry walk.
fn validate_declarations<K: StateKind>(declarations: &[Declaration<K>]) -> Check {
    let roles: HashMap<K, Role> = declarations.iter().map(|d| (d.kind, d.role)).collect();
    let mut checks: Vec<Check> = Vec::new();

    let roots: Vec<String> = declarations
        .iter()
        .filter(|d| d.role == Role::Root)
        .map(|d| d.kind.name().to_string())
        .collect();
    checks.push(check(!roots.is_empty(), || HierarchyViolation::MissingRoot));
    checks.push(check(roots.len() <= 1, || HierarchyViolation::MultipleRoots {
        states: roots.clone(),
    }));

    let mut seen = HashSet::new();
    for declaration in declarations {
        let state = declaration.kind.name().to_string();

        checks.push(check(seen.insert(declaration.kind), || {
            HierarchyViolation::DuplicateState {
                state: state.clone(),
            }
        }));

        match (declaration.role, declaration.parent) {
            (Role::Root, Some(_)) => checks.push(Validation::fail(
                HierarchyViolation::RootWithParent {
                    state: state.clone(),
                },
            )),
            (Role::Root, None) => {}
            (_, None) => checks.push(Validation::fail(HierarchyViolation::MissingParent {
                state: state.clone(),
            })),
            (_, Some(parent)) => {
                let parent_name = parent.name().to_string();
                match roles.get(&parent) {
                    None => checks.push(Validation::fail(HierarchyViolation::UnknownParent {
                        state: state.clone(),
                        parent: parent_name,
                    })),
                    Some(role) => checks.push(check(role.can_have_substates(), || {
                        HierarchyViolation::LeafParent {
                            state: state.clone(),
                            parent: parent_name,
                            role: role.to_string(),
                        }
                    })),
                }
            }
        }

        match (declaration.role.can_have_substates(), declaration.default_substate) {
            (true, None) => checks.push(Validation::fail(HierarchyViolation::MissingDefault {
                state: state.clone(),
            })),
            (true, Some(default)) => checks.push(check(roles.contains_key(&default), || {
                HierarchyViolation::UnknownDefault {
                    state: state.clone(),
                    default: default.name().to_string(),
                }
            })),
            (false, Some(_)) => checks.push(Validation::fail(
                HierarchyViolation::UnexpectedDefault {
                    state: state.clone(),
                },
            )),
            (false, None) => {}
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Checks that walk parent links: acyclicity and default placement.
fn validate_ancestry<K: StateKind>(
    declarations: &[Declaration<K>],
    nodes: &HashMap<K, Node<K>>,
) -> Check {
    let mut checks: Vec<Check> = Vec::new();
    let mut cyclic = HashSet::new();

    for declaration in declarations {
        let mut visited = HashSet::from([declaration.kind]);
        let mut current = declaration.parent;
        let mut is_cyclic = false;
        while let Some(parent) = current {
            if !visited.insert(parent) {
                is_cyclic = true;
                break;
            }
            current = nodes.get(&parent).and_then(|node| node.parent);
        }
        if is_cyclic {
            cyclic.insert(declaration.kind);
        }
        checks.push(check(!is_cyclic, || HierarchyViolation::Cycle {
            state: declaration.kind.name().to_string(),
        }));
    }

    for declaration in declarations {
        let Some(default) = declaration.default_substate else {
            continue;
        };
        if cyclic.contains(&default) {
            continue;
        }
        let below = default != declaration.kind && chain(nodes, default).contains(&declaration.kind);
        checks.push(check(below, || HierarchyViolation::DefaultOutsideSubtree {
            state: declaration.kind.name().to_string(),
            default: default.name().to_string(),
        }));
    }

    Validation::all_vec(checks).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum Order {
        Root,
        Open,
        New,
        Paid,
        Closed,
        Shipped,
        Cancelled,
    }

    impl StateKind for Order {
        fn name(&self) -> &str {
            match self {
                Self::Root => "Root",
                Self::Open => "Open",
                Self::New => "New",
                Self::Paid => "Paid",
                Self::Closed => "Closed",
                Self::Shipped => "Shipped",
                Self::Cancelled => "Cancelled",
            }
        }
    }

    fn declare(kind: Order, role: Role, parent: Option<Order>, default: Option<Order>) -> Declaration<Order> {
        Declaration {
            kind,
            role,
            parent,
            default_substate: default,
        }
    }

    fn order_declarations() -> Vec<Declaration<Order>> {
        vec![
            declare(Order::Root, Role::Root, None, Some(Order::Open)),
            declare(Order::Open, Role::Composite, Some(Order::Root), Some(Order::New)),
            declare(Order::New, Role::Simple, Some(Order::Open), None),
            declare(Order::Paid, Role::Simple, Some(Order::Open), None),
            declare(Order::Closed, Role::Composite, Some(Order::Root), Some(Order::Shipped)),
            declare(Order::Shipped, Role::Simple, Some(Order::Closed), None),
            declare(Order::Cancelled, Role::Final, Some(Order::Closed), None),
        ]
    }

    fn violations(result: Result<Hierarchy<Order>, ConfigError>) -> Vec<HierarchyViolation> {
        match result {
            Err(ConfigError::InvalidHierarchy(violations)) => violations,
            other => panic!("Expected invalid hierarchy, got {other:?}"),
        }
    }

    #[test]
    fn branch_runs_from_state_to_root() {
        let hierarchy = Hierarchy::new(order_declarations()).unwrap();

        assert_eq!(
            hierarchy.branch(Order::Paid).unwrap(),
            vec![Order::Paid, Order::Open, Order::Root]
        );
        assert_eq!(hierarchy.branch(Order::Root).unwrap(), vec![Order::Root]);
        assert_eq!(hierarchy.root(), Order::Root);
        assert_eq!(hierarchy.max_depth(), 2);
        assert_eq!(hierarchy.depth(Order::Closed).unwrap(), 1);
    }

    #[test]
    fn is_within_includes_the_state_itself() {
        let hierarchy = Hierarchy::new(order_declarations()).unwrap();

        assert!(hierarchy.is_within(Order::Paid, Order::Open).unwrap());
        assert!(hierarchy.is_within(Order::Paid, Order::Paid).unwrap());
        assert!(hierarchy.is_within(Order::Cancelled, Order::Root).unwrap());
        assert!(!hierarchy.is_within(Order::Paid, Order::Closed).unwrap());
        assert!(!hierarchy.is_within(Order::Open, Order::Paid).unwrap());
    }

    #[test]
    fn validation_accumulates_all_violations() {
        let declarations = vec![
            declare(Order::Open, Role::Composite, Some(Order::Root), None),
            declare(Order::New, Role::Simple, None, None),
            declare(Order::Paid, Role::Simple, Some(Order::New), Some(Order::New)),
        ];

        let found = violations(Hierarchy::new(declarations));

        assert!(found.contains(&HierarchyViolation::MissingRoot));
        assert!(found.contains(&HierarchyViolation::UnknownParent {
            state: "Open".to_string(),
            parent: "Root".to_string(),
        }));
        assert!(found.contains(&HierarchyViolation::MissingDefault {
            state: "Open".to_string(),
        }));
        assert!(found.contains(&HierarchyViolation::MissingParent {
            state: "New".to_string(),
        }));
        assert!(found.contains(&HierarchyViolation::LeafParent {
            state: "Paid".to_string(),
            parent: "New".to_string(),
            role: "simple".to_string(),
        }));
        assert!(found.contains(&HierarchyViolation::UnexpectedDefault {
            state: "Paid".to_string(),
        }));
    }

    #[test]
    fn multiple_roots_are_rejected() {
        let mut declarations = order_declarations();
        declarations.push(declare(Order::Cancelled, Role::Root, None, Some(Order::Open)));

        let found = violations(Hierarchy::new(declarations));

        assert!(found
            .iter()
            .any(|v| matches!(v, HierarchyViolation::MultipleRoots { .. })));
        assert!(found.contains(&HierarchyViolation::DuplicateState {
            state: "Cancelled".to_string(),
        }));
    }

    #[test]
    fn cyclic_parent_chain_is_rejected() {
        let declarations = vec![
            declare(Order::Root, Role::Root, None, Some(Order::New)),
            declare(Order::Open, Role::Composite, Some(Order::Closed), Some(Order::New)),
            declare(Order::Closed, Role::Composite, Some(Order::Open), Some(Order::Shipped)),
            declare(Order::New, Role::Simple, Some(Order::Root), None),
            declare(Order::Shipped, Role::Simple, Some(Order::Closed), None),
        ];

        let found = violations(Hierarchy::new(declarations));

        assert!(found.contains(&HierarchyViolation::Cycle {
            state: "Open".to_string(),
        }));
        assert!(found.contains(&HierarchyViolation::Cycle {
            state: "Closed".to_string(),
        }));
    }

    #[test]
    fn default_must_be_below_its_composite() {
        let mut declarations = order_declarations();
        declarations[1] = declare(Order::Open, Role::Composite, Some(Order::Root), Some(Order::Shipped));

        let found = violations(Hierarchy::new(declarations));

        assert_eq!(
            found,
            vec![HierarchyViolation::DefaultOutsideSubtree {
                state: "Open".to_string(),
                default: "Shipped".to_string(),
            }]
        );
    }

    #[test]
    fn composite_cannot_be_current_state() {
        let hierarchy = Hierarchy::new(order_declarations()).unwrap();

        assert_eq!(hierarchy.ensure_leaf(Order::Cancelled).unwrap(), Role::Final);
        assert!(matches!(
            hierarchy.ensure_leaf(Order::Open),
            Err(ConfigError::NotActivatable { .. })
        ));
    }

    #[test]
    fn undeclared_kind_is_reported() {
        let declarations = order_declarations()
            .into_iter()
            .filter(|d| d.kind != Order::Cancelled)
            .collect();
        let hierarchy = Hierarchy::new(declarations).unwrap();

        assert_eq!(
            hierarchy.branch(Order::Cancelled),
            Err(ConfigError::UnknownState("Cancelled".to_string()))
        );
    }
}
