//! Compiled schema data model
//!
//! Mirrors what the external schema engine hands over after compiling a set
//! of modules: a flat arena of schema nodes wired into per-module trees,
//! with reference expressions already resolved to the nodes they may touch.

/// Index of a module within its [`super::SchemaContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

/// Index of a schema node within its [`super::SchemaContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Statement kind of a compiled schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Choice,
    Case,
    AnyData,
    /// Top-level request/reply operation
    Rpc,
    /// Request/reply operation nested under a data node
    Action,
    /// Event-style operation
    Notification,
    /// Input side of an rpc/action
    Input,
    /// Output side of an rpc/action
    Output,
}

impl NodeKind {
    /// Request/reply-style operation node
    pub fn is_rpc(self) -> bool {
        matches!(self, NodeKind::Rpc | NodeKind::Action)
    }

    /// Any operation node (request/reply or event)
    pub fn is_operation(self) -> bool {
        matches!(self, NodeKind::Rpc | NodeKind::Action | NodeKind::Notification)
    }

    /// Whether the node contributes a segment to canonical data paths
    pub(crate) fn in_data_path(self) -> bool {
        !matches!(
            self,
            NodeKind::Choice | NodeKind::Case | NodeKind::Input | NodeKind::Output
        )
    }
}

/// A reference expression with its engine-resolved targets
///
/// The engine canonicalizes the expression text (prefixes resolved to module
/// names) and statically resolves the schema nodes the expression may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExpr {
    /// Canonical, prefix-resolved expression text
    pub canonical: String,
    /// Schema nodes the expression may reference
    pub atoms: Vec<NodeId>,
}

impl ResolvedExpr {
    pub fn new(canonical: impl Into<String>, atoms: impl Into<Vec<NodeId>>) -> Self {
        Self {
            canonical: canonical.into(),
            atoms: atoms.into(),
        }
    }
}

/// Value type of a leaf/leaf-list node, reduced to what dependency
/// collection needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// No dependency semantics
    Plain,
    /// Path-reference type; the value must point at an existing node
    Leafref {
        /// Resolved target path
        path: ResolvedExpr,
        /// Whether the referenced instance must exist for validation
        require_instance: bool,
    },
    /// Instance-locator type; the value is itself a path
    InstanceId {
        /// Whether the located instance must exist for validation
        require_instance: bool,
        /// Resolved target of the leaf's default value, if it has one
        default_target: Option<ResolvedExpr>,
    },
    /// Union type; every member is inspected
    Union(Vec<ValueType>),
}

/// One compiled schema node
#[derive(Debug)]
pub struct SchemaNode {
    /// Node name
    pub name: String,
    /// Statement kind
    pub kind: NodeKind,
    /// Module that defines the node (the augmenting module for augments)
    pub module: ModuleId,
    /// Parent node, `None` for top-level nodes
    pub parent: Option<NodeId>,
    /// Child nodes in schema order
    pub children: Vec<NodeId>,
    /// Value type, [`ValueType::Plain`] for non-leaf nodes
    pub value_type: ValueType,
    /// `when` conditions attached to the node
    pub when: Vec<ResolvedExpr>,
    /// `must` constraints attached to the node
    pub musts: Vec<ResolvedExpr>,
}

/// A submodule pulled in through an include
#[derive(Debug)]
pub struct Submodule {
    /// Submodule name
    pub name: String,
    /// Modules the submodule imports
    pub imports: Vec<ModuleId>,
}

/// One compiled module
#[derive(Debug)]
pub struct SchemaModule {
    /// Module name, unique within the context
    pub name: String,
    /// Revision label, if the module declares one
    pub revision: Option<String>,
    /// Whether the module is implemented (has a compiled data tree) or only
    /// imported for its types
    pub implemented: bool,
    /// Enabled feature names, in declaration order
    pub features: Vec<String>,
    /// Directly imported modules
    pub imports: Vec<ModuleId>,
    /// Included submodules with their own imports
    pub includes: Vec<Submodule>,
    /// Top-level schema nodes in schema order
    pub top_nodes: Vec<NodeId>,
}

impl SchemaModule {
    /// Enabled features in declaration order
    pub fn enabled_features(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(String::as_str)
    }
}
