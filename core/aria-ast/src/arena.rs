//! Node storage and parent/child routing.
//!
//! Every node that gets attached to the tree is registered here under its
//! `id`. A parallel `NodeRoute` table records parent/child links so callers
//! can walk up from a node (e.g. to find the enclosing function for a
//! `return`) without every node needing a `parent` field of its own.

use rustc_hash::FxHashMap;

use crate::nodes::{Ast, AstNode, Decl, FunctionDef, StructDef};

#[derive(Default)]
pub struct Arena {
    nodes: FxHashMap<u32, AstNode>,
    routes: Vec<NodeRoute>,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` under its own id, recording `parent_id` as its
    /// parent (`0` for top-level nodes with no AST parent).
    ///
    /// # Panics
    /// Panics if a node with the same id is already registered.
    pub fn add_node(&mut self, node: AstNode, parent_id: u32) {
        let id = node.id();
        assert!(
            !self.nodes.contains_key(&id),
            "node with id {id} already exists in the arena"
        );
        self.nodes.insert(id, node);
        self.add_route(
            NodeRoute {
                id,
                parent: Some(parent_id),
                children: Vec::new(),
            },
            parent_id,
        );
    }

    #[must_use]
    pub fn find_node(&self, id: u32) -> Option<&AstNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn find_parent(&self, id: u32) -> Option<u32> {
        self.routes.iter().find(|r| r.id == id).and_then(|r| r.parent)
    }

    /// Walks parent links from `id` looking for the nearest enclosing node
    /// for which `pred` holds. Used to find the enclosing function of a
    /// `return`, or the enclosing loop of a `break`/`continue` when the
    /// loop stack the checker maintains isn't available.
    pub fn find_enclosing<F>(&self, id: u32, pred: F) -> Option<&AstNode>
    where
        F: Fn(&AstNode) -> bool,
    {
        let mut current = self.find_parent(id);
        while let Some(cur_id) = current {
            if let Some(node) = self.find_node(cur_id) {
                if pred(node) {
                    return Some(node);
                }
            }
            current = self.find_parent(cur_id);
        }
        None
    }

    #[must_use]
    pub fn source_files(&self) -> Vec<&AstNode> {
        self.nodes
            .values()
            .filter(|n| matches!(n, AstNode::Ast(Ast::SourceFile(_))))
            .collect()
    }

    #[must_use]
    pub fn function_defs(&self) -> Vec<&FunctionDef> {
        self.nodes
            .values()
            .filter_map(|n| match n {
                AstNode::Decl(Decl::FunctionDef(f)) => Some(f.as_ref()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn struct_defs(&self) -> Vec<&StructDef> {
        self.nodes
            .values()
            .filter_map(|n| match n {
                AstNode::Decl(Decl::StructDef(s)) => Some(s.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn add_route(&mut self, route: NodeRoute, parent: u32) {
        if let Some(parent_route) = self.routes.iter_mut().find(|r| r.id == parent) {
            parent_route.children.push(route.id);
        }
        self.routes.push(route);
    }
}

#[derive(Default)]
struct NodeRoute {
    id: u32,
    parent: Option<u32>,
    children: Vec<u32>,
}
