//! Blueprints: the compiled, linked form of a source file
//!
//! A blueprint owns its own declarations and a link to at most one parent
//! blueprint. Variable slots are laid out flat across the chain, parents
//! first, so a child object's slot vector embeds its parents' slots at
//! fixed offsets. Hot reload installs a new generation under the same
//! path; existing clones keep the generation they were built from.

use std::rc::Rc;
use std::time::SystemTime;

use crate::ast::{FunctionDef, Program, VarDecl};

#[derive(Debug)]
pub struct Blueprint {
    /// Canonical mudlib path, e.g. `/std/object`.
    pub path: String,
    /// Source mtime at compile time; `None` for in-memory sources.
    pub mtime: Option<SystemTime>,
    pub parent: Option<Rc<Blueprint>>,
    pub program: Program,
    /// Offset of this blueprint's own variables in the flat slot layout.
    pub slot_base: usize,
    /// Total slots including all parents.
    pub slot_count: usize,
    /// Bumped on every recompile of this path.
    pub generation: u64,
}

impl Blueprint {
    pub fn link(
        path: String,
        program: Program,
        parent: Option<Rc<Blueprint>>,
        mtime: Option<SystemTime>,
        generation: u64,
    ) -> Rc<Blueprint> {
        let slot_base = parent.as_ref().map(|p| p.slot_count).unwrap_or(0);
        let slot_count = slot_base + program.vars.len();
        Rc::new(Blueprint {
            path,
            mtime,
            parent,
            program,
            slot_base,
            slot_count,
            generation,
        })
    }

    /// Find `name` walking child toward parent. Returns the defining
    /// blueprint level along with the function, so `::` calls can resume
    /// the walk one step above the definition site.
    pub fn find_function(
        self: &Rc<Blueprint>,
        name: &str,
    ) -> Option<(Rc<Blueprint>, Rc<FunctionDef>)> {
        let mut cur = self.clone();
        loop {
            if let Some(f) = cur.program.function(name) {
                let f = f.clone();
                return Some((cur, f));
            }
            let parent = cur.parent.clone()?;
            cur = parent;
        }
    }

    /// Slot index for a declared variable, child declarations shadowing
    /// parent declarations of the same name.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.program.vars.iter().position(|v| v.name == name) {
            return Some(self.slot_base + idx);
        }
        self.parent.as_ref().and_then(|p| p.slot_of(name))
    }

    /// Declared variables across the chain in slot order (parents first).
    pub fn all_vars(&self) -> Vec<&VarDecl> {
        let mut vars = match &self.parent {
            Some(p) => p.all_vars(),
            None => Vec::new(),
        };
        vars.extend(self.program.vars.iter());
        vars
    }

    /// Whether this blueprint's chain contains `path` (itself included).
    pub fn inherits_from(&self, path: &str) -> bool {
        if self.path == path {
            return true;
        }
        self.parent
            .as_ref()
            .map(|p| p.inherits_from(path))
            .unwrap_or(false)
    }

    /// Chain length, used to order recompilation waves parents-first.
    pub fn chain_depth(&self) -> usize {
        1 + self.parent.as_ref().map(|p| p.chain_depth()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn bp(path: &str, src: &str, parent: Option<Rc<Blueprint>>) -> Rc<Blueprint> {
        Blueprint::link(path.to_string(), parse_source(src).unwrap(), parent, None, 1)
    }

    #[test]
    fn test_slot_layout_parent_first() {
        let parent = bp("/std/thing", "int weight; int value;", None);
        let child = bp("/std/sword", "int sharpness;", Some(parent.clone()));
        assert_eq!(child.slot_count, 3);
        assert_eq!(child.slot_of("weight"), Some(0));
        assert_eq!(child.slot_of("value"), Some(1));
        assert_eq!(child.slot_of("sharpness"), Some(2));
    }

    #[test]
    fn test_child_shadows_parent_variable() {
        let parent = bp("/std/thing", "int level;", None);
        let child = bp("/std/hero", "int level;", Some(parent));
        assert_eq!(child.slot_of("level"), Some(1));
    }

    #[test]
    fn test_function_lookup_walks_chain() {
        let parent = bp("/std/thing", "int query_weight() { return 1; }", None);
        let child = bp("/std/sword", "int query_damage() { return 5; }", Some(parent));
        let (def_bp, f) = child.find_function("query_weight").unwrap();
        assert_eq!(def_bp.path, "/std/thing");
        assert_eq!(f.name, "query_weight");
        assert!(child.find_function("no_such").is_none());
    }

    #[test]
    fn test_inherits_from() {
        let parent = bp("/std/thing", "", None);
        let child = bp("/std/sword", "", Some(parent));
        assert!(child.inherits_from("/std/thing"));
        assert!(child.inherits_from("/std/sword"));
        assert!(!child.inherits_from("/std/room"));
        assert_eq!(child.chain_depth(), 2);
    }
}
