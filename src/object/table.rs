//! The object table: arena of live objects plus the blueprint registry
//!
//! Objects live in a generational arena; an [`ObjRef`] is an index plus a
//! generation, and a stale ref simply fails to resolve. The table also
//! owns the path-indexed blueprint registry and the per-path clone
//! sequence counters. Running `create()` and the init protocol is the
//! world's job; the table only manages storage and compilation.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::SystemTime;

use tracing::debug;

use crate::errors::RuntimeError;
use crate::object::paths;
use crate::object::{Blueprint, ObjRef, Object};

struct Slot {
    gen: u32,
    obj: Option<Object>,
}

pub struct ObjectTable {
    pub root: PathBuf,
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<String, ObjRef>,
    blueprints: HashMap<String, Rc<Blueprint>>,
    clone_seq: HashMap<String, u64>,
    next_generation: u64,
    loading: Vec<String>,
}

impl ObjectTable {
    pub fn new(root: PathBuf) -> Self {
        ObjectTable {
            root,
            slots: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            blueprints: HashMap::new(),
            clone_seq: HashMap::new(),
            next_generation: 1,
            loading: Vec::new(),
        }
    }

    // ---- arena ----

    pub fn get(&self, r: ObjRef) -> Option<&Object> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.gen != r.gen {
            return None;
        }
        slot.obj.as_ref()
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut Object> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.gen != r.gen {
            return None;
        }
        slot.obj.as_mut()
    }

    pub fn is_live(&self, r: ObjRef) -> bool {
        self.get(r).is_some()
    }

    pub fn insert(&mut self, obj: Object) -> ObjRef {
        let id = obj.id.clone();
        let r = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.obj = Some(obj);
                ObjRef::new(index, slot.gen)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { gen: 0, obj: Some(obj) });
                ObjRef::new(index, 0)
            }
        };
        debug!(id = %id, "object created");
        self.by_id.insert(id, r);
        r
    }

    /// Remove an object, bumping the slot generation so every outstanding
    /// ref becomes a tombstone.
    pub fn remove(&mut self, r: ObjRef) -> Option<Object> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.gen != r.gen {
            return None;
        }
        let obj = slot.obj.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(r.index);
        self.by_id.remove(&obj.id);
        debug!(id = %obj.id, "object destructed");
        Some(obj)
    }

    pub fn find(&self, id: &str) -> Option<ObjRef> {
        self.by_id.get(id).copied()
    }

    pub fn live_refs(&self) -> Vec<ObjRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.obj.is_some())
            .map(|(i, s)| ObjRef::new(i as u32, s.gen))
            .collect()
    }

    // ---- blueprints ----

    pub fn blueprint(&self, canon: &str) -> Option<Rc<Blueprint>> {
        self.blueprints.get(canon).cloned()
    }

    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blueprints.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Drop a blueprint from the registry. Existing clones keep their
    /// `Rc`; the next load recompiles.
    pub fn unregister_blueprint(&mut self, canon: &str) {
        self.blueprints.remove(canon);
    }

    pub fn next_clone_seq(&mut self, canon: &str) -> u64 {
        let seq = self.clone_seq.entry(canon.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    pub fn source_mtime(&self, canon: &str) -> Option<SystemTime> {
        fs::metadata(paths::source_file(&self.root, canon))
            .and_then(|m| m.modified())
            .ok()
    }

    /// Return the cached blueprint for `canon`, compiling it (and its
    /// inherit chain) on first load. The bool is true when compilation
    /// actually happened.
    pub fn ensure_blueprint(
        &mut self,
        canon: &str,
    ) -> Result<(Rc<Blueprint>, bool), RuntimeError> {
        if let Some(bp) = self.blueprints.get(canon) {
            return Ok((bp.clone(), false));
        }
        let bp = self.compile_blueprint(canon)?;
        Ok((bp, true))
    }

    /// Compile `canon` from disk unconditionally and register the result,
    /// replacing any previous generation under that path.
    pub fn compile_blueprint(&mut self, canon: &str) -> Result<Rc<Blueprint>, RuntimeError> {
        if self.loading.iter().any(|p| p == canon) {
            self.loading.clear();
            return Err(
                RuntimeError::load(format!("inheritance cycle through {}", canon))
                    .at_source(canon),
            );
        }
        self.loading.push(canon.to_string());
        let result = self.compile_blueprint_inner(canon);
        self.loading.pop();
        if result.is_err() {
            // a failed parent load may leave deeper entries behind
            self.loading.retain(|p| p != canon);
        }
        result
    }

    fn compile_blueprint_inner(&mut self, canon: &str) -> Result<Rc<Blueprint>, RuntimeError> {
        let file = paths::source_file(&self.root, canon);
        let src = fs::read_to_string(&file).map_err(|e| {
            RuntimeError::load(format!("cannot read {}: {}", file.display(), e)).at_source(canon)
        })?;
        let mtime = fs::metadata(&file).and_then(|m| m.modified()).ok();
        self.compile_from(canon, &src, mtime)
    }

    /// Compile from an in-memory source, used by the REPL, `--eval`, and
    /// tests. Registered like any file-backed blueprint, with no mtime.
    pub fn compile_source(
        &mut self,
        canon: &str,
        src: &str,
    ) -> Result<Rc<Blueprint>, RuntimeError> {
        self.compile_from(canon, src, None)
    }

    fn compile_from(
        &mut self,
        canon: &str,
        src: &str,
        mtime: Option<SystemTime>,
    ) -> Result<Rc<Blueprint>, RuntimeError> {
        let program = crate::parser::parse_source(src)
            .map_err(|e| RuntimeError::from(e.in_file(canon)))?;

        let parent = match &program.inherit {
            Some(raw) => {
                let parent_cwd = parent_dir(canon);
                let parent_canon = paths::canonicalize(raw, &parent_cwd)?;
                if parent_canon == canon {
                    return Err(RuntimeError::load(format!(
                        "{} inherits itself",
                        canon
                    ))
                    .at_source(canon));
                }
                let (bp, _) = self.ensure_blueprint(&parent_canon).map_err(|e| {
                    RuntimeError::load(format!(
                        "inherited blueprint {} failed: {}",
                        parent_canon, e.message
                    ))
                    .at_source(canon)
                })?;
                Some(bp)
            }
            None => None,
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        let bp = Blueprint::link(canon.to_string(), program, parent, mtime, generation);
        self.blueprints.insert(canon.to_string(), bp.clone());
        debug!(path = canon, generation, "blueprint compiled");
        Ok(bp)
    }
}

fn parent_dir(canon: &str) -> String {
    match canon.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => canon[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn table() -> ObjectTable {
        ObjectTable::new(PathBuf::from("/nonexistent"))
    }

    fn dummy_object(table: &mut ObjectTable, id: &str) -> ObjRef {
        let bp = table.compile_source("/std/thing", "int weight;").unwrap();
        let vars = vec![Value::Int(0); bp.slot_count];
        table.insert(Object::new(id.to_string(), bp, vars))
    }

    #[test]
    fn test_insert_get_remove() {
        let mut t = table();
        let r = dummy_object(&mut t, "/std/thing");
        assert!(t.is_live(r));
        assert_eq!(t.find("/std/thing"), Some(r));

        let removed = t.remove(r).unwrap();
        assert_eq!(removed.id, "/std/thing");
        assert!(!t.is_live(r));
        assert!(t.get(r).is_none());
        assert!(t.find("/std/thing").is_none());
    }

    #[test]
    fn test_generation_prevents_stale_refs() {
        let mut t = table();
        let r1 = dummy_object(&mut t, "/std/thing#1");
        t.remove(r1);
        let r2 = dummy_object(&mut t, "/std/thing#2");
        // slot reused, old ref stays dead
        assert_eq!(r1.index, r2.index);
        assert!(t.get(r1).is_none());
        assert!(t.get(r2).is_some());
    }

    #[test]
    fn test_clone_seq_monotonic() {
        let mut t = table();
        assert_eq!(t.next_clone_seq("/std/thing"), 1);
        assert_eq!(t.next_clone_seq("/std/thing"), 2);
        assert_eq!(t.next_clone_seq("/std/other"), 1);
    }

    #[test]
    fn test_compile_source_registers_blueprint() {
        let mut t = table();
        t.compile_source("/std/thing", "int weight;").unwrap();
        assert!(t.blueprint("/std/thing").is_some());
        assert_eq!(t.registered_paths(), vec!["/std/thing".to_string()]);
        t.unregister_blueprint("/std/thing");
        assert!(t.blueprint("/std/thing").is_none());
    }

    #[test]
    fn test_generation_bumps_on_recompile() {
        let mut t = table();
        let bp1 = t.compile_source("/std/thing", "int weight;").unwrap();
        let bp2 = t.compile_source("/std/thing", "int weight; int value;").unwrap();
        assert!(bp2.generation > bp1.generation);
        // old Rc still usable by clones
        assert_eq!(bp1.slot_count, 1);
        assert_eq!(bp2.slot_count, 2);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let mut t = table();
        let err = t.compile_blueprint("/no/such/file").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Load);
    }
}
