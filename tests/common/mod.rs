//! Shared helpers for the integration suites: throwaway mudlib roots,
//! fixture writing, and a call shortcut.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use mudlark::{interp, DriverConfig, ObjRef, RuntimeError, Value, World};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh empty mudlib root under the system temp directory.
pub fn temp_mudlib(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "mudlark-test-{}-{}-{}",
        std::process::id(),
        n,
        tag
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a script source under its canonical path.
pub fn write_source(root: &Path, canon: &str, src: &str) {
    let file = root.join(format!("{}.c", &canon[1..]));
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, src).unwrap();
}

pub fn world_at(root: PathBuf) -> World {
    World::new(root, DriverConfig::default())
}

/// A world with no usable mudlib on disk, for in-memory sources.
pub fn scratch_world() -> World {
    World::new(PathBuf::from("/nonexistent"), DriverConfig::default())
}

pub fn load(world: &mut World, path: &str) -> ObjRef {
    let mut ctx = world.fresh_ctx();
    world.load_object(&mut ctx, path, "/").unwrap()
}

pub fn clone(world: &mut World, path: &str) -> ObjRef {
    let mut ctx = world.fresh_ctx();
    world.clone_object(&mut ctx, path, "/").unwrap()
}

pub fn load_src(world: &mut World, canon: &str, src: &str) -> ObjRef {
    let mut ctx = world.fresh_ctx();
    world.load_from_source(&mut ctx, canon, src).unwrap()
}

pub fn call(world: &mut World, obj: ObjRef, name: &str, args: Vec<Value>) -> Value {
    try_call(world, obj, name, args).unwrap()
}

pub fn try_call(
    world: &mut World,
    obj: ObjRef,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let mut ctx = world.fresh_ctx();
    interp::call_function(world, &mut ctx, obj, name, args, None)
}

pub fn array_items(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.borrow().clone(),
        other => panic!("expected array, got {:?}", other),
    }
}

pub fn obj_id(world: &World, r: ObjRef) -> String {
    world.objects.get(r).expect("object should be live").id.clone()
}
