//! Hot reload: generation policy for existing clones, recompilation
//! waves over the inheritance graph, and the partial-success rule.

mod common;

use std::time::{Duration, SystemTime};

use common::*;
use filetime::FileTime;
use mudlark::{reload, Value};

fn touch_newer(root: &std::path::Path, canon: &str) {
    let file = root.join(format!("{}.c", &canon[1..]));
    let future = SystemTime::now() + Duration::from_secs(5);
    filetime::set_file_mtime(&file, FileTime::from_system_time(future)).unwrap();
}

#[test]
fn test_existing_clones_keep_old_code() {
    let root = temp_mudlib("reload-policy");
    write_source(&root, "/obj/thing", "int magic() { return 1; }");
    let mut w = world_at(root.clone());

    let old_clone = clone(&mut w, "/obj/thing");
    assert_eq!(call(&mut w, old_clone, "magic", vec![]), Value::Int(1));

    write_source(&root, "/obj/thing", "int magic() { return 2; }");
    let mut ctx = w.fresh_ctx();
    let count = reload::update(&mut w, &mut ctx, "/obj/thing").unwrap();
    assert_eq!(count, 1);

    // the old clone still runs the generation it was built from
    assert_eq!(call(&mut w, old_clone, "magic", vec![]), Value::Int(1));

    // new clones and the fresh master instance pick up the new code
    let new_clone = clone(&mut w, "/obj/thing");
    assert_eq!(call(&mut w, new_clone, "magic", vec![]), Value::Int(2));
    let master = w.objects.find("/obj/thing").unwrap();
    assert_eq!(call(&mut w, master, "magic", vec![]), Value::Int(2));

    // clone numbering continues across generations
    assert_eq!(obj_id(&w, new_clone), "/obj/thing#2");
}

#[test]
fn test_update_recompiles_dependents_parents_first() {
    let root = temp_mudlib("reload-wave");
    write_source(&root, "/std/base", "int base() { return 10; }");
    write_source(
        &root,
        "/std/mid",
        "inherit \"/std/base\";\nint mid() { return base() + 1; }",
    );
    write_source(
        &root,
        "/std/leaf",
        "inherit \"/std/mid\";\nint leaf() { return mid() + 1; }",
    );
    let mut w = world_at(root.clone());
    load(&mut w, "/std/leaf");
    let old_leaf_clone = clone(&mut w, "/std/leaf");

    write_source(&root, "/std/base", "int base() { return 20; }");
    let mut ctx = w.fresh_ctx();
    let count = reload::update(&mut w, &mut ctx, "/std/base").unwrap();
    // base, mid, and leaf were all registered and all inherit from base
    assert_eq!(count, 3);

    let leaf_master = w.objects.find("/std/leaf").unwrap();
    assert_eq!(call(&mut w, leaf_master, "leaf", vec![]), Value::Int(22));
    // the pre-update clone still sees the old base
    assert_eq!(call(&mut w, old_leaf_clone, "leaf", vec![]), Value::Int(12));
}

#[test]
fn test_failed_recompile_aborts_wave_partially() {
    let root = temp_mudlib("reload-partial");
    write_source(&root, "/std/base", "int base() { return 10; }");
    write_source(
        &root,
        "/std/leaf",
        "inherit \"/std/base\";\nint leaf() { return base() + 1; }",
    );
    let mut w = world_at(root.clone());
    load(&mut w, "/std/leaf");

    write_source(&root, "/std/base", "int base() { return 20; }");
    // the dependent now fails to parse
    write_source(&root, "/std/leaf", "inherit \"/std/base\";\nint leaf( {");
    let mut ctx = w.fresh_ctx();
    assert!(reload::update(&mut w, &mut ctx, "/std/base").is_err());

    // earlier wave members keep their new code
    let base_master = w.objects.find("/std/base").unwrap();
    assert_eq!(call(&mut w, base_master, "base", vec![]), Value::Int(20));
    // the failing blueprint keeps its old code and old master instance
    let leaf_master = w.objects.find("/std/leaf").unwrap();
    assert_eq!(call(&mut w, leaf_master, "leaf", vec![]), Value::Int(11));
}

#[test]
fn test_load_object_recompiles_when_source_newer() {
    let root = temp_mudlib("reload-on-load");
    write_source(&root, "/obj/thing", "int magic() { return 1; }");
    let mut w = world_at(root.clone());
    load(&mut w, "/obj/thing");

    write_source(&root, "/obj/thing", "int magic() { return 2; }");
    touch_newer(&root, "/obj/thing");

    let master = load(&mut w, "/obj/thing");
    assert_eq!(call(&mut w, master, "magic", vec![]), Value::Int(2));
}

#[test]
fn test_reload_changed_finds_stale_sources() {
    let root = temp_mudlib("reload-changed");
    write_source(&root, "/obj/stale", "int v() { return 1; }");
    write_source(&root, "/obj/fresh", "int v() { return 1; }");
    let mut w = world_at(root.clone());
    load(&mut w, "/obj/stale");
    load(&mut w, "/obj/fresh");

    let mut ctx = w.fresh_ctx();
    assert!(reload::reload_changed(&mut w, &mut ctx).unwrap().is_empty());

    write_source(&root, "/obj/stale", "int v() { return 2; }");
    touch_newer(&root, "/obj/stale");
    let recompiled = reload::reload_changed(&mut w, &mut ctx).unwrap();
    assert_eq!(recompiled, vec!["/obj/stale".to_string()]);

    let master = w.objects.find("/obj/stale").unwrap();
    assert_eq!(call(&mut w, master, "v", vec![]), Value::Int(2));
}

#[test]
fn test_update_of_unloaded_path_just_loads() {
    let root = temp_mudlib("reload-unloaded");
    write_source(&root, "/obj/lazy", "int v() { return 5; }");
    let mut w = world_at(root);
    let mut ctx = w.fresh_ctx();
    let count = reload::update(&mut w, &mut ctx, "/obj/lazy").unwrap();
    assert_eq!(count, 1);
    assert!(w.objects.find("/obj/lazy").is_some());
}
