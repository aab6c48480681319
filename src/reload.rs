//! Hot reload
//!
//! `update(path)` recompiles a blueprint and every registered blueprint
//! that transitively inherits from it, parents before children. Existing
//! clones keep the generation they were built from; only new clones and
//! the recompiled master instances see new code. A failure aborts the
//! wave: blueprints recompiled earlier keep their new code, the failing
//! one keeps its old code, and the master object is notified.

use tracing::{error, info};

use crate::errors::RuntimeError;
use crate::interp::EvalCtx;
use crate::value::Value;
use crate::world::World;

/// Recompile `canon` and its dependents; returns the recompile count.
pub fn update(world: &mut World, ctx: &mut EvalCtx, canon: &str) -> Result<usize, RuntimeError> {
    update_wave(world, ctx, canon).map(|paths| paths.len())
}

/// Recompile every registered blueprint whose source changed on disk;
/// returns all recompiled paths.
pub fn reload_changed(
    world: &mut World,
    ctx: &mut EvalCtx,
) -> Result<Vec<String>, RuntimeError> {
    let mut recompiled: Vec<String> = Vec::new();
    for path in world.objects.registered_paths() {
        if recompiled.iter().any(|p| p == &path) {
            continue;
        }
        let Some(bp) = world.objects.blueprint(&path) else { continue };
        let stale = match (world.objects.source_mtime(&path), bp.mtime) {
            (Some(disk), Some(compiled)) => disk > compiled,
            _ => false,
        };
        if stale {
            for p in update_wave(world, ctx, &path)? {
                if !recompiled.contains(&p) {
                    recompiled.push(p);
                }
            }
        }
    }
    Ok(recompiled)
}

fn update_wave(
    world: &mut World,
    ctx: &mut EvalCtx,
    canon: &str,
) -> Result<Vec<String>, RuntimeError> {
    // every registered blueprint whose chain reaches `canon`, ordered so
    // parents recompile before children
    let mut affected: Vec<(String, usize)> = Vec::new();
    for path in world.objects.registered_paths() {
        if let Some(bp) = world.objects.blueprint(&path) {
            if bp.inherits_from(canon) {
                affected.push((path, bp.chain_depth()));
            }
        }
    }
    affected.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    if affected.is_empty() {
        // never loaded: plain load
        world.load_object(ctx, canon, "/")?;
        return Ok(vec![canon.to_string()]);
    }

    let mut done = Vec::with_capacity(affected.len());
    for (path, _) in affected {
        let result = world
            .objects
            .compile_blueprint(&path)
            .and_then(|bp| {
                // old master instance goes down without invalidating the
                // freshly registered generation
                if let Some(old) = world.objects.find(&path) {
                    world.destruct_inner(old, false);
                }
                world.birth(ctx, bp, path.clone())
            });
        match result {
            Ok(_) => {
                info!(path = %path, "recompiled");
                done.push(path);
            }
            Err(e) => {
                error!(path = %path, error = %e, "recompile failed, wave aborted");
                let args = vec![Value::str(&path), Value::str(&e.message)];
                let _ = world.master_hook(ctx, "load_error", args);
                return Err(e);
            }
        }
    }
    Ok(done)
}
