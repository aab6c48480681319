//! Control efuns: assertions, randomness, shutdown, and the admin-gated
//! hot-reload operations.

use rand::Rng;
use tracing::info;

use crate::efuns::arg_str;
use crate::errors::RuntimeError;
use crate::interp::{self, EvalCtx};
use crate::reload;
use crate::value::Value;
use crate::world::World;

/// `assert(cond, msg?)` - raises on a falsy condition; the `--test`
/// harness counts these as failures.
pub fn assert_(world: &World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let ok = args
        .first()
        .map(|v| interp::truthy(world, v))
        .unwrap_or(false);
    if ok {
        return Ok(Value::Int(1));
    }
    let msg = args
        .get(1)
        .map(|v| v.to_write_string())
        .unwrap_or_else(|| "assertion failed".to_string());
    Err(RuntimeError::assert(msg))
}

/// Uniform int in `[0, n)`; `random(0)` is 0.
pub fn random(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let n = args.first().and_then(|v| v.as_int()).unwrap_or(0);
    if n <= 0 {
        return Ok(Value::Int(0));
    }
    Ok(Value::Int(rand::thread_rng().gen_range(0..n)))
}

pub fn shutdown(world: &mut World, ctx: &mut EvalCtx) -> Result<Value, RuntimeError> {
    world.admin_gate(ctx)?;
    info!("shutdown requested");
    world.shutdown = true;
    Ok(Value::Int(1))
}

/// `update(path)` - recompile a blueprint and its dependents; returns
/// the number of blueprints recompiled.
pub fn update(
    world: &mut World,
    ctx: &mut EvalCtx,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    world.admin_gate(ctx)?;
    let path = arg_str(&args, 0, "update")?;
    let cwd = world.cwd_of(ctx);
    let canon = crate::object::paths::canonicalize(&path, &cwd)?;
    let count = reload::update(world, ctx, &canon)?;
    Ok(Value::Int(count as i64))
}

/// `reload_changed()` - recompile every blueprint whose source mtime
/// moved; returns the list of recompiled paths.
pub fn reload_changed(world: &mut World, ctx: &mut EvalCtx) -> Result<Value, RuntimeError> {
    world.admin_gate(ctx)?;
    let paths = reload::reload_changed(world, ctx)?;
    Ok(Value::array(paths.into_iter().map(Value::str).collect()))
}
