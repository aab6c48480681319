//! Object efuns: lifecycle, identity, containment, and the action table.

use itertools::Itertools;

use crate::efuns::{arg_obj, arg_str, opt_obj, resolve_target};
use crate::errors::RuntimeError;
use crate::interp::{self, EvalCtx, Frame};
use crate::object::{paths, Action, ObjRef};
use crate::value::Value;
use crate::world::World;

pub fn clone_object(
    world: &mut World,
    ctx: &mut EvalCtx,
    _frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "clone_object")?;
    let cwd = world.cwd_of(ctx);
    let r = world.clone_object(ctx, &path, &cwd)?;
    Ok(Value::Object(r))
}

pub fn load_object(
    world: &mut World,
    ctx: &mut EvalCtx,
    _frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "load_object")?;
    let cwd = world.cwd_of(ctx);
    let r = world.load_object(ctx, &path, &cwd)?;
    Ok(Value::Object(r))
}

pub fn destruct(
    world: &mut World,
    _ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let target = match args.first() {
        Some(Value::Object(r)) => *r,
        None => frame.this_obj,
        Some(Value::Nil) => return Ok(Value::Nil),
        Some(other) => {
            return Err(RuntimeError::typed(format!(
                "destruct: cannot destruct {}",
                other.type_name()
            )))
        }
    };
    world.destruct(target);
    Ok(Value::Nil)
}

pub fn find_object(world: &World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let id = arg_str(&args, 0, "find_object")?;
    match world.objects.find(&id) {
        Some(r) => Ok(Value::Object(r)),
        None => Ok(Value::Nil),
    }
}

pub fn object_name(world: &World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match opt_obj(world, &args, 0) {
        Some(r) => Ok(Value::str(world.objects.get(r).unwrap().id.clone())),
        None => Ok(Value::Nil),
    }
}

/// The blueprint path of an object, without any `#n` clone suffix.
pub fn file_name(world: &World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match opt_obj(world, &args, 0) {
        Some(r) => Ok(Value::str(
            world.objects.get(r).unwrap().blueprint.path.clone(),
        )),
        None => Ok(Value::Nil),
    }
}

pub fn environment(
    world: &World,
    frame: &Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let target = opt_obj(world, &args, 0).or(if args.is_empty() {
        Some(frame.this_obj)
    } else {
        None
    });
    let env = target
        .and_then(|r| world.objects.get(r))
        .and_then(|o| o.environment)
        .filter(|r| world.objects.is_live(*r));
    Ok(env.map(Value::Object).unwrap_or(Value::Nil))
}

pub fn all_inventory(
    world: &World,
    frame: &Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let target = if args.is_empty() {
        Some(frame.this_obj)
    } else {
        opt_obj(world, &args, 0)
    };
    let items = target
        .and_then(|r| world.objects.get(r))
        .map(|o| o.inventory.clone())
        .unwrap_or_default();
    Ok(Value::array(
        items.into_iter().map(Value::Object).collect(),
    ))
}

/// `present(what, env?)`: find an object in a container, matching either
/// by ref, by object-name basename, or by asking each candidate's `id()`
/// function. A trailing number selects among multiple matches, so
/// `"sword 2"` is the second sword.
pub fn present(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let mut candidates: Vec<ObjRef> = Vec::new();
    match opt_obj(world, &args, 1) {
        Some(env) => {
            candidates.extend(world.objects.get(env).map(|o| o.inventory.clone()).unwrap_or_default());
        }
        None => {
            // default scope: our inventory, then our environment's
            if let Some(o) = world.objects.get(frame.this_obj) {
                candidates.extend(o.inventory.clone());
                if let Some(env) = o.environment {
                    candidates.extend(
                        world.objects.get(env).map(|e| e.inventory.clone()).unwrap_or_default(),
                    );
                }
            }
        }
    }

    if let Some(Value::Object(wanted)) = args.first() {
        let found = candidates.iter().any(|r| r == wanted);
        return Ok(if found && world.objects.is_live(*wanted) {
            Value::Object(*wanted)
        } else {
            Value::Nil
        });
    }

    let spec = arg_str(&args, 0, "present")?;
    let (name, nth) = split_ordinal(&spec);
    let mut seen = 0usize;
    for r in candidates {
        if !world.objects.is_live(r) {
            continue;
        }
        let id_matches = {
            let obj = world.objects.get(r).unwrap();
            paths::basename(&obj.id) == name || obj.id == name
        };
        let hit = if id_matches {
            true
        } else {
            let res = interp::call_function(
                world,
                ctx,
                r,
                "id",
                vec![Value::str(name)],
                Some(frame.this_obj),
            )?;
            interp::truthy(world, &res)
        };
        if hit {
            seen += 1;
            if seen == nth {
                return Ok(Value::Object(r));
            }
        }
    }
    Ok(Value::Nil)
}

fn split_ordinal(spec: &str) -> (&str, usize) {
    if let Some((name, num)) = spec.rsplit_once(' ') {
        if let Ok(n) = num.parse::<usize>() {
            if n >= 1 {
                return (name, n);
            }
        }
    }
    (spec, 1)
}

/// `move_object(dest)` moves this object; `move_object(what, dest)`
/// moves `what`. Either argument may be a path, which is loaded.
pub fn move_object(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let (what, dest) = if args.len() >= 2 {
        let what = resolve_target(world, ctx, &args[0])?
            .ok_or_else(|| RuntimeError::typed("move_object: bad object"))?;
        let dest = resolve_target(world, ctx, &args[1])?
            .ok_or_else(|| RuntimeError::typed("move_object: bad destination"))?;
        (what, dest)
    } else {
        let dest = resolve_target(world, ctx, args.first().unwrap_or(&Value::Nil))?
            .ok_or_else(|| RuntimeError::typed("move_object: bad destination"))?;
        (frame.this_obj, dest)
    };
    world.move_object(ctx, what, dest)?;
    Ok(Value::Int(1))
}

pub fn this_player(world: &World, ctx: &EvalCtx) -> Result<Value, RuntimeError> {
    Ok(ctx
        .this_player
        .filter(|r| world.objects.is_live(*r))
        .map(Value::Object)
        .unwrap_or(Value::Nil))
}

pub fn previous_object(world: &World, frame: &Frame) -> Result<Value, RuntimeError> {
    Ok(frame
        .prev_obj
        .filter(|r| world.objects.is_live(*r))
        .map(Value::Object)
        .unwrap_or(Value::Nil))
}

pub fn users(world: &World) -> Result<Value, RuntimeError> {
    Ok(Value::array(
        world.users().into_iter().map(Value::Object).collect(),
    ))
}

pub fn linkdead_users(world: &World) -> Result<Value, RuntimeError> {
    Ok(Value::array(
        world
            .linkdead_users()
            .into_iter()
            .map(Value::Object)
            .collect(),
    ))
}

/// `call_other(ob, func, args...)`: the efun spelling of `ob->func()`.
pub fn call_other(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    if args.len() < 2 {
        return Err(RuntimeError::typed(
            "call_other needs an object and a function name",
        ));
    }
    let func = arg_str(&args, 1, "call_other")?;
    let Some(target) = resolve_target(world, ctx, &args[0])? else {
        return Ok(Value::Nil);
    };
    let rest = args.into_iter().skip(2).collect_vec();
    interp::call_function(world, ctx, target, &func, rest, Some(frame.this_obj))
}

/// Register a verb handler on behalf of the current `this_player`. Only
/// meaningful from inside the init protocol.
pub fn add_action(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let func = arg_str(&args, 0, "add_action")?;
    let verb = arg_str(&args, 1, "add_action")?;
    let Some(commander) = ctx.this_player.filter(|r| world.objects.is_live(*r)) else {
        return Ok(Value::Int(0));
    };
    if let Some(obj) = world.objects.get_mut(commander) {
        obj.actions.push(Action {
            verb,
            owner: frame.this_obj,
            func,
        });
    }
    Ok(Value::Int(1))
}

pub fn query_verb(ctx: &EvalCtx) -> Result<Value, RuntimeError> {
    Ok(ctx
        .verb
        .as_deref()
        .map(Value::str)
        .unwrap_or(Value::Nil))
}

/// Hand this dispatch's connection over to a linkdead player object.
pub fn reconnect(
    world: &mut World,
    ctx: &mut EvalCtx,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let target = arg_obj(world, &args, 0, "reconnect")?;
    let Some(from) = ctx.this_player else {
        return Ok(Value::Int(0));
    };
    Ok(Value::Int(if world.reconnect(from, target) { 1 } else { 0 }))
}
