//! The efun surface: the closed set of operations the runtime grants to
//! scripts, grouped by category. Functions defined on an object's own
//! inheritance chain shadow efuns of the same name; dispatch here is the
//! fallback the interpreter consults.

pub mod collections;
pub mod control;
pub mod io;
pub mod objects;
pub mod strings;
pub mod time;

use crate::errors::RuntimeError;
use crate::interp::{EvalCtx, Frame};
use crate::object::ObjRef;
use crate::value::Value;
use crate::world::World;

/// Route an efun call. `Ok(None)` means "no such efun"; the interpreter
/// turns that into an unknown-function error.
pub fn dispatch(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    name: &str,
    args: Vec<Value>,
) -> Result<Option<Value>, RuntimeError> {
    let v = match name {
        // objects
        "clone_object" => objects::clone_object(world, ctx, frame, args)?,
        "load_object" => objects::load_object(world, ctx, frame, args)?,
        "destruct" => objects::destruct(world, ctx, frame, args)?,
        "find_object" => objects::find_object(world, args)?,
        "object_name" => objects::object_name(world, args)?,
        "file_name" => objects::file_name(world, args)?,
        "environment" => objects::environment(world, frame, args)?,
        "all_inventory" => objects::all_inventory(world, frame, args)?,
        "present" => objects::present(world, ctx, frame, args)?,
        "move_object" => objects::move_object(world, ctx, frame, args)?,
        "this_object" => Value::Object(frame.this_obj),
        "this_player" => objects::this_player(world, ctx)?,
        "previous_object" => objects::previous_object(world, frame)?,
        "users" => objects::users(world)?,
        "linkdead_users" => objects::linkdead_users(world)?,
        "call_other" => objects::call_other(world, ctx, frame, args)?,
        "add_action" => objects::add_action(world, ctx, frame, args)?,
        "query_verb" => objects::query_verb(ctx)?,
        "reconnect" => objects::reconnect(world, ctx, args)?,
        // I/O
        "write" => io::write(world, ctx, args)?,
        "tell_object" => io::tell_object(world, args)?,
        "tell_room" => io::tell_room(world, args)?,
        "read_file" => io::read_file(world, ctx, frame, args)?,
        "write_file" => io::write_file(world, ctx, frame, args)?,
        "get_dir" => io::get_dir(world, ctx, frame, args)?,
        "save_object" => io::save_object(world, ctx, frame, args)?,
        "restore_object" => io::restore_object(world, ctx, frame, args)?,
        "command" => io::command(world, ctx, frame, args)?,
        // strings (sscanf lives in the interpreter: it needs lvalues)
        "explode" => strings::explode(args)?,
        "implode" => strings::implode(args)?,
        "sprintf" => strings::sprintf(args)?,
        "lower_case" => strings::lower_case(args)?,
        "capitalize" => strings::capitalize(args)?,
        "replace_string" => strings::replace_string(args)?,
        "trim" => strings::trim(args)?,
        "strlen" => strings::strlen(args)?,
        "to_int" => strings::to_int(args)?,
        "member" => strings::member(args)?,
        // collections
        "keys" => collections::keys(args)?,
        "m_indices" => collections::keys(args)?,
        "m_delete" => collections::m_delete(args)?,
        "sizeof" => collections::sizeof(args)?,
        // time and scheduling
        "time" => Value::Int(world.now as i64),
        "localtime" => time::localtime(world, args)?,
        "call_out" => time::call_out(world, frame, args)?,
        "set_heart_beat" => time::set_heart_beat(world, frame, args)?,
        "set_reset" => time::set_reset(world, frame, args)?,
        // hot reload
        "update" => control::update(world, ctx, args)?,
        "reload_changed" => control::reload_changed(world, ctx)?,
        // control
        "assert" => control::assert_(world, args)?,
        "random" => control::random(args)?,
        "shutdown" => control::shutdown(world, ctx)?,
        _ => return Ok(None),
    };
    Ok(Some(v))
}

// ---- shared argument helpers ----

pub(crate) fn arg_str(args: &[Value], i: usize, efun: &str) -> Result<String, RuntimeError> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(RuntimeError::typed(format!(
            "{}: argument {} must be a string, got {}",
            efun,
            i + 1,
            other.type_name()
        ))),
        None => Err(RuntimeError::typed(format!(
            "{}: missing string argument {}",
            efun,
            i + 1
        ))),
    }
}

pub(crate) fn arg_int(args: &[Value], i: usize, efun: &str) -> Result<i64, RuntimeError> {
    match args.get(i) {
        Some(v) => v.as_int().ok_or_else(|| {
            RuntimeError::typed(format!("{}: argument {} must be an int", efun, i + 1))
        }),
        None => Ok(0),
    }
}

/// A live object argument; nil and destructed refs are rejected.
pub(crate) fn arg_obj(
    world: &World,
    args: &[Value],
    i: usize,
    efun: &str,
) -> Result<ObjRef, RuntimeError> {
    match args.get(i) {
        Some(Value::Object(r)) if world.objects.is_live(*r) => Ok(*r),
        _ => Err(RuntimeError::typed(format!(
            "{}: argument {} must be a live object",
            efun,
            i + 1
        ))),
    }
}

/// An optional object argument; absent, nil, and destructed all read as
/// `None`.
pub(crate) fn opt_obj(world: &World, args: &[Value], i: usize) -> Option<ObjRef> {
    match args.get(i) {
        Some(Value::Object(r)) if world.objects.is_live(*r) => Some(*r),
        _ => None,
    }
}

/// Resolve an object-or-path argument, loading the path when needed.
pub(crate) fn resolve_target(
    world: &mut World,
    ctx: &mut EvalCtx,
    v: &Value,
) -> Result<Option<ObjRef>, RuntimeError> {
    match v {
        Value::Object(r) if world.objects.is_live(*r) => Ok(Some(*r)),
        Value::Str(path) => {
            let cwd = world.cwd_of(ctx);
            world.load_object(ctx, path, &cwd).map(Some)
        }
        _ => Ok(None),
    }
}
