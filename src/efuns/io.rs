//! I/O efuns: player output, file access, and persistence entry points.
//! All file paths are canonicalized against the mudlib root and checked
//! through the master object's `valid_read`/`valid_write` hooks.

use std::fs;
use std::io::Write as _;

use crate::efuns::{arg_obj, arg_str};
use crate::errors::RuntimeError;
use crate::interp::{EvalCtx, Frame};
use crate::object::{paths, ObjRef};
use crate::persist;
use crate::value::Value;
use crate::world::World;

/// Append to the initiating player's output buffer; without an
/// interactive initiator the text goes to the console stream.
pub fn write(world: &mut World, ctx: &mut EvalCtx, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let text = args
        .first()
        .map(|v| v.to_write_string())
        .unwrap_or_default();
    match ctx.this_player.filter(|r| world.objects.is_live(*r)) {
        Some(player) => world.send(player, &text),
        None => world.send_conn(0, &text),
    }
    Ok(Value::Int(1))
}

pub fn tell_object(world: &mut World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let target = arg_obj(world, &args, 0, "tell_object")?;
    let text = args
        .get(1)
        .map(|v| v.to_write_string())
        .unwrap_or_default();
    world.send(target, &text);
    Ok(Value::Int(1))
}

pub fn tell_room(world: &mut World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let room = arg_obj(world, &args, 0, "tell_room")?;
    let text = args
        .get(1)
        .map(|v| v.to_write_string())
        .unwrap_or_default();
    let except: Vec<ObjRef> = match args.get(2) {
        Some(Value::Array(items)) => items
            .borrow()
            .iter()
            .filter_map(|v| v.as_object())
            .collect(),
        Some(Value::Object(r)) => vec![*r],
        _ => Vec::new(),
    };
    world.tell_room(room, &text, &except);
    Ok(Value::Int(1))
}

pub fn read_file(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "read_file")?;
    let cwd = world.cwd_of(ctx);
    let canon = paths::canonicalize(&path, &cwd)?;
    world.check_path(ctx, &canon, frame.this_obj, false)?;
    let file = paths::data_file(&world.objects.root, &canon);
    match fs::read_to_string(&file) {
        Ok(text) => Ok(Value::str(text)),
        Err(e) => Err(RuntimeError::io(format!("read {}: {}", canon, e))),
    }
}

pub fn write_file(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "write_file")?;
    let data = args
        .get(1)
        .map(|v| v.to_write_string())
        .unwrap_or_default();
    let append = args
        .get(2)
        .map(|v| v.truthy_basic())
        .unwrap_or(false);
    let cwd = world.cwd_of(ctx);
    let canon = paths::canonicalize(&path, &cwd)?;
    world.check_path(ctx, &canon, frame.this_obj, true)?;
    let file = paths::data_file(&world.objects.root, &canon);
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| RuntimeError::io(format!("mkdir for {}: {}", canon, e)))?;
    }
    let result = fs::OpenOptions::new()
        .create(true)
        .append(append)
        .write(true)
        .truncate(!append)
        .open(&file)
        .and_then(|mut f| f.write_all(data.as_bytes()));
    match result {
        Ok(()) => Ok(Value::Int(1)),
        Err(e) => Err(RuntimeError::io(format!("write {}: {}", canon, e))),
    }
}

/// Directory listing: names sorted, subdirectories marked with a
/// trailing `/`.
pub fn get_dir(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "get_dir")?;
    let cwd = world.cwd_of(ctx);
    let canon = paths::canonicalize(&path, &cwd)?;
    world.check_path(ctx, &canon, frame.this_obj, false)?;
    let dir = paths::data_file(&world.objects.root, &canon);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(Value::array(Vec::new())),
    };
    let mut names: Vec<String> = Vec::new();
    for entry in entries.flatten() {
        let mut name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(Value::array(names.into_iter().map(Value::str).collect()))
}

pub fn save_object(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "save_object")?;
    let cwd = world.cwd_of(ctx);
    let canon = paths::canonicalize(&path, &cwd)?;
    world.check_path(ctx, &canon, frame.this_obj, true)?;
    persist::save_object(world, frame.this_obj, &canon)?;
    Ok(Value::Int(1))
}

/// Returns 1 on success, 0 when no save file exists.
pub fn restore_object(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let path = arg_str(&args, 0, "restore_object")?;
    let cwd = world.cwd_of(ctx);
    let canon = paths::canonicalize(&path, &cwd)?;
    world.check_path(ctx, &canon, frame.this_obj, false)?;
    let restored = persist::restore_object(world, frame.this_obj, &canon)?;
    Ok(Value::Int(if restored { 1 } else { 0 }))
}

/// Run a command line as this object, through the normal dispatch path.
pub fn command(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let line = arg_str(&args, 0, "command")?;
    let saved = ctx.this_player;
    ctx.this_player = Some(frame.this_obj);
    let result = world.dispatch_command_with(ctx, frame.this_obj, &line);
    ctx.this_player = saved;
    let handled = result?;
    Ok(Value::Int(if handled { 1 } else { 0 }))
}
