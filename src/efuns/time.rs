//! Time and scheduling efuns.

use chrono::{Datelike, Local, TimeZone, Timelike};

use crate::efuns::{arg_int, arg_str};
use crate::errors::RuntimeError;
use crate::interp::Frame;
use crate::value::Value;
use crate::world::World;

/// `localtime(t)` - broken-down local time as
/// `({ sec, min, hour, mday, mon, year, wday, yday })`, months and
/// weekdays zero-based (Sunday = 0).
pub fn localtime(world: &World, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let t = if args.is_empty() {
        world.now as i64
    } else {
        arg_int(&args, 0, "localtime")?
    };
    let dt = Local
        .timestamp_opt(t, 0)
        .single()
        .ok_or_else(|| RuntimeError::typed("localtime: timestamp out of range"))?;
    Ok(Value::array(vec![
        Value::Int(dt.second() as i64),
        Value::Int(dt.minute() as i64),
        Value::Int(dt.hour() as i64),
        Value::Int(dt.day() as i64),
        Value::Int(dt.month0() as i64),
        Value::Int(dt.year() as i64),
        Value::Int(dt.weekday().num_days_from_sunday() as i64),
        Value::Int(dt.ordinal0() as i64),
    ]))
}

/// `call_out(func, delay, args...)` - one-shot deferred call on this
/// object. Destructing the object cancels it; there is no by-name
/// cancellation.
pub fn call_out(
    world: &mut World,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let func = arg_str(&args, 0, "call_out")?;
    let delay = arg_int(&args, 1, "call_out")?;
    let extra: Vec<Value> = args.into_iter().skip(2).collect();
    let now = world.now;
    world
        .sched
        .schedule(frame.this_obj, func, delay, extra, now);
    Ok(Value::Int(1))
}

pub fn set_heart_beat(
    world: &mut World,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let on = arg_int(&args, 0, "set_heart_beat")? != 0;
    world.sched.set_heart_beat(frame.this_obj, on);
    if let Some(obj) = world.objects.get_mut(frame.this_obj) {
        obj.heart_beat = on;
    }
    Ok(Value::Int(1))
}

/// `set_reset(interval)` - periodic `reset()` with a per-object
/// interval; zero disables it.
pub fn set_reset(
    world: &mut World,
    frame: &mut Frame,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let interval = arg_int(&args, 0, "set_reset")?;
    let now = world.now;
    world.sched.set_reset(frame.this_obj, interval, now);
    if let Some(obj) = world.objects.get_mut(frame.this_obj) {
        obj.reset_interval = if interval > 0 { Some(interval as u64) } else { None };
    }
    Ok(Value::Int(1))
}
