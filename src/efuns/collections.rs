//! Collection efuns over arrays and mappings.

use crate::errors::RuntimeError;
use crate::value::Value;

/// Keys of a mapping in the runtime's stable iteration order. Also
/// exposed as `m_indices`.
pub fn keys(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Mapping(map)) => {
            let keys: Vec<Value> = map.borrow().keys().map(Value::from_map_key).collect();
            Ok(Value::array(keys))
        }
        Some(Value::Nil) | None => Ok(Value::array(Vec::new())),
        Some(other) => Err(RuntimeError::typed(format!(
            "keys: got {}",
            other.type_name()
        ))),
    }
}

/// Remove a key, returning the same mapping handle.
pub fn m_delete(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let Some(Value::Mapping(map)) = args.first() else {
        return Err(RuntimeError::typed("m_delete: first argument must be a mapping"));
    };
    if let Some(keyv) = args.get(1) {
        if let Ok(key) = keyv.into_map_key() {
            map.borrow_mut().remove(&key);
        }
    }
    Ok(Value::Mapping(map.clone()))
}

/// Element count: arrays and mappings by length, strings by bytes, and
/// zero for everything empty-like (`sizeof(nil) == 0`).
pub fn sizeof(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let n = match args.first() {
        Some(Value::Array(items)) => items.borrow().len(),
        Some(Value::Mapping(map)) => map.borrow().len(),
        Some(Value::Str(s)) => s.len(),
        _ => 0,
    };
    Ok(Value::Int(n as i64))
}
