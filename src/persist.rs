//! Plain-text object persistence
//!
//! One line per declared variable: `<name> <encoded-value>`. Ints are
//! decimal, strings are quoted with `\n \" \\` escapes, arrays are
//! `({ ... })`, mappings are `([ k:v, ... ])`, object refs are their id
//! as a quoted string (re-resolved on restore, nil when gone), and nil
//! is `0`. Restore ignores unknown names, zero-fills missing ones, and
//! overwrites every declared slot.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use tracing::debug;

use crate::ast::Type;
use crate::errors::RuntimeError;
use crate::object::{paths, ObjRef};
use crate::value::{escape, MapKey, Value};
use crate::world::World;

pub fn save_object(world: &World, target: ObjRef, canon: &str) -> Result<(), RuntimeError> {
    let obj = world
        .objects
        .get(target)
        .ok_or_else(|| RuntimeError::typed("save_object on a destructed object"))?;
    let mut out = String::new();
    for (slot, var) in obj.blueprint.all_vars().iter().enumerate() {
        let v = obj.vars.get(slot).cloned().unwrap_or(Value::Nil);
        out.push_str(&var.name);
        out.push(' ');
        encode(world, &v, &mut out);
        out.push('\n');
    }

    let file = paths::save_file(&world.objects.root, canon);
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| RuntimeError::io(format!("mkdir for {}: {}", canon, e)))?;
    }
    fs::write(&file, out).map_err(|e| RuntimeError::io(format!("save {}: {}", canon, e)))?;
    debug!(object = %obj.id, file = %file.display(), "saved");
    Ok(())
}

/// Returns false when no save file exists.
pub fn restore_object(
    world: &mut World,
    target: ObjRef,
    canon: &str,
) -> Result<bool, RuntimeError> {
    let file = paths::save_file(&world.objects.root, canon);
    let text = match fs::read_to_string(&file) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(RuntimeError::io(format!("restore {}: {}", canon, e))),
    };

    let mut stored: HashMap<String, Value> = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, rest)) = line.split_once(' ') else { continue };
        let v = decode(rest).map_err(|mut e| {
            e.line = Some(lineno + 1);
            e
        })?;
        stored.insert(name.to_string(), v);
    }

    let decls: Vec<(String, Type, bool)> = match world.objects.get(target) {
        Some(obj) => obj
            .blueprint
            .all_vars()
            .iter()
            .map(|v| (v.name.clone(), v.ty, v.array))
            .collect(),
        None => return Err(RuntimeError::typed("restore_object on a destructed object")),
    };

    let mut new_vars = Vec::with_capacity(decls.len());
    for (name, ty, array) in &decls {
        let v = match stored.remove(name) {
            Some(v) => resolve_refs(world, v, *ty),
            None => Value::type_zero(*ty, *array),
        };
        new_vars.push(v);
    }
    if let Some(obj) = world.objects.get_mut(target) {
        obj.vars = new_vars;
    }
    Ok(true)
}

/// Re-resolve saved object ids inside a value restored into a slot
/// declared `object` or `object*`: id strings become live refs (nil when
/// gone), arrays and mapping values are walked recursively. Slots of
/// other declared types keep their strings, since the text format cannot
/// distinguish an id from ordinary string data.
fn resolve_refs(world: &World, v: Value, ty: Type) -> Value {
    if ty != Type::Object {
        return v;
    }
    match v {
        Value::Str(id) => match world.objects.find(&id) {
            Some(r) => Value::Object(r),
            None => Value::Nil,
        },
        Value::Array(items) => {
            let resolved: Vec<Value> = items
                .borrow()
                .iter()
                .map(|e| resolve_refs(world, e.clone(), ty))
                .collect();
            Value::array(resolved)
        }
        Value::Mapping(map) => {
            let resolved: BTreeMap<MapKey, Value> = map
                .borrow()
                .iter()
                .map(|(k, val)| (k.clone(), resolve_refs(world, val.clone(), ty)))
                .collect();
            Value::mapping(resolved)
        }
        other => other,
    }
}

fn encode(world: &World, v: &Value, out: &mut String) {
    match v {
        Value::Nil => out.push('0'),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Str(s) => {
            out.push('"');
            out.push_str(&escape(s));
            out.push('"');
        }
        Value::Object(r) => match world.objects.get(*r) {
            Some(obj) => {
                out.push('"');
                out.push_str(&escape(&obj.id));
                out.push('"');
            }
            None => out.push('0'),
        },
        Value::Array(items) => {
            out.push_str("({ ");
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode(world, item, out);
            }
            out.push_str(" })");
        }
        Value::Mapping(map) => {
            out.push_str("([ ");
            for (i, (k, val)) in map.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode(world, &Value::from_map_key(k), out);
                out.push(':');
                encode(world, val, out);
            }
            out.push_str(" ])");
        }
    }
}

pub fn decode(text: &str) -> Result<Value, RuntimeError> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = Cursor { chars, pos: 0 };
    let v = cursor.value()?;
    Ok(v)
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn bad(&self, what: &str) -> RuntimeError {
        RuntimeError::io(format!("corrupt save value: {}", what))
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.current().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.current() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_str(&mut self, s: &str) -> Result<(), RuntimeError> {
        for ch in s.chars() {
            if !self.eat(ch) {
                return Err(self.bad(&format!("expected `{}`", s)));
            }
        }
        Ok(())
    }

    fn value(&mut self) -> Result<Value, RuntimeError> {
        self.skip_ws();
        match self.current() {
            Some('"') => self.string(),
            Some('(') => {
                self.pos += 1;
                match self.current() {
                    Some('{') => {
                        self.pos += 1;
                        self.array()
                    }
                    Some('[') => {
                        self.pos += 1;
                        self.mapping()
                    }
                    _ => Err(self.bad("expected ({ or ([")),
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => self.int(),
            _ => Err(self.bad("expected a value")),
        }
    }

    fn int(&mut self) -> Result<Value, RuntimeError> {
        let negative = self.eat('-');
        let mut digits = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.bad("expected digits"));
        }
        let n: i64 = digits.parse().map_err(|_| self.bad("int out of range"))?;
        Ok(Value::Int(if negative { -n } else { n }))
    }

    fn string(&mut self) -> Result<Value, RuntimeError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        while let Some(c) = self.current() {
            self.pos += 1;
            match c {
                '"' => return Ok(Value::str(out)),
                '\\' => match self.current() {
                    Some('n') => {
                        out.push('\n');
                        self.pos += 1;
                    }
                    Some('"') => {
                        out.push('"');
                        self.pos += 1;
                    }
                    Some('\\') => {
                        out.push('\\');
                        self.pos += 1;
                    }
                    _ => return Err(self.bad("bad escape")),
                },
                other => out.push(other),
            }
        }
        Err(self.bad("unterminated string"))
    }

    fn array(&mut self) -> Result<Value, RuntimeError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.current() == Some('}') {
                self.pos += 1;
                self.expect_str(")")?;
                return Ok(Value::array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            self.eat(',');
        }
    }

    fn mapping(&mut self) -> Result<Value, RuntimeError> {
        let mut map = std::collections::BTreeMap::new();
        loop {
            self.skip_ws();
            if self.current() == Some(']') {
                self.pos += 1;
                self.expect_str(")")?;
                return Ok(Value::mapping(map));
            }
            let key = self.value()?;
            self.skip_ws();
            if !self.eat(':') {
                return Err(self.bad("expected `:` in mapping"));
            }
            let val = self.value()?;
            let key = match key {
                Value::Int(n) => MapKey::Int(n),
                Value::Str(s) => MapKey::Str(s),
                _ => return Err(self.bad("bad mapping key")),
            };
            map.insert(key, val);
            self.skip_ws();
            self.eat(',');
        }
    }
}
