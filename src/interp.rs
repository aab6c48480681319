//! Tree-walking interpreter
//!
//! Evaluation happens inside an activation: an object, the blueprint
//! level that defines the running function, a local frame, and the
//! ambient `this_player`/`previous_object` handles carried on the
//! evaluation context rather than in process globals. Every statement
//! and expression costs one step from the dispatch's instruction budget;
//! exhausting it aborts the whole activation chain with
//! `EvalBudgetExceeded`. A hard activation-depth cap keeps runaway
//! recursion off the host stack.

use std::collections::HashMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{AssignOp, BinOp, Expr, FunctionDef, Stmt};
use crate::errors::{ErrorKind, RuntimeError};
use crate::object::{Blueprint, ObjRef};
use crate::value::{self, Value};
use crate::world::World;

/// Ambient evaluation state for one dispatch. `this_player` is set once
/// at dispatch entry and preserved across cross-object calls.
pub struct EvalCtx {
    pub steps: u64,
    pub depth: usize,
    pub this_player: Option<ObjRef>,
    pub verb: Option<String>,
}

impl EvalCtx {
    pub fn new(budget: u64) -> Self {
        EvalCtx {
            steps: budget,
            depth: 0,
            this_player: None,
            verb: None,
        }
    }

    fn step(&mut self) -> Result<(), RuntimeError> {
        if self.steps == 0 {
            return Err(RuntimeError::budget());
        }
        self.steps -= 1;
        Ok(())
    }
}

/// One activation's locals and identity.
pub struct Frame {
    pub this_obj: ObjRef,
    pub def_bp: Rc<Blueprint>,
    pub prev_obj: Option<ObjRef>,
    pub locals: HashMap<String, Value>,
}

enum Flow {
    Normal,
    Return(Value),
}

/// Dead object refs read as nil everywhere the scripts can observe them.
pub fn normalize(world: &World, v: Value) -> Value {
    match v {
        Value::Object(r) if !world.objects.is_live(r) => Value::Nil,
        other => other,
    }
}

/// World-aware truthiness: destructed refs are false.
pub fn truthy(world: &World, v: &Value) -> bool {
    match v {
        Value::Object(r) => world.objects.is_live(*r),
        other => other.truthy_basic(),
    }
}

/// Call `name` on `target`, walking its inheritance chain. Returns
/// `None` when the target is destructed or defines no such function;
/// capability probing via missing functions is not an error.
pub fn try_call(
    world: &mut World,
    ctx: &mut EvalCtx,
    target: ObjRef,
    name: &str,
    args: Vec<Value>,
    prev: Option<ObjRef>,
) -> Result<Option<Value>, RuntimeError> {
    let bp = match world.objects.get(target) {
        Some(obj) => obj.blueprint.clone(),
        None => return Ok(None),
    };
    let (def_bp, fun) = match bp.find_function(name) {
        Some(found) => found,
        None => return Ok(None),
    };
    call_with(world, ctx, target, def_bp, fun, args, prev).map(Some)
}

/// Like [`try_call`] but collapsing the missing-function case to nil.
pub fn call_function(
    world: &mut World,
    ctx: &mut EvalCtx,
    target: ObjRef,
    name: &str,
    args: Vec<Value>,
    prev: Option<ObjRef>,
) -> Result<Value, RuntimeError> {
    Ok(try_call(world, ctx, target, name, args, prev)?.unwrap_or(Value::Nil))
}

fn call_with(
    world: &mut World,
    ctx: &mut EvalCtx,
    target: ObjRef,
    def_bp: Rc<Blueprint>,
    fun: Rc<FunctionDef>,
    args: Vec<Value>,
    prev: Option<ObjRef>,
) -> Result<Value, RuntimeError> {
    if ctx.depth >= world.config.max_call_depth {
        return Err(RuntimeError::new(
            ErrorKind::EvalBudgetExceeded,
            format!("activation depth limit in {}()", fun.name),
        ));
    }
    ctx.depth += 1;

    let mut locals = HashMap::new();
    for (i, p) in fun.params.iter().enumerate() {
        let v = match args.get(i) {
            Some(v) => v.clone(),
            // missing trailing arguments get their declared zero
            None => Value::type_zero(p.ty, p.array),
        };
        locals.insert(p.name.clone(), v);
    }

    let mut frame = Frame {
        this_obj: target,
        def_bp,
        prev_obj: prev,
        locals,
    };

    let mut result = Value::Nil;
    let mut outcome: Result<(), RuntimeError> = Ok(());
    for stmt in &fun.body {
        match eval_stmt(world, ctx, &mut frame, stmt) {
            Ok(Flow::Return(v)) => {
                result = v;
                break;
            }
            Ok(Flow::Normal) => {}
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    ctx.depth -= 1;
    outcome?;
    Ok(result)
}

/// Evaluate the declared-variable initializers of a freshly created
/// object, each at the blueprint level that declares it.
pub fn init_object_vars(
    world: &mut World,
    ctx: &mut EvalCtx,
    target: ObjRef,
) -> Result<(), RuntimeError> {
    let bp = match world.objects.get(target) {
        Some(obj) => obj.blueprint.clone(),
        None => return Ok(()),
    };
    let mut chain: Vec<Rc<Blueprint>> = Vec::new();
    let mut cur = Some(bp);
    while let Some(level) = cur {
        cur = level.parent.clone();
        chain.push(level);
    }
    chain.reverse(); // parents first

    for level in chain {
        for (i, var) in level.program.vars.iter().enumerate() {
            let Some(init) = var.init.clone() else { continue };
            let mut frame = Frame {
                this_obj: target,
                def_bp: level.clone(),
                prev_obj: None,
                locals: HashMap::new(),
            };
            let v = eval_expr(world, ctx, &mut frame, &init)?;
            if let Some(obj) = world.objects.get_mut(target) {
                obj.vars[level.slot_base + i] = v;
            }
        }
    }
    Ok(())
}

fn eval_stmt(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    stmt: &Stmt,
) -> Result<Flow, RuntimeError> {
    ctx.step()?;
    match stmt {
        Stmt::Block(stmts) => {
            for s in stmts {
                if let Flow::Return(v) = eval_stmt(world, ctx, frame, s)? {
                    return Ok(Flow::Return(v));
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::If { cond, then, els } => {
            let c = eval_expr(world, ctx, frame, cond)?;
            if truthy(world, &c) {
                eval_stmt(world, ctx, frame, then)
            } else if let Some(els) = els {
                eval_stmt(world, ctx, frame, els)
            } else {
                Ok(Flow::Normal)
            }
        }
        Stmt::While { cond, body } => {
            loop {
                let c = eval_expr(world, ctx, frame, cond)?;
                if !truthy(world, &c) {
                    break;
                }
                if let Flow::Return(v) = eval_stmt(world, ctx, frame, body)? {
                    return Ok(Flow::Return(v));
                }
                ctx.step()?;
            }
            Ok(Flow::Normal)
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                eval_stmt(world, ctx, frame, init)?;
            }
            loop {
                if let Some(cond) = cond {
                    let c = eval_expr(world, ctx, frame, cond)?;
                    if !truthy(world, &c) {
                        break;
                    }
                }
                if let Flow::Return(v) = eval_stmt(world, ctx, frame, body)? {
                    return Ok(Flow::Return(v));
                }
                if let Some(step) = step {
                    eval_expr(world, ctx, frame, step)?;
                }
                ctx.step()?;
            }
            Ok(Flow::Normal)
        }
        Stmt::Return(expr) => {
            let v = match expr {
                Some(e) => eval_expr(world, ctx, frame, e)?,
                None => Value::Nil,
            };
            Ok(Flow::Return(v))
        }
        Stmt::Decl(var) => {
            let v = match &var.init {
                Some(e) => eval_expr(world, ctx, frame, e)?,
                None => Value::type_zero(var.ty, var.array),
            };
            frame.locals.insert(var.name.clone(), v);
            Ok(Flow::Normal)
        }
        Stmt::Expr(e) => {
            eval_expr(world, ctx, frame, e)?;
            Ok(Flow::Normal)
        }
    }
}

fn eval_expr(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    expr: &Expr,
) -> Result<Value, RuntimeError> {
    ctx.step()?;
    match expr {
        Expr::IntLit(n) => Ok(Value::Int(*n)),
        Expr::StrLit(s) => Ok(Value::str(s)),
        Expr::ArrayLit(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(world, ctx, frame, item)?);
            }
            Ok(Value::array(out))
        }
        Expr::MapLit(pairs) => {
            let mut map = std::collections::BTreeMap::new();
            for (k, v) in pairs {
                let key = eval_expr(world, ctx, frame, k)?.into_map_key()?;
                let val = eval_expr(world, ctx, frame, v)?;
                map.insert(key, val);
            }
            Ok(Value::mapping(map))
        }
        Expr::Ident(name) => read_ident(world, frame, name),
        Expr::Assign { target, op, value } => {
            let rhs = eval_expr(world, ctx, frame, value)?;
            let assigned = match op {
                AssignOp::Set => rhs,
                AssignOp::Add => {
                    let cur = read_target(world, ctx, frame, target)?;
                    value::add(&cur, &rhs)?
                }
                AssignOp::Sub => {
                    let cur = read_target(world, ctx, frame, target)?;
                    value::sub(&cur, &rhs)?
                }
            };
            assign_to(world, ctx, frame, target, assigned.clone())?;
            Ok(assigned)
        }
        Expr::Binary { op, left, right } => {
            let l = eval_expr(world, ctx, frame, left)?;
            let r = eval_expr(world, ctx, frame, right)?;
            eval_binary(world, *op, l, r)
        }
        Expr::And(l, r) => {
            let lv = eval_expr(world, ctx, frame, l)?;
            if !truthy(world, &lv) {
                return Ok(Value::Int(0));
            }
            eval_expr(world, ctx, frame, r)
        }
        Expr::Or(l, r) => {
            let lv = eval_expr(world, ctx, frame, l)?;
            if truthy(world, &lv) {
                return Ok(lv);
            }
            eval_expr(world, ctx, frame, r)
        }
        Expr::Not(e) => {
            let v = eval_expr(world, ctx, frame, e)?;
            Ok(Value::Int(if truthy(world, &v) { 0 } else { 1 }))
        }
        Expr::Neg(e) => {
            let v = eval_expr(world, ctx, frame, e)?;
            match v {
                Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                other => Err(RuntimeError::typed(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Index { base, index } => {
            let b = eval_expr(world, ctx, frame, base)?;
            let i = eval_expr(world, ctx, frame, index)?;
            value::index(&b, &i)
        }
        Expr::Slice { base, lo, hi } => {
            let b = eval_expr(world, ctx, frame, base)?;
            let lo = eval_expr(world, ctx, frame, lo)?;
            let hi = eval_expr(world, ctx, frame, hi)?;
            value::slice(&b, &lo, &hi)
        }
        Expr::Call { name, args, line } => {
            // functions on this object's chain shadow efuns
            let this_bp = world
                .objects
                .get(frame.this_obj)
                .map(|o| o.blueprint.clone());
            if let Some(bp) = this_bp {
                if let Some((def_bp, fun)) = bp.find_function(name) {
                    let argv = eval_args(world, ctx, frame, args)?;
                    return call_with(
                        world,
                        ctx,
                        frame.this_obj,
                        def_bp,
                        fun,
                        argv,
                        Some(frame.this_obj),
                    );
                }
            }
            if name == "sscanf" {
                return eval_sscanf(world, ctx, frame, args);
            }
            let argv = eval_args(world, ctx, frame, args)?;
            match crate::efuns::dispatch(world, ctx, frame, name, argv)? {
                Some(v) => Ok(v),
                None => Err(RuntimeError::typed(format!(
                    "call to unknown function `{}`",
                    name
                ))
                .with_line(*line)),
            }
        }
        Expr::SuperCall { name, args, .. } => {
            let parent = frame.def_bp.parent.clone();
            let Some(parent) = parent else {
                return Ok(Value::Nil);
            };
            let Some((def_bp, fun)) = parent.find_function(name) else {
                return Ok(Value::Nil);
            };
            let argv = eval_args(world, ctx, frame, args)?;
            call_with(
                world,
                ctx,
                frame.this_obj,
                def_bp,
                fun,
                argv,
                Some(frame.this_obj),
            )
        }
        Expr::ArrowCall {
            obj, name, args, ..
        } => {
            let target = eval_expr(world, ctx, frame, obj)?;
            let target = normalize(world, target);
            let target_ref = match target {
                Value::Nil => return Ok(Value::Nil),
                Value::Object(r) => r,
                Value::Str(path) => {
                    let cwd = world.cwd_of(ctx);
                    world.load_object(ctx, &path, &cwd)?
                }
                other => {
                    return Err(RuntimeError::typed(format!(
                        "cannot call into {}",
                        other.type_name()
                    )))
                }
            };
            let argv = eval_args(world, ctx, frame, args)?;
            call_function(world, ctx, target_ref, name, argv, Some(frame.this_obj))
        }
    }
}

fn eval_args(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: &[Expr],
) -> Result<Vec<Value>, RuntimeError> {
    let mut out: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
    for a in args {
        out.push(eval_expr(world, ctx, frame, a)?);
    }
    Ok(out.into_vec())
}

fn read_ident(world: &World, frame: &Frame, name: &str) -> Result<Value, RuntimeError> {
    if let Some(v) = frame.locals.get(name) {
        return Ok(v.clone());
    }
    if let Some(slot) = frame.def_bp.slot_of(name) {
        // a destructed object's slots read as type-zero
        let v = world
            .objects
            .get(frame.this_obj)
            .and_then(|o| o.vars.get(slot).cloned())
            .unwrap_or(Value::Nil);
        return Ok(v);
    }
    Err(RuntimeError::typed(format!(
        "undeclared variable `{}`",
        name
    )))
}

fn read_target(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    target: &Expr,
) -> Result<Value, RuntimeError> {
    match target {
        Expr::Ident(name) => read_ident(world, frame, name),
        Expr::Index { base, index } => {
            let b = eval_expr(world, ctx, frame, base)?;
            let i = eval_expr(world, ctx, frame, index)?;
            value::index(&b, &i)
        }
        _ => Err(RuntimeError::typed("invalid assignment target")),
    }
}

fn assign_to(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    target: &Expr,
    v: Value,
) -> Result<(), RuntimeError> {
    match target {
        Expr::Ident(name) => {
            if let Some(slot) = frame.locals.get_mut(name) {
                *slot = v;
                return Ok(());
            }
            if let Some(slot) = frame.def_bp.slot_of(name) {
                // writes into a destructed object are dropped
                if let Some(obj) = world.objects.get_mut(frame.this_obj) {
                    if let Some(cell) = obj.vars.get_mut(slot) {
                        *cell = v;
                    }
                }
                return Ok(());
            }
            Err(RuntimeError::typed(format!(
                "undeclared variable `{}`",
                name
            )))
        }
        Expr::Index { base, index } => {
            let b = eval_expr(world, ctx, frame, base)?;
            let i = eval_expr(world, ctx, frame, index)?;
            value::index_assign(&b, &i, v)
        }
        _ => Err(RuntimeError::typed("invalid assignment target")),
    }
}

fn eval_binary(world: &World, op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add => value::add(&l, &r),
        BinOp::Sub => value::sub(&l, &r),
        BinOp::Mul => value::mul(&l, &r),
        BinOp::Div => value::div(&l, &r),
        BinOp::Mod => value::rem(&l, &r),
        BinOp::Eq | BinOp::Ne => {
            let l = normalize(world, l);
            let r = normalize(world, r);
            let eq = l == r;
            let hit = if op == BinOp::Eq { eq } else { !eq };
            Ok(Value::Int(if hit { 1 } else { 0 }))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = value::compare(&l, &r)?;
            let hit = match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Int(if hit { 1 } else { 0 }))
        }
    }
}

/// `sscanf(input, fmt, lv...)` needs assignable output arguments, so it
/// is handled here rather than in the efun table.
fn eval_sscanf(
    world: &mut World,
    ctx: &mut EvalCtx,
    frame: &mut Frame,
    args: &[Expr],
) -> Result<Value, RuntimeError> {
    if args.len() < 2 {
        return Err(RuntimeError::typed("sscanf needs an input and a format"));
    }
    let input = eval_expr(world, ctx, frame, &args[0])?;
    let fmt = eval_expr(world, ctx, frame, &args[1])?;
    let (Some(input), Some(fmt)) = (input.as_str(), fmt.as_str()) else {
        return Err(RuntimeError::typed("sscanf input and format must be strings"));
    };

    let (matched, zeros) = crate::efuns::strings::sscanf_match(input, fmt);
    let count = matched.len();
    for (i, target) in args[2..].iter().enumerate() {
        let v = matched
            .get(i)
            .cloned()
            .unwrap_or_else(|| zeros.get(i).cloned().unwrap_or(Value::Int(0)));
        assign_to(world, ctx, frame, target, v)?;
    }
    Ok(Value::Int(count as i64))
}

trait WithLine {
    fn with_line(self, line: usize) -> Self;
}

impl WithLine for RuntimeError {
    fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}
