//! The world: object table, scheduler, connections, and dispatch
//!
//! Everything script-visible is owned here and mutated synchronously by
//! the single driver loop. A command dispatch, callout, heartbeat, or
//! reset is one top-level activation chain with its own instruction
//! budget; its cross-object effects are immediately visible to the next
//! dispatch.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::errors::RuntimeError;
use crate::interp::{self, EvalCtx};
use crate::object::{paths, ObjRef, Object, ObjectTable};
use crate::reload;
use crate::sched::Scheduler;
use crate::value::Value;

pub struct World {
    pub config: DriverConfig,
    pub objects: ObjectTable,
    pub sched: Scheduler,
    /// Unix seconds, advanced by the driver loop.
    pub now: u64,
    next_heartbeat: u64,
    /// Per-connection output buffers, flushed at end of dispatch.
    outbox: BTreeMap<u64, String>,
    conn_players: HashMap<u64, ObjRef>,
    pub linkdead: Vec<ObjRef>,
    pub shutdown: bool,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl World {
    pub fn new(root: PathBuf, config: DriverConfig) -> World {
        World {
            config,
            objects: ObjectTable::new(root),
            sched: Scheduler::new(),
            now: unix_now(),
            next_heartbeat: 0,
            outbox: BTreeMap::new(),
            conn_players: HashMap::new(),
            linkdead: Vec::new(),
            shutdown: false,
        }
    }

    pub fn fresh_ctx(&self) -> EvalCtx {
        EvalCtx::new(self.config.eval_budget)
    }

    /// Load the master blueprint. Called once at startup, before any
    /// other object exists.
    pub fn boot(&mut self) -> Result<ObjRef, RuntimeError> {
        let path = self.config.master_path.clone();
        let mut ctx = self.fresh_ctx();
        let master = self.load_object(&mut ctx, &path, "/")?;
        info!(path = %path, "master object loaded");
        Ok(master)
    }

    pub fn master(&self) -> Option<ObjRef> {
        let canon = paths::canonicalize(&self.config.master_path, "/").ok()?;
        self.objects.find(&canon)
    }

    /// Working directory for relative paths: carried on the interactive
    /// object that initiated the dispatch.
    pub fn cwd_of(&self, ctx: &EvalCtx) -> String {
        ctx.this_player
            .and_then(|r| self.objects.get(r))
            .map(|o| o.cwd.clone())
            .unwrap_or_else(|| "/".to_string())
    }

    // ---- loading, cloning, destructing ----

    /// Load (or return) the master instance for `path`. When the source
    /// on disk is newer than the compiled blueprint, the blueprint and
    /// its dependents are recompiled first.
    pub fn load_object(
        &mut self,
        ctx: &mut EvalCtx,
        path: &str,
        cwd: &str,
    ) -> Result<ObjRef, RuntimeError> {
        let canon = paths::canonicalize(path, cwd)?;
        if let Some(existing) = self.objects.find(&canon) {
            let stale = match (
                self.objects.source_mtime(&canon),
                self.objects.blueprint(&canon).and_then(|b| b.mtime),
            ) {
                (Some(disk), Some(compiled)) => disk > compiled,
                _ => false,
            };
            if !stale {
                return Ok(existing);
            }
            reload::update(self, ctx, &canon)?;
            if let Some(fresh) = self.objects.find(&canon) {
                return Ok(fresh);
            }
        }
        let (bp, _) = self.objects.ensure_blueprint(&canon)?;
        self.birth(ctx, bp, canon)
    }

    /// Compile an in-memory source under `canon` and create its master
    /// instance, replacing any previous one. Used by the REPL, `--eval`,
    /// and tests.
    pub fn load_from_source(
        &mut self,
        ctx: &mut EvalCtx,
        canon: &str,
        src: &str,
    ) -> Result<ObjRef, RuntimeError> {
        if let Some(old) = self.objects.find(canon) {
            self.destruct_inner(old, false);
        }
        let bp = self.objects.compile_source(canon, src)?;
        self.birth(ctx, bp, canon.to_string())
    }

    pub fn clone_object(
        &mut self,
        ctx: &mut EvalCtx,
        path: &str,
        cwd: &str,
    ) -> Result<ObjRef, RuntimeError> {
        let canon = paths::canonicalize(path, cwd)?;
        self.load_object(ctx, &canon, "/")?;
        let bp = self
            .objects
            .blueprint(&canon)
            .ok_or_else(|| RuntimeError::load(format!("no blueprint for {}", canon)))?;
        let seq = self.objects.next_clone_seq(&canon);
        let id = format!("{}#{}", canon, seq);
        self.birth(ctx, bp, id)
    }

    /// Allocate the object, run declared initializers, then `create()`.
    pub(crate) fn birth(
        &mut self,
        ctx: &mut EvalCtx,
        bp: std::rc::Rc<crate::object::Blueprint>,
        id: String,
    ) -> Result<ObjRef, RuntimeError> {
        let vars = bp
            .all_vars()
            .iter()
            .map(|v| Value::type_zero(v.ty, v.array))
            .collect();
        let r = self.objects.insert(Object::new(id, bp, vars));
        interp::init_object_vars(self, ctx, r)?;
        interp::call_function(self, ctx, r, "create", Vec::new(), None)?;
        Ok(r)
    }

    pub fn destruct(&mut self, r: ObjRef) {
        self.destruct_inner(r, true);
    }

    /// `invalidate` is false only during hot reload, where the new
    /// blueprint generation is already registered under the path and must
    /// survive the old master instance's teardown.
    pub(crate) fn destruct_inner(&mut self, r: ObjRef, invalidate: bool) {
        let Some(obj) = self.objects.get(r) else { return };
        let env = obj.environment;
        let inventory = obj.inventory.clone();
        let conn = obj.interactive;
        let master_path = if obj.is_master_instance() {
            Some(obj.blueprint.path.clone())
        } else {
            None
        };

        if let Some(env) = env {
            if let Some(envo) = self.objects.get_mut(env) {
                envo.inventory.retain(|x| *x != r);
            }
        }
        self.sched.remove_object(r);
        self.objects.remove(r);
        self.linkdead.retain(|x| *x != r);
        if let Some(conn) = conn {
            self.conn_players.remove(&conn);
        }
        if invalidate {
            // destructing a master instance invalidates its blueprint
            if let Some(path) = master_path {
                self.objects.unregister_blueprint(&path);
            }
        }
        // containment cascade
        for item in inventory {
            self.destruct_inner(item, true);
        }
    }

    // ---- movement and the init protocol ----

    pub fn move_object(
        &mut self,
        ctx: &mut EvalCtx,
        what: ObjRef,
        dest: ObjRef,
    ) -> Result<(), RuntimeError> {
        if !self.objects.is_live(what) || !self.objects.is_live(dest) {
            return Err(RuntimeError::typed("move involving a destructed object"));
        }
        // reject containment cycles
        let mut cursor = Some(dest);
        while let Some(r) = cursor {
            if r == what {
                return Err(RuntimeError::typed("circular containment"));
            }
            cursor = self.objects.get(r).and_then(|o| o.environment);
        }

        let old_env = self.objects.get(what).and_then(|o| o.environment);
        if let Some(old) = old_env {
            if let Some(o) = self.objects.get_mut(old) {
                o.inventory.retain(|x| *x != what);
            }
        }
        {
            let obj = self.objects.get_mut(what).unwrap();
            obj.environment = Some(dest);
            obj.actions.clear();
        }
        self.objects.get_mut(dest).unwrap().inventory.push(what);

        // init protocol: the destination and each prior occupant observe
        // the entrant, and the entrant observes each prior occupant
        let occupants: Vec<ObjRef> = self
            .objects
            .get(dest)
            .map(|o| o.inventory.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|r| *r != what)
            .collect();

        let saved = ctx.this_player;
        let result = (|| {
            ctx.this_player = Some(what);
            interp::call_function(self, ctx, dest, "init", Vec::new(), None)?;
            for occ in &occupants {
                if self.objects.is_live(*occ) && self.objects.is_live(what) {
                    ctx.this_player = Some(what);
                    interp::call_function(self, ctx, *occ, "init", Vec::new(), None)?;
                }
                if self.objects.is_live(*occ) && self.objects.is_live(what) {
                    ctx.this_player = Some(*occ);
                    interp::call_function(self, ctx, what, "init", Vec::new(), None)?;
                }
            }
            Ok(())
        })();
        ctx.this_player = saved;
        result
    }

    // ---- output ----

    pub fn send(&mut self, target: ObjRef, text: &str) {
        let Some(obj) = self.objects.get(target) else { return };
        if let Some(conn) = obj.interactive {
            self.send_conn(conn, text);
        }
    }

    pub fn send_conn(&mut self, conn: u64, text: &str) {
        self.outbox.entry(conn).or_default().push_str(text);
    }

    pub fn take_output(&mut self, conn: u64) -> Option<String> {
        self.outbox.remove(&conn)
    }

    pub fn tell_room(&mut self, room: ObjRef, text: &str, except: &[ObjRef]) {
        let occupants = self
            .objects
            .get(room)
            .map(|o| o.inventory.clone())
            .unwrap_or_default();
        for occ in occupants {
            if !except.contains(&occ) {
                self.send(occ, text);
            }
        }
    }

    // ---- interactive bookkeeping ----

    pub fn users(&self) -> Vec<ObjRef> {
        let mut users: Vec<(u64, ObjRef)> = self
            .conn_players
            .iter()
            .filter(|(_, r)| self.objects.is_live(**r))
            .map(|(c, r)| (*c, *r))
            .collect();
        users.sort_by_key(|(c, _)| *c);
        users.into_iter().map(|(_, r)| r).collect()
    }

    pub fn linkdead_users(&self) -> Vec<ObjRef> {
        self.linkdead
            .iter()
            .copied()
            .filter(|r| self.objects.is_live(*r))
            .collect()
    }

    pub fn player_for(&self, conn: u64) -> Option<ObjRef> {
        self.conn_players.get(&conn).copied()
    }

    /// A new connection arrived: ask the master for a player object, or
    /// clone the configured default.
    pub fn register_connection(&mut self, conn: u64) -> Result<ObjRef, RuntimeError> {
        let mut ctx = self.fresh_ctx();
        let player = match self.master_hook(&mut ctx, "connect", Vec::new())? {
            Some(Value::Object(r)) if self.objects.is_live(r) => r,
            _ => {
                let path = self.config.player_path.clone();
                self.clone_object(&mut ctx, &path, "/")?
            }
        };
        self.bind_connection(conn, player);
        ctx.this_player = Some(player);
        interp::call_function(self, &mut ctx, player, "logon", Vec::new(), None)?;
        info!(conn, player = %self.object_id(player), "connection bound");
        Ok(player)
    }

    /// Attach a connection id to an object, making it interactive.
    pub fn bind_connection(&mut self, conn: u64, player: ObjRef) {
        if let Some(obj) = self.objects.get_mut(player) {
            obj.interactive = Some(conn);
        }
        self.conn_players.insert(conn, player);
    }

    pub fn connection_closed(&mut self, conn: u64) {
        let Some(player) = self.conn_players.remove(&conn) else { return };
        self.outbox.remove(&conn);
        if !self.objects.is_live(player) {
            return;
        }
        if let Some(obj) = self.objects.get_mut(player) {
            obj.interactive = None;
        }
        self.linkdead.push(player);
        warn!(conn, player = %self.object_id(player), "link dead");
        let mut ctx = self.fresh_ctx();
        if let Err(e) = interp::call_function(self, &mut ctx, player, "net_dead", Vec::new(), None) {
            warn!(error = %e, "net_dead hook failed");
        }
    }

    /// Hand an existing connection from `from` to the linkdead object
    /// `to`. Used by login code to resume a linkdead player.
    pub fn reconnect(&mut self, from: ObjRef, to: ObjRef) -> bool {
        let Some(conn) = self.objects.get(from).and_then(|o| o.interactive) else {
            return false;
        };
        if !self.objects.is_live(to) {
            return false;
        }
        if let Some(o) = self.objects.get_mut(from) {
            o.interactive = None;
        }
        self.objects.get_mut(to).unwrap().interactive = Some(conn);
        self.conn_players.insert(conn, to);
        self.linkdead.retain(|r| *r != to);
        info!(conn, player = %self.object_id(to), "reconnected");
        true
    }

    pub fn object_id(&self, r: ObjRef) -> String {
        self.objects
            .get(r)
            .map(|o| o.id.clone())
            .unwrap_or_else(|| "<destructed>".to_string())
    }

    // ---- master policy hooks ----

    /// Call a function on the master object if it defines one.
    pub fn master_hook(
        &mut self,
        ctx: &mut EvalCtx,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, RuntimeError> {
        let Some(master) = self.master() else { return Ok(None) };
        interp::try_call(self, ctx, master, name, args, None)
    }

    /// Master-validated file access for the I/O efuns.
    pub fn check_path(
        &mut self,
        ctx: &mut EvalCtx,
        canon: &str,
        who: ObjRef,
        write: bool,
    ) -> Result<(), RuntimeError> {
        let Some(master) = self.master() else { return Ok(()) };
        if master == who {
            return Ok(());
        }
        let hook = if write { "valid_write" } else { "valid_read" };
        let args = vec![Value::str(canon), Value::Object(who)];
        match interp::try_call(self, ctx, master, hook, args, None)? {
            None => Ok(()),
            Some(v) if interp::truthy(self, &v) => Ok(()),
            Some(_) => Err(RuntimeError::path(format!(
                "{} denied for {}",
                hook, canon
            ))),
        }
    }

    /// Gate for `update`, `reload_changed`, and `shutdown`. With no
    /// master or no hook, only non-interactive dispatches (boot, REPL,
    /// tests) may pass.
    pub fn admin_gate(&mut self, ctx: &mut EvalCtx) -> Result<(), RuntimeError> {
        if self.master().is_none() {
            return Ok(());
        }
        let subject = match ctx.this_player {
            Some(r) => Value::Object(r),
            None => return Ok(()),
        };
        match self.master_hook(ctx, "valid_admin", vec![subject])? {
            Some(v) if interp::truthy(self, &v) => Ok(()),
            Some(_) => Err(RuntimeError::path("administrative permission denied")),
            None => Err(RuntimeError::path("administrative permission denied")),
        }
    }

    // ---- command dispatch ----

    /// Top-level entry for one input line from an interactive object.
    /// Errors abort the dispatch and are rendered back to the player.
    pub fn dispatch_command(&mut self, player: ObjRef, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let mut ctx = self.fresh_ctx();
        ctx.this_player = Some(player);
        debug!(player = %self.object_id(player), line, "dispatch");
        match self.dispatch_command_with(&mut ctx, player, line) {
            Ok(true) => {}
            Ok(false) => self.send(player, "What?\n"),
            Err(e) => {
                warn!(player = %self.object_id(player), error = %e, "command failed");
                let rendered = format!("{}\n", e.render());
                self.send(player, &rendered);
            }
        }
    }

    /// Shared dispatch path, also used by the `command` efun. Returns
    /// whether any handler claimed the verb.
    pub fn dispatch_command_with(
        &mut self,
        ctx: &mut EvalCtx,
        commander: ObjRef,
        line: &str,
    ) -> Result<bool, RuntimeError> {
        let (mut verb, mut rest) = split_verb(line);

        // per-player alias map, consulted on the first token only
        if let Some(Value::Mapping(aliases)) =
            interp::try_call(self, ctx, commander, "query_aliases", Vec::new(), None)?
        {
            let key = Value::str(&verb).into_map_key()?;
            let expansion = aliases.borrow().get(&key).cloned();
            if let Some(Value::Str(exp)) = expansion {
                let expanded = if rest.is_empty() {
                    exp.to_string()
                } else {
                    format!("{} {}", exp, rest)
                };
                let (v, r) = split_verb(&expanded);
                verb = v;
                rest = r;
            }
        }

        let saved_verb = ctx.verb.take();
        ctx.verb = Some(verb.clone());
        let result = self.dispatch_verb(ctx, commander, &verb, &rest);
        ctx.verb = saved_verb;
        result
    }

    fn dispatch_verb(
        &mut self,
        ctx: &mut EvalCtx,
        commander: ObjRef,
        verb: &str,
        rest: &str,
    ) -> Result<bool, RuntimeError> {
        let arg_value = if rest.is_empty() {
            Value::Int(0)
        } else {
            Value::str(rest)
        };

        // init-registered actions: environment's own registrations first,
        // then occupants and inventory, in registration order
        let (env, actions) = match self.objects.get(commander) {
            Some(o) => (o.environment, o.actions.clone()),
            None => return Ok(false),
        };
        let pass = |owner_env: bool| {
            actions
                .iter()
                .filter(|a| a.verb == *verb)
                .filter(|a| (env == Some(a.owner)) == owner_env)
                .cloned()
                .collect::<Vec<_>>()
        };
        for action in pass(true).into_iter().chain(pass(false)) {
            if !self.objects.is_live(action.owner) {
                continue;
            }
            let res = interp::call_function(
                self,
                ctx,
                action.owner,
                &action.func,
                vec![arg_value.clone()],
                Some(commander),
            )?;
            if interp::truthy(self, &res) {
                return Ok(true);
            }
        }

        // command directory fallback, master-resolvable
        let path = match self.master_hook(ctx, "resolve_command", vec![Value::str(verb)])? {
            Some(Value::Str(p)) => p.to_string(),
            _ => format!("{}/{}", self.config.cmd_dir, verb),
        };
        let canon = match paths::canonicalize(&path, "/") {
            Ok(c) => c,
            Err(_) => return Ok(false),
        };
        if !paths::source_file(&self.objects.root, &canon).exists() {
            return Ok(false);
        }
        let cmd_obj = self.load_object(ctx, &canon, "/")?;
        let res = interp::call_function(
            self,
            ctx,
            cmd_obj,
            "main",
            vec![arg_value],
            Some(commander),
        )?;
        Ok(interp::truthy(self, &res))
    }

    // ---- scheduler pump ----

    /// Advance time: fire due callouts, then heartbeats and resets when
    /// the heartbeat tick boundary has been reached. Callback errors are
    /// logged and never remove an object from the heartbeat set.
    pub fn tick(&mut self, now: u64) {
        self.now = now;

        for callout in self.sched.due(now) {
            if !self.objects.is_live(callout.obj) {
                continue;
            }
            let mut ctx = self.fresh_ctx();
            ctx.this_player = self.interactive_self(callout.obj);
            if let Err(e) = interp::call_function(
                self,
                &mut ctx,
                callout.obj,
                &callout.func,
                callout.args.clone(),
                None,
            ) {
                warn!(obj = %self.object_id(callout.obj), func = %callout.func,
                      error = %e, "callout failed");
            }
        }

        if now >= self.next_heartbeat {
            for r in self.sched.heartbeat_members() {
                if !self.objects.is_live(r) {
                    self.sched.set_heart_beat(r, false);
                    continue;
                }
                let mut ctx = self.fresh_ctx();
                ctx.this_player = self.interactive_self(r);
                if let Err(e) =
                    interp::call_function(self, &mut ctx, r, "heart_beat", Vec::new(), None)
                {
                    warn!(obj = %self.object_id(r), error = %e, "heart_beat failed");
                }
            }
            for r in self.sched.due_resets(now) {
                if !self.objects.is_live(r) {
                    continue;
                }
                let mut ctx = self.fresh_ctx();
                if let Err(e) =
                    interp::call_function(self, &mut ctx, r, "reset", Vec::new(), None)
                {
                    warn!(obj = %self.object_id(r), error = %e, "reset failed");
                }
            }
            self.next_heartbeat = now + self.config.tick_seconds();
        }
    }

    fn interactive_self(&self, r: ObjRef) -> Option<ObjRef> {
        self.objects
            .get(r)
            .and_then(|o| o.interactive.map(|_| r))
    }
}

fn split_verb(line: &str) -> (String, String) {
    match line.split_once(' ') {
        Some((verb, rest)) => (verb.to_string(), rest.trim_start().to_string()),
        None => (line.to_string(), String::new()),
    }
}
