//! Command dispatch: the init protocol and action table, alias
//! expansion, the command directory fallback, and error rendering to the
//! initiating player.

mod common;

use common::*;
use mudlark::{ObjRef, Value, World};

const PLAYER: &str = r#"
    mapping aliases;
    void create() {
        aliases = ([ "po": "poke" ]);
    }
    mapping query_aliases() { return aliases; }
    string query_name() { return "tester"; }
"#;

const ROOM: &str = r#"
    int pokes;
    void init() {
        add_action("do_poke", "poke");
    }
    int do_poke(string arg) {
        pokes += 1;
        if (arg) {
            write("You poke " + arg + ".\n");
        } else {
            write("You poke the air.\n");
        }
        return 1;
    }
    int query_pokes() { return pokes; }
"#;

fn setup(w: &mut World) -> (ObjRef, ObjRef) {
    let player = load_src(w, "/t/player", PLAYER);
    let room = load_src(w, "/t/room", ROOM);
    w.bind_connection(7, player);
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(player);
    w.move_object(&mut ctx, player, room).unwrap();
    (player, room)
}

#[test]
fn test_init_registered_action_handles_verb() {
    let mut w = scratch_world();
    let (player, room) = setup(&mut w);

    w.dispatch_command(player, "poke the bear");
    assert_eq!(call(&mut w, room, "query_pokes", vec![]), Value::Int(1));
    let out = w.take_output(7).unwrap();
    assert_eq!(out, "You poke the bear.\n");
}

#[test]
fn test_alias_expansion_on_first_token() {
    let mut w = scratch_world();
    let (player, room) = setup(&mut w);

    w.dispatch_command(player, "po the bear");
    assert_eq!(call(&mut w, room, "query_pokes", vec![]), Value::Int(1));
    assert_eq!(w.take_output(7).unwrap(), "You poke the bear.\n");
}

#[test]
fn test_unknown_verb_says_what() {
    let mut w = scratch_world();
    let (player, _) = setup(&mut w);

    w.dispatch_command(player, "flounce");
    assert_eq!(w.take_output(7).unwrap(), "What?\n");
}

#[test]
fn test_action_cleared_when_leaving_room() {
    let mut w = scratch_world();
    let (player, room) = setup(&mut w);
    let void = load_src(&mut w, "/t/void", "void create() { }");

    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(player);
    w.move_object(&mut ctx, player, void).unwrap();

    w.dispatch_command(player, "poke");
    assert_eq!(w.take_output(7).unwrap(), "What?\n");
    assert_eq!(call(&mut w, room, "query_pokes", vec![]), Value::Int(0));
}

#[test]
fn test_handler_returning_zero_falls_through() {
    let mut w = scratch_world();
    let player = load_src(&mut w, "/t/player", PLAYER);
    let room = load_src(
        &mut w,
        "/t/meh",
        r#"
        void init() { add_action("decline", "wave"); }
        int decline(string arg) { return 0; }
    "#,
    );
    w.bind_connection(7, player);
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(player);
    w.move_object(&mut ctx, player, room).unwrap();

    w.dispatch_command(player, "wave");
    // the only handler declined, no /cmds directory exists
    assert_eq!(w.take_output(7).unwrap(), "What?\n");
}

#[test]
fn test_cmd_directory_fallback() {
    let root = temp_mudlib("cmd-dir");
    write_source(&root, "/t/player", PLAYER);
    write_source(
        &root,
        "/cmds/hello",
        r#"
        int main(string arg) {
            write("Hello, " + this_player()->query_name() + ".\n");
            return 1;
        }
    "#,
    );
    let mut w = world_at(root);
    let player = load(&mut w, "/t/player");
    w.bind_connection(7, player);

    w.dispatch_command(player, "hello");
    assert_eq!(w.take_output(7).unwrap(), "Hello, tester.\n");
}

#[test]
fn test_budget_error_rendered_to_player() {
    let mut w = scratch_world();
    let player = load_src(&mut w, "/t/player", PLAYER);
    let room = load_src(
        &mut w,
        "/t/trap",
        r#"
        void init() { add_action("do_spin", "spin"); }
        int do_spin(string arg) {
            while (1) { }
            return 1;
        }
    "#,
    );
    w.bind_connection(7, player);
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(player);
    w.move_object(&mut ctx, player, room).unwrap();

    w.dispatch_command(player, "spin");
    let out = w.take_output(7).unwrap();
    assert!(out.contains("Error: EvalBudgetExceeded"), "got {:?}", out);

    // the world survives and keeps dispatching
    w.dispatch_command(player, "nothing");
    assert_eq!(w.take_output(7).unwrap(), "What?\n");
}

#[test]
fn test_command_efun_dispatches_as_object() {
    let mut w = scratch_world();
    let (player, room) = setup(&mut w);
    let _ = (player, room);

    let actor = load_src(
        &mut w,
        "/t/actor",
        r#"
        int run(string line) { return command(line); }
    "#,
    );
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(player);
    w.move_object(&mut ctx, actor, room).unwrap();
    // the actor got its own init-registered action on entering
    assert_eq!(
        call(&mut w, actor, "run", vec![Value::str("poke")]),
        Value::Int(1)
    );
    assert_eq!(call(&mut w, room, "query_pokes", vec![]), Value::Int(1));
}

#[test]
fn test_write_goes_to_initiator_tell_object_to_target() {
    let mut w = scratch_world();
    let (player, room) = setup(&mut w);

    let other = load_src(&mut w, "/t/other", PLAYER);
    w.bind_connection(9, other);
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(other);
    w.move_object(&mut ctx, other, room).unwrap();

    // drain anything the protocol produced
    w.take_output(7);
    w.take_output(9);

    let speaker = load_src(
        &mut w,
        "/t/speaker",
        r#"
        void speak(object who, object env) {
            tell_object(who, "private\n");
            tell_room(env, "public\n", ({ who }));
        }
    "#,
    );
    call(
        &mut w,
        speaker,
        "speak",
        vec![Value::Object(player), Value::Object(room)],
    );
    assert_eq!(w.take_output(7).unwrap(), "private\n");
    assert_eq!(w.take_output(9).unwrap(), "public\n");
}

#[test]
fn test_present_matches_by_id_function() {
    let mut w = scratch_world();
    let room = load_src(&mut w, "/t/hall", "void create() { }");
    let sword_src = r#"
        int id(string s) { return s == "sword"; }
    "#;
    let s1 = load_src(&mut w, "/t/sword1", sword_src);
    let s2 = load_src(&mut w, "/t/sword2", sword_src);
    let mut ctx = w.fresh_ctx();
    w.move_object(&mut ctx, s1, room).unwrap();
    w.move_object(&mut ctx, s2, room).unwrap();

    let seeker = load_src(
        &mut w,
        "/t/seeker",
        r#"
        object find(string what, object env) { return present(what, env); }
    "#,
    );
    assert_eq!(
        call(
            &mut w,
            seeker,
            "find",
            vec![Value::str("sword"), Value::Object(room)]
        ),
        Value::Object(s1)
    );
    assert_eq!(
        call(
            &mut w,
            seeker,
            "find",
            vec![Value::str("sword 2"), Value::Object(room)]
        ),
        Value::Object(s2)
    );
    assert_eq!(
        call(
            &mut w,
            seeker,
            "find",
            vec![Value::str("axe"), Value::Object(room)]
        ),
        Value::Nil
    );
}

#[test]
fn test_users_and_linkdead_lists() {
    let mut w = scratch_world();
    let (player, _) = setup(&mut w);
    assert_eq!(w.users(), vec![player]);
    assert!(w.linkdead_users().is_empty());

    w.connection_closed(7);
    assert!(w.users().is_empty());
    assert_eq!(w.linkdead_users(), vec![player]);

    // a new login reclaims the linkdead body
    let login = load_src(&mut w, "/t/login", "void create() { }");
    w.bind_connection(8, login);
    let mut ctx = w.fresh_ctx();
    ctx.this_player = Some(login);
    let ok = w.reconnect(login, player);
    assert!(ok);
    assert_eq!(w.users(), vec![player]);
    assert!(w.linkdead_users().is_empty());
}
