/// Mudlark - LPMud driver library
///
/// The driver compiles an LPC-style scripting language and hosts the
/// resulting object world: single inheritance with cloning, a hot-reload
/// subsystem that preserves existing clones, a cooperative scheduler of
/// callouts and heartbeats, and a line-oriented telnet front-end.
///
/// # Architecture
///
/// The pipeline runs in dependency order:
///
/// 1. **Lexing & parsing** (`lexer`, `parser`) - `.c` source text to a
///    per-file AST.
/// 2. **Object table & loader** (`object`) - sources become blueprints;
///    blueprints get one master instance plus any number of clones,
///    indexed by canonical mudlib path.
/// 3. **Interpretation** (`interp`, `value`, `efuns`) - tree-walking
///    evaluation under a per-dispatch instruction budget, with the efun
///    surface bridging scripts to host services.
/// 4. **Scheduling & I/O** (`sched`, `net`, `world`) - one driver loop
///    owns the callout queue, heartbeat set, and sockets; scripts never
///    observe interleaving.
///
/// # Example
///
/// ```rust
/// use mudlark::{repl, DriverConfig, World};
///
/// let mut world = World::new(std::path::PathBuf::from("."), DriverConfig::default());
/// let v = repl::eval_expression(&mut world, r#"implode(({ "a", "b" }), "-")"#).unwrap();
/// assert_eq!(v, mudlark::Value::str("a-b"));
/// ```
pub mod ast;
pub mod config;
pub mod efuns;
pub mod errors;
pub mod interp;
pub mod lexer;
pub mod net;
pub mod object;
pub mod parser;
pub mod persist;
pub mod reload;
pub mod repl;
pub mod sched;
pub mod value;
pub mod world;

pub use config::DriverConfig;
pub use errors::{ErrorKind, ParseError, RuntimeError, SyntaxError};
pub use interp::EvalCtx;
pub use lexer::{Lexer, Token};
pub use object::{Blueprint, ObjRef, ObjectTable};
pub use parser::{parse_source, Parser};
pub use value::Value;
pub use world::World;
