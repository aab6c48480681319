/// Mudlark - LPMud driver CLI
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use tracing_subscriber::EnvFilter;

use mudlark::object::paths;
use mudlark::repl;
use mudlark::world::unix_now;
use mudlark::{interp, net, DriverConfig, World};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Mudlark v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    mudlark [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help           Print this help message");
    eprintln!("    -v, --version        Print version information");
    eprintln!("    --mudlib <DIR>       Root of mudlib sources and data");
    eprintln!("    --port <N>           TCP port to listen on (server mode)");
    eprintln!("    --tick-millis <N>    Heartbeat tick interval");
    eprintln!("    --repl               Interactive expression loop");
    eprintln!("    --eval <EXPR>        Evaluate one expression and print it");
    eprintln!("    --test <DIR>         Run run_tests() in every .c under DIR");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    mudlark --mudlib ./lib --port 4000");
    eprintln!("    mudlark --repl");
    eprintln!("    mudlark --eval '1 + 2'");
    eprintln!("    mudlark --mudlib ./lib --test /tests");
}

fn print_version() {
    println!("Mudlark {}", VERSION);
}

struct Options {
    mudlib: Option<String>,
    port: Option<u16>,
    tick_millis: Option<u64>,
    repl_mode: bool,
    eval: Option<String>,
    test: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut options = Options {
        mudlib: None,
        port: None,
        tick_millis: None,
        repl_mode: false,
        eval: None,
        test: None,
    };
    let mut i = 1;

    let value_of = |i: &mut usize, args: &[String], flag: &str| -> Result<String, String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .ok_or_else(|| format!("Missing value after {}", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                process::exit(0);
            }
            "--mudlib" => options.mudlib = Some(value_of(&mut i, &args, "--mudlib")?),
            "--port" => {
                let raw = value_of(&mut i, &args, "--port")?;
                options.port = Some(raw.parse().map_err(|_| format!("Bad port: {}", raw))?);
            }
            "--tick-millis" => {
                let raw = value_of(&mut i, &args, "--tick-millis")?;
                options.tick_millis =
                    Some(raw.parse().map_err(|_| format!("Bad interval: {}", raw))?);
            }
            "--repl" => options.repl_mode = true,
            "--eval" => options.eval = Some(value_of(&mut i, &args, "--eval")?),
            "--test" => options.test = Some(value_of(&mut i, &args, "--test")?),
            arg => return Err(format!("Unknown option: {}", arg)),
        }
        i += 1;
    }

    Ok(options)
}

/// Load the master object when the mudlib carries one; REPL and eval
/// modes work without it.
fn boot_if_present(world: &mut World) {
    let canon = match paths::canonicalize(&world.config.master_path.clone(), "/") {
        Ok(c) => c,
        Err(_) => return,
    };
    if !paths::source_file(&world.objects.root, &canon).exists() {
        return;
    }
    if let Err(e) = world.boot() {
        eprintln!("master object failed to load: {}", e.render());
    }
}

/// `--test <dir>`: every `.c` under the mudlib directory gets loaded and
/// its `run_tests()` invoked; assert failures and errors fail the run.
fn run_test_dir(world: &mut World, dir: &str) -> i32 {
    let canon = match paths::canonicalize(dir, "/") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.render());
            return 1;
        }
    };
    let host_dir = paths::data_file(&world.objects.root, &canon);
    let mut entries: Vec<PathBuf> = match fs::read_dir(&host_dir) {
        Ok(rd) => rd
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "c").unwrap_or(false))
            .collect(),
        Err(e) => {
            eprintln!("cannot read {}: {}", host_dir.display(), e);
            return 1;
        }
    };
    entries.sort();

    let mut passed = 0usize;
    let mut failed = 0usize;
    for file in entries {
        let stem = file.file_stem().unwrap_or_default().to_string_lossy();
        let script = format!("{}/{}", canon, stem);
        let mut ctx = world.fresh_ctx();
        let outcome = world
            .load_object(&mut ctx, &script, "/")
            .and_then(|obj| interp::try_call(world, &mut ctx, obj, "run_tests", Vec::new(), None));
        if let Some(out) = world.take_output(0) {
            print!("{}", out);
        }
        match outcome {
            Ok(Some(_)) | Ok(None) => {
                println!("PASS {}", script);
                passed += 1;
            }
            Err(e) => {
                println!("FAIL {}: {}", script, e.render());
                failed += 1;
            }
        }
    }
    println!("{} passed, {} failed", passed, failed);
    if failed == 0 {
        0
    } else {
        1
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let root = PathBuf::from(options.mudlib.clone().unwrap_or_else(|| ".".to_string()));
    let mut config = DriverConfig::load(&root);
    if let Some(port) = options.port {
        config.port = port;
    }
    if let Some(tick) = options.tick_millis {
        config.tick_millis = tick;
    }

    let mut world = World::new(root, config);
    world.tick(unix_now());

    if let Some(expr) = options.eval {
        boot_if_present(&mut world);
        match repl::eval_expression(&mut world, &expr) {
            Ok(v) => {
                if let Some(out) = world.take_output(0) {
                    print!("{}", out);
                }
                println!("{}", v);
            }
            Err(e) => {
                eprintln!("{}", e.render());
                process::exit(1);
            }
        }
        return;
    }

    if options.repl_mode {
        boot_if_present(&mut world);
        repl::run_repl(&mut world);
        return;
    }

    if let Some(dir) = options.test {
        if options.mudlib.is_none() {
            eprintln!("Error: --test needs --mudlib");
            process::exit(1);
        }
        boot_if_present(&mut world);
        process::exit(run_test_dir(&mut world, &dir));
    }

    // server mode
    if options.mudlib.is_none() {
        eprintln!("Error: server mode needs --mudlib");
        eprintln!();
        print_usage();
        process::exit(1);
    }
    if let Err(e) = world.boot() {
        eprintln!("Error: {}", e.render());
        process::exit(1);
    }
    let port = world.config.port;
    let mut server = match net::Server::bind(port) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: cannot bind port {}: {}", port, e);
            process::exit(1);
        }
    };
    server.run(&mut world);
}
