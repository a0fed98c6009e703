use std::io::{self, BufRead, Read, Write};
use std::process;

use clap::Parser as ClapParser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use ay_lang::runtime::{Options, Table};
use ay_lang::{Error, Interpreter, Value};

/// Stack for the interpreter thread; evaluation recurses on the native stack.
const INTERPRETER_STACK: usize = 256 * 1024 * 1024;

const INIT_VARIABLES: [&str; 3] = ["AY_INIT", "LUA_INIT_5_4", "LUA_INIT"];

#[derive(ClapParser)]
#[command(name = "ay", version, about = "A tree-walking interpreter for Lua 5.4")]
struct Cli {
    /// Execute string 'stat'
    #[arg(short = 'e', value_name = "stat")]
    execute: Vec<String>,
    /// Enter interactive mode after executing 'script'
    #[arg(short = 'i')]
    interactive: bool,
    /// Load library 'name' into global 'name', or 'mod' into global 'g'
    #[arg(short = 'l', value_name = "name|g=mod")]
    libraries: Vec<String>,
    /// Show version information
    #[arg(short = 'v')]
    show_version: bool,
    /// Ignore environment variables
    #[arg(short = 'E')]
    ignore_environment: bool,
    /// Turn warnings on
    #[arg(short = 'W')]
    warnings: bool,
    /// Script to execute ('-' reads standard input)
    script: Option<String>,
    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true).with_writer(io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }

    let worker = std::thread::Builder::new()
        .name("ay".to_string())
        .stack_size(INTERPRETER_STACK)
        .spawn(move || run(cli));
    let exit_code = match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => 1,
        Err(e) => {
            eprintln!("ay: cannot start interpreter: {}", e);
            1
        }
    };
    process::exit(exit_code);
}

fn version_text() -> String {
    format!("ay {} ({})", env!("CARGO_PKG_VERSION"), ay_lang::runtime::stdlib::basic::VERSION)
}

fn run(cli: Cli) -> i32 {
    let mut interp = Interpreter::with_options(Options {
        warnings: cli.warnings,
        ..Options::default()
    });
    install_arg_table(&mut interp, &cli);

    if !cli.ignore_environment {
        if let Err(e) = run_init(&mut interp) {
            report(&mut interp, e);
            return 1;
        }
    }

    if cli.show_version {
        println!("{}", version_text());
        if cli.script.is_none() && cli.execute.is_empty() && !cli.interactive {
            return 0;
        }
    }

    for spec in &cli.libraries {
        if let Err(e) = load_library(&mut interp, spec) {
            report(&mut interp, e);
            return 1;
        }
    }

    for stat in &cli.execute {
        if let Err(e) = interp.exec_named(stat, "(command line)") {
            report(&mut interp, e);
            return 1;
        }
    }

    if let Some(script) = &cli.script {
        if let Err(e) = run_script(&mut interp, script, &cli.args) {
            report(&mut interp, e);
            return 1;
        }
    }

    let nothing_run = cli.script.is_none() && cli.execute.is_empty();
    if cli.interactive || (nothing_run && !cli.show_version) {
        println!("{}", version_text());
        repl(&mut interp);
    }
    0
}

/// `arg[0]` is the script, `arg[1..]` its arguments, `arg[-1]` the interpreter.
fn install_arg_table(interp: &mut Interpreter, cli: &Cli) {
    let mut table = Table::new();
    table.set_int(-1, Value::from("ay"));
    table.set_int(0, Value::from(cli.script.as_deref().unwrap_or("ay")));
    for (i, a) in cli.args.iter().enumerate() {
        table.set_int(i as i64 + 1, Value::from(a.as_str()));
    }
    interp.set_global("arg", Value::from_table(table));
}

fn run_init(interp: &mut Interpreter) -> Result<(), Error> {
    for name in INIT_VARIABLES {
        let Ok(init) = std::env::var(name) else {
            continue;
        };
        match init.strip_prefix('@') {
            Some(path) => interp.exec_file(path)?,
            None => interp.exec_named(&init, name)?,
        };
        break;
    }
    Ok(())
}

/// `-l name` runs `name.lua` into global `name`; `-l g=mod` runs `mod.lua` into `g`.
fn load_library(interp: &mut Interpreter, spec: &str) -> Result<(), Error> {
    let (global, module) = spec.split_once('=').unwrap_or((spec, spec));
    let results = interp.exec_file(format!("{}.lua", module))?;
    let value = results.into_iter().next().unwrap_or(Value::Bool(true));
    interp.set_global(global, value);
    Ok(())
}

fn run_script(interp: &mut Interpreter, script: &str, args: &[String]) -> Result<(), Error> {
    let (source, chunkname) = if script == "-" {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        (String::from_utf8_lossy(&bytes).into_owned(), "stdin".to_string())
    } else {
        let bytes = std::fs::read(script).map_err(|e| {
            io::Error::new(e.kind(), format!("cannot open {}: {}", script, e))
        })?;
        (String::from_utf8_lossy(&bytes).into_owned(), script.to_string())
    };
    let main = interp.load(&source, &chunkname)?;
    let varargs = args.iter().map(|a| Value::from(a.as_str())).collect();
    interp.call(&main, varargs)?;
    Ok(())
}

/// Print an uncaught error to stderr, rendering error objects through `tostring`.
fn report(interp: &mut Interpreter, error: Error) {
    let message = match &error {
        Error::Runtime(e) => {
            let value = e.value();
            match &value {
                Value::Str(_) => value.to_string_lossy(),
                _ if interp.has_metamethod(&value, "__tostring") => interp
                    .tostring(&value)
                    .map(|v| v.to_string_lossy())
                    .unwrap_or_else(|e| e.to_string()),
                other => format!("(error object is a {} value)", other.type_name()),
            }
        }
        other => other.to_string(),
    };
    eprintln!("ay: {}", message);
}

// ── REPL ────────────────────────────────────────────────────────────────

fn prompt(interp: &Interpreter, global: &str, default: &str) -> String {
    match interp.get_global(global) {
        Value::Nil => std::env::var(global).unwrap_or_else(|_| default.to_string()),
        v => v.to_string_lossy(),
    }
}

fn read_line(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']).len();
            line.truncate(trimmed);
            Some(line)
        }
    }
}

/// Compile a REPL entry, first as `return <entry>` so bare expressions print.
fn compile_entry(interp: &mut Interpreter, entry: &str) -> Result<Value, Error> {
    let as_expression = format!("return {}", entry.strip_prefix('=').unwrap_or(entry));
    match interp.load(&as_expression, "stdin") {
        Ok(f) => Ok(f),
        Err(_) => interp.load(entry, "stdin"),
    }
}

fn repl(interp: &mut Interpreter) {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        let first = prompt(interp, "_PROMPT", "> ");
        let Some(mut entry) = read_line(&mut input, &first) else {
            println!();
            return;
        };
        let function = loop {
            match compile_entry(interp, &entry) {
                Ok(f) => break Some(f),
                Err(e) if e.is_incomplete() => {
                    let second = prompt(interp, "_PROMPT2", ">> ");
                    match read_line(&mut input, &second) {
                        Some(more) => {
                            entry.push('\n');
                            entry.push_str(&more);
                        }
                        None => {
                            report(interp, e);
                            break None;
                        }
                    }
                }
                Err(e) => {
                    report(interp, e);
                    break None;
                }
            }
        };
        let Some(function) = function else {
            continue;
        };
        match interp.call(&function, Vec::new()) {
            Ok(values) if !values.is_empty() => {
                let rendered: Vec<String> = values
                    .iter()
                    .map(|v| {
                        interp
                            .tostring(v)
                            .map(|s| s.to_string_lossy())
                            .unwrap_or_else(|e| e.to_string())
                    })
                    .collect();
                println!("{}", rendered.join(", "));
            }
            Ok(_) => {}
            Err(e) => report(interp, Error::Runtime(e)),
        }
    }
}
