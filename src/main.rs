#[macro_use]
extern crate clap;

use clap::{Arg, ArgGroup};
use etapa7::{parser, semantics, tac, x86_64};
use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::{self, Command};
use symtab::SymbolTable;

/// What to produce; each operation implies everything above it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Operation {
    CheckSyntax,
    CheckSemantics,
    EmitDebugTac,
    EmitAssemblyTac,
    EmitAssembly,
    EmitObject,
    EmitExecutable,
}

struct Arguments {
    operation: Operation,
    debug: bool,
    tac_flags: tac::opt::OptFlags,
    asm_flags: x86_64::opt::OptFlags,
    source: String,
}

fn main() {
    let arguments = parse_arguments();
    process::exit(run(&arguments));
}

fn parse_arguments() -> Arguments {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("SOURCE")
                .help("Sets the source code file to compile")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("check-syntax")
                .short("k")
                .long("check-syntax")
                .help("Checks syntax"),
        )
        .arg(
            Arg::with_name("check-semantics")
                .short("K")
                .long("check-semantics")
                .help("Checks semantics"),
        )
        .arg(
            Arg::with_name("emit-debug-tac")
                .short("t")
                .long("emit-debug-tac")
                .help("Emits debug TAC"),
        )
        .arg(
            Arg::with_name("emit-assembly-tac")
                .short("T")
                .long("emit-assembly-tac")
                .help("Emits assembly TAC"),
        )
        .arg(
            Arg::with_name("emit-assembly")
                .short("S")
                .long("emit-assembly")
                .help("Emits assembly"),
        )
        .arg(
            Arg::with_name("emit-obj-file")
                .short("c")
                .long("emit-obj-file")
                .help("Emits object file"),
        )
        .arg(
            Arg::with_name("emit-executable")
                .short("e")
                .long("emit-executable")
                .help("Emits executable (default)"),
        )
        .group(ArgGroup::with_name("operation").args(&[
            "check-syntax",
            "check-semantics",
            "emit-debug-tac",
            "emit-assembly-tac",
            "emit-assembly",
            "emit-obj-file",
            "emit-executable",
        ]))
        .arg(
            Arg::with_name("optimize")
                .short("O")
                .long("optimize")
                .help("Turns on all optimizations"),
        )
        .arg(
            Arg::with_name("opt")
                .short("f")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("PASS")
                .possible_values(&["power-of-two", "reuse-tmps", "dedup-movs", "inc-decs"])
                .help("Turns on one optimization pass"),
        )
        .arg(
            Arg::with_name("debug")
                .short("g")
                .long("debug")
                .help("Generates assembly debug symbols"),
        )
        .get_matches_safe()
        .unwrap_or_else(|err| {
            eprintln!("{}", err.message);
            process::exit(1);
        });

    let operation = if matches.is_present("check-syntax") {
        Operation::CheckSyntax
    } else if matches.is_present("check-semantics") {
        Operation::CheckSemantics
    } else if matches.is_present("emit-debug-tac") {
        Operation::EmitDebugTac
    } else if matches.is_present("emit-assembly-tac") {
        Operation::EmitAssemblyTac
    } else if matches.is_present("emit-assembly") {
        Operation::EmitAssembly
    } else if matches.is_present("emit-obj-file") {
        Operation::EmitObject
    } else {
        Operation::EmitExecutable
    };

    let mut tac_flags = tac::opt::OptFlags::OFF;
    let mut asm_flags = x86_64::opt::OptFlags::OFF;
    if matches.is_present("optimize") {
        tac_flags = tac::opt::OptFlags::FULL;
        asm_flags = x86_64::opt::OptFlags::FULL;
    }
    if let Some(passes) = matches.values_of("opt") {
        for pass in passes {
            match pass {
                "power-of-two" => tac_flags.power_of_two = true,
                "reuse-tmps" => tac_flags.reuse_tmps = true,
                "dedup-movs" => asm_flags.dedup_movs = true,
                "inc-decs" => {
                    // The contraction pass relies on the dedup pass having
                    // cleaned up first.
                    asm_flags.inc_decs = true;
                    asm_flags.dedup_movs = true;
                }
                _ => unreachable!(),
            }
        }
    }

    Arguments {
        operation,
        debug: matches.is_present("debug"),
        tac_flags,
        asm_flags,
        source: matches.value_of("SOURCE").unwrap().to_owned(),
    }
}

fn run(arguments: &Arguments) -> i32 {
    let mut table = SymbolTable::new();

    let source = match fs::read_to_string(&arguments.source) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: {}", arguments.source, err);
            return 2;
        }
    };

    let mut program = match parser::parse_program(&source, &mut table) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}", err.with_path(&arguments.source));
            return 3;
        }
    };

    if arguments.operation >= Operation::CheckSemantics {
        let errors = semantics::check_program(&mut table, &mut program);
        for error in &errors {
            eprintln!("{}", error);
        }
        eprintln!("exiting with {} semantic errors...", errors.len());
        if !errors.is_empty() {
            return 4;
        }
    }

    if arguments.operation >= Operation::EmitDebugTac {
        let mut tac = tac::gen::lower(&mut table, &program);
        tac::opt::optimize(&mut tac, &mut table, arguments.tac_flags);

        if arguments.operation < Operation::EmitAssemblyTac {
            eprintln!("generated TAC:\n");
            let stderr = io::stderr();
            tac.raw_print(&table, &mut stderr.lock()).ok();
        } else if arguments.operation < Operation::EmitAssembly {
            let stdout = io::stdout();
            let params = tac::RenderParams { space_count: 4 };
            tac.print(&table, params, &mut stdout.lock()).ok();
        } else {
            let mut unit = x86_64::gen::generate(&mut table, &tac);
            x86_64::opt::optimize(&mut unit, &table, arguments.asm_flags);

            let assembly_path = format!("{}.s", arguments.source);
            let file = match File::create(&assembly_path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("{}: {}", assembly_path, err);
                    return 2;
                }
            };
            let mut writer = BufWriter::new(file);
            let params = x86_64::RenderParams {
                space_count: 4,
                assembler: x86_64::Assembler::Gas,
            };
            let written = unit
                .render(&table, params, &mut writer)
                .and_then(|_| writer.flush());
            if let Err(err) = written {
                eprintln!("{}: {}", assembly_path, err);
                return 2;
            }

            if arguments.operation == Operation::EmitObject {
                if !run_cc(&assembly_path, true, arguments.debug) {
                    return 5;
                }
            } else if arguments.operation == Operation::EmitExecutable
                && !run_cc(&assembly_path, false, arguments.debug)
            {
                return 6;
            }
        }
    }

    0
}

/// Hands the emitted assembly to the host C compiler for assembling and,
/// without `object_only`, linking.
fn run_cc(assembly_path: &str, object_only: bool, debug: bool) -> bool {
    let mut command = Command::new("cc");
    command.arg(assembly_path);
    if object_only {
        command.arg("-c");
    }
    if debug {
        command.arg("-g");
    }
    match command.status() {
        Ok(status) => status.success(),
        Err(err) => {
            eprintln!("cc: {}", err);
            false
        }
    }
}
