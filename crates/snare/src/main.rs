use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use snare_core::breakpoints::resolver::{resolve_address, resolve_function, resolve_source_line};
use snare_core::breakpoints::Resolution;
use snare_core::debuginfo::{load_module, Module, VariableLocation};
use snare_core::types::{Address, SymbolKind};
use snare_utils::{debug, default_log_file, info, init_logging, LogFormat, LogLevel, LoggingConfig};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Resolve breakpoints and inspect debug information of native binaries.
#[derive(Parser, Debug)]
#[command(name = "snare")]
#[command(version)]
#[command(about = "Resolve breakpoints and inspect debug information of native binaries", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty, compact or json (overrides SNARE_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Also write logs to a file; without a value uses ~/.snare/<date>-snare.log
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show the architecture, compile units and table sizes of a binary
    Info
    {
        /// Path to an ELF binary with DWARF debug info
        binary: PathBuf,
    },
    /// Resolve a breakpoint to concrete addresses without running the binary
    Break
    {
        binary: PathBuf,
        /// `file:line`, a function name, or an address (`0x401000`)
        location: String,
        /// Fail instead of moving to the next line with code
        #[arg(long, default_value_t = false)]
        exact: bool,
    },
    /// Print a type's definition
    Type
    {
        binary: PathBuf,
        /// Type name as spelled in source (`struct point_tag`, `char *`)
        name: String,
    },
    /// List line table entries, optionally only those of one source line
    Lines
    {
        binary: PathBuf,
        /// Source file name or path suffix
        file: String,
        line: Option<u32>,
    },
    /// List global and file-static variables
    Globals
    {
        binary: PathBuf,
    },
    /// List functions with their code ranges
    Functions
    {
        binary: PathBuf,
    },
    /// List symbols, optionally filtered by a substring of the name
    Symbols
    {
        binary: PathBuf,
        filter: Option<String>,
    },
    /// Describe an address by symbol, offset and source line
    Symbolicate
    {
        binary: PathBuf,
        /// Address (hex format: 0x1000 or decimal)
        address: String,
    },
}

fn main()
{
    let cli = Cli::parse();

    let config = match LoggingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    let mut config = config.with_level(cli.log_level);
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    if let Some(file) = &cli.log_file {
        config.file = Some(file.clone().unwrap_or_else(default_log_file));
    }
    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load(binary: &Path) -> Result<Module, Box<dyn std::error::Error>>
{
    info!("Loading {}", binary.display());
    let module = load_module(binary)?;
    debug!(
        functions = module.functions().len(),
        globals = module.globals().len(),
        symbols = module.symbols().len(),
        "module loaded"
    );
    Ok(module)
}

fn run_command(command: Commands) -> CliResult
{
    match command {
        Commands::Info { binary } => {
            print_info(&load(&binary)?);
            Ok(())
        }
        Commands::Break { binary, location, exact } => {
            let module = load(&binary)?;
            let resolution = resolve(&module, &location, !exact)?;
            print_resolution(&module, &location, &resolution);
            Ok(())
        }
        Commands::Type { binary, name } => {
            let module = load(&binary)?;
            let id = module.find_type(&name)?;
            println!("{}", module.describe_type(id));
            println!("size = {} bytes", module.byte_size(id)?);
            Ok(())
        }
        Commands::Lines { binary, file, line } => {
            let module = load(&binary)?;
            match line {
                Some(line) => {
                    for entry in module.line_entries_for(&file, line)? {
                        println!("{}: {entry}", entry.address());
                    }
                }
                None => {
                    let table = module.line_table();
                    if !table.knows_file(&file) {
                        return Err(format!("no line table entries for '{file}'").into());
                    }
                    for entry in table.entries_in_file(&file) {
                        println!("{}: {entry}", entry.address());
                    }
                }
            }
            Ok(())
        }
        Commands::Globals { binary } => {
            let module = load(&binary)?;
            for global in module.globals() {
                let location = match global.location {
                    VariableLocation::Static(address) => address.to_string(),
                    VariableLocation::FrameOffset(offset) => format!("frame{offset:+}"),
                };
                println!("{location}: ({}) {}", module.type_name(global.ty), global.name);
            }
            Ok(())
        }
        Commands::Functions { binary } => {
            let module = load(&binary)?;
            for function in module.functions() {
                let decl = function
                    .decl
                    .as_ref()
                    .map(|decl| match decl.line {
                        Some(line) => format!(" at {}:{line}", decl.file_name()),
                        None => format!(" in {}", decl.file_name()),
                    })
                    .unwrap_or_default();
                println!("{} {}{decl}", function.range, function.name);
            }
            Ok(())
        }
        Commands::Symbols { binary, filter } => {
            let module = load(&binary)?;
            let symbols = module
                .symbols()
                .iter()
                .filter(|symbol| filter.as_deref().map_or(true, |needle| symbol.display_name().contains(needle)));
            for symbol in symbols {
                let kind = match symbol.kind {
                    SymbolKind::Code => "code",
                    SymbolKind::Data => "data",
                };
                println!("{} {kind:<4} {:>6} {}", symbol.address, symbol.size, symbol.display_name());
            }
            Ok(())
        }
        Commands::Symbolicate { binary, address } => {
            let module = load(&binary)?;
            println!("{}", module.symbolicate(parse_address(&address)?));
            Ok(())
        }
    }
}

fn resolve(module: &Module, location: &str, move_to_nearest_code: bool) -> Result<Resolution, Box<dyn std::error::Error>>
{
    if let Ok(address) = parse_address(location) {
        return Ok(resolve_address(module, address));
    }
    if let Some((file, line)) = location.rsplit_once(':') {
        if let Ok(line) = line.parse::<u32>() {
            return Ok(resolve_source_line(module, file, line, move_to_nearest_code)?);
        }
    }
    Ok(resolve_function(module, location)?)
}

fn print_resolution(module: &Module, request: &str, resolution: &Resolution)
{
    let line = resolution.line.map(|line| format!(", line = {line}")).unwrap_or_default();
    println!("{request}{line}, locations = {}", resolution.locations.len());
    for (index, location) in resolution.locations.iter().enumerate() {
        println!(
            "  {}: where = {}, address = {}",
            index + 1,
            module.symbolicate(location.address),
            location.address
        );
    }
}

fn print_info(module: &Module)
{
    println!("Module: {}", module.name());
    println!("  Path: {}", module.path().display());
    println!("  Architecture: {}", module.architecture());
    println!("  Compile units: {}", module.compile_units().len());
    for unit in module.compile_units() {
        match &unit.producer {
            Some(producer) => println!("    {} ({producer})", unit.name),
            None => println!("    {}", unit.name),
        }
    }
    println!("  Functions: {}", module.functions().len());
    println!("  Globals: {}", module.globals().len());
    println!("  Types: {}", module.types().len());
    println!("  Symbols: {}", module.symbols().len());
    println!("  Line entries: {}", module.line_table().len());
}

fn parse_address(text: &str) -> Result<Address, std::num::ParseIntError>
{
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => text.parse::<u64>()?,
    };
    Ok(Address::new(value))
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_address()
    {
        assert_eq!(parse_address("0x401000").unwrap(), Address::new(0x40_1000));
        assert_eq!(parse_address("4096").unwrap(), Address::new(4096));
        assert!(parse_address("main.c:12").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand()
    {
        let cli = Cli::try_parse_from(["snare", "break", "a.out", "main.c:12", "--exact", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(matches!(cli.command, Commands::Break { exact: true, .. }));
    }
}
