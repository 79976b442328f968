use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stil::il::{Type, bytecode, dump};
use stil::vm::marshal::{copy_width, format_value};
use stil::{Runtime, RuntimeConfig};

#[derive(Parser)]
#[command(name = "stil")]
#[command(about = "Run and inspect stil module images", long_about = None)]
struct Cli {
    /// Log engine events (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an image and invoke one function
    Run {
        /// Image file to load
        image: PathBuf,

        /// Module that owns the function
        #[arg(long, default_value = "main")]
        module: String,

        /// Function to invoke
        #[arg(long, default_value = "main")]
        function: String,

        /// Argument for the next parameter, parsed by its declared type
        #[arg(long = "arg", value_name = "VALUE", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Runtime configuration file (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print GC statistics after the run
        #[arg(long)]
        gc_stats: bool,

        /// Disable garbage collection
        #[arg(long)]
        no_gc: bool,

        /// Initial collection threshold in bytes
        #[arg(long, value_name = "BYTES")]
        heap_capacity: Option<usize>,
    },
    /// Print the disassembly of an image
    Dump {
        image: PathBuf,

        /// Emit a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decode, verify and commit an image without running it
    Verify { image: PathBuf },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "stil=warn",
        1 => "stil=debug",
        _ => "stil=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            image,
            module,
            function,
            args,
            config,
            gc_stats,
            no_gc,
            heap_capacity,
        } => load_config(config.as_deref()).and_then(|mut config| {
            config.gc_stats |= gc_stats;
            if no_gc {
                config.gc_enabled = false;
            }
            if let Some(capacity) = heap_capacity {
                config.heap_capacity = capacity;
            }
            run_image(&image, &config, &module, &function, &args)
        }),
        Commands::Dump { image, json } => dump_image(&image, json),
        Commands::Verify { image } => verify_image(&image),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, String> {
    match path {
        Some(path) => RuntimeConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(RuntimeConfig::default()),
    }
}

fn run_image(
    path: &Path,
    config: &RuntimeConfig,
    module: &str,
    function: &str,
    args: &[String],
) -> Result<(), String> {
    let mut runtime = Runtime::load_file(path, config).map_err(|e| e.to_string())?;
    let mut invocation = runtime
        .begin_invoke(module, function)
        .map_err(|e| e.to_string())?;

    let id = invocation.function();
    let (params, return_type) = {
        let func = runtime
            .context()
            .function(id)
            .ok_or_else(|| format!("function '{}' vanished after lookup", function))?;
        let params: Vec<Type> = func.params().iter().map(|p| p.ty.clone()).collect();
        (params, func.return_type.clone())
    };
    if args.len() != params.len() {
        return Err(format!(
            "'{}' expects {} arguments, {} given",
            function,
            params.len(),
            args.len()
        ));
    }
    for (index, (ty, text)) in params.iter().zip(args).enumerate() {
        let bytes = parse_arg(&mut runtime, ty, text)?;
        runtime
            .push_argument_bytes(&mut invocation, &bytes, index as u32)
            .map_err(|e| e.to_string())?;
    }

    let width = match &return_type {
        Some(ty) => copy_width(runtime.context(), ty).map_err(|e| e.to_string())?,
        None => 0,
    };
    let bytes = runtime
        .invoke_raw(invocation, width)
        .map_err(|e| e.to_string())?;
    runtime.flush().map_err(|e| e.to_string())?;

    if let Some(ty) = &return_type {
        let text = format_value(runtime.context(), runtime.vm().heap(), ty, &bytes)
            .map_err(|e| e.to_string())?;
        println!("{}", text);
    }

    if config.gc_stats {
        let stats = runtime.gc_stats();
        let heap = runtime.heap_stats();
        eprintln!(
            "[GC] Collections: {}, Total pause: {}us, Max pause: {}us",
            stats.cycles, stats.total_pause_us, stats.max_pause_us
        );
        eprintln!(
            "[GC] Freed: {} slots ({} bytes), Live: {} slots, Used: {}/{} bytes",
            stats.freed_slots, stats.freed_bytes, heap.live_slots, heap.used, heap.capacity
        );
    }
    Ok(())
}

/// Encode a command-line argument as the native bytes of `ty`.
fn parse_arg(runtime: &mut Runtime, ty: &Type, text: &str) -> Result<Vec<u8>, String> {
    let type_name = runtime.context().type_name(ty);
    let bad = || format!("cannot parse '{}' as {}", text, type_name);
    let bytes = match ty {
        Type::Integer { width, signed } => {
            let value: i128 = text.parse().map_err(|_| bad())?;
            let bits = width.bits();
            let (min, max) = if *signed {
                (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
            } else {
                (0, (1i128 << bits) - 1)
            };
            if value < min || value > max {
                return Err(bad());
            }
            value.to_le_bytes()[..width.bytes() as usize].to_vec()
        }
        Type::Float(stil::il::FloatWidth::F32) => {
            text.parse::<f32>().map_err(|_| bad())?.to_le_bytes().to_vec()
        }
        Type::Float(stil::il::FloatWidth::F64) => {
            text.parse::<f64>().map_err(|_| bad())?.to_le_bytes().to_vec()
        }
        Type::Boolean => vec![u8::from(text.parse::<bool>().map_err(|_| bad())?)],
        Type::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => u32::from(c).to_le_bytes().to_vec(),
                _ => return Err(bad()),
            }
        }
        Type::String => {
            use stil::NativeValue;
            let slice = runtime.alloc_string(text).map_err(|e| e.to_string())?;
            slice.to_bytes()
        }
        _ => {
            return Err(format!(
                "{} arguments cannot be given on the command line",
                type_name
            ));
        }
    };
    Ok(bytes)
}

fn dump_image(path: &Path, json: bool) -> Result<(), String> {
    let ctx = bytecode::load_from_file(path).map_err(|e| e.to_string())?;
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &dump::summarize(&ctx))
            .map_err(|e| e.to_string())?;
        writeln!(stdout).map_err(|e| e.to_string())?;
    } else {
        write!(stdout, "{}", dump::disassemble(&ctx)).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn verify_image(path: &Path) -> Result<(), String> {
    let mut ctx = bytecode::load_from_file(path).map_err(|e| e.to_string())?;
    ctx.commit().map_err(|e| e.to_string())?;
    let functions: usize = ctx.modules().iter().map(|m| m.functions().len()).sum();
    println!(
        "{}: ok ({} modules, {} functions)",
        path.display(),
        ctx.modules().len(),
        functions
    );
    Ok(())
}
