// Cadenza CLI entry point.
//
// Continues a seed MIDI file and writes the result (seed + generated notes)
// to a new MIDI file. The pipeline: parse seed -> encode -> generate ->
// decode -> write.
//
// Usage:
//   cadenza <seed.mid> [output.mid] [--steps N] [--temperature T]
//     [--window N] [--max-notes N] [--seed N] [--config path.json]
//
// Flags override values from the config file. Without --seed the sampler
// is seeded from the clock and every run differs.
// Set RUST_LOG=debug for per-stage logging.

use cadenza_core::baseline::default_models;
use cadenza_core::config::CadenzaConfig;
use cadenza_core::generator::CancelToken;
use cadenza_core::midi::load_notes;
use cadenza_core::pipeline::continue_notes;
use cadenza_prng::SampleRng;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let positional: Vec<&str> = positional_args(&args);
    let Some(&input_path) = positional.first() else {
        print_usage();
        std::process::exit(1);
    };
    let output_path = positional.get(1).copied().unwrap_or("generated.mid");

    let mut config = match parse_flag::<String>(&args, "--config") {
        Some(path) => CadenzaConfig::load(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("Failed to load config {path}: {e}");
            std::process::exit(1);
        }),
        None => CadenzaConfig::default(),
    };
    if let Some(steps) = parse_flag(&args, "--steps") {
        config.generation.steps = steps;
    }
    if let Some(temperature) = parse_flag(&args, "--temperature") {
        config.generation.temperature = temperature;
    }
    if let Some(window) = parse_flag(&args, "--window") {
        config.generation.window = window;
    }
    if let Some(max_notes) = parse_flag(&args, "--max-notes") {
        config.generation.max_notes = max_notes;
    }
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }
    let seed: u64 = parse_flag(&args, "--seed").unwrap_or_else(clock_seed);

    println!("=== Cadenza ===");
    println!("Seed file: {input_path}");
    println!("Output: {output_path}");
    println!(
        "Steps: {}  Temperature: {}  Window: {}  Max seed notes: {}",
        config.generation.steps,
        config.generation.temperature,
        config.generation.window,
        config.generation.max_notes
    );
    println!("RNG seed: {seed}");
    println!();

    println!("[1/3] Reading seed melody...");
    let seed_notes = load_notes(Path::new(input_path)).unwrap_or_else(|e| {
        eprintln!("  Error reading {input_path}: {e}");
        std::process::exit(1);
    });
    println!("  {} notes in first instrument.", seed_notes.len());

    println!("[2/3] Generating continuation...");
    let models = default_models(config.generation.pitch_range, &config.models);
    let mut rng = SampleRng::new(seed);
    let result = continue_notes(&seed_notes, &models, &config, &mut rng, &CancelToken::new())
        .unwrap_or_else(|e| {
            eprintln!("  Generation failed: {e}");
            std::process::exit(1);
        });
    let duration = result.notes.last().map(|n| n.end).unwrap_or(0.0);
    println!(
        "  {} seed + {} generated notes, {:.1}s total.",
        result.seed_notes,
        result.generated_notes(),
        duration
    );

    println!("[3/3] Writing MIDI to {output_path}...");
    if let Err(e) = std::fs::write(output_path, &result.midi) {
        eprintln!("  Error writing MIDI: {e}");
        std::process::exit(1);
    }
    println!("  Done.");
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut i = 1;
    while i < args.len() {
        if args[i].starts_with("--") {
            i += 2;
            continue;
        }
        out.push(args[i].as_str());
        i += 1;
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn print_usage() {
    println!("Usage: cadenza <seed.mid> [output.mid] [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --steps <N>          Notes to generate (default: 200)");
    println!("  --temperature <T>    Pitch sampling temperature (default: 0.5)");
    println!("  --window <N>         Context window length (default: 50)");
    println!("  --max-notes <N>      Seed notes to keep (default: 50)");
    println!("  --seed <N>           RNG seed for reproducible output");
    println!("  --config <PATH>      JSON config file");
    println!("  --help, -h           Show this help");
}
