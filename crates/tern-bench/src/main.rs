//! Benchmark runner: times each compilation stage over the demo programs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{ArgAction, Parser};
use serde::Serialize;

use tern_lexer::Scanner;
use tern_parser::Parser as TernParser;

#[derive(Parser, Debug)]
#[command(name = "tern-bench", about = "Time the tern compilation pipeline")]
struct Cli {
    /// Specific program(s) to run by name (e.g. factorial). Default: all.
    #[arg(short = 't', long = "test", action = ArgAction::Append)]
    tests: Vec<String>,

    /// Measured iterations per program.
    #[arg(short = 'n', long = "iterations", default_value_t = 20)]
    iterations: u32,

    /// Warmup iterations (not measured).
    #[arg(short = 'w', long = "warmup", default_value_t = 3)]
    warmup: u32,

    /// Output JSON path; default: bench-results/<timestamp>.json
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// List discovered programs and exit.
    #[arg(long = "list", default_value_t = false)]
    list: bool,
}

#[derive(Debug, Serialize)]
struct BenchResult {
    name: String,
    iterations: u32,
    avg_total_ms: f64,
    min_total_ms: f64,
    max_total_ms: f64,
    avg_lex_ms: f64,
    avg_parse_ms: f64,
    avg_sema_ms: f64,
    avg_gen_ms: f64,
    asm_bytes: usize,
}

#[derive(Debug, Serialize)]
struct OutputDoc {
    timestamp: String,
    tern_version: String,
    benchmarks: Vec<BenchResult>,
}

#[derive(Debug, Clone)]
struct Case {
    name: String,
    path: PathBuf,
}

fn workspace_root() -> PathBuf {
    // crates/tern-bench -> crates -> root
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn discover() -> Vec<Case> {
    let dir = workspace_root().join("demos");
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(&dir) {
        for e in entries.flatten() {
            let p = e.path();
            if p.extension().and_then(|s| s.to_str()) == Some("tn") {
                let name = p
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_string();
                out.push(Case { name, path: p });
            }
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

fn dur_ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn stats(vals: &[f64]) -> (f64, f64, f64) {
    let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = if vals.is_empty() {
        0.0
    } else {
        vals.iter().sum::<f64>() / (vals.len() as f64)
    };
    (avg, min, max)
}

fn compile_once(src: &str) -> (f64, f64, f64, f64, usize) {
    let mut t = Instant::now();
    let tokens = Scanner::new(src).scan().expect("lex error");
    let t_lex = dur_ms(t.elapsed());

    t = Instant::now();
    let prog = TernParser::new(tokens).parse_program().expect("parse error");
    let t_parse = dur_ms(t.elapsed());

    t = Instant::now();
    let meta = tern_sema::analyze(&prog).expect("check error");
    let t_sema = dur_ms(t.elapsed());

    t = Instant::now();
    let asm = tern_codegen::generate(&prog, &meta).expect("codegen error");
    let t_gen = dur_ms(t.elapsed());

    (t_lex, t_parse, t_sema, t_gen, asm.len())
}

fn main() {
    let cli = Cli::parse();

    let mut cases = discover();
    if cli.list {
        println!("Discovered programs:");
        for c in &cases {
            println!("- {} ({})", c.name, c.path.display());
        }
        return;
    }
    if !cli.tests.is_empty() {
        let wanted: std::collections::HashSet<_> =
            cli.tests.iter().map(|s| s.to_lowercase()).collect();
        cases.retain(|c| wanted.contains(&c.name.to_lowercase()));
        if cases.is_empty() {
            eprintln!("No matching programs. Use --list to see available.");
            std::process::exit(2);
        }
    }
    if cases.is_empty() {
        eprintln!("No .tn programs found under demos/.");
        std::process::exit(2);
    }

    let mut results = Vec::new();
    for case in &cases {
        let src = fs::read_to_string(&case.path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", case.path.display(), e));

        for _ in 0..cli.warmup {
            compile_once(&src);
        }

        let mut totals = Vec::new();
        let mut lexes = Vec::new();
        let mut parses = Vec::new();
        let mut semas = Vec::new();
        let mut gens = Vec::new();
        let mut asm_bytes = 0;
        for _ in 0..cli.iterations {
            let t0 = Instant::now();
            let (l, p, s, g, bytes) = compile_once(&src);
            totals.push(dur_ms(t0.elapsed()));
            lexes.push(l);
            parses.push(p);
            semas.push(s);
            gens.push(g);
            asm_bytes = bytes;
        }

        let (avg_t, min_t, max_t) = stats(&totals);
        let (avg_l, _, _) = stats(&lexes);
        let (avg_p, _, _) = stats(&parses);
        let (avg_s, _, _) = stats(&semas);
        let (avg_g, _, _) = stats(&gens);

        println!(
            "{:>12}: total avg={:.3}ms min={:.3}ms max={:.3}ms | lex={:.3}ms parse={:.3}ms sema={:.3}ms gen={:.3}ms | asm={}B",
            case.name, avg_t, min_t, max_t, avg_l, avg_p, avg_s, avg_g, asm_bytes
        );

        results.push(BenchResult {
            name: case.name.clone(),
            iterations: cli.iterations,
            avg_total_ms: avg_t,
            min_total_ms: min_t,
            max_total_ms: max_t,
            avg_lex_ms: avg_l,
            avg_parse_ms: avg_p,
            avg_sema_ms: avg_s,
            avg_gen_ms: avg_g,
            asm_bytes,
        });
    }

    let out_path = cli.output.unwrap_or_else(|| {
        let dir = workspace_root().join("bench-results");
        fs::create_dir_all(&dir).expect("create results dir");
        let ts = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%SZ").to_string();
        dir.join(format!("{}.json", ts))
    });

    let doc = OutputDoc {
        timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        tern_version: env!("CARGO_PKG_VERSION").to_string(),
        benchmarks: results,
    };
    let json = serde_json::to_string_pretty(&doc).expect("serialize json");
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).expect("create results dir");
    }
    fs::write(&out_path, json).expect("write results json");

    println!("\nSaved results to {}", out_path.display());
}
