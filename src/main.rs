use std::process;

use clap::Parser;
use stackcc::generate_assembly;
use tracing_subscriber::EnvFilter;

/// Compile a program of single-letter-variable arithmetic into x86-64
/// assembly, printed on stdout.
#[derive(Parser, Debug)]
#[command(about, disable_help_flag = true, disable_version_flag = true)]
struct Args {
  /// The whole program, e.g. "a=3; b=a+2; return a*b;".
  #[arg(allow_hyphen_values = true)]
  source: String,
}

fn main() {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .init();

  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  match generate_assembly(&args.source) {
    Ok(asm) => print!("{asm}"),
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}
