//! Summon provider: `summon-locksmith <secret-id>` writes the raw value to stdout.

use std::io;

use color_eyre::Result;
use locksmith_cli::{config, error_line, init_tracing, secrets, storage};

fn main() {
    let _ = color_eyre::install();
    init_tracing();

    let Some(secret_id) = std::env::args().nth(1) else {
        eprintln!("Error: No secret identifier provided");
        std::process::exit(1);
    };

    if let Err(err) = run(&secret_id) {
        eprintln!("Error retrieving secret '{secret_id}': {}", error_line(&err));
        std::process::exit(1);
    }
}

fn run(secret_id: &str) -> Result<()> {
    let config = config::load()?;
    let locksmith = storage::open(&config)?;
    secrets::summon(&locksmith, secret_id, &mut io::stdout().lock())
}
