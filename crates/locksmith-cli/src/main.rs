use std::io::{self, Write};

use clap::Parser;
use color_eyre::Result;
use locksmith_cli::{
    cli::{parse_failure_message, Cli, Command, ConfigCommand},
    config::{self, Config},
    error_line, init_tracing, secrets, storage,
};

fn main() {
    if let Err(err) = color_eyre::install() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match parse_failure_message(&err) {
            None => err.exit(),
            Some(message) => {
                eprintln!("{}", message.trim_end());
                std::process::exit(1);
            }
        },
    };

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {}", error_line(&err));
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    let config = config::load()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Config(ConfigCommand::Init) => init_config(&mut out)?,
        Command::Add {
            key,
            secret,
            expires,
        } => secrets::add(&storage::open(&config)?, &key, secret, &expires, &mut out)?,
        Command::Get { key, json } => {
            let locksmith = storage::open(&config)?;
            secrets::get(&locksmith, &key, json, &config, &mut out, &mut io::stderr())?
        }
        Command::List => secrets::list(&storage::open(&config)?, &config, &mut out)?,
        Command::Delete { key } => secrets::delete(&storage::open(&config)?, &key, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn init_config(out: &mut impl Write) -> Result<()> {
    let path = config::default_path()?;
    let existed = path.exists();
    let path = config::write_if_missing(&Config::default(), &path)?;
    if existed {
        writeln!(out, "Config already exists at {}", path.display())?;
    } else {
        writeln!(out, "Config initialized at {}", path.display())?;
    }
    Ok(())
}
