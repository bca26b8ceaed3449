#[macro_use]
extern crate clap;

use clap::Arg;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process;

use cq::{Client, Result, DEFAULT_ADDRESS};

fn run() -> Result<()> {
    let matches = app_from_crate!()
        .about("Sends commands, one per line, to a cq-server")
        .arg(Arg::with_name("address").long("addr").takes_value(true))
        .arg(Arg::with_name("file").long("file").takes_value(true)
            .help("Read commands from a file instead of stdin"))
        .get_matches();

    let address = matches.value_of("address").unwrap_or(DEFAULT_ADDRESS);
    let input: Box<dyn BufRead> = match matches.value_of("file") {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut client = Client::connect(address)?;
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            client.send(line.to_owned())?;
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        use std::error::Error;

        eprintln!("Error: {}", err);

        let mut source: &dyn Error = &err;
        while let Some(err) = source.source() {
            eprintln!("Caused by: {}", err);
            source = err;
        }
        process::exit(1);
    }
}
