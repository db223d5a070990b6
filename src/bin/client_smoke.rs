//! A smoke-test client: reads whitespace-separated reals from stdin,
//! runs them through the protocol against a running server, and prints
//! the decrypted result to stdout.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fhe_transformer::error::{Error, Result};
use fhe_transformer::protocol::Client;

/// Drives one inference request against a server and prints the result.
#[derive(Parser, Debug)]
#[command(version, about = "Sends stdin's numbers through the HE inference protocol")]
struct Args {
    /// Server hostname or address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = 4433)]
    port: u16,

    /// SIMD lanes packed per ciphertext chunk.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,
}

fn read_input_values() -> Result<Vec<f32>> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f32>().map_err(|e| {
                Error::ShapeMismatch(format!("stdin token '{tok}' is not a number: {e}"))
            })
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let input_values = read_input_values()?;

    let mut client = Client::connect(&args.host, args.port, args.batch_size, input_values);
    info!(host = %args.host, port = args.port, "connecting");

    while !client.is_done() {
        thread::sleep(Duration::from_millis(10));
    }
    let result = client.get_results();
    client.close();

    let rendered: Vec<String> = result.iter().map(|v| v.to_string()).collect();
    println!("{}", rendered.join(" "));
    Ok(())
}
