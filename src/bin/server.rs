//! The inference server daemon: loads a graph and HE scheme parameters once,
//! then serves one [`Session`](fhe_transformer::protocol::Session) per
//! accepted connection on a dedicated thread.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fhe_transformer::error::{Error, Result};
use fhe_transformer::executable::Executable;
use fhe_transformer::graph::GraphSpec;
use fhe_transformer::protocol::Session;
use fhe_transformer::scheme::{bfv::BfvScheme, ckks::CkksScheme, load_scheme_parameters};
use fhe_transformer::scheme::{HeScheme, Scheme, SchemeContext};

/// Runs the inference server.
#[derive(Parser, Debug)]
#[command(version, about = "Serves a dataflow graph over the HE inference protocol")]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 4433)]
    port: u16,

    /// Path to a JSON graph description (see `GraphSpec`).
    #[arg(long)]
    graph: std::path::PathBuf,

    /// Which HE scheme to serve (`bfv` or `ckks`). The graph's `HE_CONFIG`
    /// (if set) must name the same scheme.
    #[arg(long, default_value = "bfv")]
    scheme: String,

    /// Name of the graph's bound `Input` node that incoming `Execute`
    /// ciphertexts are written into.
    #[arg(long, default_value = "input")]
    input_name: String,

    /// Ciphertext SIMD lanes per `Execute` chunk.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,
}

fn parse_scheme(s: &str) -> Result<Scheme> {
    match s.to_ascii_lowercase().as_str() {
        "bfv" => Ok(Scheme::Bfv),
        "ckks" => Ok(Scheme::Ckks),
        other => Err(Error::SchemeParamError(format!(
            "unknown --scheme {other:?}, expected \"bfv\" or \"ckks\""
        ))),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let scheme_kind = parse_scheme(&args.scheme)?;

    let spec = GraphSpec::load(&args.graph)?;
    let total_input_elements: usize = spec
        .input_shape(&args.input_name)
        .ok_or_else(|| {
            Error::ShapeMismatch(format!(
                "graph has no Input node named '{}'",
                args.input_name
            ))
        })?
        .iter()
        .product();
    let graph = spec.build()?;
    let executable = Arc::new(Executable::new(graph));

    let params = load_scheme_parameters(scheme_kind)?;
    let scheme: Box<dyn HeScheme> = match scheme_kind {
        Scheme::Bfv => Box::new(BfvScheme::new(params)?),
        Scheme::Ckks => Box::new(CkksScheme::new(params)?),
    };
    let ctx = Arc::new(SchemeContext::new(scheme)?);

    let listener = TcpListener::bind(("0.0.0.0", args.port))?;
    info!(port = args.port, graph = ?args.graph, "server listening");

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let ctx = Arc::clone(&ctx);
        let executable = Arc::clone(&executable);
        let input_name = args.input_name.clone();
        let batch_size = args.batch_size;

        thread::spawn(move || {
            let mut session = Session::new(
                stream,
                &ctx,
                &executable,
                input_name,
                total_input_elements,
                batch_size,
            );
            if let Err(e) = session.run() {
                error!(error = %e, "session ended with an error");
            }
        });
    }

    Ok(())
}
