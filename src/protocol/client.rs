//! Client FSM (§4.5): `CONNECTING` → `AWAIT_PARAMS` → `AWAIT_PARAM_SIZE` →
//! `AWAIT_RESULT` → `DONE`, driven on a background thread so the in-process
//! API (§6) can be polled rather than blocked on.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::framing::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
use crate::protocol::message::{decode_message, encode_message, Message};
use crate::scheme::{HeScheme, SchemeContext, SchemeParameters};
use crate::value::Ciphertext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    AwaitParams,
    AwaitParamSize,
    AwaitResult,
    Done,
}

/// Outcome of the background FSM run, polled via [`Client::is_done`]/
/// [`Client::get_results`].
enum Outcome {
    Running,
    Succeeded(Vec<f32>),
    Aborted,
}

/// An in-process client connection (§6): `connect` returns immediately and
/// drives the protocol on a background thread; callers poll `is_done`/
/// `get_results`, or `close` to abort early.
pub struct Client {
    outcome: Arc<Mutex<Outcome>>,
    stream: Arc<Mutex<Option<TcpStream>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Client {
    /// Connects to `host:port` and starts running the FSM in the background:
    /// encrypts `inputs` in `batch_size`-lane chunks against whatever scheme
    /// the server advertises, executes, and decrypts the result. Connection
    /// failures and protocol errors surface as an aborted run (§7): `is_done`
    /// becomes true and `get_results` returns empty, never a panic.
    pub fn connect(host: &str, port: u16, batch_size: usize, inputs: Vec<f32>) -> Client {
        let outcome = Arc::new(Mutex::new(Outcome::Running));
        let stream_handle = Arc::new(Mutex::new(None));
        let outcome_bg = Arc::clone(&outcome);
        let stream_bg = Arc::clone(&stream_handle);
        let host = host.to_string();

        let worker = thread::spawn(move || {
            let result = run_session(&host, port, batch_size, &inputs, &stream_bg);
            let mut guard = outcome_bg.lock().unwrap();
            *guard = match result {
                Ok(values) => Outcome::Succeeded(values),
                Err(e) => {
                    warn!(error = %e, "client session aborted");
                    Outcome::Aborted
                }
            };
        });

        Client {
            outcome,
            stream: stream_handle,
            worker: Some(worker),
        }
    }

    /// True once the background run has either produced a result or aborted.
    pub fn is_done(&self) -> bool {
        !matches!(*self.outcome.lock().unwrap(), Outcome::Running)
    }

    /// Flattened (element-major, then batch-lane) results, matching
    /// `HeTensor::write`/`read`'s layout. Empty if still running or if the
    /// run aborted (§7's "User-visible behavior").
    pub fn get_results(&self) -> Vec<f32> {
        match &*self.outcome.lock().unwrap() {
            Outcome::Succeeded(values) => values.clone(),
            Outcome::Running | Outcome::Aborted => Vec::new(),
        }
    }

    /// Aborts the run early: shuts down the socket so any blocking read/write
    /// the worker thread is in unblocks with an I/O error, then joins it.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.lock().unwrap().as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

struct Session {
    stream: TcpStream,
    state: State,
    max_frame_bytes: u64,
}

impl Session {
    fn send(&mut self, msg: &Message) -> Result<()> {
        let body = encode_message(msg)?;
        write_frame(&mut self.stream, &body)
    }

    fn recv(&mut self) -> Result<Message> {
        let body = read_frame(&mut self.stream, self.max_frame_bytes)?;
        decode_message(&body)
    }

    fn protocol_error(&self, got: Message) -> Error {
        Error::ProtocolError {
            state: format!("{:?}", self.state),
            got: Box::new(got),
        }
    }
}

/// Stand-in key material: the scheme library itself (out of scope, §1) would
/// derive real lattice keys here. A fresh CSPRNG draw at least gives every
/// connection distinct, non-degenerate key bytes on the wire.
fn random_key_material(len: usize) -> Vec<u8> {
    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}

fn build_context(params_bytes: &[u8]) -> Result<SchemeContext> {
    let params: SchemeParameters =
        serde_json::from_slice(params_bytes).map_err(|e| Error::Codec(e.to_string()))?;
    let scheme: Box<dyn HeScheme> = match params.scheme {
        crate::scheme::Scheme::Bfv => Box::new(crate::scheme::bfv::BfvScheme::new(params)?),
        crate::scheme::Scheme::Ckks => Box::new(crate::scheme::ckks::CkksScheme::new(params)?),
    };
    SchemeContext::new(scheme)
}

/// Runs the full FSM to completion (or the first error). `stream_handle` is
/// populated as soon as the socket connects, so [`Client::close`] can shut it
/// down from another thread.
fn run_session(
    host: &str,
    port: u16,
    batch_size: usize,
    inputs: &[f32],
    stream_handle: &Mutex<Option<TcpStream>>,
) -> Result<Vec<f32>> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Codec(format!("could not resolve {host}:{port}")))?;
    let stream = TcpStream::connect(addr)?;
    let cloned = stream.try_clone()?;
    *stream_handle.lock().unwrap() = Some(cloned);

    let mut session = Session {
        stream,
        state: State::Connecting,
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
    };

    session.state = State::AwaitParams;
    let params_bytes = match session.recv()? {
        Message::EncryptionParameters { params } => params,
        other => return Err(session.protocol_error(other)),
    };

    let ctx = build_context(&params_bytes)?;

    // This reference implementation has no real lattice key material (see
    // `scheme` module docs); stand-in key bytes still flow through the wire
    // protocol so the FSM and framing are exercised faithfully.
    session.send(&Message::PublicKey {
        key: random_key_material(32),
    })?;
    match session.recv()? {
        Message::PublicKeyAck => {}
        other => return Err(session.protocol_error(other)),
    }
    session.send(&Message::EvalKey {
        key: random_key_material(32),
    })?;
    session.state = State::AwaitParamSize;

    let n = match session.recv()? {
        Message::ParameterSize { n } => n,
        other => return Err(session.protocol_error(other)),
    };

    if batch_size == 0 || inputs.len() != n as usize * batch_size {
        return Err(Error::ShapeMismatch(format!(
            "inputs.len() {} does not equal n={} * batch_size={}",
            inputs.len(),
            n,
            batch_size
        )));
    }

    let mut ciphers = Vec::with_capacity(n as usize);
    for chunk in inputs.chunks(batch_size) {
        let lanes: Vec<f64> = chunk.iter().map(|&v| v as f64).collect();
        let plain = ctx.scheme().encode(&lanes, ctx.scheme().params().scale)?;
        let cipher = ctx.scheme().encrypt(&plain);
        ciphers.push(serde_json::to_vec(&cipher).map_err(|e| Error::Codec(e.to_string()))?);
    }
    session.send(&Message::Execute { ciphers })?;
    session.state = State::AwaitResult;

    let result_ciphers = match session.recv()? {
        Message::Result { ciphers } => ciphers,
        Message::None => return Err(Error::ProtocolError {
            state: format!("{:?}", session.state),
            got: Box::new(Message::None),
        }),
        other => return Err(session.protocol_error(other)),
    };

    let mut out = Vec::new();
    for bytes in result_ciphers {
        let c: Ciphertext =
            serde_json::from_slice(&bytes).map_err(|e| Error::Codec(e.to_string()))?;
        out.extend(
            ctx.scheme()
                .decode(&ctx.scheme().decrypt(&c))
                .into_iter()
                .map(|v| v as f32),
        );
    }
    session.state = State::Done;
    info!("client run complete");
    Ok(out)
}
