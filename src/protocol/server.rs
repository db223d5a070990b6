//! Server FSM (§4.5): `INIT` → `AWAIT_PK` → `AWAIT_EXECUTE` → `DONE`, one
//! connection at a time.

use std::collections::HashMap;
use std::net::TcpStream;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::executable::Executable;
use crate::protocol::framing::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
use crate::protocol::message::{decode_message, encode_message, Message};
use crate::scheme::SchemeContext;
use crate::tensor::{Datatype, HeTensor};
use crate::value::{Ciphertext, HeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    AwaitPk,
    AwaitExecute,
    Done,
}

/// A single accepted connection's FSM state plus the loaded graph it serves.
pub struct Session<'a> {
    stream: TcpStream,
    state: State,
    ctx: &'a SchemeContext,
    executable: &'a Executable,
    input_name: String,
    total_input_elements: usize,
    batch_size: usize,
    max_frame_bytes: u64,
    peer_public_key: Option<Vec<u8>>,
    peer_eval_key: Option<Vec<u8>>,
}

impl<'a> Session<'a> {
    /// Builds a session bound to a single `Input` node of `executable` by
    /// name, expecting `total_input_elements` scalars packed `batch_size`
    /// lanes per ciphertext.
    pub fn new(
        stream: TcpStream,
        ctx: &'a SchemeContext,
        executable: &'a Executable,
        input_name: impl Into<String>,
        total_input_elements: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            stream,
            state: State::Init,
            ctx,
            executable,
            input_name: input_name.into(),
            total_input_elements,
            batch_size,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            peer_public_key: None,
            peer_eval_key: None,
        }
    }

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

    /// Drives the FSM to completion: advertises parameters, collects the
    /// peer's keys, runs one `Execute`, sends `Result`, then closes.
    pub fn run(&mut self) -> Result<()> {
        info!(peer = ?self.stream.peer_addr().ok(), "session accepted");

        let params = self.ctx.scheme().save_params();
        self.send(&Message::EncryptionParameters { params })?;
        self.state = State::AwaitPk;

        loop {
            match self.state {
                State::AwaitPk => self.handle_await_pk()?,
                State::AwaitExecute => {
                    if self.handle_await_execute()? {
                        break;
                    }
                }
                State::Init | State::Done => break,
            }
        }

        debug!("session complete");
        Ok(())
    }

    fn handle_await_pk(&mut self) -> Result<()> {
        let msg = self.recv()?;
        match msg {
            Message::PublicKey { key } => {
                self.peer_public_key = Some(key);
                self.send(&Message::PublicKeyAck)
            }
            Message::EvalKey { key } => {
                self.peer_eval_key = Some(key);
                self.state = State::AwaitExecute;
                let n = (self.total_input_elements / self.batch_size.max(1)) as u64;
                self.send(&Message::ParameterSize { n })
            }
            other => Err(self.protocol_error(other)),
        }
    }

    /// Returns `true` once the session should close.
    fn handle_await_execute(&mut self) -> Result<bool> {
        let msg = self.recv()?;
        match msg {
            Message::ParameterShapeRequest => {
                self.send(&Message::ParameterShape {
                    shape: vec![self.total_input_elements as u64],
                })?;
                Ok(false)
            }
            Message::Execute { ciphers } => {
                match self.execute(ciphers) {
                    Ok(output) => {
                        self.send(&Message::Result { ciphers: output })?;
                    }
                    Err(e) => {
                        // Abort without leaking details (§7): the kernel/tensor
                        // error is logged server-side, the peer only learns
                        // that the request failed.
                        debug!(error = %e, "execute failed, aborting with None");
                        self.send(&Message::None)?;
                    }
                }
                self.state = State::Done;
                Ok(true)
            }
            other => Err(self.protocol_error(other)),
        }
    }

    fn execute(&self, ciphers: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        let mut elements = Vec::with_capacity(ciphers.len());
        for bytes in &ciphers {
            let c: Ciphertext =
                serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))?;
            elements.push(HeValue::from_cipher(c));
        }

        let mut input = HeTensor::new(Datatype::F64, vec![elements.len()], false, true)?;
        input.set_elements(elements)?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), input);
        let output = self.executable.run(self.ctx, &inputs)?;

        output
            .get_elements()
            .iter()
            .map(|v| serde_json::to_vec(v.as_cipher()).map_err(|e| Error::Codec(e.to_string())))
            .collect()
    }
}
