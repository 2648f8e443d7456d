//! Minimal Source RCON client, as spoken by Minecraft servers.
//!
//! Every packet is `length: i32le, id: i32le, type: i32le, body, 0, 0`,
//! where `length` counts everything after itself.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::error::{ConsoleError, Result};

pub const PACKET_AUTH: i32 = 3;
pub const PACKET_AUTH_RESPONSE: i32 = 2;
pub const PACKET_EXEC_COMMAND: i32 = 2;
pub const PACKET_RESPONSE_VALUE: i32 = 0;

/// Largest command body a Minecraft server accepts.
pub const MAX_COMMAND_LEN: usize = 1446;
/// Responses longer than this are split over several packets.
const MAX_RESPONSE_CHUNK: usize = 4096;
const MAX_PACKET_LEN: i32 = 4096 + 10;
/// How long to wait for the next fragment of a split response.
const FRAGMENT_WAIT: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = (body.len() + 10) as i32;

        let mut buf = Vec::with_capacity(body.len() + 14);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub fn read_from(reader: &mut impl Read) -> Result<Self> {
        let length = read_i32(reader)?;
        if !(10..=MAX_PACKET_LEN).contains(&length) {
            return Err(ConsoleError::Rcon(format!(
                "invalid packet length {length}"
            )));
        }

        let mut rest = vec![0u8; length as usize];
        reader.read_exact(&mut rest).map_err(map_read_error)?;

        let id = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let kind = i32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let body = &rest[8..rest.len() - 2];

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// An authenticated RCON connection.
pub struct RconClient {
    stream: TcpStream,
    timeout: Duration,
    next_id: i32,
}

impl RconClient {
    /// Connect and authenticate. `timeout` bounds the connect and every
    /// reply.
    pub fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConsoleError::ConnectionFailed(format!("cannot resolve {host}"))
            })?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|err| {
            ConsoleError::ConnectionFailed(format!("rcon {host}:{port}: {err}"))
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let mut client = Self {
            stream,
            timeout,
            next_id: 1,
        };
        client.authenticate(password)?;
        Ok(client)
    }

    fn authenticate(&mut self, password: &str) -> Result<()> {
        let id = self.send(PACKET_AUTH, password)?;

        loop {
            let packet = Packet::read_from(&mut self.stream)?;
            // Some servers send an empty response value before the verdict.
            if packet.kind != PACKET_AUTH_RESPONSE {
                continue;
            }
            if packet.id == -1 {
                return Err(ConsoleError::Rcon(String::from(
                    "authentication rejected",
                )));
            }
            if packet.id == id {
                debug!("rcon authenticated");
                return Ok(());
            }
        }
    }

    /// Run a console command and return the server's reply.
    pub fn command(&mut self, command: &str) -> Result<String> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(ConsoleError::InvalidInput(format!(
                "rcon command longer than {MAX_COMMAND_LEN} bytes"
            )));
        }

        let id = self.send(PACKET_EXEC_COMMAND, command)?;

        let mut reply = loop {
            let packet = Packet::read_from(&mut self.stream)?;
            if packet.id == id && packet.kind == PACKET_RESPONSE_VALUE {
                break packet.body;
            }
        };

        if reply.len() >= MAX_RESPONSE_CHUNK {
            self.read_fragments(id, &mut reply)?;
        }

        Ok(reply)
    }

    fn read_fragments(&mut self, id: i32, reply: &mut String) -> Result<()> {
        self.stream.set_read_timeout(Some(FRAGMENT_WAIT))?;
        let result = loop {
            match Packet::read_from(&mut self.stream) {
                Ok(packet) if packet.id == id => {
                    let last = packet.body.len() < MAX_RESPONSE_CHUNK;
                    reply.push_str(&packet.body);
                    if last {
                        break Ok(());
                    }
                },
                Ok(_) => {},
                Err(ConsoleError::Timeout) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.stream.set_read_timeout(Some(self.timeout))?;
        result
    }

    fn send(&mut self, kind: i32, body: &str) -> Result<i32> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let packet = Packet {
            id,
            kind,
            body: body.to_string(),
        };
        self.stream.write_all(&packet.encode())?;
        Ok(id)
    }
}

fn read_i32(reader: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(map_read_error)?;
    Ok(i32::from_le_bytes(buf))
}

fn map_read_error(err: io::Error) -> ConsoleError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ConsoleError::Timeout,
        io::ErrorKind::UnexpectedEof => ConsoleError::NotConnected,
        _ => ConsoleError::Io(err),
    }
}
