//! Line-oriented telnet front-end
//!
//! A non-blocking `TcpListener` plus per-connection read buffers, all
//! polled from the single driver loop that also pumps the scheduler. No
//! telnet option negotiation: IAC sequences are stripped from input
//! without interpretation and lines are CRLF- (or LF-) terminated, 8-bit
//! clean otherwise.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tracing::{info, warn};

use crate::world::{unix_now, World};

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;

struct Conn {
    stream: TcpStream,
    inbuf: Vec<u8>,
    closed: bool,
}

pub struct Server {
    listener: TcpListener,
    conns: HashMap<u64, Conn>,
    next_conn: u64,
}

impl Server {
    pub fn bind(port: u16) -> std::io::Result<Server> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        info!(port, "listening");
        Ok(Server {
            listener,
            conns: HashMap::new(),
            // conn id 0 is the driver console
            next_conn: 1,
        })
    }

    /// Drive the world until `shutdown()` is called.
    pub fn run(&mut self, world: &mut World) {
        while !world.shutdown {
            self.accept_new(world);
            self.read_sockets();
            world.tick(unix_now());
            self.process_lines(world);
            self.flush_output(world);
            self.reap_closed(world);
            std::thread::sleep(Duration::from_millis(20));
        }
        info!("server loop stopped");
    }

    fn accept_new(&mut self, world: &mut World) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let conn = self.next_conn;
                    self.next_conn += 1;
                    info!(conn, %peer, "connection accepted");
                    self.conns.insert(
                        conn,
                        Conn {
                            stream,
                            inbuf: Vec::new(),
                            closed: false,
                        },
                    );
                    if let Err(e) = world.register_connection(conn) {
                        warn!(conn, error = %e, "login failed");
                        if let Some(c) = self.conns.get_mut(&conn) {
                            let _ = c.stream.write_all(b"Login failed.\r\n");
                            c.closed = true;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn read_sockets(&mut self) {
        let mut buf = [0u8; 1024];
        for conn in self.conns.values_mut() {
            if conn.closed {
                continue;
            }
            loop {
                match conn.stream.read(&mut buf) {
                    Ok(0) => {
                        conn.closed = true;
                        break;
                    }
                    Ok(n) => conn.inbuf.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(_) => {
                        conn.closed = true;
                        break;
                    }
                }
            }
        }
    }

    /// One line per connection per pass, connections in id order, passes
    /// repeated until everything queued has been dispatched.
    fn process_lines(&mut self, world: &mut World) {
        loop {
            let mut any = false;
            let mut ids: Vec<u64> = self.conns.keys().copied().collect();
            ids.sort();
            for id in ids {
                let Some(conn) = self.conns.get_mut(&id) else { continue };
                let Some(line) = next_line(&mut conn.inbuf) else { continue };
                any = true;
                let Some(player) = world.player_for(id) else { continue };
                world.dispatch_command(player, &line);
                world.send_conn(id, "> ");
            }
            if !any {
                break;
            }
        }
    }

    fn flush_output(&mut self, world: &mut World) {
        // console output from dispatches with no interactive initiator
        if let Some(text) = world.take_output(0) {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        for (id, conn) in self.conns.iter_mut() {
            if conn.closed {
                continue;
            }
            if let Some(text) = world.take_output(*id) {
                let text = text.replace('\n', "\r\n");
                if conn.stream.write_all(text.as_bytes()).is_err() {
                    conn.closed = true;
                }
            }
        }
    }

    fn reap_closed(&mut self, world: &mut World) {
        let closed: Vec<u64> = self
            .conns
            .iter()
            .filter(|(_, c)| c.closed)
            .map(|(id, _)| *id)
            .collect();
        for id in closed {
            self.conns.remove(&id);
            world.connection_closed(id);
        }
    }
}

/// Extract the next complete line from the buffer: stripped of CR/LF and
/// telnet IAC sequences, decoded leniently as UTF-8.
pub fn next_line(inbuf: &mut Vec<u8>) -> Option<String> {
    let nl = inbuf.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = inbuf.drain(..=nl).collect();
    line.pop(); // the \n
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&strip_telnet(&line)).to_string())
}

/// Drop IAC command sequences without negotiating anything.
pub fn strip_telnet(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != IAC {
            out.push(b);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            // escaped 0xFF data byte
            Some(&IAC) => {
                out.push(IAC);
                i += 2;
            }
            // WILL/WONT/DO/DONT carry an option byte
            Some(&cmd) if (251..=254).contains(&cmd) => i += 3,
            // subnegotiation runs to IAC SE
            Some(&SB) => {
                let mut j = i + 2;
                while j + 1 < bytes.len() && !(bytes[j] == IAC && bytes[j + 1] == SE) {
                    j += 1;
                }
                i = j + 2;
            }
            Some(_) => i += 2,
            None => i += 1,
        }
    }
    out
}
