//! The connection acceptor (spec.md §4.7): accepts clients, assigns them to
//! an active session slot or the waiting queue, and promotes queued
//! clients as active ones depart.

use std::collections::VecDeque;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::error::{Result, TxnError};
use crate::session::ClientSession;
use crate::shutdown;

/// How long a single `poll(2)` on the listening socket waits before the
/// accept loop returns to re-check for finished children and the shutdown
/// flag - the socket analogue of the ~200ms bounded wait Core A's
/// coordinator uses.
const POLL_TIMEOUT_MS: i32 = 200;

/// Accepts connections on one listening socket, enforcing the active/
/// waiting capacity split from spec.md §4.7.
pub struct Acceptor {
    listener: TcpListener,
    max_concurrent: u32,
    max_waiting: u32,
    csv_path: PathBuf,
    active_children: Vec<Pid>,
    waiting: VecDeque<TcpStream>,
}

impl Acceptor {
    /// Bind the listening socket and prepare an empty acceptor.
    pub fn bind(host: &str, port: u16, max_concurrent: u32, max_waiting: u32, csv_path: PathBuf) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).map_err(|source| TxnError::Bind {
            host: host.to_string(),
            port,
            source,
        })?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, max_concurrent, max_waiting, csv_path, active_children: Vec::new(), waiting: VecDeque::new() })
    }

    /// The address actually bound, useful when `port` was `0` (as tests do
    /// to get an OS-assigned ephemeral port).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until a shutdown signal is observed.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.reap_finished_children();

            if shutdown::requested() {
                self.shutdown();
                return Ok(());
            }

            match self.listener.accept() {
                Ok((stream, _addr)) => self.handle_new_connection(stream)?,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    poll_readable(&self.listener, POLL_TIMEOUT_MS);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn handle_new_connection(&mut self, stream: TcpStream) -> Result<()> {
        if (self.active_children.len() as u32) < self.max_concurrent {
            self.spawn_session(stream, "CONEXION_ESTABLECIDA: bienvenido")?;
        } else if (self.waiting.len() as u32) < self.max_waiting {
            let position = self.waiting.len() as u32 + 1;
            let mut stream = stream;
            let _ = writeln!(stream, "EN_COLA_ESPERA: {position}/{}", self.max_waiting);
            self.waiting.push_back(stream);
        } else {
            let mut stream = stream;
            let _ = writeln!(stream, "ERROR: Limite de conexiones alcanzado");
        }
        Ok(())
    }

    fn spawn_session(&mut self, stream: TcpStream, greeting: &str) -> Result<()> {
        // Safety: the child immediately exits via `std::process::exit`
        // without returning through this function or unwinding, so no
        // destructor runs twice and no lock acquired before the fork is
        // ever used post-fork from two processes at once.
        match unsafe { fork() }.map_err(TxnError::Fork)? {
            ForkResult::Parent { child } => {
                self.active_children.push(child);
                drop(stream);
            }
            ForkResult::Child => {
                drop(std::mem::replace(&mut self.listener, dummy_listener()));
                self.waiting.clear();
                let session = ClientSession::new(stream, &self.csv_path);
                let _ = session.run(greeting);
                std::process::exit(0);
            }
        }
        Ok(())
    }

    fn reap_finished_children(&mut self) {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    if let Some(pid) = status.pid() {
                        self.active_children.retain(|&p| p != pid);
                        self.promote_waiting();
                    }
                }
                Err(nix::Error::ECHILD) => break,
                Err(_) => break,
            }
        }
    }

    fn promote_waiting(&mut self) {
        while (self.active_children.len() as u32) < self.max_concurrent {
            let Some(stream) = self.waiting.pop_front() else { break };
            if self.spawn_session(stream, "CONEXION_APROBADA: su turno ha llegado").is_err() {
                break;
            }
            self.broadcast_positions();
        }
    }

    fn broadcast_positions(&mut self) {
        let total = self.max_waiting;
        for (index, stream) in self.waiting.iter_mut().enumerate() {
            let _ = writeln!(stream, "POSICION_ACTUALIZADA: {}/{total}", index + 1);
        }
    }

    fn shutdown(&mut self) {
        for pid in &self.active_children {
            let _ = nix::sys::signal::kill(*pid, nix::sys::signal::Signal::SIGTERM);
        }
        for mut stream in self.waiting.drain(..) {
            let _ = writeln!(stream, "SERVIDOR_CERRANDO: el servidor se esta deteniendo");
        }
        for pid in self.active_children.drain(..) {
            let _ = waitpid(pid, None);
        }
        self.remove_temp_files();
    }

    /// Remove the CSV mutator's sibling temp file and the transaction lock
    /// sentinel (spec.md §5: "removes any temp files (`temp.csv`,
    /// `temp_commit.csv`, lock sentinel)"). Safe to call when neither
    /// exists; every active session has already been SIGTERMed above, so
    /// no session can recreate them after this runs.
    fn remove_temp_files(&self) {
        let _ = std::fs::remove_file(crate::csv_store::sibling_temp_path(&self.csv_path));
        let _ = std::fs::remove_file(crate::session::sibling_lock_path(&self.csv_path));
    }
}

fn poll_readable(listener: &TcpListener, timeout_ms: i32) {
    let mut pfd = libc::pollfd { fd: listener.as_raw_fd(), events: libc::POLLIN, revents: 0 };
    unsafe {
        libc::poll(&mut pfd, 1, timeout_ms);
    }
}

fn dummy_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").expect("failed to bind throwaway listener")
}
