//! pppd supervision.
//!
//! The PPP daemon runs as a child with its stdio on the slave side of a
//! pty; the master side is this process's only handle to it and is
//! pumped by the session loop. Teardown closes the master first, then
//! delivers SIGINT and waits a bounded time for the child to exit.

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::pty::{Winsize, openpty};
use nix::sys::signal::{Signal, kill};
use nix::sys::termios::Termios;
use nix::unistd::Pid;
use sstp_common::error::SessionError;
use std::io;
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::Config;

/// How long teardown waits for pppd after SIGINT before giving up.
const EXIT_WAIT: Duration = Duration::from_secs(5);

/// A running pppd child wired to a pty.
pub struct PppSupervisor {
    child: Child,
    master: Option<AsyncFd<OwnedFd>>,
}

impl PppSupervisor {
    /// Allocate a pty and spawn pppd on its slave side.
    ///
    /// The argument vector forces foreground synchronous PPP with
    /// authentication of the peer disabled and compression negotiation
    /// off, which is what an SSTP tunnel expects.
    pub fn spawn(config: &Config) -> Result<Self, SessionError> {
        let pty = openpty(None::<&Winsize>, None::<&Termios>)
            .map_err(|err| SessionError::Child(format!("openpty failed: {err}")))?;

        let mut args: Vec<String> = [
            "nodetach",
            "local",
            "noauth",
            "noccp",
            "nobsdcomp",
            "user",
            config.username.as_str(),
            "password",
            config.password.as_str(),
            "sync",
            "refuse-eap",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(logfile) = &config.logfile {
            args.push("logfile".into());
            args.push(logfile.display().to_string());
            args.push("debug".into());
        }
        if let Some(domain) = &config.domain {
            args.push("domain".into());
            args.push(domain.clone());
        }

        let slave_stdin = pty
            .slave
            .try_clone()
            .map_err(|err| SessionError::Child(format!("pty fd clone failed: {err}")))?;

        let child = Command::new(&config.pppd_path)
            .args(&args)
            .stdin(Stdio::from(slave_stdin))
            .stdout(Stdio::from(pty.slave))
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                SessionError::Child(format!(
                    "failed to spawn {}: {err}",
                    config.pppd_path.display()
                ))
            })?;
        info!(
            "{} spawned as pid {:?}",
            config.pppd_path.display(),
            child.id()
        );
        debug!("pppd arguments: {}", args.join(" "));

        fcntl(&pty.master, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .map_err(|err| SessionError::Child(format!("pty O_NONBLOCK failed: {err}")))?;
        let master = AsyncFd::new(pty.master)
            .map_err(|err| SessionError::Child(format!("pty registration failed: {err}")))?;

        Ok(Self {
            child,
            master: Some(master),
        })
    }

    fn master(&self) -> io::Result<&AsyncFd<OwnedFd>> {
        self.master
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pty master closed"))
    }

    /// Read one PPP frame's worth of bytes from the pty master.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let master = self.master()?;
        loop {
            let mut guard = master.readable().await?;
            match guard.try_io(|inner| {
                nix::unistd::read(inner.get_ref(), buf).map_err(io::Error::from)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write a complete downlink payload to the pty master.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let master = self.master()?;
        let mut written = 0;
        while written < data.len() {
            let mut guard = master.writable().await?;
            match guard.try_io(|inner| {
                nix::unistd::write(inner.get_ref(), &data[written..]).map_err(io::Error::from)
            }) {
                Ok(result) => written += result?,
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Close the pty, interrupt the child and wait for it to exit.
    /// Safe to call more than once.
    pub async fn terminate(&mut self) {
        // Closing the master first gives pppd a hangup on its tty.
        drop(self.master.take());

        let Some(pid) = self.child.id() else {
            return;
        };
        info!("waiting for pppd (pid {pid}) to exit");
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
            warn!("failed to interrupt pppd: {err}");
        }

        match tokio::time::timeout(EXIT_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => info!("pppd exited with {status}"),
            Ok(Err(err)) => warn!("waiting on pppd failed: {err}"),
            Err(_) => {
                warn!("pppd did not exit within {EXIT_WAIT:?}, killing it");
                if let Err(err) = self.child.kill().await {
                    warn!("failed to kill pppd: {err}");
                }
            }
        }
    }
}
