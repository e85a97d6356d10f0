//! FTP transport backed by a blocking `suppaftp::FtpStream` on a worker thread.
//!
//! The worker owns the control connection and drains a job channel strictly in
//! order, so the one-command-at-a-time contract holds even if a caller misbehaves.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use bytes::Bytes;
use suppaftp::list::File as ListFile;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Command, ConnectionState, Connector, EventSink, RemoteEntry, Transport, TransportEvent};
use crate::error::{AppError, Result};

const CHUNK_SIZE: usize = 8 * 1024;
const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

enum Job {
    /// A command with the token its abort trips.
    Run(Command, CancellationToken),
    Shutdown,
}

/// Opens [`FtpTransport`]s, one worker thread each.
#[derive(Clone, Debug, Default)]
pub struct FtpConnector;

impl Connector for FtpConnector {
    type Transport = FtpTransport;

    fn open(&mut self, sink: EventSink) -> Result<FtpTransport> {
        let (jobs, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            sink: sink.clone(),
            stream: None,
        };
        std::thread::Builder::new()
            .name(format!("ftp-transport-{}", sink.session().0))
            .spawn(move || worker.run(rx))?;

        debug!("Opened FTP transport for session {}", sink.session().0);
        Ok(FtpTransport {
            jobs,
            current: CancellationToken::new(),
        })
    }
}

/// Handle to a running FTP worker.
pub struct FtpTransport {
    jobs: mpsc::UnboundedSender<Job>,
    // token of the last submitted command
    current: CancellationToken,
}

impl Transport for FtpTransport {
    fn submit(&mut self, command: Command) -> Result<()> {
        self.current = CancellationToken::new();
        self.jobs
            .send(Job::Run(command, self.current.clone()))
            .map_err(|_| AppError::TransportClosed)
    }

    fn abort(&mut self) {
        self.current.cancel();
    }

    fn close(&mut self) {
        // the worker may already be gone
        let _ = self.jobs.send(Job::Shutdown);
    }
}

impl Drop for FtpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

struct Worker {
    sink: EventSink,
    stream: Option<FtpStream>,
}

impl Worker {
    fn run(mut self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.blocking_recv() {
            match job {
                Job::Run(command, cancel) => {
                    debug!("FTP worker executing {:?}", command);
                    let result = self.execute(command, &cancel);

                    let error = match result {
                        Ok(()) => None,
                        Err(e) => {
                            warn!("FTP command failed: {}", e);
                            if is_connection_lost(&e) && self.stream.take().is_some() {
                                self.set_state(ConnectionState::Unconnected);
                            }
                            Some(e.to_string())
                        }
                    };
                    if !self.sink.emit(TransportEvent::CommandFinished { error }) {
                        break;
                    }
                }
                Job::Shutdown => break,
            }
        }
        self.shutdown();
    }

    fn execute(&mut self, command: Command, cancel: &CancellationToken) -> Result<()> {
        match command {
            Command::ConnectToHost { host, port } => self.connect(&host, port),
            Command::Login { credentials } => {
                let (user, password) = credentials.unwrap_or_else(|| {
                    (ANONYMOUS_USER.to_string(), ANONYMOUS_PASSWORD.to_string())
                });
                self.stream()?
                    .login(user.as_str(), password.as_str())
                    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;
                self.set_state(ConnectionState::LoggedIn);
                Ok(())
            }
            Command::Cd(path) => self.stream()?.cwd(path.as_str()).map_err(remote_error),
            Command::Mkdir(name) => self.stream()?.mkdir(name.as_str()).map_err(remote_error),
            Command::Rmdir(name) => self.stream()?.rmdir(name.as_str()).map_err(remote_error),
            Command::Rename { from, to } => self
                .stream()?
                .rename(from.as_str(), to.as_str())
                .map_err(remote_error),
            Command::Remove(name) => self.stream()?.rm(name.as_str()).map_err(remote_error),
            Command::List => self.list(),
            Command::Get { remote } => self.retrieve(&remote, cancel),
            Command::Put { remote, data } => self.store(&remote, data, cancel),
        }
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if let Some(mut old) = self.stream.take() {
            let _ = old.quit();
        }

        self.set_state(ConnectionState::HostLookup);
        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                self.set_state(ConnectionState::Unconnected);
                return Err(AppError::ConnectionError(format!("{host}: {e}")));
            }
        };

        self.set_state(ConnectionState::Connecting);
        match FtpStream::connect(&addrs[..]) {
            Ok(stream) => {
                if let Some(welcome) = stream.get_welcome_msg() {
                    debug!("Server welcome: {}", welcome.trim());
                }
                info!("Connected to {}:{}", host, port);
                self.stream = Some(stream);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Unconnected);
                Err(AppError::ConnectionError(e.to_string()))
            }
        }
    }

    fn list(&mut self) -> Result<()> {
        let lines = self.stream()?.list(None)?;
        for line in lines {
            match ListFile::from_str(&line) {
                Ok(file) => {
                    let name = file.name();
                    if name == "." || name == ".." {
                        continue;
                    }
                    let entry = if file.is_directory() {
                        RemoteEntry::dir(name)
                    } else {
                        RemoteEntry::file(name, file.size() as u64)
                    };
                    self.sink.emit(TransportEvent::ListInfo(entry));
                }
                Err(e) => debug!("Skipping unparseable LIST line {:?}: {:?}", line, e),
            }
        }
        Ok(())
    }

    fn retrieve(&mut self, remote: &str, cancel: &CancellationToken) -> Result<()> {
        let sink = self.sink.clone();
        let stream = self.stream()?;

        stream.transfer_type(FileType::Binary)?;
        // SIZE is optional on many servers
        let total = stream.size(remote).map(|size| size as u64).unwrap_or(0);

        let mut data = stream.retr_as_stream(remote)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut transferred = 0u64;
        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(AppError::TransferError("transfer aborted".to_string()));
            }
            match data.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    transferred += n as u64;
                    sink.emit(TransportEvent::Data(Bytes::copy_from_slice(&buf[..n])));
                    sink.emit(TransportEvent::Progress { transferred, total });
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(AppError::from(e)),
            }
        };

        match outcome {
            Ok(()) => {
                stream.finalize_retr_stream(data)?;
                Ok(())
            }
            Err(e) => {
                // consume the 426/451 reply so the control channel stays in sync
                let _ = stream.finalize_retr_stream(data);
                Err(e)
            }
        }
    }

    fn store(&mut self, remote: &str, data: Bytes, cancel: &CancellationToken) -> Result<()> {
        let sink = self.sink.clone();
        let stream = self.stream()?;

        stream.transfer_type(FileType::Binary)?;
        let total = data.len() as u64;
        let mut writer = stream.put_with_stream(remote)?;

        let mut transferred = 0u64;
        let mut outcome = Ok(());
        for chunk in data.chunks(CHUNK_SIZE) {
            if cancel.is_cancelled() {
                outcome = Err(AppError::TransferError("transfer aborted".to_string()));
                break;
            }
            if let Err(e) = writer.write_all(chunk) {
                outcome = Err(AppError::from(e));
                break;
            }
            transferred += chunk.len() as u64;
            sink.emit(TransportEvent::Progress { transferred, total });
        }

        let finalized = stream.finalize_put_stream(writer);
        outcome?;
        finalized?;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.set_state(ConnectionState::Closing);
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.quit()
        {
            debug!("QUIT failed: {}", e);
        }
        self.set_state(ConnectionState::Unconnected);
        debug!("FTP worker for session {} stopped", self.sink.session().0);
    }

    fn stream(&mut self) -> Result<&mut FtpStream> {
        self.stream.as_mut().ok_or(AppError::NotConnected)
    }

    fn set_state(&self, state: ConnectionState) {
        self.sink.emit(TransportEvent::StateChanged(state));
    }
}

/// Server refusals become [`AppError::RemoteOperationError`]; a dropped
/// connection stays an FTP error so the worker notices it.
fn remote_error(error: FtpError) -> AppError {
    match error {
        FtpError::ConnectionError(_) => AppError::Ftp(error),
        other => AppError::RemoteOperationError(other.to_string()),
    }
}

fn is_connection_lost(error: &AppError) -> bool {
    matches!(error, AppError::Ftp(FtpError::ConnectionError(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Notification, SessionId};

    fn open_transport() -> (FtpTransport, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = FtpConnector
            .open(EventSink::new(SessionId(7), tx))
            .unwrap();
        (transport, rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Notification>) -> TransportEvent {
        let notification = rx.blocking_recv().expect("worker hung up");
        assert_eq!(notification.session, SessionId(7));
        notification.event
    }

    #[test]
    fn test_remote_error_keeps_connection_errors() {
        let lost = FtpError::ConnectionError(std::io::Error::from(ErrorKind::BrokenPipe));
        assert!(is_connection_lost(&remote_error(lost)));

        let refused = FtpError::BadResponse;
        assert!(matches!(
            remote_error(refused),
            AppError::RemoteOperationError(_)
        ));
    }

    #[test]
    fn test_abort_before_worker_dequeues_sticks_to_the_job() {
        let (jobs, mut rx) = mpsc::unbounded_channel();
        let mut transport = FtpTransport {
            jobs,
            current: CancellationToken::new(),
        };

        transport
            .submit(Command::Get {
                remote: "big.iso".to_string(),
            })
            .unwrap();
        transport.abort();
        transport.submit(Command::List).unwrap();

        let Some(Job::Run(Command::Get { .. }, first)) = rx.blocking_recv() else {
            panic!("expected the get job");
        };
        assert!(first.is_cancelled());
        let Some(Job::Run(Command::List, second)) = rx.blocking_recv() else {
            panic!("expected the list job");
        };
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_login_without_connection_fails() {
        let (mut transport, mut rx) = open_transport();
        transport.submit(Command::Login { credentials: None }).unwrap();

        match next_event(&mut rx) {
            TransportEvent::CommandFinished { error } => assert!(error.is_some()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_connect_refused_reports_unconnected() {
        // grab a free port, then release it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (mut transport, mut rx) = open_transport();
        transport
            .submit(Command::ConnectToHost {
                host: "127.0.0.1".to_string(),
                port,
            })
            .unwrap();

        assert_eq!(
            next_event(&mut rx),
            TransportEvent::StateChanged(ConnectionState::HostLookup)
        );
        assert_eq!(
            next_event(&mut rx),
            TransportEvent::StateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut rx),
            TransportEvent::StateChanged(ConnectionState::Unconnected)
        );
        match next_event(&mut rx) {
            TransportEvent::CommandFinished { error } => assert!(error.is_some()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_close_stops_worker() {
        let (mut transport, mut rx) = open_transport();
        transport.close();

        assert_eq!(
            next_event(&mut rx),
            TransportEvent::StateChanged(ConnectionState::Closing)
        );
        assert_eq!(
            next_event(&mut rx),
            TransportEvent::StateChanged(ConnectionState::Unconnected)
        );
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    #[ignore = "requires a running ftp server"]
    fn test_list_against_local_server() {
        let (mut transport, mut rx) = open_transport();
        transport
            .submit(Command::ConnectToHost {
                host: "127.0.0.1".to_string(),
                port: 21,
            })
            .unwrap();
        transport.submit(Command::Login { credentials: None }).unwrap();
        transport.submit(Command::List).unwrap();
        transport.close();

        let mut finished = 0;
        while let Some(notification) = rx.blocking_recv() {
            match notification.event {
                TransportEvent::CommandFinished { error } => {
                    assert!(error.is_none(), "{error:?}");
                    finished += 1;
                }
                TransportEvent::ListInfo(entry) => println!("{entry:?}"),
                _ => {}
            }
        }
        assert_eq!(finished, 3);
    }
}
