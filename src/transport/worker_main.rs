//! Worker subprocess entry point
//!
//! Runs when `jobherd worker --slot N --role R ...` is invoked by the process
//! transport. Requests are read from stdin and responses written to stdout,
//! one JSON object per line; logs go to stderr.

use crate::agent::{AgentStats, WorkerAgent};
use crate::config::WorkerArgs;
use crate::error::{ChannelError, Result};
use crate::protocol::{Request, Response};
use crate::transport::{Outbox, SpawnSpec};
use crossbeam_channel::{unbounded, Sender};
use std::io::{self, BufRead, Write};
use std::thread;
use tracing::{debug, warn};

/// Outbox writing JSON lines to a writer (stdout in production)
pub struct LineOutbox<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> LineOutbox<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> Outbox for LineOutbox<W> {
    fn send(&mut self, response: Response) -> std::result::Result<(), ChannelError> {
        let line = response
            .to_line()
            .map_err(|_| ChannelError::CoordinatorGone)?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|_| ChannelError::CoordinatorGone)
    }
}

/// Feed parsed request lines into `tx` until EOF or until the agent is gone
fn pump_requests<R: BufRead>(reader: R, tx: Sender<Request>) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match Request::from_line(&line) {
            Ok(request) => {
                if tx.send(request).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed request"),
        }
    }
    debug!("Request stream closed");
}

/// Run one agent over arbitrary line streams
pub fn serve<R, W>(args: &WorkerArgs, reader: R, writer: W) -> Result<AgentStats>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let kit = args.settings().build_kit(SpawnSpec {
        slot: args.slot,
        role: args.role,
    })?;

    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || pump_requests(reader, tx))?;

    let agent = WorkerAgent::new(args.slot, args.role, kit, Box::new(LineOutbox::new(writer)));
    agent.run(rx)
}

/// Entry point of the `worker` subcommand
pub fn run_worker_main(args: WorkerArgs) -> Result<()> {
    let stdin = io::BufReader::new(io::stdin());
    let stats = serve(&args, stdin, io::stdout())?;
    debug!(slot = args.slot, ?stats, "Worker process done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::slot::Role;
    use crate::sink::schema::{self, OutcomeTable};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn args(role: Role) -> WorkerArgs {
        WorkerArgs {
            slot: 1,
            role,
            max_delay_ms: 0,
            success_rate: 1.0,
            discovery_max: 10,
            seed: Some(3),
            output: None,
            batch_size: 10,
            run_id: "t".into(),
        }
    }

    #[test]
    fn test_processor_over_lines() {
        let input = [Request::ProcessDiscovery, Request::Exit]
            .iter()
            .map(|r| r.to_line().unwrap())
            .collect::<String>();
        let out = SharedBuf::default();

        serve(&args(Role::Processor), Cursor::new(input), out.clone()).unwrap();

        let text = String::from_utf8(out.0.lock().clone()).unwrap();
        let responses: Vec<Response> = text
            .lines()
            .map(|l| Response::from_line(l).unwrap())
            .collect();
        assert_eq!(responses[0], Response::Online);
        assert!(matches!(responses[1], Response::DiscoveryComplete(_)));
    }

    #[test]
    fn test_writer_persists_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.db");
        let mut writer_args = args(Role::Writer);
        writer_args.slot = 0;
        writer_args.output = Some(path.clone());

        let item = crate::item::WorkItem::new("abcde", 4, chrono::Utc::now());
        let input = [
            Request::WriteData(item.clone()),
            Request::WriteFailureData(vec![item.clone(), item]),
        ]
        .iter()
        .map(|r| r.to_line().unwrap())
        .collect::<String>();

        let stats = serve(&writer_args, Cursor::new(input), SharedBuf::default()).unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.failure_written, 2);

        let conn = rusqlite::Connection::open(&path).unwrap();
        assert_eq!(schema::count_rows(&conn, OutcomeTable::Written).unwrap(), 1);
        assert_eq!(schema::count_rows(&conn, OutcomeTable::Failed).unwrap(), 2);
    }
}
