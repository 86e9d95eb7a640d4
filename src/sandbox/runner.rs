//! @ai:module:intent Run a unit of work in a forked worker and stream its events back
//! @ai:module:layer infrastructure
//! @ai:module:public_api run, RunEvents
//! @ai:module:stateless false

use crate::error::SandboxError;
use crate::sandbox::event::{RunEvent, TerminalReason};
use crate::sandbox::wire::{decode, EventSink, WireMessage, WorkFailure};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// How long a worker that closed its channel gets to finish exiting before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(200);
const EXIT_POLL: Duration = Duration::from_millis(5);

/// Stage name used when the work panics.
pub const PANIC_STAGE: &str = "worker";

/// Frames pumped from the pipe reader thread.
enum Frame<P, R> {
    Message(WireMessage<P, R>),
    Corrupt(String),
    Closed,
}

/// @ai:intent Spawn an isolated worker running `work` and return its event stream
/// @ai:pre the calling process holds no device context the worker relies on across fork
/// @ai:pre `work` takes no process-global lock (such as stdout) that another thread may hold at fork
/// @ai:post the returned sequence ends with exactly one Terminal event
/// @ai:effects process:fork, ipc
///
/// `timeout` bounds each receive, not the whole run.
pub fn run<P, R, F>(work: F, timeout: Duration) -> Result<RunEvents<P, R>, SandboxError>
where
    P: Serialize + DeserializeOwned + Send + 'static,
    R: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce(&mut EventSink<P, R>) -> Result<(), WorkFailure>,
{
    let (read_end, write_end) = event_pipe()?;

    // Safety: the child only runs `work` and then `_exit`s; it never returns
    // into the caller's stack or runs the caller's destructors.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(read_end);
            let code = worker_main(write_end, work);
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(write_end);
            tracing::debug!("Spawned worker {}", child);

            let (sender, frames) = crossbeam_channel::unbounded();
            let reader = File::from(read_end);
            let spawned = thread::Builder::new()
                .name(format!("worker-{child}-events"))
                .spawn(move || pump_frames(reader, sender));

            if let Err(e) = spawned {
                terminate(child);
                return Err(SandboxError::Spawn(e.to_string()));
            }

            Ok(RunEvents {
                frames: Some(frames),
                worker: Some(child),
                timeout,
                pending: None,
                finished: false,
            })
        }
        Err(e) => Err(SandboxError::Spawn(e.to_string())),
    }
}

/// Close-on-exec, so compilers spawned by other threads never hold the write end open.
fn event_pipe() -> Result<(OwnedFd, OwnedFd), SandboxError> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| SandboxError::Pipe(e.to_string()))
}

/// Child side. Returns the process exit code.
fn worker_main<P, R, F>(channel: OwnedFd, work: F) -> i32
where
    P: Serialize,
    R: Serialize,
    F: FnOnce(&mut EventSink<P, R>) -> Result<(), WorkFailure>,
{
    close_inherited_fds(channel.as_raw_fd());

    #[cfg(target_os = "linux")]
    let _ = nix::sys::prctl::set_pdeathsig(Signal::SIGKILL);

    // the parent's subscriber may be mid-write on a thread that does not exist here
    let _quiet = tracing::subscriber::set_default(tracing::subscriber::NoSubscriber::default());

    let mut sink = EventSink::new(File::from(channel));

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(&mut sink))) {
        Ok(Ok(())) => WireMessage::Done,
        Ok(Err(failure)) => WireMessage::Failed(failure),
        Err(payload) => WireMessage::Failed(WorkFailure::new(PANIC_STAGE, panic_message(&*payload))),
    };

    match sink.send(&outcome) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Close every descriptor above stderr except `keep`, so pipes of runs forked
/// concurrently from the same parent are not held open by this worker.
fn close_inherited_fds(keep: RawFd) {
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
        return;
    };
    let fds: Vec<RawFd> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok()?.parse().ok())
        .filter(|fd| *fd > 2 && *fd != keep)
        .collect();

    for fd in fds {
        // EBADF is the directory handle used for the listing
        let _ = nix::unistd::close(fd);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

fn pump_frames<P, R>(reader: File, sender: Sender<Frame<P, R>>)
where
    P: DeserializeOwned,
    R: DeserializeOwned,
{
    for line in BufReader::new(reader).lines() {
        let frame = match line {
            Ok(line) => match decode(&line) {
                Ok(message) => Frame::Message(message),
                Err(e) => Frame::Corrupt(e.to_string()),
            },
            Err(e) => Frame::Corrupt(e.to_string()),
        };
        let corrupt = matches!(frame, Frame::Corrupt(_));
        if sender.send(frame).is_err() || corrupt {
            return;
        }
    }
    let _ = sender.send(Frame::Closed);
}

/// @ai:intent Single-pass event stream of one sandboxed run
///
/// Dropping it before the terminal event kills and reaps the worker.
pub struct RunEvents<P, R> {
    frames: Option<Receiver<Frame<P, R>>>,
    worker: Option<Pid>,
    timeout: Duration,
    pending: Option<TerminalReason>,
    finished: bool,
}

impl<P, R> RunEvents<P, R> {
    /// @ai:intent A run that ended before any worker was spawned
    /// @ai:post yields exactly `Terminal(reason)`
    /// @ai:effects pure
    pub fn terminated(reason: TerminalReason) -> Self {
        Self {
            frames: None,
            worker: None,
            timeout: Duration::ZERO,
            pending: Some(reason),
            finished: false,
        }
    }

    /// @ai:intent OS process id of a worker that has not been reaped yet
    /// @ai:effects pure
    pub fn worker_id(&self) -> Option<i32> {
        self.worker.map(Pid::as_raw)
    }

    /// @ai:intent Drain the stream, returning the non-terminal events and the terminal reason
    /// @ai:effects ipc, process:wait
    pub fn collect_all(self) -> (Vec<RunEvent<P, R>>, TerminalReason) {
        let mut events = Vec::new();
        for event in self {
            match event {
                RunEvent::Terminal(reason) => return (events, reason),
                other => events.push(other),
            }
        }
        // unreachable for a well-formed stream; keep the contract regardless
        (
            events,
            TerminalReason::Crashed {
                detail: "event stream ended without a terminal event".to_string(),
            },
        )
    }

    fn finish(&mut self, reason: TerminalReason) -> Option<RunEvent<P, R>> {
        self.finished = true;
        self.frames = None;
        Some(RunEvent::Terminal(reason))
    }

    /// Reap a worker that is expected to exit on its own; kill it if it lingers.
    fn reap(&mut self) -> Option<WaitStatus> {
        let pid = self.worker.take()?;
        let deadline = Instant::now() + EXIT_GRACE;

        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(WaitStatus::StillAlive) => return Some(terminate(pid)),
                Ok(status) => return Some(status),
                Err(Errno::EINTR) => continue,
                Err(_) => return None,
            }
        }
    }

    fn kill_worker(&mut self) {
        if let Some(pid) = self.worker.take() {
            terminate(pid);
        }
    }
}

/// SIGKILL and reap.
fn terminate(pid: Pid) -> WaitStatus {
    let _ = kill(pid, Signal::SIGKILL);
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            Ok(status) => return status,
            Err(_) => return WaitStatus::StillAlive,
        }
    }
}

fn describe_exit(status: Option<WaitStatus>) -> String {
    match status {
        Some(WaitStatus::Exited(_, code)) => {
            format!("worker exited with status {code} before reporting completion")
        }
        Some(WaitStatus::Signaled(_, signal, _)) => format!("worker terminated by {}", signal.as_str()),
        _ => "worker stopped reporting without an exit status".to_string(),
    }
}

impl<P, R> Iterator for RunEvents<P, R> {
    type Item = RunEvent<P, R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(reason) = self.pending.take() {
            return self.finish(reason);
        }

        let received = match &self.frames {
            Some(frames) => frames.recv_timeout(self.timeout),
            None => Err(RecvTimeoutError::Disconnected),
        };

        let reason = match received {
            Ok(Frame::Message(WireMessage::Progress(payload))) => return Some(RunEvent::Progress(payload)),
            Ok(Frame::Message(WireMessage::Result(payload))) => return Some(RunEvent::Result(payload)),
            Ok(Frame::Message(WireMessage::Done)) => {
                self.reap();
                TerminalReason::Completed
            }
            Ok(Frame::Message(WireMessage::Failed(failure))) => {
                self.reap();
                tracing::warn!("Worker reported failure in {}: {}", failure.stage, failure.message);
                TerminalReason::Failed {
                    stage: failure.stage,
                    message: failure.message,
                }
            }
            Ok(Frame::Corrupt(reason)) => {
                self.kill_worker();
                tracing::warn!("Worker sent an unreadable event: {}", reason);
                TerminalReason::Crashed {
                    detail: format!("unreadable event from worker: {reason}"),
                }
            }
            Ok(Frame::Closed) | Err(RecvTimeoutError::Disconnected) => {
                let detail = describe_exit(self.reap());
                tracing::warn!("Worker crashed: {}", detail);
                TerminalReason::Crashed { detail }
            }
            Err(RecvTimeoutError::Timeout) => {
                self.kill_worker();
                let reason = TerminalReason::timed_out(self.timeout);
                tracing::warn!("Worker {}", reason);
                reason
            }
        };

        self.finish(reason)
    }
}

impl<P, R> Drop for RunEvents<P, R> {
    fn drop(&mut self) {
        self.kill_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn events_of<P, R>(events: RunEvents<P, R>) -> Vec<RunEvent<P, R>> {
        events.collect()
    }

    #[test]
    fn test_events_arrive_in_order_then_completed() {
        let events = run::<String, u32, _>(
            |sink| {
                sink.progress("A".to_string())?;
                sink.result(2)?;
                sink.progress("C".to_string())?;
                Ok(())
            },
            TIMEOUT,
        )
        .unwrap();

        assert_eq!(
            events_of(events),
            vec![
                RunEvent::Progress("A".to_string()),
                RunEvent::Result(2),
                RunEvent::Progress("C".to_string()),
                RunEvent::Terminal(TerminalReason::Completed),
            ]
        );
    }

    #[test]
    fn test_empty_work_yields_only_completed() {
        let events = run::<(), (), _>(|_| Ok(()), TIMEOUT).unwrap();
        assert_eq!(events_of(events), vec![RunEvent::Terminal(TerminalReason::Completed)]);
    }

    #[test]
    fn test_silent_worker_times_out_and_is_killed() {
        let timeout = Duration::from_millis(300);
        let started = Instant::now();

        let mut events = run::<String, (), _>(
            |sink| {
                sink.progress("started".to_string())?;
                thread::sleep(Duration::from_secs(30));
                sink.progress("too late".to_string())?;
                Ok(())
            },
            timeout,
        )
        .unwrap();
        let pid = Pid::from_raw(events.worker_id().unwrap());

        assert_eq!(events.next(), Some(RunEvent::Progress("started".to_string())));
        match events.next() {
            Some(RunEvent::Terminal(TerminalReason::TimedOut { message })) => {
                assert_eq!(message, "Execution exceeded time limit of 0.30s");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(events.next(), None);
        assert_eq!(events.next(), None);

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn test_reported_failure_is_terminal() {
        let events = run::<(), u32, _>(
            |sink| {
                sink.result(1)?;
                Err(WorkFailure::new("load", "symbol not found: solution"))
            },
            TIMEOUT,
        )
        .unwrap();

        assert_eq!(
            events_of(events),
            vec![
                RunEvent::Result(1),
                RunEvent::Terminal(TerminalReason::Failed {
                    stage: "load".to_string(),
                    message: "symbol not found: solution".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (events, terminal) = run::<(), (), _>(|_| panic!("kernel exploded"), TIMEOUT)
            .unwrap()
            .collect_all();

        assert!(events.is_empty());
        assert_eq!(
            terminal,
            TerminalReason::Failed {
                stage: PANIC_STAGE.to_string(),
                message: "kernel exploded".to_string(),
            }
        );
    }

    #[test]
    fn test_abort_is_reported_as_crash() {
        let (events, terminal) = run::<String, (), _>(
            |sink| {
                sink.progress("before".to_string())?;
                unsafe { libc::abort() }
            },
            TIMEOUT,
        )
        .unwrap()
        .collect_all();

        assert_eq!(events, vec![RunEvent::Progress("before".to_string())]);
        assert_eq!(
            terminal,
            TerminalReason::Crashed {
                detail: "worker terminated by SIGABRT".to_string()
            }
        );
    }

    #[test]
    fn test_exit_without_sentinel_is_crash() {
        let started = Instant::now();
        let (_, terminal) = run::<(), (), _>(|_| unsafe { libc::_exit(3) }, TIMEOUT)
            .unwrap()
            .collect_all();

        assert_eq!(
            terminal,
            TerminalReason::Crashed {
                detail: "worker exited with status 3 before reporting completion".to_string()
            }
        );
        assert!(started.elapsed() < TIMEOUT);
    }

    #[test]
    fn test_dropping_stream_kills_worker() {
        let mut events = run::<(), (), _>(
            |sink| {
                sink.progress(())?;
                thread::sleep(Duration::from_secs(30));
                Ok(())
            },
            TIMEOUT,
        )
        .unwrap();
        let pid = Pid::from_raw(events.worker_id().unwrap());

        assert_eq!(events.next(), Some(RunEvent::Progress(())));
        drop(events);

        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }

    #[test]
    fn test_event_pipe_is_close_on_exec() {
        let (read_end, write_end) = event_pipe().unwrap();

        for fd in [&read_end, &write_end] {
            let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn test_worker_logging_ignores_writer_held_by_parent_thread() {
        let subscriber = tracing_subscriber::fmt().with_writer(std::io::stdout).finish();
        let (locked, stdout_held) = crossbeam_channel::bounded(0);
        let holder = thread::spawn(move || {
            let _stdout = std::io::stdout().lock();
            let _ = locked.send(());
            thread::sleep(Duration::from_secs(3));
        });
        stdout_held.recv().unwrap();

        let (_, terminal) = tracing::subscriber::with_default(subscriber, || {
            run::<(), (), _>(
                |_| {
                    tracing::info!("benchmarking inside the worker");
                    Ok(())
                },
                Duration::from_secs(1),
            )
            .unwrap()
            .collect_all()
        });
        holder.join().unwrap();

        assert_eq!(terminal, TerminalReason::Completed);
    }

    #[test]
    fn test_pre_terminated_run() {
        let reason = TerminalReason::Failed {
            stage: "compile".to_string(),
            message: "expected a declaration".to_string(),
        };
        let events = RunEvents::<(), ()>::terminated(reason.clone());

        assert_eq!(events.worker_id(), None);
        assert_eq!(events_of(events), vec![RunEvent::Terminal(reason)]);
    }
}
