//! Cross-crate scenarios from the daemon's testable-properties list,
//! exercised without going through either binary crate: the queue, pool,
//! transport, and lifecycle libraries are wired together here exactly as
//! `rcmd-daemon`'s `app::run_daemon_body`/`accept_loop` and
//! `rcmd-client`'s `session::run` do.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rcmd_descriptor::ClientDescriptor;
use rcmd_lifecycle::{DaemonContext, DaemonRegistry, LifecycleError};
use rcmd_pool::RunnerPool;
use rcmd_queue::SharedQueue;

fn unique_name(tag: &str) -> String {
    format!(
        "/rcmd_system_test_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

/// The full round trip from §8: a client enqueues its descriptor, the
/// accept loop admits it into the pool, and a command sent over the
/// resulting session is executed with its output streamed back.
#[test]
fn full_command_round_trip_through_queue_and_pool() {
    let dir = tempfile::tempdir().unwrap();
    let tmp_dir = dir.path().to_str().unwrap().to_string();
    let pid = std::process::id() as i32;

    let queue_name = unique_name("roundtrip");
    let consumer = SharedQueue::open_consumer(&queue_name, 4).unwrap();
    let producer = SharedQueue::open_producer(&queue_name).unwrap();
    let pool = RunnerPool::new(2, tmp_dir.clone());
    let context = Arc::new(DaemonContext::new(consumer, pool));

    // One iteration of the accept loop: pop the descriptor pushed below
    // and admit it into the pool.
    let accept_context = context.clone();
    let accept_thread = thread::spawn(move || {
        let desc = accept_context.queue.pop().unwrap();
        accept_context.pool.admit(desc).unwrap();
    });

    let desc = ClientDescriptor::new(pid, &tmp_dir).unwrap();
    let (inbound_path, outbound_path) = rcmd_transport::fifo_paths(&tmp_dir, pid);
    rcmd_transport::create_fifo(&inbound_path).unwrap();
    producer.push(desc).unwrap();

    // Blocks until the runner's session thread opens the other end.
    let mut inbound_write = rcmd_transport::open_write_blocking(&inbound_path).unwrap();
    rcmd_transport::remove_fifo(&inbound_path).unwrap();
    accept_thread.join().unwrap();

    inbound_write.write_all(b"echo hello\n").unwrap();
    inbound_write.flush().unwrap();

    // The worker creates P_out itself once it reads the command line.
    while std::fs::metadata(&outbound_path).is_err() {
        thread::sleep(Duration::from_millis(5));
    }
    let mut outbound_read = rcmd_transport::open_read_blocking(&outbound_path).unwrap();
    rcmd_transport::remove_fifo(&outbound_path).unwrap();

    let mut output = String::new();
    outbound_read.read_to_string(&mut output).unwrap();
    assert_eq!(output, "hello\n");

    // Closing our end sends the session's reader EOF, so it retires on
    // its own; `shutdown_all` below is just teardown, not the thing
    // under test here.
    drop(inbound_write);
    thread::sleep(Duration::from_millis(50));

    let context = Arc::try_unwrap(context).unwrap_or_else(|_| panic!("context still shared"));
    context.pool.shutdown_all();
    context.into_queue().destroy().unwrap();
}

/// §8: a pool with no free slot rejects the new client instead of
/// blocking the accept loop or growing past its configured capacity.
#[test]
fn pool_rejects_clients_once_every_slot_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let tmp_dir = dir.path().to_str().unwrap().to_string();
    let pool = RunnerPool::new(1, tmp_dir.clone());

    let busy_pid = std::process::id() as i32;
    let inbound_path = rcmd_transport::fifo_paths(&tmp_dir, busy_pid).0;
    rcmd_transport::create_fifo(&inbound_path).unwrap();
    let busy_desc = ClientDescriptor::new(busy_pid, &tmp_dir).unwrap();
    pool.admit(busy_desc).unwrap();

    // Hold the write end open so the runner's blocking open-for-read
    // completes and it parks in its read loop instead, which
    // `shutdown_all`'s fd-close cancellation can actually interrupt.
    let _inbound_write = rcmd_transport::open_write_blocking(&inbound_path).unwrap();
    thread::sleep(Duration::from_millis(50));

    let overflow_desc = ClientDescriptor::new(busy_pid + 1, &tmp_dir).unwrap();
    let result = pool.admit(overflow_desc);
    assert!(result.is_err());

    pool.shutdown_all();
}

/// §8: idempotent stop — issuing `stop` against a daemon that is not
/// running observes `NotRunning` and leaves no shared-memory segment
/// behind, the same check `rcmd-daemon`'s `run_stop` performs before
/// ever sending a signal.
#[test]
fn idempotent_stop_against_a_daemon_that_is_not_running() {
    let name = unique_name("stop");

    assert!(matches!(DaemonRegistry::open(&name), Err(LifecycleError::NotRunning)));
    // Calling it again must observe the identical, side-effect-free result.
    assert!(matches!(DaemonRegistry::open(&name), Err(LifecycleError::NotRunning)));

    // Once a daemon actually registers and then tears down, the same
    // idempotent check applies again.
    let registry = DaemonRegistry::create(&name, std::process::id() as i32).unwrap();
    registry.destroy().unwrap();
    assert!(matches!(DaemonRegistry::open(&name), Err(LifecycleError::NotRunning)));
}
