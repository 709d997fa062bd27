//! Daemon orchestration: startup wiring, the accept loop, and the
//! `stop`/`status` CLI commands (§4.D).

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rcmd_config::DaemonConfig;
use rcmd_lifecycle::{
    daemonize, send_sigterm, signals, DaemonContext, DaemonRegistry, DaemonizeOutcome,
    LauncherVerdict, LifecycleError, SHUTDOWN_SENTINEL_PID,
};
use rcmd_observability::LogConfig;
use rcmd_pool::RunnerPool;
use rcmd_queue::SharedQueue;
use tracing::{info, warn};

/// `start [--foreground] [--capacity]` (§4.D steps 1-6, §6).
pub fn run_start(
    foreground: bool,
    capacity: Option<u32>,
    log_level: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let config = DaemonConfig::load(capacity)?;
    let effective_level = log_level.unwrap_or_else(|| config.log_level.clone());

    rcmd_observability::init_with_config(LogConfig {
        service_name: "daemon".into(),
        default_level: effective_level,
        log_path: config.paths.log_path().ok(),
        also_stderr: foreground,
    });

    info!(
        capacity = config.capacity,
        tmp_dir = config.paths.tmp_dir(),
        foreground,
        "starting rcmd-daemon"
    );

    // SAFETY: no threads have been spawned yet; this is the first thing
    // `run_start` does after initializing logging.
    let outcome = unsafe { daemonize(foreground)? };

    match outcome {
        DaemonizeOutcome::Launcher(LauncherVerdict::Success) => {
            println!("rcmd-daemon started");
            Ok(())
        }
        DaemonizeOutcome::Launcher(LauncherVerdict::Failure) => {
            eprintln!("rcmd-daemon failed to start; see the log for details");
            std::process::exit(1);
        }
        DaemonizeOutcome::Daemon { launcher_pid, detached } => {
            run_daemon_body(config, launcher_pid, detached)
        }
    }
}

/// Runs on the detached grandchild (or, in `--foreground` mode, on the
/// original process itself) for as long as the daemon is alive.
fn run_daemon_body(
    config: DaemonConfig,
    launcher_pid: i32,
    detached: bool,
) -> Result<(), Box<dyn Error>> {
    let pid = std::process::id() as i32;

    let registry = match DaemonRegistry::create(config.paths.registry_shm_name(), pid) {
        Ok(registry) => registry,
        Err(err) => return fail_startup(err, launcher_pid, detached),
    };

    let queue = match SharedQueue::open_consumer(config.paths.queue_shm_name(), config.capacity) {
        Ok(queue) => queue,
        Err(err) => {
            let _ = registry.destroy();
            return fail_startup(err, launcher_pid, detached);
        }
    };

    let shutdown_rx = match signals::watch_for_shutdown() {
        Ok(rx) => rx,
        Err(err) => {
            let _ = queue.destroy();
            let _ = registry.destroy();
            return fail_startup(err, launcher_pid, detached);
        }
    };

    let pool = RunnerPool::new(config.capacity as usize, config.paths.tmp_dir().to_string());
    let context = Arc::new(DaemonContext::new(queue, pool));

    let signal_context = context.clone();
    let signal_thread = thread::Builder::new()
        .name("rcmd-shutdown-watcher".into())
        .spawn(move || {
            if shutdown_rx.recv().is_ok() {
                info!("shutdown requested");
                signal_context.request_shutdown();
                if let Err(err) = signal_context.unblock_accept_loop() {
                    warn!(error = %err, "failed to unblock accept loop for shutdown");
                }
            }
        })?;

    if detached {
        signals::notify_launcher_success(launcher_pid);
    }
    info!(pid, capacity = config.capacity, "rcmd-daemon accepting clients");

    accept_loop(&context);

    signal_thread.join().expect("shutdown watcher thread should not panic");

    info!("tearing down rcmd-daemon");
    let stats = context.pool.shutdown_all();
    for stat in &stats {
        info!(
            runner = stat.id,
            pid = stat.pid,
            session_ms = stat.session_duration.as_millis() as u64,
            "session closed"
        );
    }

    let context = Arc::try_unwrap(context)
        .unwrap_or_else(|_| panic!("daemon context still shared after the only other owner exited"));
    let queue = context.into_queue();
    if let Err(err) = queue.destroy() {
        warn!(error = %err, "failed to destroy shared queue during teardown");
    }
    if let Err(err) = registry.destroy() {
        warn!(error = %err, "failed to destroy daemon registry during teardown");
    }

    info!("rcmd-daemon stopped");
    Ok(())
}

fn accept_loop(context: &Arc<DaemonContext>) {
    loop {
        let desc = match context.queue.pop() {
            Ok(desc) => desc,
            Err(err) => {
                warn!(error = %err, "accept loop failed to pop from queue, stopping");
                break;
            }
        };

        if context.is_shutting_down() || desc.pid == SHUTDOWN_SENTINEL_PID {
            break;
        }

        if let Err(err) = context.pool.admit(desc) {
            warn!(error = %err, pid = desc.pid, "client rejected");
        }
    }
}

fn fail_startup<E: Into<Box<dyn Error>>>(
    err: E,
    launcher_pid: i32,
    detached: bool,
) -> Result<(), Box<dyn Error>> {
    let err = err.into();
    if detached {
        tracing::error!(error = %err, "daemon startup failed");
        signals::notify_launcher_failure(launcher_pid);
        std::process::exit(1);
    }
    Err(err)
}

/// `stop` (§4.D, §6): signal a running daemon and wait for it to exit.
pub fn run_stop() -> Result<(), Box<dyn Error>> {
    let config = DaemonConfig::load(None)?;

    let registry = match DaemonRegistry::open(config.paths.registry_shm_name()) {
        Ok(registry) => registry,
        Err(LifecycleError::NotRunning) => {
            println!("rcmd-daemon is not running");
            // Idempotent stop against an already-stopped daemon is not a
            // success: §8 requires this to exit 1 with no side effects.
            return Err(LifecycleError::NotRunning.into());
        }
        Err(err) => return Err(err.into()),
    };

    let pid = registry.pid();
    drop(registry);

    send_sigterm(pid)?;
    println!("sent shutdown signal to rcmd-daemon (pid {pid})");

    for _ in 0..30 {
        thread::sleep(Duration::from_millis(100));
        if matches!(
            DaemonRegistry::open(config.paths.registry_shm_name()),
            Err(LifecycleError::NotRunning)
        ) {
            println!("rcmd-daemon stopped");
            return Ok(());
        }
    }

    println!("rcmd-daemon did not stop within 3s; it may still be shutting down");
    Ok(())
}

/// `status` (§4.D, §6).
pub fn run_status() -> Result<(), Box<dyn Error>> {
    let config = DaemonConfig::load(None)?;

    match DaemonRegistry::open(config.paths.registry_shm_name()) {
        Ok(registry) => {
            println!("rcmd-daemon is running");
            println!("  pid:      {}", registry.pid());
            println!("  capacity: {}", config.capacity);
            println!("  tmp_dir:  {}", config.paths.tmp_dir());
        }
        Err(LifecycleError::NotRunning) => {
            println!("rcmd-daemon is not running");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
