//! End-to-end integration tests for tether-cli
//!
//! These tests run the built `tether` binary against Unix sockets served
//! from a helper thread, with stdin either piped or a real pty. They are gated behind the `integration` feature
//! flag. Run with:
//!
//! ```sh
//! cargo test -p tether-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{Child, CommandBuilder, PtyPair, PtySize, native_pty_system};
use tempfile::TempDir;

/// Build a `tether` command isolated from the user's and the project's config
fn tether(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tether"));
    cmd.env("XDG_CONFIG_HOME", config_home.join("user"))
        .env("TETHER_PROJECT_CONFIG_DIR", config_home.join("project"))
        .env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &[u8]) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn tether");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input)
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for tether")
}

/// Test that tether --help works
#[test]
fn tether_help_works() {
    let dir = TempDir::new().unwrap();
    let output = tether(dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Attach a terminal to a running process"));
    assert!(stdout.contains("attach"));
    assert!(stdout.contains("config"));
}

/// Test that tether attach --help shows all flags
#[test]
fn tether_attach_help_shows_all_flags() {
    let dir = TempDir::new().unwrap();
    let output = tether(dir.path())
        .args(["attach", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--detach-keys"));
    assert!(stdout.contains("--timeout"));
}

/// Test that tether config show works without config file
#[test]
fn tether_config_show_works_without_config() {
    let dir = TempDir::new().unwrap();
    let output = tether(dir.path()).args(["config", "show"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[attach]"));
    assert!(stdout.contains("detach_keys = \"ctrl-p,ctrl-q\""));
}

/// Test that project config overrides user config
#[test]
fn tether_config_show_merges_layers() {
    let dir = TempDir::new().unwrap();
    let user = dir.path().join("user").join("tether");
    let project = dir.path().join("project");
    std::fs::create_dir_all(&user).unwrap();
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        user.join("config.toml"),
        "[attach]\ndetach_keys = \"ctrl-a,d\"\ntimeout_secs = 10\n",
    )
    .unwrap();
    std::fs::write(project.join("config.toml"), "[attach]\ntimeout_secs = 3\n").unwrap();

    let output = tether(dir.path()).args(["config", "show"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("detach_keys = \"ctrl-a,d\""));
    assert!(stdout.contains("timeout_secs = 3"));
}

/// Test that an invalid --detach-keys value is rejected
#[test]
fn tether_attach_rejects_invalid_detach_keys() {
    let dir = TempDir::new().unwrap();
    let output = tether(dir.path())
        .args(["attach", "/nonexistent.sock", "--detach-keys", "ctrl-9"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ctrl-9"));
}

/// Test that attaching to a missing socket fails cleanly
#[test]
fn tether_attach_missing_socket_fails() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("missing.sock");
    let output = tether(dir.path())
        .arg("attach")
        .arg(&socket)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to connect"), "stderr: {}", stderr);
}

/// Test that the detach sequence ends the attach and is never forwarded
#[test]
fn tether_attach_detaches_on_sequence() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("app.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let mut cmd = tether(dir.path());
    cmd.arg("attach").arg(&socket);
    let output = run_with_stdin(cmd, b"hello\n\x10\x11ignored");

    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("detached from unix:"), "stderr: {}", stderr);
    assert_eq!(server.join().unwrap(), b"hello\n");
}

/// Test that output is relayed until the remote closes the connection
#[test]
fn tether_attach_relays_output_until_remote_closes() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("app.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut line = [0u8; 6];
        stream.read_exact(&mut line).unwrap();
        stream.write_all(b"echo: ").unwrap();
        stream.write_all(&line).unwrap();
    });

    let mut cmd = tether(dir.path());
    cmd.arg("attach").arg(&socket);
    let output = run_with_stdin(cmd, b"hello\n");

    server.join().unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "echo: hello\n");
    assert!(!String::from_utf8_lossy(&output.stderr).contains("detached"));
}

/// Test that config path lists both layers in merge order
#[test]
fn tether_config_path_lists_layers() {
    let dir = TempDir::new().unwrap();
    let output = tether(dir.path()).args(["config", "path"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "stdout: {}", stdout);
    assert!(lines[0].starts_with("user"));
    assert!(lines[1].starts_with("project"));
    assert!(lines[1].ends_with("(not found)"));
}

// ==================== Terminal Tests ====================

/// A pty whose slave side is handed to spawned commands as their terminal
struct Terminal {
    pair: PtyPair,
    input: Box<dyn Write + Send>,
    output: mpsc::Receiver<Vec<u8>>,
}

impl Terminal {
    fn open() -> Self {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .expect("Failed to open pty");
        let mut reader = pair.master.try_clone_reader().unwrap();
        let input = pair.master.take_writer().unwrap();

        let (tx, output) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 1024];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        });

        Self {
            pair,
            input,
            output,
        }
    }

    fn spawn(&self, cmd: CommandBuilder) -> Box<dyn Child + Send + Sync> {
        self.pair
            .slave
            .spawn_command(cmd)
            .expect("Failed to spawn on pty")
    }

    fn type_bytes(&mut self, bytes: &[u8]) {
        self.input.write_all(bytes).unwrap();
        self.input.flush().unwrap();
    }

    /// Everything printed to the terminal until it goes quiet
    fn drain(&self) -> String {
        let mut seen = Vec::new();
        while let Ok(chunk) = self.output.recv_timeout(Duration::from_millis(300)) {
            seen.extend(chunk);
        }
        String::from_utf8_lossy(&seen).into_owned()
    }

    /// Terminal settings as reported by `stty -g`
    fn settings(&self) -> String {
        let mut cmd = CommandBuilder::new("stty");
        cmd.arg("-g");
        let mut child = self.spawn(cmd);
        assert_eq!(wait_exit(&mut child), 0, "stty failed");
        self.drain().trim().to_string()
    }
}

fn wait_exit(child: &mut Box<dyn Child + Send + Sync>) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status.exit_code();
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("process did not exit in time");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Test that a terminal on stdin is put in raw mode, detaches on
/// ctrl-p, pause, ctrl-q, and gets its settings back afterwards
#[test]
fn tether_attach_on_terminal_detaches_and_restores_settings() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("app.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let (accepted_tx, accepted) = mpsc::channel();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        accepted_tx.send(()).unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let mut term = Terminal::open();
    let before = term.settings();
    assert!(!before.is_empty());

    let mut cmd = CommandBuilder::new(env!("CARGO_BIN_EXE_tether"));
    cmd.arg("attach");
    cmd.arg(&socket);
    cmd.env("XDG_CONFIG_HOME", dir.path().join("user"));
    cmd.env("TETHER_PROJECT_CONFIG_DIR", dir.path().join("project"));
    cmd.env_remove("RUST_LOG");
    let mut child = term.spawn(cmd);

    // Raw mode is on before the socket is connected
    accepted
        .recv_timeout(Duration::from_secs(10))
        .expect("tether never connected");

    term.type_bytes(b"hello\n");
    term.type_bytes(&[16]);
    thread::sleep(Duration::from_millis(100));
    term.type_bytes(&[17]);

    assert_eq!(wait_exit(&mut child), 0);
    let printed = term.drain();
    assert!(printed.contains("detached from unix:"), "printed: {:?}", printed);
    assert_eq!(server.join().unwrap(), b"hello\n");

    assert_eq!(term.settings(), before);
}
