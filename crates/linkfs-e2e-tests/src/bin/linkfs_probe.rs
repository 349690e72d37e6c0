// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Small program run under the interception library by the e2e tests.
//!
//! Every command prints its observation on stdout, one item per line:
//!
//! ```text
//! linkfs_probe read <path>                 contents, or "missing"
//! linkfs_probe read-twice <path> <gate>    read, wait for <gate> to exist, read again
//! linkfs_probe list <path>                 sorted entry names
//! linkfs_probe stat <path>                 "file", "dir" or "missing"
//! linkfs_probe write <path> <text>         writes <text>, prints "ok"
//! linkfs_probe cwd <dir>                   chdir, then prints the working directory
//! linkfs_probe spawn <args..>              runs itself with <args> and relays stdout
//! linkfs_probe sleep <millis>
//! linkfs_probe fork-while-blocked <fifo> <path>
//!                                          creates <fifo>, blocks a thread opening it
//!                                          through <path>, forks a writer, prints what
//!                                          the thread read
//! ```

use std::path::Path;
use std::process::{Command, ExitCode};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

const GATE_TIMEOUT: Duration = Duration::from_secs(10);

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|_| "missing".to_string())
}

fn stat(path: &Path) -> &'static str {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => "dir",
        Ok(_) => "file",
        Err(_) => "missing",
    }
}

fn wait_for(gate: &Path) -> Result<()> {
    let start = Instant::now();
    while !gate.exists() {
        if start.elapsed() > GATE_TIMEOUT {
            bail!("gate {} never appeared", gate.display());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// Forks while another thread sits in a blocking `open` of `path`; the
/// child is the writer that releases it.
#[cfg(target_os = "linux")]
fn fork_while_blocked(fifo: &Path, path: &Path) -> Result<String> {
    use std::io::Write;

    use nix::sys::stat::Mode;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, mkfifo, ForkResult};

    mkfifo(fifo, Mode::S_IRUSR | Mode::S_IWUSR)?;
    let reader = {
        let path = path.to_path_buf();
        std::thread::spawn(move || std::fs::read_to_string(path))
    };
    std::thread::sleep(Duration::from_millis(200));

    match unsafe { fork() }? {
        ForkResult::Child => {
            let written = std::fs::OpenOptions::new()
                .write(true)
                .open(fifo)
                .and_then(|mut pipe| pipe.write_all(b"forked"));
            unsafe { nix::libc::_exit(i32::from(written.is_err())) }
        }
        ForkResult::Parent { child } => {
            let status = waitpid(child, None)?;
            if status != WaitStatus::Exited(child, 0) {
                bail!("writer failed: {status:?}");
            }
            match reader.join() {
                Ok(text) => Ok(text?),
                Err(_) => bail!("reader thread panicked"),
            }
        }
    }
}

fn run(args: &[String]) -> Result<()> {
    let arg = |index: usize| -> Result<&str> {
        args.get(index)
            .map(String::as_str)
            .with_context(|| format!("missing argument {index}"))
    };

    match arg(0)? {
        "read" => println!("{}", read(Path::new(arg(1)?))),
        "read-twice" => {
            let path = Path::new(arg(1)?);
            println!("{}", read(path));
            wait_for(Path::new(arg(2)?))?;
            println!("{}", read(path));
        }
        "list" => {
            let mut names: Vec<String> = std::fs::read_dir(arg(1)?)?
                .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
                .collect::<Result<_, _>>()?;
            names.sort();
            for name in names {
                println!("{name}");
            }
        }
        "stat" => println!("{}", stat(Path::new(arg(1)?))),
        "write" => {
            std::fs::write(arg(1)?, arg(2)?)?;
            println!("ok");
        }
        "cwd" => {
            std::env::set_current_dir(arg(1)?)?;
            println!("{}", std::env::current_dir()?.display());
        }
        "spawn" => {
            let output = Command::new(std::env::current_exe()?)
                .args(&args[1..])
                .output()?;
            print!("{}", String::from_utf8_lossy(&output.stdout));
            if !output.status.success() {
                bail!("child failed: {}", output.status);
            }
        }
        "sleep" => std::thread::sleep(Duration::from_millis(arg(1)?.parse()?)),
        #[cfg(target_os = "linux")]
        "fork-while-blocked" => println!("{}", fork_while_blocked(Path::new(arg(1)?), Path::new(arg(2)?))?),
        other => bail!("unknown command '{other}'"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("linkfs_probe: {err:#}");
            ExitCode::FAILURE
        }
    }
}
