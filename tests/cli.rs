//! Exit status and output of the `lc3-vm` binary.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use lc3::cpu::decode::{encode, Instruction};
use lc3::cpu::registers::PC_START;
use lc3::Image;

const BIN: &str = env!("CARGO_BIN_EXE_lc3-vm");

/// A scratch directory removed when dropped.
struct Scratch(PathBuf);

impl Scratch {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("lc3-cli-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Scratch(dir)
    }

    fn image(&self, file: &str, image: &Image) -> PathBuf {
        let path = self.0.join(file);
        std::fs::write(&path, image.to_bytes()).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn lc3_vm(args: &[&OsStr]) -> Output {
    Command::new(BIN)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn hello_image() -> Image {
    let mut words: Vec<u16> = [
        Instruction::Lea { dr: 0, offset: 2 },
        Instruction::Trap { vector: 0x22 },
        Instruction::Trap { vector: 0x25 },
    ]
    .iter()
    .map(encode)
    .collect();
    words.extend([u16::from(b'H'), u16::from(b'I'), 0]);
    Image::new(PC_START, words)
}

#[test]
fn hello_exits_zero() {
    let dir = Scratch::new("hello");
    let path = dir.image("hello.obj", &hello_image());

    let out = lc3_vm(&[path.as_os_str()]);

    assert_eq!(out.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "HIHALT\n");
}

#[test]
fn no_arguments_is_a_usage_error() {
    let out = lc3_vm(&[]);

    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
    assert!(!out.stderr.is_empty());
}

#[test]
fn missing_image_exits_one_and_names_it() {
    let dir = Scratch::new("missing");
    let path = dir.0.join("nowhere.obj");

    let out = lc3_vm(&[path.as_os_str()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains(&*path.to_string_lossy()));
}

#[test]
fn truncated_image_exits_one() {
    let dir = Scratch::new("short");
    let path = dir.0.join("short.obj");
    std::fs::write(&path, [0x30]).unwrap();

    let out = lc3_vm(&[path.as_os_str()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("too short"));
}

#[test]
fn rti_exits_three() {
    let dir = Scratch::new("rti");
    let path = dir.image("rti.obj", &Image::new(PC_START, vec![0x8000]));

    let out = lc3_vm(&[path.as_os_str()]);

    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("illegal opcode"));
}

#[test]
fn getc_at_end_of_input_exits_three() {
    let dir = Scratch::new("getc");
    let getc = encode(&Instruction::Trap { vector: 0x20 });
    let path = dir.image("getc.obj", &Image::new(PC_START, vec![getc]));

    let out = lc3_vm(&[path.as_os_str()]);

    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn dump_state_writes_registers() {
    let dir = Scratch::new("dump");
    let path = dir.image("hello.obj", &hello_image());
    let state = dir.0.join("state.json");

    let out = lc3_vm(&[OsStr::new("--dump-state"), state.as_os_str(), path.as_os_str()]);

    assert_eq!(out.status.code(), Some(0));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(json["state"], "Halted");
    assert_eq!(json["regs"]["pc"], 0x3003);
}

#[cfg(unix)]
#[test]
fn termination_signal_exits_130() {
    use std::time::{Duration, Instant};

    let dir = Scratch::new("signal");
    // BRnzp #-1
    let spin = encode(&Instruction::Br { mask: 0b111, offset: 0xFFFF });
    let path = dir.image("spin.obj", &Image::new(PC_START, vec![spin]));

    let mut child = Command::new(BIN)
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let pid = child.id().to_string();
    let killed = Command::new("kill")
        .args(["-TERM", pid.as_str()])
        .status()
        .unwrap();
    assert!(killed.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("lc3-vm ignored SIGTERM");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status.code(), Some(130));
}
