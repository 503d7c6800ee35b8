//! End-to-end tests: inline WAT guests driven through the real loop on the
//! headless platform with virtual time.

use std::time::Duration;
use tlib_host::{
    CommandPolicy, DrivingLoop, HeadlessPlatform, HeadlessMonitor, HostConfig, HostError, InputEvent,
    LoopState, ManualClock, Outcome, ScriptedKey,
};

fn start(config: HostConfig, platform: HeadlessPlatform, wat: &str) -> (DrivingLoop, HeadlessMonitor) {
    let monitor = platform.monitor();
    let driver = DrivingLoop::new(config, platform, ManualClock::default())
        .unwrap()
        .with_bytes(wat);
    (driver, monitor)
}

fn run(config: HostConfig, wat: &str) -> (DrivingLoop, HeadlessMonitor, Outcome) {
    let (mut driver, monitor) = start(config, HeadlessPlatform::new(), wat);
    let outcome = driver.run().unwrap();
    (driver, monitor, outcome)
}

fn u32_at(mem: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(mem[at..at + 4].try_into().unwrap())
}

fn i64_at(mem: &[u8], at: usize) -> i64 {
    i64::from_le_bytes(mem[at..at + 8].try_into().unwrap())
}

fn epoch_micros() -> i64 {
    ManualClock::DEFAULT_EPOCH.as_micros() as i64
}

#[test]
fn sleep_request_sets_delay_and_sticks() {
    // Records wasm_time at 8 * frame; only the first frame asks for a delay.
    let wat = r#"(module
        (import "env" "wasm_time" (func $time (result i64)))
        (import "env" "wasm_sleep" (func $sleep (param i64)))
        (memory (export "memory") 1)
        (global $frame (mut i32) (i32.const 0))
        (func (export "os_main") (param i32 i32)
            (i64.store (i32.mul (global.get $frame) (i32.const 8)) (call $time))
            (if (i32.eqz (global.get $frame))
                (then (call $sleep (i64.const 5000))))
            (global.set $frame (i32.add (global.get $frame) (i32.const 1)))))"#;

    let (mut driver, _, outcome) = run(HostConfig::default().max_frames(3), wat);
    assert_eq!(outcome, Outcome::FrameLimit);
    assert_eq!(driver.frames(), 3);

    let mem = driver.memory().unwrap();
    assert_eq!(i64_at(mem, 0), epoch_micros());
    assert_eq!(i64_at(mem, 8) - i64_at(mem, 0), 5000);
    assert_eq!(i64_at(mem, 16) - i64_at(mem, 8), 5000);
}

#[test]
fn time_reads_the_session_clock() {
    let wat = r#"(module
        (import "env" "wasm_time" (func $time (result i64)))
        (import "env" "wasm_exit" (func $exit))
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32)
            (i64.store (i32.const 0) (call $time))
            (call $exit)))"#;

    let (mut driver, _, outcome) = run(HostConfig::default(), wat);
    assert_eq!(outcome, Outcome::Exited);
    assert_eq!(i64_at(driver.memory().unwrap(), 0), epoch_micros());
}

#[test]
fn exit_then_trap_is_a_clean_exit() {
    let wat = r#"(module
        (import "env" "wasm_exit" (func $exit))
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32)
            (call $exit)
            unreachable))"#;

    let (driver, monitor, outcome) = run(HostConfig::default(), wat);
    assert_eq!(outcome, Outcome::Exited);
    assert_eq!(driver.frames(), 1);
    assert!(monitor.snapshot().alerts.is_empty());
}

#[test]
fn trap_without_exit_fails_and_alerts_once() {
    let wat = r#"(module
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32) unreachable))"#;

    let (driver, monitor, outcome) = run(HostConfig::default(), wat);
    assert!(matches!(outcome, Outcome::Failed(_)));
    assert_eq!(driver.frames(), 1);
    assert_eq!(monitor.snapshot().alerts.len(), 1);
}

#[test]
fn fail_message_is_alerted_exactly_once() {
    let wat = r#"(module
        (import "env" "wasm_fail" (func $fail (param i32 i32)))
        (memory (export "memory") 1)
        (data (i32.const 16) "boom")
        (func (export "os_main") (param i32 i32)
            (call $fail (i32.const 16) (i32.const 4))))"#;

    let (_, monitor, outcome) = run(HostConfig::default(), wat);
    assert_eq!(outcome, Outcome::Failed("boom".into()));
    assert_eq!(monitor.snapshot().alerts, vec!["boom".to_string()]);
}

#[test]
fn write_reports_success_and_bad_ranges() {
    let wat = r#"(module
        (import "env" "wasm_write" (func $write (param i32 i32 i32) (result i32)))
        (import "env" "wasm_exit" (func $exit))
        (memory (export "memory") 1)
        (data (i32.const 16) "hello\n")
        (func (export "os_main") (param i32 i32)
            (i32.store (i32.const 0) (call $write (i32.const 1) (i32.const 16) (i32.const 6)))
            (i32.store (i32.const 4) (call $write (i32.const 1) (i32.const 65530) (i32.const 100)))
            (call $exit)))"#;

    let (mut driver, monitor, outcome) = run(HostConfig::default(), wat);
    assert_eq!(outcome, Outcome::Exited);
    let mem = driver.memory().unwrap();
    assert_eq!(u32_at(mem, 0), 1);
    assert_eq!(u32_at(mem, 4), 0);
    assert!(monitor.snapshot().alerts.is_empty());
}

const COMMAND_GUEST: &str = r#"(module
    (import "env" "wasm_system" (func $system (param i32 i32) (result i32)))
    (import "env" "wasm_eval" (func $eval (param i32) (result i32)))
    (import "env" "wasm_exit" (func $exit))
    (memory (export "memory") 1)
    (data (i32.const 16) "echo hi")
    (data (i32.const 32) "true\00")
    (func (export "os_main") (param i32 i32)
        (i32.store (i32.const 0) (call $system (i32.const 16) (i32.const 7)))
        (i32.store (i32.const 4) (call $eval (i32.const 32)))
        (call $exit)))"#;

#[test]
fn host_commands_succeed_when_recorded() {
    let config = HostConfig::default().commands(CommandPolicy::Record);
    let (mut driver, monitor) = start(config, HeadlessPlatform::new(), COMMAND_GUEST);

    assert_eq!(driver.run().unwrap(), Outcome::Exited);
    let mem = driver.memory().unwrap();
    assert_eq!(u32_at(mem, 0), 0);
    assert_eq!(u32_at(mem, 4), 0);
    assert_eq!(monitor.snapshot().commands, vec!["echo hi".to_string(), "true".to_string()]);
}

#[test]
fn host_commands_report_failure_when_denied() {
    let config = HostConfig::default().commands(CommandPolicy::Deny);
    let (mut driver, monitor) = start(config, HeadlessPlatform::new(), COMMAND_GUEST);

    // A denied command is recovered locally; the guest keeps running.
    assert_eq!(driver.run().unwrap(), Outcome::Exited);
    let mem = driver.memory().unwrap();
    assert_eq!(u32_at(mem, 0), 1);
    assert_eq!(u32_at(mem, 4), 1);
    let stats = monitor.snapshot();
    assert!(stats.alerts.is_empty());
    assert_eq!(stats.commands, vec!["echo hi".to_string(), "true".to_string()]);
}

#[test]
fn config_file_policy_reaches_host_commands() {
    let config = HostConfig::from_json(r#"{ "commands": "deny" }"#).unwrap();
    let (mut driver, _) = start(config, HeadlessPlatform::new(), COMMAND_GUEST);

    assert_eq!(driver.run().unwrap(), Outcome::Exited);
    let mem = driver.memory().unwrap();
    assert_eq!([u32_at(mem, 0), u32_at(mem, 4)], [1, 1]);
}

#[test]
fn surface_opens_once_and_resizes_on_change() {
    let wat = r#"(module
        (import "env" "pix_wasm_draw" (func $draw (param i32 i32 i32)))
        (memory (export "memory") 1)
        (global $frame (mut i32) (i32.const 0))
        (func (export "os_main") (param i32 i32)
            (global.set $frame (i32.add (global.get $frame) (i32.const 1)))
            (if (i32.eq (global.get $frame) (i32.const 1))
                (then (call $draw (i32.const 4) (i32.const 4) (i32.const 1024)))
                (else (call $draw (i32.const 2) (i32.const 2) (i32.const 1024))))))"#;

    let (_, monitor, outcome) = run(HostConfig::default().max_frames(3), wat);
    assert_eq!(outcome, Outcome::FrameLimit);

    let stats = monitor.snapshot();
    assert_eq!(stats.surfaces_opened, 1);
    assert_eq!(stats.resizes, vec![(2, 2)]);
    assert_eq!(stats.surface_size, Some((2, 2)));
    assert_eq!(stats.frames_presented, 3);
}

#[test]
fn zero_sized_frame_is_fatal() {
    let wat = r#"(module
        (import "env" "pix_wasm_draw" (func $draw (param i32 i32 i32)))
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32)
            (call $draw (i32.const 0) (i32.const 4) (i32.const 0))))"#;

    let (_, monitor, outcome) = run(HostConfig::default(), wat);
    assert!(matches!(outcome, Outcome::Failed(_)));
    let stats = monitor.snapshot();
    assert_eq!(stats.alerts.len(), 1);
    assert_eq!(stats.surfaces_opened, 0);
}

/// Fills 8 stereo frames of 0.5 at 256 and registers the ring (cursor at 128).
const AUDIO_GUEST: &str = r#"(module
    (import "env" "pix_wasm_start_audio" (func $start_audio (param i32 i32 i32)))
    (import "env" "wasm_sleep" (func $sleep (param i64)))
    (memory (export "memory") 1)
    (global $delay (mut i64) (i64.const 0))
    (func (export "os_main") (param i32 i32)
        (local $i i32)
        (block $done
            (loop $fill
                (br_if $done (i32.ge_u (local.get $i) (i32.const 16)))
                (f32.store
                    (i32.add (i32.const 256) (i32.mul (local.get $i) (i32.const 4)))
                    (f32.const 0.5))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $fill)))
        (call $start_audio (i32.const 256) (i32.const 8) (i32.const 128))
        (call $sleep (global.get $delay))))"#;

#[test]
fn audio_pull_consumes_and_zeroes_the_ring() {
    let config = HostConfig::default().audio(48_000, 4).max_frames(1);
    let (mut driver, monitor, outcome) = run(config, AUDIO_GUEST);
    assert_eq!(outcome, Outcome::FrameLimit);

    let stats = monitor.snapshot();
    assert_eq!(stats.audio_opened, 1);
    assert_eq!(stats.audio_frames, 4);
    assert_eq!(stats.audio_peak, 0.5);

    let mem = driver.memory().unwrap();
    assert_eq!(u32_at(mem, 128), 4);
    assert!(mem[256..256 + 32].iter().all(|&b| b == 0));
    assert_eq!(&mem[288..292], &0.5f32.to_le_bytes());
}

#[test]
fn audio_is_pulled_once_per_period_while_sleeping() {
    // 100 ms of sleep at 1024 frames / 48 kHz (21.3 ms) covers five periods.
    let wat = AUDIO_GUEST.replace("(i64.const 0)", "(i64.const 100000)");
    let (_, monitor, outcome) = run(HostConfig::default().max_frames(1), &wat);
    assert_eq!(outcome, Outcome::FrameLimit);
    assert_eq!(monitor.snapshot().audio_frames, 5 * 1024);
}

/// Grows memory to two pages, then uses only addresses past the first page:
/// text at 70000, a 2x2 frame at 70016, and an 8-frame ring at 80000 with its
/// cursor at 79000.
const GROWN_MEMORY_GUEST: &str = r#"(module
    (import "env" "wasm_write" (func $write (param i32 i32 i32) (result i32)))
    (import "env" "pix_wasm_draw" (func $draw (param i32 i32 i32)))
    (import "env" "pix_wasm_start_audio" (func $start_audio (param i32 i32 i32)))
    (memory (export "memory") 1)
    (func (export "os_main") (param i32 i32)
        (local $i i32)
        (drop (memory.grow (i32.const 1)))
        (i32.store8 (i32.const 70000) (i32.const 104))
        (i32.store8 (i32.const 70001) (i32.const 105))
        (i32.store (i32.const 0) (call $write (i32.const 1) (i32.const 70000) (i32.const 2)))
        (memory.fill (i32.const 70016) (i32.const 255) (i32.const 16))
        (call $draw (i32.const 2) (i32.const 2) (i32.const 70016))
        (block $done
            (loop $fill
                (br_if $done (i32.ge_u (local.get $i) (i32.const 16)))
                (f32.store
                    (i32.add (i32.const 80000) (i32.mul (local.get $i) (i32.const 4)))
                    (f32.const 0.5))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br $fill)))
        (call $start_audio (i32.const 80000) (i32.const 8) (i32.const 79000))))"#;

#[test]
fn capabilities_see_memory_grown_by_the_guest() {
    let config = HostConfig::default().audio(48_000, 4).max_frames(1);
    let (mut driver, monitor, outcome) = run(config, GROWN_MEMORY_GUEST);
    assert_eq!(outcome, Outcome::FrameLimit);

    let stats = monitor.snapshot();
    assert!(stats.alerts.is_empty());
    assert_eq!(stats.frames_presented, 1);
    assert_eq!(stats.last_frame, vec![255; 16]);
    assert_eq!(stats.audio_frames, 4);
    assert_eq!(stats.audio_peak, 0.5);

    let mem = driver.memory().unwrap();
    assert_eq!(mem.len(), 2 * 65536);
    assert_eq!(u32_at(mem, 0), 1);
    assert_eq!(u32_at(mem, 79000), 4);
    assert!(mem[80000..80000 + 32].iter().all(|&b| b == 0));
    assert_eq!(&mem[80032..80036], &0.5f32.to_le_bytes());
}

#[test]
fn audio_period_that_rounds_to_zero_is_rejected_up_front() {
    let config = HostConfig::default().audio(4_000_000_000, 1);
    assert!(matches!(
        DrivingLoop::new(config, HeadlessPlatform::new(), ManualClock::default()),
        Err(HostError::Config(_))
    ));
}

#[test]
fn start_capabilities_are_idempotent() {
    let wat = r#"(module
        (import "env" "pix_wasm_start_audio" (func $start_audio (param i32 i32 i32)))
        (import "env" "pix_wasm_start_input" (func $start_input (param i32)))
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32)
            (call $start_audio (i32.const 256) (i32.const 8) (i32.const 128))
            (call $start_audio (i32.const 256) (i32.const 8) (i32.const 128))
            (call $start_input (i32.const 1))
            (call $start_input (i32.const 2)))
        (func (export "pix_wasm_key_down") (param i32 i32 i32)))"#;

    let (driver, monitor, outcome) = run(HostConfig::default().max_frames(2), wat);
    assert_eq!(outcome, Outcome::FrameLimit);
    let stats = monitor.snapshot();
    assert_eq!(stats.audio_opened, 1);
    assert_eq!(stats.audio_resumes, 4);
    assert_eq!(stats.keyboards_opened, 1);
    // Registrations are released when the loop stops.
    assert!(driver.host().audio.is_none());
    assert!(driver.host().keyboard.is_none());
}

#[test]
fn start_input_without_key_callback_is_fatal() {
    let wat = r#"(module
        (import "env" "pix_wasm_start_input" (func $start_input (param i32)))
        (memory (export "memory") 1)
        (func (export "os_main") (param i32 i32)
            (call $start_input (i32.const 1))))"#;

    let (_, monitor, outcome) = run(HostConfig::default(), wat);
    assert!(matches!(outcome, Outcome::Failed(msg) if msg.contains("pix_wasm_key_down")));
    assert_eq!(monitor.snapshot().alerts.len(), 1);
}

/// Starts input with context 7, sleeps 10 ms per frame, and logs each
/// `(ctx, key, down)` at 64 + 12 * n with the count at 0.
const KEY_GUEST: &str = r#"(module
    (import "env" "pix_wasm_start_input" (func $start_input (param i32)))
    (import "env" "wasm_sleep" (func $sleep (param i64)))
    (memory (export "memory") 1)
    (global $n (mut i32) (i32.const 0))
    (func (export "os_main") (param i32 i32)
        (call $start_input (i32.const 7))
        (call $sleep (i64.const 10000)))
    (func (export "pix_wasm_key_down") (param $ctx i32) (param $key i32) (param $down i32)
        (local $at i32)
        (local.set $at (i32.add (i32.const 64) (i32.mul (global.get $n) (i32.const 12))))
        (i32.store (local.get $at) (local.get $ctx))
        (i32.store offset=4 (local.get $at) (local.get $key))
        (i32.store offset=8 (local.get $at) (local.get $down))
        (global.set $n (i32.add (global.get $n) (i32.const 1)))
        (i32.store (i32.const 0) (global.get $n))))"#;

#[test]
fn keys_are_forwarded_without_repeats_or_context_menu() {
    let platform = HeadlessPlatform::new().script_keys([
        ScriptedKey::down(Duration::ZERO, 65),
        ScriptedKey {
            at: Duration::from_millis(1),
            event: InputEvent::Key {
                code: 65,
                down: true,
                repeat: true,
            },
        },
        ScriptedKey {
            at: Duration::from_millis(2),
            event: InputEvent::ContextMenu,
        },
        ScriptedKey::up(Duration::from_millis(5), 65),
    ]);
    let (mut driver, _) = start(HostConfig::default().max_frames(2), platform, KEY_GUEST);
    assert_eq!(driver.run().unwrap(), Outcome::FrameLimit);

    let mem = driver.memory().unwrap();
    assert_eq!(u32_at(mem, 0), 2);
    assert_eq!([u32_at(mem, 64), u32_at(mem, 68), u32_at(mem, 72)], [7, 65, 1]);
    assert_eq!([u32_at(mem, 76), u32_at(mem, 80), u32_at(mem, 84)], [7, 65, 0]);
}

#[test]
fn trap_in_key_callback_fails_the_loop() {
    let wat = KEY_GUEST.replace("(local $at i32)", "(local $at i32) unreachable");
    let platform = HeadlessPlatform::new().script_keys([ScriptedKey::down(Duration::ZERO, 32)]);
    let (mut driver, monitor) = start(HostConfig::default().max_frames(5), platform, &wat);

    assert!(matches!(driver.run().unwrap(), Outcome::Failed(_)));
    assert_eq!(driver.frames(), 1);
    assert_eq!(monitor.snapshot().alerts.len(), 1);
}

#[test]
fn exit_from_key_callback_stops_at_the_next_boundary() {
    let wat = KEY_GUEST
        .replace(
            "(import \"env\" \"wasm_sleep\" (func $sleep (param i64)))",
            "(import \"env\" \"wasm_sleep\" (func $sleep (param i64)))\n    (import \"env\" \"wasm_exit\" (func $exit))",
        )
        .replace("(local $at i32)", "(local $at i32) (call $exit)");
    let platform = HeadlessPlatform::new().script_keys([ScriptedKey::down(Duration::from_millis(3), 27)]);
    let (mut driver, monitor) = start(HostConfig::default().max_frames(5), platform, &wat);

    assert_eq!(driver.run().unwrap(), Outcome::Exited);
    assert_eq!(driver.frames(), 1);
    assert!(monitor.snapshot().alerts.is_empty());
}

#[test]
fn frame_limit_stops_the_loop() {
    let wat = r#"(module
        (memory (export "memory") 1)
        (func (export "os_main")))"#;

    let (driver, monitor, outcome) = run(HostConfig::default().max_frames(4), wat);
    assert_eq!(outcome, Outcome::FrameLimit);
    assert_eq!(driver.frames(), 4);
    assert!(monitor.snapshot().alerts.is_empty());
}

#[test]
fn missing_entry_point_fails_loading() {
    let (mut driver, monitor) = start(
        HostConfig::default(),
        HeadlessPlatform::new(),
        r#"(module (memory (export "memory") 1))"#,
    );

    assert!(matches!(driver.run(), Err(HostError::MissingExport("os_main"))));
    assert!(matches!(driver.state(), LoopState::Stopped(Outcome::Failed(_))));
    assert_eq!(driver.frames(), 0);
    assert_eq!(monitor.snapshot().alerts.len(), 1);
}

#[test]
fn artifact_directory_resolves_to_index_wasm() {
    let dir = std::env::temp_dir().join(format!("tlib-host-artifact-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("index.wasm"),
        r#"(module
            (import "env" "wasm_exit" (func $exit))
            (memory (export "memory") 1)
            (func (export "os_main") (call $exit)))"#,
    )
    .unwrap();

    let config = HostConfig::default().artifact(&dir);
    let mut driver = DrivingLoop::new(config, HeadlessPlatform::new(), ManualClock::default()).unwrap();
    let outcome = driver.run();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(outcome.unwrap(), Outcome::Exited);
}
