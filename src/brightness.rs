// src/brightness.rs
//! Screen brightness probing.
//!
//! Each platform exposes brightness differently: WMI through PowerShell on
//! Windows, the IOKit registry (or the `brightness` CLI) on macOS and the
//! sysfs backlight class (or `xrandr`) on Linux. All probes report a 0-100
//! percentage.

use std::{
    fs,
    io::Read,
    path::Path,
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};
use thiserror::Error;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_POLL: Duration = Duration::from_millis(10);
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

pub const SYSFS_BACKLIGHT_ROOT: &str = "/sys/class/backlight";
/// Devices tried before any other entry of the backlight class.
const PREFERRED_BACKLIGHTS: [&str; 3] = ["intel_backlight", "acpi_video0", "radeon_bl0"];
/// Raw scale of the IOKit brightness value when no max is reported.
const IOREG_DEFAULT_MAX: f64 = 65535.0;

#[derive(Debug, Error)]
pub enum BrightnessError {
    #[error("brightness detection is not supported on {0}")]
    Unsupported(&'static str),
    #[error("`{cmd}` failed: {detail}")]
    CommandFailed { cmd: String, detail: String },
    #[error("`{0}` timed out")]
    Timeout(String),
    #[error("could not parse brightness from output: {0}")]
    Parse(String),
    #[error("no usable backlight device found")]
    NoBacklight,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait BrightnessSource {
    /// Current screen brightness as a 0-100 percentage.
    fn read(&self) -> Result<u8, BrightnessError>;
}

/// Probes the operating system for the current brightness.
#[derive(Debug, Clone, Default)]
pub struct SystemBrightness;

impl BrightnessSource for SystemBrightness {
    fn read(&self) -> Result<u8, BrightnessError> {
        if cfg!(target_os = "windows") {
            read_windows()
        } else if cfg!(target_os = "macos") {
            read_macos()
        } else if cfg!(target_os = "linux") {
            read_linux()
        } else {
            Err(BrightnessError::Unsupported(std::env::consts::OS))
        }
    }
}

fn read_windows() -> Result<u8, BrightnessError> {
    let output = run_command(
        "powershell",
        &[
            "-NoProfile",
            "-Command",
            "(Get-WmiObject -Namespace root/WMI -Class WmiMonitorBrightness).CurrentBrightness",
        ],
    )?;
    parse_integer_output(&output)
}

fn read_macos() -> Result<u8, BrightnessError> {
    let ioreg = run_command("ioreg", &["-c", "AppleBacklightDisplay"])
        .and_then(|output| parse_ioreg_output(&output));
    match ioreg {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!("ioreg brightness unavailable ({}), trying `brightness -l`", e);
            let output = run_command("brightness", &["-l"])?;
            parse_brightness_cli_output(&output)
        }
    }
}

fn read_linux() -> Result<u8, BrightnessError> {
    match read_sysfs_backlight(Path::new(SYSFS_BACKLIGHT_ROOT)) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!("sysfs backlight unavailable ({}), trying xrandr", e);
            let output = run_command("xrandr", &["--verbose"])?;
            parse_xrandr_output(&output)
        }
    }
}

/// Reads `brightness` / `max_brightness` from the first usable device under `root`.
pub fn read_sysfs_backlight(root: &Path) -> Result<u8, BrightnessError> {
    let mut devices: Vec<String> = PREFERRED_BACKLIGHTS.iter().map(|s| s.to_string()).collect();
    if let Ok(entries) = fs::read_dir(root) {
        let mut others: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !PREFERRED_BACKLIGHTS.contains(&name.as_str()))
            .collect();
        others.sort();
        devices.extend(others);
    }

    for device in devices {
        let dir = root.join(&device);
        let (Ok(current), Ok(max)) = (
            fs::read_to_string(dir.join("brightness")),
            fs::read_to_string(dir.join("max_brightness")),
        ) else {
            continue;
        };
        let (Ok(current), Ok(max)) = (current.trim().parse::<u64>(), max.trim().parse::<u64>()) else {
            warn!("Unreadable backlight values in {}", dir.display());
            continue;
        };
        if let Some(percent) = percent_of(current as f64, max as f64) {
            debug!("Backlight {}: {}/{} -> {}%", device, current, max, percent);
            return Ok(percent);
        }
    }
    Err(BrightnessError::NoBacklight)
}

/// `current / max * 100`, truncated and clamped to 0-100. `None` when `max` is not positive.
pub fn percent_of(current: f64, max: f64) -> Option<u8> {
    if !(max > 0.0) || !current.is_finite() {
        return None;
    }
    Some(clamp_percent(current / max * 100.0))
}

fn clamp_percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0) as u8
}

pub fn parse_integer_output(output: &str) -> Result<u8, BrightnessError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| BrightnessError::Parse("empty output".to_string()))?;
    line.parse::<i64>()
        .map(|v| clamp_percent(v as f64))
        .map_err(|_| BrightnessError::Parse(line.to_string()))
}

/// Extracts the last `"brightness"={...}` dictionary reported by `ioreg`.
pub fn parse_ioreg_output(output: &str) -> Result<u8, BrightnessError> {
    const KEY: &str = "\"brightness\"={";

    let (_, rest) = output
        .rsplit_once(KEY)
        .ok_or_else(|| BrightnessError::Parse("no brightness entry in ioreg output".to_string()))?;
    let body = rest.split('}').next().unwrap_or_default();

    let mut value = None;
    let mut max = None;
    for pair in body.split(',') {
        let Some((key, raw)) = pair.split_once('=') else {
            continue;
        };
        let parsed = raw.trim().parse::<f64>().ok();
        match key.trim().trim_matches('"') {
            "value" => value = parsed,
            "max" => max = parsed,
            _ => {}
        }
    }

    let value = value.ok_or_else(|| BrightnessError::Parse(body.to_string()))?;
    percent_of(value, max.unwrap_or(IOREG_DEFAULT_MAX))
        .ok_or_else(|| BrightnessError::Parse(body.to_string()))
}

/// Parses `display 0: brightness 0.500000` lines of the macOS `brightness` tool.
pub fn parse_brightness_cli_output(output: &str) -> Result<u8, BrightnessError> {
    parse_fraction_line(output, |line| line.to_lowercase().contains("brightness"))
}

/// Parses the `Brightness: 0.80` line of `xrandr --verbose`.
pub fn parse_xrandr_output(output: &str) -> Result<u8, BrightnessError> {
    parse_fraction_line(output, |line| line.contains("Brightness"))
}

fn parse_fraction_line(output: &str, matches: impl Fn(&str) -> bool) -> Result<u8, BrightnessError> {
    for line in output.lines().filter(|l| matches(l)) {
        if let Some(fraction) = line.split_whitespace().last().and_then(|t| t.parse::<f64>().ok()) {
            return Ok(clamp_percent(fraction * 100.0));
        }
    }
    Err(BrightnessError::Parse("no brightness line found".to_string()))
}

/// Runs an external command, killing it after [`COMMAND_TIMEOUT`].
fn run_command(program: &str, args: &[&str]) -> Result<String, BrightnessError> {
    let cmd = format!("{} {}", program, args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| BrightnessError::CommandFailed { cmd: cmd.clone(), detail: e.to_string() })?;

    // Drain stdout on a helper thread so a chatty command can't block on a full pipe.
    let stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + COMMAND_TIMEOUT;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BrightnessError::Timeout(cmd));
        }
        thread::sleep(COMMAND_POLL);
    };

    let output = reader.join().unwrap_or_default();
    if !status.success() {
        return Err(BrightnessError::CommandFailed { cmd, detail: status.to_string() });
    }
    Ok(output)
}

/// Re-probes brightness every `interval` and sends the latest value (`None` on failure).
pub fn start_brightness_thread<S>(
    source: S,
    sender: Sender<Option<u8>>,
    stop_signal: Arc<AtomicBool>,
    ctx: egui::Context,
    interval: Duration,
) -> JoinHandle<()>
where
    S: BrightnessSource + Send + 'static,
{
    info!("Spawning brightness polling thread (every {:?}).", interval);
    thread::spawn(move || {
        while !stop_signal.load(Ordering::Relaxed) {
            let reading = match source.read() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Brightness detection error: {}", e);
                    None
                }
            };
            match sender.try_send(reading) {
                Ok(()) => ctx.request_repaint(),
                Err(TrySendError::Full(_)) => debug!("UI channel full. Dropping brightness reading."),
                Err(TrySendError::Disconnected(_)) => {
                    info!("UI receiver disconnected. Stopping brightness thread.");
                    break;
                }
            }

            let next_poll = Instant::now() + interval;
            while Instant::now() < next_poll && !stop_signal.load(Ordering::Relaxed) {
                thread::sleep(STOP_CHECK_INTERVAL.min(interval));
            }
        }
        info!("Brightness polling thread finished.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let started = Instant::now();
        let result = run_command("sleep", &["5"]);
        assert!(matches!(result, Err(BrightnessError::Timeout(cmd)) if cmd == "sleep 5"));
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }

    #[test]
    fn percent_truncates_and_clamps() {
        assert_eq!(percent_of(937.0, 1874.0), Some(50));
        assert_eq!(percent_of(1.0, 3.0), Some(33));
        assert_eq!(percent_of(120.0, 100.0), Some(100));
        assert_eq!(percent_of(5.0, 0.0), None);
    }

    #[test]
    fn integer_output_from_powershell() {
        assert_eq!(parse_integer_output("  75\r\n").unwrap(), 75);
        assert_eq!(parse_integer_output("\n\n40\n").unwrap(), 40);
        assert!(matches!(parse_integer_output("   "), Err(BrightnessError::Parse(_))));
        assert!(parse_integer_output("Get-WmiObject : Not supported").is_err());
    }

    #[test]
    fn ioreg_uses_last_entry_and_its_max() {
        let output = r#"
    | |   "IODisplayParameters" = {"brightness"={"max"=1024,"min"=0,"value"=256},"commit"={"reg"=0}}
    | |   "IODisplayParameters" = {"brightness"={"min"=0,"max"=1000,"value"=800},"commit"={"reg"=0}}
"#;
        assert_eq!(parse_ioreg_output(output).unwrap(), 80);
    }

    #[test]
    fn ioreg_without_max_uses_raw_scale() {
        let output = r#""brightness"={"min"=0,"value"=32768}"#;
        assert_eq!(parse_ioreg_output(output).unwrap(), 50);
        assert!(parse_ioreg_output("no display here").is_err());
    }

    #[test]
    fn brightness_cli_and_xrandr_fractions() {
        let cli = "display 0: main, active, awake, online, built-in, ID 0x4280a80\ndisplay 0: brightness 0.437500\n";
        assert_eq!(parse_brightness_cli_output(cli).unwrap(), 43);

        let xrandr = "eDP-1 connected primary 1920x1080+0+0\n\tGamma:      1.0:1.0:1.0\n\tBrightness: 0.80\n";
        assert_eq!(parse_xrandr_output(xrandr).unwrap(), 80);
        assert!(parse_xrandr_output("eDP-1 connected").is_err());
    }

    #[test]
    fn sysfs_prefers_known_devices() {
        let root = tempfile::tempdir().unwrap();
        for (name, current, max) in [("amdgpu_bl0", "10", "100"), ("intel_backlight", "600", "1200")] {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("brightness"), format!("{}\n", current)).unwrap();
            fs::write(dir.join("max_brightness"), format!("{}\n", max)).unwrap();
        }
        assert_eq!(read_sysfs_backlight(root.path()).unwrap(), 50);
    }

    #[test]
    fn sysfs_skips_devices_with_zero_max() {
        let root = tempfile::tempdir().unwrap();
        for (name, current, max) in [("acpi_video0", "5", "0"), ("nv_backlight", "30", "40")] {
            let dir = root.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("brightness"), current).unwrap();
            fs::write(dir.join("max_brightness"), max).unwrap();
        }
        assert_eq!(read_sysfs_backlight(root.path()).unwrap(), 75);
    }

    #[test]
    fn sysfs_without_devices_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(read_sysfs_backlight(root.path()), Err(BrightnessError::NoBacklight)));
    }
}
