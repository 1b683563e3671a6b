//! Line commands and plain-text rendering for the terminal front-end.

use crate::dashboard::DashboardView;
use irrigation_shared::Actuator;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Temperature(f64),
    Humidity(f64),
    Toggle(Actuator, bool),
    Export,
    Machines,
    Logout,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),
    #[error("`{0}` needs a value")]
    MissingValue(&'static str),
    #[error("bad value {0:?}")]
    BadValue(String),
}

pub const HELP: &str = "\
commands:
  temp <value>                 set target temperature
  hum <value>                  set target humidity
  motor|pump|sprinkler on|off  toggle an actuator
  export                       download all logs for this machine
  machines                     list known machines
  logout                       forget the stored session and quit
  quit";

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let head = head.to_ascii_lowercase();

    let cmd = match head.as_str() {
        "temp" | "temperature" => Command::Temperature(number(arg, "temp")?),
        "hum" | "humidity" => Command::Humidity(number(arg, "hum")?),
        "motor" | "pump" | "sprinkler" => {
            let actuator: Actuator = head
                .parse()
                .map_err(|_| CommandError::Unknown(head.clone()))?;
            let on = match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("on") | Some("1") | Some("true") => true,
                Some("off") | Some("0") | Some("false") => false,
                Some(other) => return Err(CommandError::BadValue(other.to_string())),
                None => return Err(CommandError::MissingValue("on|off")),
            };
            Command::Toggle(actuator, on)
        }
        "export" => Command::Export,
        "machines" => Command::Machines,
        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

fn number(arg: Option<&str>, name: &'static str) -> Result<f64, CommandError> {
    let raw = arg.ok_or(CommandError::MissingValue(name))?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CommandError::BadValue(raw.to_string())),
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string())
}

pub fn render_view(view: &DashboardView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "machine {}", view.machine_id);
    match &view.latest {
        Some(r) => {
            let d = &r.data;
            let _ = writeln!(
                out,
                "  temp {:.1}  hum {:.1}  pH {}  EC {}  N {}  P {}  K {}",
                d.temperature,
                d.humidity,
                opt(d.ph),
                opt(d.ec),
                opt(d.n),
                opt(d.p),
                opt(d.k)
            );
        }
        None => {
            let _ = writeln!(out, "  no reading yet");
        }
    }

    let sp = &view.setpoints;
    let _ = write!(
        out,
        "  target temp {:.1}  target hum {:.1}",
        sp.target_temperature, sp.target_humidity
    );
    for actuator in Actuator::ALL {
        let state = if sp.actuators.get(actuator) { "on" } else { "off" };
        let _ = write!(out, "  {} {state}", actuator.as_str());
    }
    out.push('\n');

    for s in &view.window {
        let _ = writeln!(
            out,
            "  {}  {:>6.1} C  {:>6.1} %",
            s.time_label(),
            s.temperature,
            s.humidity
        );
    }
    out
}
