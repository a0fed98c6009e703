//! `os` library: clock, calendar time, environment and process helpers.
//!
//! Calendar functions work in UTC; a local-time request is served as UTC.

use std::fs::OpenOptions;
use std::io::Write;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::runtime::native::{arg, bad_argument, NativeFunction};
use crate::runtime::value::{Table, TableRef, Value};
use crate::runtime::{Interpreter, RuntimeError};

use super::library;

const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];
const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];
const CATEGORIES: [&str; 6] = ["all", "collate", "ctype", "monetary", "numeric", "time"];

pub fn open(interp: &mut Interpreter) {
    let started = Instant::now();
    let table = library(vec![
        NativeFunction::raw("clock", &[], 0, false, move |_, _| {
            Ok(vec![Value::Float(started.elapsed().as_secs_f64())])
        }),
        NativeFunction::raw("date", &["format", "time"], 0, false, date),
        NativeFunction::raw("time", &["table"], 0, false, time),
        NativeFunction::raw("difftime", &["t2", "t1"], 1, false, |_, args| {
            let t2: i64 = arg(&args, 0, "difftime")?;
            let t1: Option<i64> = arg(&args, 1, "difftime")?;
            Ok(vec![Value::Float(t2 as f64 - t1.unwrap_or(0) as f64)])
        }),
        NativeFunction::raw("execute", &["command"], 0, false, execute),
        NativeFunction::raw("exit", &["code", "close"], 0, false, |_, args| {
            let code = match args.first() {
                None | Some(Value::Nil) | Some(Value::Bool(true)) => 0,
                Some(Value::Bool(false)) => 1,
                Some(_) => arg::<i64>(&args, 0, "exit")? as i32,
            };
            let _ = std::io::stdout().flush();
            std::process::exit(code)
        }),
        NativeFunction::raw("getenv", &["name"], 1, false, |_, args| {
            let name: String = arg(&args, 0, "getenv")?;
            Ok(vec![std::env::var(&name).map_or(Value::Nil, Value::from)])
        }),
        NativeFunction::raw("remove", &["filename"], 1, false, |_, args| {
            let path: String = arg(&args, 0, "remove")?;
            let result = match std::fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => std::fs::remove_dir(&path),
                _ => std::fs::remove_file(&path),
            };
            Ok(file_result(result, &path))
        }),
        NativeFunction::raw("rename", &["oldname", "newname"], 2, false, |_, args| {
            let from: String = arg(&args, 0, "rename")?;
            let to: String = arg(&args, 1, "rename")?;
            Ok(file_result(std::fs::rename(&from, &to), &from))
        }),
        NativeFunction::raw("setlocale", &["locale", "category"], 0, false, setlocale),
        NativeFunction::raw("tmpname", &[], 0, false, |_, _| tmpname()),
    ]);
    interp.set_global("os", Value::from(table));
}

// ── Calendar ────────────────────────────────────────────────────────────

/// Civil date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Day count since 1970-01-01 for a civil date; `month` is 1..=12.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Broken-down UTC time.
struct DateTime {
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    min: i64,
    sec: i64,
    /// 0 = Sunday.
    wday: i64,
    /// 1-based day of the year.
    yday: i64,
}

impl DateTime {
    fn from_timestamp(t: i64) -> Self {
        let days = t.div_euclid(86_400);
        let secs = t.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        DateTime {
            year,
            month,
            day,
            hour: secs / 3600,
            min: secs % 3600 / 60,
            sec: secs % 60,
            wday: (days + 4).rem_euclid(7),
            yday: days - days_from_civil(year, 1, 1) + 1,
        }
    }

    fn to_table(&self) -> Table {
        let mut t = Table::with_capacity(9);
        t.set_str("year", Value::Int(self.year));
        t.set_str("month", Value::Int(self.month));
        t.set_str("day", Value::Int(self.day));
        t.set_str("hour", Value::Int(self.hour));
        t.set_str("min", Value::Int(self.min));
        t.set_str("sec", Value::Int(self.sec));
        t.set_str("wday", Value::Int(self.wday + 1));
        t.set_str("yday", Value::Int(self.yday));
        t.set_str("isdst", Value::Bool(false));
        t
    }

    fn format(&self, spec: &str) -> Result<String, RuntimeError> {
        let mut out = String::new();
        let mut chars = spec.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let Some(conv) = chars.next() else {
                return Err(invalid_specifier("%"));
            };
            match conv {
                'a' => out.push_str(&DAY_NAMES[self.wday as usize][..3]),
                'A' => out.push_str(DAY_NAMES[self.wday as usize]),
                'b' | 'h' => out.push_str(&MONTH_NAMES[self.month as usize - 1][..3]),
                'B' => out.push_str(MONTH_NAMES[self.month as usize - 1]),
                'c' => out.push_str(&self.format("%a %b %e %H:%M:%S %Y")?),
                'd' => out.push_str(&format!("{:02}", self.day)),
                'e' => out.push_str(&format!("{:2}", self.day)),
                'D' | 'x' => out.push_str(&self.format("%m/%d/%y")?),
                'F' => out.push_str(&self.format("%Y-%m-%d")?),
                'H' => out.push_str(&format!("{:02}", self.hour)),
                'I' => out.push_str(&format!("{:02}", (self.hour + 11) % 12 + 1)),
                'j' => out.push_str(&format!("{:03}", self.yday)),
                'm' => out.push_str(&format!("{:02}", self.month)),
                'M' => out.push_str(&format!("{:02}", self.min)),
                'n' => out.push('\n'),
                'p' => out.push_str(if self.hour < 12 { "AM" } else { "PM" }),
                'S' => out.push_str(&format!("{:02}", self.sec)),
                't' => out.push('\t'),
                'T' | 'X' => out.push_str(&self.format("%H:%M:%S")?),
                'w' => out.push_str(&self.wday.to_string()),
                'y' => out.push_str(&format!("{:02}", self.year.rem_euclid(100))),
                'Y' => out.push_str(&self.year.to_string()),
                'Z' => out.push_str("UTC"),
                '%' => out.push('%'),
                other => return Err(invalid_specifier(&format!("%{}", other))),
            }
        }
        Ok(out)
    }
}

fn invalid_specifier(conv: &str) -> RuntimeError {
    bad_argument(
        0,
        "date",
        &format!("invalid conversion specifier '{}'", conv),
    )
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn date(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let format: Option<String> = arg(&args, 0, "date")?;
    let t: Option<i64> = arg(&args, 1, "date")?;
    let format = format.unwrap_or_else(|| "%c".to_string());
    let spec = format.strip_prefix('!').unwrap_or(&format);
    let when = DateTime::from_timestamp(t.unwrap_or_else(now));
    if spec.starts_with("*t") {
        return Ok(vec![Value::from_table(when.to_table())]);
    }
    Ok(vec![Value::from(when.format(spec)?)])
}

/// Integer field `key` of a date table; `default` of `None` makes it required.
fn date_field(t: &TableRef, key: &str, default: Option<i64>) -> Result<i64, RuntimeError> {
    let raw = t.borrow().get_str(key);
    match raw {
        Value::Nil => default.ok_or_else(|| {
            RuntimeError::Raised(Value::from(format!("field '{}' missing in date table", key)))
        }),
        Value::Int(i) => Ok(i),
        other => crate::runtime::ops::to_integer(&other).ok_or_else(|| {
            RuntimeError::Raised(Value::from(format!("field '{}' is not an integer", key)))
        }),
    }
}

fn time(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let fields: Option<TableRef> = arg(&args, 0, "time")?;
    let Some(fields) = fields else {
        return Ok(vec![Value::Int(now())]);
    };
    let year = date_field(&fields, "year", None)?;
    let month = date_field(&fields, "month", None)?;
    let day = date_field(&fields, "day", None)?;
    let hour = date_field(&fields, "hour", Some(12))?;
    let min = date_field(&fields, "min", Some(0))?;
    let sec = date_field(&fields, "sec", Some(0))?;

    // Out-of-range fields carry into the next larger unit.
    let months = year
        .checked_mul(12)
        .and_then(|m| m.checked_add(month - 1))
        .ok_or_else(|| RuntimeError::Raised(Value::from("time result cannot be represented")))?;
    let days = days_from_civil(months.div_euclid(12), months.rem_euclid(12) + 1, 1) + day - 1;
    let timestamp = days
        .checked_mul(86_400)
        .and_then(|s| s.checked_add(hour.checked_mul(3600)?))
        .and_then(|s| s.checked_add(min.checked_mul(60)?))
        .and_then(|s| s.checked_add(sec))
        .ok_or_else(|| RuntimeError::Raised(Value::from("time result cannot be represented")))?;

    // Write the normalized fields back.
    let normalized = DateTime::from_timestamp(timestamp).to_table();
    let mut t = fields.borrow_mut();
    for (key, value) in normalized.iter() {
        t.put(key.clone(), value.clone())?;
    }
    Ok(vec![Value::Int(timestamp)])
}

// ── Processes and files ─────────────────────────────────────────────────

fn execute(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let command: Option<String> = arg(&args, 0, "execute")?;
    let Some(command) = command else {
        return Ok(vec![Value::Bool(true)]);
    };
    debug!(command = %command, "os.execute");
    let _ = std::io::stdout().flush();
    let status = match std::process::Command::new("sh").arg("-c").arg(&command).status() {
        Ok(status) => status,
        Err(e) => return Ok(os_failure(&e, "sh")),
    };
    let (how, code) = match status.code() {
        Some(code) => ("exit", i64::from(code)),
        None => ("signal", signal_of(&status)),
    };
    let ok = if how == "exit" && code == 0 {
        Value::Bool(true)
    } else {
        Value::Nil
    };
    Ok(vec![ok, Value::from(how), Value::Int(code)])
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(0, i64::from)
}

#[cfg(not(unix))]
fn signal_of(_: &std::process::ExitStatus) -> i64 {
    0
}

/// `true` on success, else `nil, "name: message", errno`.
fn file_result(result: std::io::Result<()>, name: &str) -> Vec<Value> {
    match result {
        Ok(()) => vec![Value::Bool(true)],
        Err(e) => os_failure(&e, name),
    }
}

fn os_failure(e: &std::io::Error, name: &str) -> Vec<Value> {
    let text = e.to_string();
    let message = match text.find(" (os error") {
        Some(cut) => &text[..cut],
        None => &text,
    };
    vec![
        Value::Nil,
        Value::from(format!("{}: {}", name, message)),
        Value::Int(i64::from(e.raw_os_error().unwrap_or(0))),
    ]
}

fn setlocale(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
    let locale: Option<String> = arg(&args, 0, "setlocale")?;
    let category: Option<String> = arg(&args, 1, "setlocale")?;
    let category = category.unwrap_or_else(|| "all".to_string());
    if !CATEGORIES.contains(&category.as_str()) {
        return Err(bad_argument(
            1,
            "setlocale",
            &format!("invalid option '{}'", category),
        ));
    }
    // Only the C locale is available.
    Ok(vec![match locale.as_deref() {
        None | Some("") | Some("C") | Some("POSIX") => Value::from("C"),
        Some(_) => Value::Nil,
    }])
}

fn tmpname() -> Result<Vec<Value>, RuntimeError> {
    let dir = std::env::temp_dir();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    for attempt in 0..16u32 {
        let name = format!("ay_{}_{:08x}", std::process::id(), stamp.wrapping_add(attempt));
        let path = dir.join(name);
        if OpenOptions::new().write(true).create_new(true).open(&path).is_ok() {
            return Ok(vec![Value::from(path.to_string_lossy().into_owned())]);
        }
    }
    Err(RuntimeError::Raised(Value::from(
        "unable to generate a unique filename",
    )))
}
