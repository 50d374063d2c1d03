use std::fmt::Display;
use std::io::Write;

use chrono::{DateTime, Utc};
use env_logger::fmt::Formatter;
use log::kv::{Key, Value, VisitSource};
use log::Record;

const FRAGMENT_LEN: usize = 60;

/// Initializes `env_logger`, printing structured key-values after the message.
/// The level is read from `RUST_LOG` and defaults to `info`.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(format_record)
        .init();
}

fn format_record(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let mut pairs = Pairs::default();
    if record.key_values().visit(&mut pairs).is_err() {
        pairs.0.push_str(" <unprintable key-values>");
    }

    writeln!(
        buf,
        "[{} {:<5} {}] {}{}",
        buf.timestamp(),
        record.level(),
        record.target(),
        record.args(),
        pairs.0,
    )
}

#[derive(Default)]
struct Pairs(String);

impl<'kvs> VisitSource<'kvs> for Pairs {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), log::kv::Error> {
        self.0.push_str(&format!(" {key}={value:?}"));
        Ok(())
    }
}

/// Shortens offending input to something that fits on a log line.
pub fn fragment(input: &str) -> &str {
    let input = input.trim();

    match input.char_indices().nth(FRAGMENT_LEN) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Logs the error of a recoverable operation with its component, the offending
/// input and the instant, and turns the result into an `Option`.
pub trait LogExt<T> {
    fn log_warn(self, component: &'static str, input: &str, at: DateTime<Utc>) -> Option<T>;
    fn log_error(self, component: &'static str, input: &str, at: DateTime<Utc>) -> Option<T>;
}

impl<T, E> LogExt<T> for Result<T, E>
where
    E: Display,
{
    #[track_caller]
    fn log_warn(self, component: &'static str, input: &str, at: DateTime<Utc>) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let location = std::panic::Location::caller().to_string();
                let fragment = fragment(input);

                log::warn!(component = component, fragment = fragment, at:% = at, location:% = location; "{error}");

                None
            }
        }
    }

    #[track_caller]
    fn log_error(self, component: &'static str, input: &str, at: DateTime<Utc>) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let location = std::panic::Location::caller().to_string();
                let fragment = fragment(input);

                log::error!(component = component, fragment = fragment, at:% = at, location:% = location; "{error}");

                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_is_trimmed_and_bounded() {
        assert_eq!(fragment("  SUMMARY:x  "), "SUMMARY:x");

        let long = "é".repeat(100);
        assert_eq!(fragment(&long).chars().count(), FRAGMENT_LEN);
    }

    #[test]
    fn log_ext_keeps_ok_values() {
        let ok: Result<u8, String> = Ok(3);
        let err: Result<u8, String> = Err("boom".into());

        assert_eq!(ok.log_warn("test", "input", Utc::now()), Some(3));
        assert_eq!(err.log_error("test", "input", Utc::now()), None);
    }
}
