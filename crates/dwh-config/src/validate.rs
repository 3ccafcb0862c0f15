//! Parsing helpers for raw environment values.

use std::time::Duration;

use url::Url;

use crate::defaults::MAX_WORKERS;
use crate::error::{ConfigError, ConfigResult};
use crate::model::LogOutput;

/// Parse a strictly positive integer.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not an unsigned
/// integer or is zero.
pub fn parse_positive_u64(field: &'static str, raw: &str) -> ConfigResult<u64> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", raw))?;
    if value == 0 {
        return Err(ConfigError::invalid(field, "zero", raw));
    }
    Ok(value)
}

/// Parse a positive number of seconds into a [`Duration`].
///
/// # Errors
///
/// Propagates the failures of [`parse_positive_u64`].
pub fn parse_seconds(field: &'static str, raw: &str) -> ConfigResult<Duration> {
    parse_positive_u64(field, raw).map(Duration::from_secs)
}

/// Parse a positive number of milliseconds into a [`Duration`].
///
/// # Errors
///
/// Propagates the failures of [`parse_positive_u64`].
pub fn parse_millis(field: &'static str, raw: &str) -> ConfigResult<Duration> {
    parse_positive_u64(field, raw).map(Duration::from_millis)
}

/// Parse the worker pool size.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is zero, not a number,
/// or above [`MAX_WORKERS`].
pub fn parse_workers(field: &'static str, raw: &str) -> ConfigResult<usize> {
    let value = parse_positive_u64(field, raw)?;
    let workers =
        usize::try_from(value).map_err(|_| ConfigError::invalid(field, "out_of_range", raw))?;
    if workers > MAX_WORKERS {
        return Err(ConfigError::invalid(field, "out_of_range", raw));
    }
    Ok(workers)
}

/// Parse a storage SAS URL. Only `http` and `https` URLs with a host are accepted.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the URL is malformed. The
/// recorded value has its query string removed so signatures are not logged.
pub fn parse_sas_url(field: &'static str, raw: &str) -> ConfigResult<Url> {
    let trimmed = raw.trim();
    let redacted = redact_query(trimmed);
    let url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidField {
        field,
        reason: "malformed_url",
        value: Some(redacted.clone()),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidField {
            field,
            reason: "unsupported_scheme",
            value: Some(redacted),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidField {
            field,
            reason: "missing_host",
            value: Some(redacted),
        });
    }
    Ok(url)
}

/// Parse a console log format name.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for anything other than `json` or `pretty`.
pub fn parse_log_output(field: &'static str, raw: &str) -> ConfigResult<LogOutput> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogOutput::Json),
        "pretty" => Ok(LogOutput::Pretty),
        _ => Err(ConfigError::invalid(field, "unknown_format", raw)),
    }
}

fn redact_query(raw: &str) -> String {
    raw.split_once('?')
        .map_or_else(|| raw.to_string(), |(base, _)| format!("{base}?***"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_u64_rejects_zero_and_text() {
        assert_eq!(parse_positive_u64("X", "15").ok(), Some(15));
        assert!(matches!(
            parse_positive_u64("X", "0"),
            Err(ConfigError::InvalidField { reason: "zero", .. })
        ));
        assert!(matches!(
            parse_positive_u64("X", "soon"),
            Err(ConfigError::InvalidField {
                reason: "not_an_integer",
                ..
            })
        ));
    }

    #[test]
    fn parse_workers_enforces_upper_bound() {
        assert_eq!(parse_workers("W", "4").ok(), Some(4));
        assert!(matches!(
            parse_workers("W", "65"),
            Err(ConfigError::InvalidField {
                reason: "out_of_range",
                ..
            })
        ));
    }

    #[test]
    fn parse_sas_url_redacts_signature_on_failure() {
        let err = parse_sas_url("DWH_BLOB_SAS", "ftp://acct.blob.example/c?sig=secret")
            .err()
            .map(|err| match err {
                ConfigError::InvalidField { reason, value, .. } => (reason, value),
                ConfigError::MissingEnv { .. } => ("missing", None),
            });
        let Some((reason, Some(value))) = err else {
            panic!("expected invalid field error");
        };
        assert_eq!(reason, "unsupported_scheme");
        assert!(!value.contains("secret"));
    }

    #[test]
    fn parse_sas_url_accepts_https_with_query() {
        let url = parse_sas_url(
            "DWH_INBOX",
            "https://acct.file.core.windows.net/share/inbox?sv=2020&sig=abc",
        )
        .ok();
        assert_eq!(
            url.as_ref().and_then(Url::host_str),
            Some("acct.file.core.windows.net")
        );
    }

    #[test]
    fn parse_log_output_is_case_insensitive() {
        assert_eq!(parse_log_output("F", "JSON").ok(), Some(LogOutput::Json));
        assert_eq!(parse_log_output("F", "pretty").ok(), Some(LogOutput::Pretty));
        assert!(parse_log_output("F", "xml").is_err());
    }
}
