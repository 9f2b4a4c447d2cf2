use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono::Datelike;
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

fn relative_regex() -> &'static Regex {
    static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();
    RELATIVE_RE.get_or_init(|| {
        Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$").expect("relative regex is valid")
    })
}

fn clock_regex() -> &'static Regex {
    static CLOCK_RE: OnceLock<Regex> = OnceLock::new();
    CLOCK_RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$")
            .expect("clock regex is valid")
    })
}

const TIMEZONE_CONFIG_FILE: &str = "taskdeck-time.toml";
const TIMEZONE_ENV_VAR: &str = "TASKDECK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "TASKDECK_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// Timezone used for day boundaries ("today", deadline display).
/// Resolved once per process: env var, then config file, then UTC.
pub fn project_timezone() -> &'static Tz {
    static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();
    PROJECT_TZ.get_or_init(resolve_project_timezone)
}

/// UTC instant of local midnight for the day containing `now`.
///
/// This anchors the "today" window of the time filters, so it must not
/// fail: a midnight skipped by a DST transition falls back to the naive
/// UTC reading of that date.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = project_timezone();
    let local_date = now.with_timezone(tz).date_naive();
    let Some(midnight) = local_date.and_hms_opt(0, 0, 0) else {
        return now;
    };

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => {
            let chosen = if first <= second { first } else { second };
            chosen.with_timezone(&Utc)
        }
        LocalResult::None => {
            tracing::warn!(
                date = %local_date,
                "local midnight does not exist in project timezone; using UTC midnight"
            );
            DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc)
        }
    }
}

/// Deadline rendering for lists and detail views.
pub fn format_deadline(dt: DateTime<Utc>) -> String {
    dt.with_timezone(project_timezone())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn resolve_project_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    chrono_tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir().ok().map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed reading timezone config file"
            );
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed parsing timezone config file"
            );
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured project timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

fn to_utc_from_project_local(
    local_naive: NaiveDateTime,
    context: &str,
) -> anyhow::Result<DateTime<Utc>> {
    match project_timezone().from_local_datetime(&local_naive) {
        LocalResult::Single(local_dt) => Ok(local_dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                context,
                first = %first,
                second = %second,
                "ambiguous local datetime; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in configured timezone: {context}"
        )),
    }
}

/// Parses the deadline expressions accepted on the command line.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_deadline_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => {
            let date = now.with_timezone(project_timezone()).date_naive();
            let midnight = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("failed to construct midnight for today"))?;
            return to_utc_from_project_local(midnight, "today");
        }
        "tomorrow" => {
            let today = parse_deadline_expr("today", now)?;
            return Ok(today + Duration::days(1));
        }
        _ => {}
    }

    if let Some(target_weekday) = parse_weekday_name(&lower) {
        let local_today = now.with_timezone(project_timezone()).date_naive();
        let target_date = next_weekday_date(local_today, target_weekday);
        let midnight = target_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("failed to construct weekday midnight"))?;
        return to_utc_from_project_local(midnight, "weekday-name");
    }

    if let Some((hour, minute)) = parse_clock_time(token) {
        let local_now = now.with_timezone(project_timezone());
        let mut day = local_now.date_naive();
        let local_candidate = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("failed to construct clock time candidate"))?;
        if local_candidate <= local_now.naive_local() {
            day = day
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| anyhow!("failed to advance to next day"))?;
        }
        let next_candidate = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("failed to construct next clock time candidate"))?;
        return to_utc_from_project_local(next_candidate, "clock-time");
    }

    if let Some(caps) = relative_regex().captures(token) {
        let sign = caps
            .name("sign")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative sign"))?;
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let unit = caps
            .name("unit")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative unit"))?;

        let duration = match unit {
            "d" => Duration::days(num),
            "h" => Duration::hours(num),
            "m" => Duration::minutes(num),
            _ => return Err(anyhow!("unknown relative unit: {unit}")),
        };

        return Ok(if sign == "-" { now - duration } else { now + duration });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("failed to construct midnight for date"))?;
        return to_utc_from_project_local(midnight, "date");
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, fmt) {
            return to_utc_from_project_local(ndt, fmt);
        }
    }

    Err(anyhow!("unrecognized deadline expression: {input}")).with_context(|| {
        "supported formats: now/today/tomorrow, weekday names (e.g. monday), \
         clock times (e.g. 3:23pm or 15:23), +Nd/+Nh/+Nm, RFC3339, \
         YYYY-MM-DD, YYYY-MM-DDTHH:MM, YYYY-MM-DD HH:MM"
    })
}

fn parse_weekday_name(token: &str) -> Option<Weekday> {
    match token.trim() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let from_idx = from.weekday().num_days_from_monday() as i64;
    let target_idx = target.num_days_from_monday() as i64;
    let mut delta = (7 + target_idx - from_idx) % 7;
    if delta == 0 {
        delta = 7;
    }
    from.checked_add_signed(Duration::days(delta)).unwrap_or(from)
}

fn parse_clock_time(token: &str) -> Option<(u32, u32)> {
    let captures = clock_regex().captures(token.trim())?;

    let raw_hour = captures.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = captures.name("minute")?.as_str().parse::<u32>().ok()?;
    if minute > 59 {
        return None;
    }

    let hour = if let Some(ampm_match) = captures.name("ampm") {
        let ampm = ampm_match.as_str().to_ascii_lowercase();
        if raw_hour == 0 || raw_hour > 12 {
            return None;
        }
        match ampm.as_str() {
            "am" => {
                if raw_hour == 12 {
                    0
                } else {
                    raw_hour
                }
            }
            "pm" => {
                if raw_hour == 12 {
                    12
                } else {
                    raw_hour + 12
                }
            }
            _ => return None,
        }
    } else {
        if raw_hour > 23 {
            return None;
        }
        raw_hour
    };

    Some((hour, minute))
}

/// Wire format for deadlines: RFC3339 out (what the server expects from
/// the client), lenient in (a timestamp the client cannot parse becomes
/// `None` rather than failing the whole response).
pub mod lenient_date_serde {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        let Some(value) = raw else {
            return Ok(None);
        };
        let Some(text) = value.as_str() else {
            tracing::debug!(?value, "non-string deadline value treated as absent");
            return Ok(None);
        };

        Ok(parse_wire_datetime(text))
    }

    pub(super) fn parse_wire_datetime(text: &str) -> Option<DateTime<Utc>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
        }

        tracing::debug!(raw = trimmed, "unparseable deadline treated as absent");
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::lenient_date_serde::parse_wire_datetime;
    use super::{parse_deadline_expr, start_of_day};

    #[test]
    fn parses_relative_offsets() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).single().expect("valid now");
        let parsed = parse_deadline_expr("+7d", now).expect("parse relative");
        assert_eq!(parsed, now + Duration::days(7));

        let parsed = parse_deadline_expr("-90m", now).expect("parse relative");
        assert_eq!(parsed, now - Duration::minutes(90));
    }

    #[test]
    fn parses_rfc3339() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).single().expect("valid now");
        let parsed =
            parse_deadline_expr("2026-03-01T09:30:00Z", now).expect("parse rfc3339");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("valid date")
        );
    }

    #[test]
    fn parses_clock_times_into_the_next_occurrence() {
        use chrono::Timelike;

        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).single().expect("valid now");

        for expr in ["3:23pm", "15:23", "9:05AM"] {
            let parsed = parse_deadline_expr(expr, now).expect("parse clock time");
            assert!(parsed > now);
            assert!(parsed <= now + Duration::days(1));
        }

        let local = parse_deadline_expr("3:23pm", now)
            .expect("parse clock time")
            .with_timezone(super::project_timezone());
        assert_eq!((local.hour(), local.minute()), (15, 23));

        assert!(parse_deadline_expr("25:00", now).is_err());
        assert!(parse_deadline_expr("13:00pm", now).is_err());
    }

    #[test]
    fn rejects_garbage_expression() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).single().expect("valid now");
        assert!(parse_deadline_expr("eventually", now).is_err());
    }

    #[test]
    fn today_window_is_24_hours() {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).single().expect("valid now");
        let start = start_of_day(now);
        assert!(start <= now);
        assert!(now < start + Duration::days(1));
    }

    #[test]
    fn wire_datetime_is_lenient() {
        assert!(parse_wire_datetime("2026-03-01T12:00:00.000Z").is_some());
        assert!(parse_wire_datetime("2026-03-01").is_some());
        assert!(parse_wire_datetime("Invalid Date").is_none());
        assert!(parse_wire_datetime("").is_none());
    }
}
