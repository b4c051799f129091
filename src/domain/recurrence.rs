use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Parsed recurrence pattern. Supported grammar is an RRULE subset:
/// `FREQ=DAILY|WEEKLY|MONTHLY|YEARLY`, optional `INTERVAL=n`, `BYDAY=MO,..,SU`
/// (weekly only) and `BYMONTHDAY=1..31` (monthly only). Interval arithmetic is
/// anchored at the template's valid_from date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub by_day: Vec<Weekday>,
    pub by_month_day: Option<u32>,
}

impl RecurrenceRule {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("recurrence rule must not be empty".to_string());
        }

        let mut frequency = None;
        let mut interval: u32 = 1;
        let mut by_day = Vec::new();
        let mut by_month_day = None;

        for part in text.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some((key, value)) = part.split_once('=') else {
                return Err(format!("malformed rule segment '{part}'"));
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(match value.trim().to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        other => return Err(format!("unsupported FREQ '{other}'")),
                    });
                }
                "INTERVAL" => {
                    interval = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|parsed| *parsed >= 1)
                        .ok_or_else(|| format!("INTERVAL must be a positive integer, got '{value}'"))?;
                }
                "BYDAY" => {
                    for token in value.split(',') {
                        let weekday = parse_weekday(token.trim())
                            .ok_or_else(|| format!("unknown BYDAY token '{token}'"))?;
                        if !by_day.contains(&weekday) {
                            by_day.push(weekday);
                        }
                    }
                }
                "BYMONTHDAY" => {
                    let day = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|parsed| (1..=31).contains(parsed))
                        .ok_or_else(|| format!("BYMONTHDAY must be 1..=31, got '{value}'"))?;
                    by_month_day = Some(day);
                }
                other => return Err(format!("unknown rule key '{other}'")),
            }
        }

        let Some(frequency) = frequency else {
            return Err("recurrence rule must declare FREQ".to_string());
        };
        if !by_day.is_empty() && frequency != Frequency::Weekly {
            return Err("BYDAY is only valid with FREQ=WEEKLY".to_string());
        }
        if by_month_day.is_some() && frequency != Frequency::Monthly {
            return Err("BYMONTHDAY is only valid with FREQ=MONTHLY".to_string());
        }

        Ok(Self {
            frequency,
            interval,
            by_day,
            by_month_day,
        })
    }

    /// Single-date membership test relative to the template validity range.
    pub fn occurs_on(
        &self,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
        date: NaiveDate,
    ) -> bool {
        if date < valid_from {
            return false;
        }
        if let Some(valid_to) = valid_to {
            if date > valid_to {
                return false;
            }
        }

        let interval = i64::from(self.interval);
        match self.frequency {
            Frequency::Daily => (date - valid_from).num_days() % interval == 0,
            Frequency::Weekly => {
                let anchor_day = [valid_from.weekday()];
                let weekdays: &[Weekday] = if self.by_day.is_empty() {
                    &anchor_day
                } else {
                    &self.by_day
                };
                if !weekdays.contains(&date.weekday()) {
                    return false;
                }
                let week_offset =
                    (week_start(date) - week_start(valid_from)).num_days() / 7;
                week_offset % interval == 0
            }
            Frequency::Monthly => {
                let target_day = self.by_month_day.unwrap_or(valid_from.day());
                if date.day() != target_day {
                    return false;
                }
                let month_offset = i64::from(date.year() - valid_from.year()) * 12
                    + i64::from(date.month()) - i64::from(valid_from.month());
                month_offset % interval == 0
            }
            Frequency::Yearly => {
                date.month() == valid_from.month()
                    && date.day() == valid_from.day()
                    && i64::from(date.year() - valid_from.year()) % interval == 0
            }
        }
    }

    /// Every firing date within `[window_start, window_end]`, ascending and
    /// deduplicated, clipped to the validity range, skip days removed.
    pub fn expand(
        &self,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
        window_start: NaiveDate,
        window_end: NaiveDate,
        skip_days: &BTreeSet<NaiveDate>,
    ) -> Vec<NaiveDate> {
        let mut from = window_start.max(valid_from);
        let to = match valid_to {
            Some(valid_to) => window_end.min(valid_to),
            None => window_end,
        };

        let mut dates = Vec::new();
        while from <= to {
            if self.occurs_on(valid_from, valid_to, from) && !skip_days.contains(&from) {
                dates.push(from);
            }
            from += Duration::days(1);
        }
        dates
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}
