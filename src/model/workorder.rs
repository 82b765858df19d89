//! Work-order values written into the intervention spreadsheet.
//!
//! Everything here is validated on construction: a [`WorkOrderFields`] value
//! can only exist if every field is within the range the sheet expects.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer};

use crate::error::{Result, SheetmailError};
use crate::sheet::cell::is_forbidden_char;

/// Dispatch code written to the sheet header. Always in `0..=999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinoffCode(u16);

impl SinoffCode {
    pub const MAX: u16 = 999;

    pub fn new(value: i64) -> Result<Self> {
        if (0..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u16))
        } else {
            Err(SheetmailError::validation(
                "sinoffCode",
                format!("{value} is outside 0..={}", Self::MAX),
            ))
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Day, month, hour and minute of an intervention boundary.
///
/// The sheet carries no year, so neither does this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterventionTime {
    day: u8,
    month: u8,
    hour: u8,
    minute: u8,
}

impl InterventionTime {
    /// Build from already-parsed numbers. `label` prefixes field names in
    /// validation errors (`"start"` → `startDay`, `startMonth`, …).
    pub fn from_parts(label: &str, day: i64, month: i64, hour: i64, minute: i64) -> Result<Self> {
        Ok(Self {
            day: in_range(label, "Day", day, 1, 31)?,
            month: in_range(label, "Month", month, 1, 12)?,
            hour: in_range(label, "Hour", hour, 0, 23)?,
            minute: in_range(label, "Minute", minute, 0, 59)?,
        })
    }

    pub fn day(self) -> u8 {
        self.day
    }

    pub fn month(self) -> u8 {
        self.month
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl From<NaiveDateTime> for InterventionTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self {
            day: dt.day() as u8,
            month: dt.month() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }
}

fn in_range(label: &str, unit: &str, value: i64, min: i64, max: i64) -> Result<u8> {
    if (min..=max).contains(&value) {
        Ok(value as u8)
    } else {
        Err(SheetmailError::validation(
            format!("{label}{unit}"),
            format!("{value} is outside {min}..={max}"),
        ))
    }
}

/// All values the patcher writes. No field has a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOrderFields {
    pub sinoff_code: SinoffCode,
    pub intervention_start: InterventionTime,
    pub intervention_end: InterventionTime,
    pub solution_text: String,
}

impl WorkOrderFields {
    pub fn new(
        sinoff_code: SinoffCode,
        intervention_start: InterventionTime,
        intervention_end: InterventionTime,
        solution_text: impl Into<String>,
    ) -> Result<Self> {
        let solution_text = solution_text.into();
        if solution_text.trim().is_empty() {
            return Err(SheetmailError::validation("solution", "is required"));
        }
        check_text("solution", &solution_text)?;
        Ok(Self {
            sinoff_code,
            intervention_start,
            intervention_end,
            solution_text,
        })
    }
}

/// Which cells a patch may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchMode {
    /// Write the work-order fields only; the details cell is left untouched.
    SolutionOnly,
    /// Also overwrite the details cell with the given text.
    DetailsAndSolution(String),
}

/// The work-order form as submitted by a client: every value is still a string.
///
/// Numbers may arrive as JSON strings or JSON numbers.
/// Missing fields deserialize as blank and are reported by [`WorkOrderForm::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkOrderForm {
    #[serde(deserialize_with = "loose_string")]
    pub sinoff_code: String,
    #[serde(deserialize_with = "loose_string")]
    pub start_day: String,
    #[serde(deserialize_with = "loose_string")]
    pub start_month: String,
    #[serde(deserialize_with = "loose_string")]
    pub start_hour: String,
    #[serde(deserialize_with = "loose_string")]
    pub start_minute: String,
    #[serde(deserialize_with = "loose_string")]
    pub end_day: String,
    #[serde(deserialize_with = "loose_string")]
    pub end_month: String,
    #[serde(deserialize_with = "loose_string")]
    pub end_hour: String,
    #[serde(deserialize_with = "loose_string")]
    pub end_minute: String,
    pub solution: String,
    pub details: Option<String>,
}

impl WorkOrderForm {
    /// Parse every numeric field and select the patch mode.
    ///
    /// A non-blank `details` value selects [`PatchMode::DetailsAndSolution`].
    pub fn validate(&self) -> Result<(WorkOrderFields, PatchMode)> {
        let sinoff = SinoffCode::new(parse_number("sinoffCode", &self.sinoff_code)?)?;
        let start = InterventionTime::from_parts(
            "start",
            parse_number("startDay", &self.start_day)?,
            parse_number("startMonth", &self.start_month)?,
            parse_number("startHour", &self.start_hour)?,
            parse_number("startMinute", &self.start_minute)?,
        )?;
        let end = InterventionTime::from_parts(
            "end",
            parse_number("endDay", &self.end_day)?,
            parse_number("endMonth", &self.end_month)?,
            parse_number("endHour", &self.end_hour)?,
            parse_number("endMinute", &self.end_minute)?,
        )?;
        let fields = WorkOrderFields::new(sinoff, start, end, self.solution.clone())?;

        let mode = match self.details.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => {
                check_text("details", d)?;
                PatchMode::DetailsAndSolution(d.to_string())
            }
            _ => PatchMode::SolutionOnly,
        };
        Ok((fields, mode))
    }
}

/// Reject characters a worksheet cannot hold.
pub fn check_text(field: &str, text: &str) -> Result<()> {
    match text.chars().find(|&c| is_forbidden_char(c)) {
        Some(c) => Err(SheetmailError::validation(
            field,
            format!("contains an unsupported character U+{:04X}", u32::from(c)),
        )),
        None => Ok(()),
    }
}

/// Parse a caller-supplied integer. Surrounding whitespace is ignored; anything
/// else that is not a plain decimal integer is rejected.
pub fn parse_number(field: &str, raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SheetmailError::validation(field, "is required"));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| SheetmailError::validation(field, format!("not a number: '{raw}'")))
}

fn loose_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Text(String),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Int(n) => n.to_string(),
        Loose::Text(s) => s,
    })
}
