// period.rs
// Civil-calendar helpers. Every date rule runs in the property's fixed UTC+7 zone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

pub const LOCAL_OFFSET_SECS: i32 = 7 * 3600;
pub const BILL_DUE_DAY: u32 = 25;

const THAI_MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).expect("UTC+7 is a valid offset")
}

pub fn to_local(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&local_offset())
}

pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    to_local(instant).date_naive()
}

/// UTC instant of local midnight on `date`.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    local_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Half-open UTC range `[start, end)` covering one local calendar day.
pub fn local_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(date);
    (start, start + Duration::days(1))
}

pub fn thai_month_name(month: u32) -> &'static str {
    THAI_MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}

pub fn buddhist_year(year: i32) -> i32 {
    year + 543
}

/// "25 มีนาคม 2567"
pub fn format_thai_date(instant: DateTime<Utc>) -> String {
    let date = local_date(instant);
    format!(
        "{} {} {}",
        date.day(),
        thai_month_name(date.month()),
        buddhist_year(date.year())
    )
}

/// "2024-03-25", the local calendar date.
pub fn format_local_date(instant: DateTime<Utc>) -> String {
    local_date(instant).format("%Y-%m-%d").to_string()
}

/// A calendar month a bill is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub month: u32,
    pub year: i32,
}

impl BillingPeriod {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let date = local_date(now);
        Self {
            month: date.month(),
            year: date.year(),
        }
    }

    /// "มีนาคม 2567"
    pub fn thai_label(&self) -> String {
        format!(
            "{} {}",
            thai_month_name(self.month),
            buddhist_year(self.year)
        )
    }

    /// The 25th of the current local month, or of next month once the 25th has passed.
    pub fn due_date(now: DateTime<Utc>) -> DateTime<Utc> {
        let today = local_date(now);
        let (year, month) = if today.day() > BILL_DUE_DAY {
            if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            }
        } else {
            (today.year(), today.month())
        };
        let due = NaiveDate::from_ymd_opt(year, month, BILL_DUE_DAY).unwrap_or(today);
        local_midnight(due)
    }
}
