//! Calendar arithmetic helpers that bypass jiff's `Span` machinery.
//!
//! The engine needs three date operations a lot: day differences for audit
//! holding periods, month offsets for the scheduler's clock advance, and
//! whole-calendar-year offsets for regressive bracket boundaries and
//! port-in backdating. jiff `Span` operations are correct but heavier than
//! needed, and the bracket math depends on precise day-clamping semantics
//! (a Jan 31 clock lands on Feb 28, a Feb 29 lot gets a Feb 28 boundary in
//! non-leap years), so the rules live here where they are spelled out.

use jiff::civil::Date;

/// Fast leap year check.
#[inline]
pub fn is_leap_year(year: i16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Days in a month without creating a `jiff::civil::Date`.
#[inline]
pub fn days_in_month(year: i16, month: i8) -> i8 {
    const DAYS: [i8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS[(month - 1) as usize]
    }
}

/// Convert a civil date to a Rata Die day number (days since 0001-01-01),
/// proleptic Gregorian. O(1), no `Span` allocation.
#[inline]
fn rata_die(d: Date) -> i32 {
    let y = d.year() as i32;
    let m = d.month() as i32;
    let day = d.day() as i32;

    // Shift March = month 1 so Feb (end of "year") is month 12
    let a = (14 - m) / 12;
    let y2 = y - a;
    let m2 = m + 12 * a - 3;

    day + (153 * m2 + 2) / 5 + 365 * y2 + y2 / 4 - y2 / 100 + y2 / 400 - 306
}

/// Number of days between two dates (`d2 - d1`), positive when `d2 > d1`.
#[inline]
pub fn days_between(d1: Date, d2: Date) -> i32 {
    rata_die(d2) - rata_die(d1)
}

/// Add `n` days to a date.
#[inline]
pub fn add_days(d: Date, n: i32) -> Date {
    rd_to_date(rata_die(d) + n)
}

/// Inverse of `rata_die()`.
#[inline]
fn rd_to_date(rd: i32) -> Date {
    // Shift so day 0 = March 1, year 0
    let z = rd + 306;
    let h = 100 * z - 25;
    let a = h / 3_652_425;
    let b = a - a / 4;
    let y = (100 * b + h) / 36_525;
    let c = b + z - 365 * y - y / 4;
    let m = (5 * c + 456) / 153;
    let day = c - (153 * m - 457) / 5;

    let (year, month) = if m > 12 { (y + 1, m - 12) } else { (y, m) };

    jiff::civil::date(year as i16, month as i8, day as i8)
}

/// Add whole months, clamping the day to the target month's length.
///
/// The clamp is not sticky: advancing Jan 31 by one month gives Feb 28
/// (or 29), and advancing that by another month gives Mar 28 (or 29):
/// the clock keeps the clamped day, matching how the monthly scheduler
/// has always stepped.
pub fn add_months(d: Date, n: i32) -> Date {
    let zero_based = d.year() as i32 * 12 + (d.month() as i32 - 1) + n;
    let year = zero_based.div_euclid(12) as i16;
    let month = (zero_based.rem_euclid(12) + 1) as i8;
    let day = d.day().min(days_in_month(year, month));
    jiff::civil::date(year, month, day)
}

/// Add whole calendar years, clamping Feb 29 to Feb 28 in non-leap years.
///
/// This is the boundary rule for regressive tax brackets: a lot dated on a
/// leap day gets a leap-adjusted boundary, not a fixed day count.
pub fn add_years(d: Date, n: i32) -> Date {
    let year = (d.year() as i32 + n) as i16;
    let day = d.day().min(days_in_month(year, d.month()));
    jiff::civil::date(year, d.month(), day)
}
