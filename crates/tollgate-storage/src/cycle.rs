use time::{Date, Month};

/// Start of the billing cycle containing `today`, derived by advancing the
/// subscription anchor month by month. Anchor days past the end of a short
/// month clamp to its last day.
pub fn current_cycle_start(period_start: Date, today: Date) -> Date {
    if today <= period_start {
        return period_start;
    }
    let elapsed = (today.year() - period_start.year()) * 12
        + (i32::from(u8::from(today.month())) - i32::from(u8::from(period_start.month())));
    let candidate = add_months(period_start, elapsed);
    if candidate > today {
        add_months(period_start, elapsed - 1)
    } else {
        candidate
    }
}

/// Scope label for the monthly counter row: the ISO date of the cycle start.
pub fn cycle_label(cycle_start: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        cycle_start.year(),
        u8::from(cycle_start.month()),
        cycle_start.day()
    )
}

/// First day of the calendar month containing `today`. Fallback cycle for
/// users without a subscription anchor.
pub fn calendar_month_start(today: Date) -> Date {
    Date::from_calendar_date(today.year(), today.month(), 1).unwrap_or(today)
}

fn add_months(date: Date, months: i32) -> Date {
    let total = date.year() * 12 + i32::from(u8::from(date.month())) - 1 + months;
    let year = total.div_euclid(12);
    let month = match Month::try_from((total.rem_euclid(12) + 1) as u8) {
        Ok(month) => month,
        Err(_) => return date,
    };
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn cycle_start_advances_monthly_from_anchor() {
        let anchor = date!(2026 - 03 - 15);
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 03 - 20)),
            date!(2026 - 03 - 15)
        );
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 04 - 14)),
            date!(2026 - 03 - 15)
        );
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 04 - 15)),
            date!(2026 - 04 - 15)
        );
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 08 - 29)),
            date!(2026 - 08 - 15)
        );
    }

    #[test]
    fn anchor_day_clamps_in_short_months() {
        let anchor = date!(2026 - 01 - 31);
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 03 - 01)),
            date!(2026 - 02 - 28)
        );
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 04 - 02)),
            date!(2026 - 03 - 31)
        );
    }

    #[test]
    fn today_before_anchor_keeps_anchor() {
        let anchor = date!(2026 - 09 - 01);
        assert_eq!(
            current_cycle_start(anchor, date!(2026 - 08 - 29)),
            anchor
        );
    }

    #[test]
    fn labels_are_iso_dates() {
        assert_eq!(cycle_label(date!(2026 - 08 - 05)), "2026-08-05");
    }
}
