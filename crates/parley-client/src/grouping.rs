//! Day grouping of messages for display.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::messages::MessageView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "date", rename_all = "lowercase")]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl std::fmt::Display for DayLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            Self::Date(date) => write!(f, "{}", date.format("%A, %-d %B %Y")),
        }
    }
}

/// Messages of one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub label: DayLabel,
    pub title: String,
    pub messages: Vec<MessageView>,
}

/// Bucket `messages` (already in display order) by calendar day in `tz`,
/// labelled relative to `now`.
pub fn group_by_day<Tz: TimeZone>(
    messages: &[MessageView],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<DayGroup> {
    let today = now.with_timezone(tz).date_naive();
    let yesterday = today.pred_opt();

    let mut groups: Vec<DayGroup> = Vec::new();
    for message in messages {
        let date = message.created_at.with_timezone(tz).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.messages.push(message.clone()),
            _ => {
                let label = if date == today {
                    DayLabel::Today
                } else if Some(date) == yesterday {
                    DayLabel::Yesterday
                } else {
                    DayLabel::Date(date)
                };
                groups.push(DayGroup {
                    date,
                    label,
                    title: label.to_string(),
                    messages: vec![message.clone()],
                });
            }
        }
    }
    groups
}
