use chrono::{FixedOffset, NaiveDate};
use shared::domain::{Message, ParticipantRole};

/// Whether a message was authored by the current viewer or the counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Mine,
    Theirs,
}

/// The same conversation renders from two perspectives: the provider's app
/// and the customer's app invert attribution on identical data. The session
/// role therefore always arrives as a parameter, never from global state.
pub fn attribute(message: &Message, viewer_role: ParticipantRole) -> Attribution {
    if message.sender_role == viewer_role {
        Attribution::Mine
    } else {
        Attribution::Theirs
    }
}

/// A display-ready row: either a message with its attribution or a synthetic
/// day separator inserted where the calendar day changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    DaySeparator { label: String },
    Message { message: Message, attribution: Attribution },
}

fn day_label(day: NaiveDate) -> String {
    day.format("%B %-d, %Y").to_string()
}

/// Projects the ascending message sequence into render rows, emitting a
/// separator before the first message and before each message whose calendar
/// day (in the supplied offset) differs from its predecessor's.
///
/// Pure and deterministic; recomputed whenever the store changes rather than
/// incrementally maintained.
pub fn project_rows(
    messages: &[Message],
    viewer_role: ParticipantRole,
    offset: FixedOffset,
) -> Vec<Row> {
    let mut rows = Vec::with_capacity(messages.len() + 1);
    let mut previous_day: Option<NaiveDate> = None;
    for message in messages {
        let day = message.created_at.with_timezone(&offset).date_naive();
        if previous_day != Some(day) {
            rows.push(Row::DaySeparator {
                label: day_label(day),
            });
            previous_day = Some(day);
        }
        rows.push(Row::Message {
            message: message.clone(),
            attribution: attribute(message, viewer_role),
        });
    }
    rows
}
