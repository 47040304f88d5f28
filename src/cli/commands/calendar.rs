//! Calendar command implementation.

use crate::cli::{CalendarAction, Output};
use crate::config::Settings;
use crate::tools::calendar::AddOutcome;
use crate::tools::{CalendarEvent, CalendarStore};
use anyhow::Result;
use chrono::Duration;

/// Run the calendar command.
pub fn run_calendar(action: &CalendarAction, settings: &Settings) -> Result<()> {
    let store = CalendarStore::open(&settings.calendar_path())?;

    match action {
        CalendarAction::List { upcoming } => {
            let mut events = store.list()?;
            if let Some(days) = upcoming {
                let today = chrono::Local::now().date_naive();
                let end = today + Duration::days(*days);
                events.retain(|e| e.date >= today && e.date <= end);
            }

            if events.is_empty() {
                Output::info("No events.");
                return Ok(());
            }

            Output::header(&format!("Calendar ({} events)", events.len()));
            for event in &events {
                Output::event(event);
            }
        }

        CalendarAction::Add {
            title,
            date,
            time,
            kind,
        } => {
            let event = CalendarEvent::parse(title, date, time, kind)?;
            match store.add(event)? {
                AddOutcome::Added => Output::success(&format!("Added {:?}", title.trim())),
                AddOutcome::Duplicate => Output::warning("That event is already in the calendar."),
            }
        }

        CalendarAction::Remove { title } => match store.remove(title)? {
            0 => Output::warning(&format!("No event titled {:?}", title)),
            n => Output::success(&format!("Removed {} event(s)", n)),
        },
    }

    Ok(())
}
