use crate::models::{Booking, BookingStatus, Court};

const ICS_FORMAT: &str = "%Y%m%dT%H%M%S";

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

pub fn generate_ics(booking: &Booking, court: &Court) -> String {
    let dtstart = booking.start_at.format(ICS_FORMAT);
    let dtend = booking.end_at.format(ICS_FORMAT);
    let dtstamp = booking.updated_at.format(ICS_FORMAT);
    let uid = format!("{}@courtbook", booking.id);

    let summary = escape(&format!("{} at {}", court.name, court.venue_name));
    let location = escape(&court.venue_name);
    let mut description = format!(
        "Booking {} for {} player(s)",
        booking.reference, booking.player_count
    );
    if let Some(notes) = &booking.notes {
        description.push_str(" - ");
        description.push_str(notes);
    }
    let description = escape(&description);
    let status = match booking.status {
        BookingStatus::Cancelled => "CANCELLED",
        _ => "CONFIRMED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Courtbook//Court Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         LOCATION:{location}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
