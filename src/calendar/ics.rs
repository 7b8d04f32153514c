//! RFC 5545 iCalendar text generation
//!
//! UTF-8 output with CRLF line endings, 75-octet line folding, and a single
//! VTIMEZONE for America/New_York carrying both EDT and EST subcomponents.

use chrono::NaiveDateTime;

const PRODID: &str = "-//medshift//Residency Scheduler//EN";

/// Timezone id used by every event
pub const TZID: &str = "America/New_York";

/// One calendar event
#[derive(Debug, Clone)]
pub struct IcsEvent {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Local wall-clock times in the calendar's timezone
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Builds a VCALENDAR document
#[derive(Default)]
pub struct IcsBuilder {
    events: Vec<IcsEvent>,
}

impl IcsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&mut self, event: IcsEvent) {
        self.events.push(event);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Render the calendar with CRLF line endings
    pub fn build(&self, dtstamp: NaiveDateTime) -> String {
        let mut lines: Vec<String> = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{}", PRODID),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:PUBLISH".to_string(),
        ];
        lines.extend(vtimezone_lines());

        let stamp = dtstamp.format("%Y%m%dT%H%M%SZ").to_string();
        for event in &self.events {
            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}", event.uid));
            lines.push(format!("DTSTAMP:{}", stamp));
            lines.push(format!(
                "DTSTART;TZID={}:{}",
                TZID,
                event.start.format("%Y%m%dT%H%M%S")
            ));
            lines.push(format!(
                "DTEND;TZID={}:{}",
                TZID,
                event.end.format("%Y%m%dT%H%M%S")
            ));
            lines.push(format!("SUMMARY:{}", escape_text(&event.summary)));
            if let Some(location) = &event.location {
                lines.push(format!("LOCATION:{}", escape_text(location)));
            }
            if let Some(description) = &event.description {
                lines.push(format!("DESCRIPTION:{}", escape_text(description)));
            }
            lines.push("END:VEVENT".to_string());
        }

        lines.push("END:VCALENDAR".to_string());

        let mut output = String::new();
        for line in lines {
            for folded in fold_line(&line) {
                output.push_str(&folded);
                output.push_str("\r\n");
            }
        }
        output
    }
}

/// America/New_York with the post-2007 US DST rules
fn vtimezone_lines() -> Vec<String> {
    [
        "BEGIN:VTIMEZONE",
        "TZID:America/New_York",
        "BEGIN:DAYLIGHT",
        "TZOFFSETFROM:-0500",
        "TZOFFSETTO:-0400",
        "TZNAME:EDT",
        "DTSTART:20070311T020000",
        "RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU",
        "END:DAYLIGHT",
        "BEGIN:STANDARD",
        "TZOFFSETFROM:-0400",
        "TZOFFSETTO:-0500",
        "TZNAME:EST",
        "DTSTART:20071104T020000",
        "RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU",
        "END:STANDARD",
        "END:VTIMEZONE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Escape text values per RFC 5545 §3.3.11
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Fold content lines at 75 octets; continuations start with a space
fn fold_line(line: &str) -> Vec<String> {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return vec![line.to_string()];
    }

    let mut folded = Vec::new();
    let bytes = line.as_bytes();
    let mut start = 0;
    let mut first = true;
    while start < bytes.len() {
        // Continuations lose one octet to the leading space
        let budget = if first { LIMIT } else { LIMIT - 1 };
        let mut end = (start + budget).min(bytes.len());
        // Never split inside a UTF-8 sequence
        while end < bytes.len() && !line.is_char_boundary(end) {
            end -= 1;
        }
        let chunk = &line[start..end];
        if first {
            folded.push(chunk.to_string());
            first = false;
        } else {
            folded.push(format!(" {}", chunk));
        }
        start = end;
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_event() -> IcsEvent {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        IcsEvent {
            uid: "abc-123@medshift".to_string(),
            summary: "PGY-2 Clinic".to_string(),
            description: Some("Notes; with commas, and lines".to_string()),
            location: Some("Main Clinic".to_string()),
            start: date.and_hms_opt(8, 0, 0).unwrap(),
            end: date.and_hms_opt(12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_calendar_structure() {
        let mut builder = IcsBuilder::new();
        builder.add_event(sample_event());
        let ics = builder.build(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("VERSION:2.0"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("SUMMARY:PGY-2 Clinic"));
        assert!(ics.contains("LOCATION:Main Clinic"));
        assert!(ics.contains("DTSTART;TZID=America/New_York:20240115T080000"));
        assert!(ics.contains("DTEND;TZID=America/New_York:20240115T120000"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        // Every line ends with CRLF
        assert!(!ics.replace("\r\n", "").contains('\r'));
    }

    #[test]
    fn test_vtimezone_component() {
        let ics = IcsBuilder::new().build(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        assert!(ics.contains("BEGIN:VTIMEZONE"));
        assert!(ics.contains("TZID:America/New_York"));
        assert!(ics.contains("BEGIN:DAYLIGHT"));
        assert!(ics.contains("BEGIN:STANDARD"));
        assert!(ics.contains("TZNAME:EDT"));
        assert!(ics.contains("TZNAME:EST"));
        assert!(ics.contains("END:VTIMEZONE"));
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(escape_text("a;b,c"), "a\\;b\\,c");
        assert_eq!(escape_text("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_long_lines_folded() {
        let line = format!("DESCRIPTION:{}", "x".repeat(200));
        let folded = fold_line(&line);
        assert!(folded.len() > 1);
        assert!(folded.iter().all(|l| l.len() <= 75));
        assert!(folded[1].starts_with(' '));
        let reassembled: String = folded
            .iter()
            .enumerate()
            .map(|(i, l)| if i == 0 { l.clone() } else { l[1..].to_string() })
            .collect();
        assert_eq!(reassembled, line);
    }
}
