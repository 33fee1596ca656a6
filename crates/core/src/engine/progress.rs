//! Best-effort progress extraction from the external engine's stderr.
//!
//! The external engine reports progress only as free-form diagnostic text:
//! a `Duration: HH:MM:SS.ff` line near the start of the run and repeated
//! `time=HH:MM:SS.ff` position lines afterwards. This scrape is an explicit
//! best-effort adapter over an interface we do not control; text that does
//! not match simply yields no update.

use regex_lite::Regex;

/// Incremental parser over stderr chunks.
///
/// Feed each chunk with [`ProgressParser::observe`]; the return value is the
/// derived percentage when the chunk (combined with a previously seen
/// duration) yields a position, `None` otherwise.
#[derive(Debug)]
pub struct ProgressParser {
    duration_re: Regex,
    position_re: Regex,
    duration_secs: Option<f64>,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            duration_re: Regex::new(r"Duration: (\d{2,}):(\d{2}):(\d{2}\.\d+)")
                .expect("duration regex is valid"),
            position_re: Regex::new(r"time=(\d{2,}):(\d{2}):(\d{2}\.\d+)")
                .expect("position regex is valid"),
            duration_secs: None,
        }
    }

    /// Scans one diagnostic chunk and returns the derived percentage, if any.
    pub fn observe(&mut self, chunk: &str) -> Option<u8> {
        if let Some(duration) = last_timestamp(&self.duration_re, chunk) {
            if duration > 0.0 {
                self.duration_secs = Some(duration);
            }
        }

        let position = last_timestamp(&self.position_re, chunk)?;
        let duration = self.duration_secs?;

        let percent = (position / duration * 100.0).round();
        Some(percent.clamp(0.0, 100.0) as u8)
    }

    /// The total duration seen so far, in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }
}

/// Most recent `HH:MM:SS.ff` match of `re` in `text`, as fractional seconds.
fn last_timestamp(re: &Regex, text: &str) -> Option<f64> {
    let caps = re.captures_iter(text).last()?;
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Last `chars` characters of `text`, on a character boundary.
pub(crate) fn tail(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    if count <= chars {
        return text.to_string();
    }
    text.chars().skip(count - chars).collect()
}

/// In-place variant of [`tail`] used to bound an accumulating diagnostic.
pub(crate) fn trim_to_tail(text: &mut String, chars: usize) {
    let count = text.chars().count();
    if count > chars {
        *text = text.chars().skip(count - chars).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_then_positions() {
        let mut parser = ProgressParser::new();
        assert_eq!(
            parser.observe("Duration: 00:01:40.00, start: 0.000000, bitrate: 1000 kb/s"),
            None
        );
        assert_eq!(parser.duration_secs(), Some(100.0));

        assert_eq!(
            parser.observe("frame=  240 fps= 24 time=00:00:25.00 bitrate=900kbits/s"),
            Some(25)
        );
        assert_eq!(
            parser.observe("frame=  480 fps= 24 time=00:00:50.00 bitrate=900kbits/s"),
            Some(50)
        );
    }

    #[test]
    fn test_pair_in_single_chunk() {
        let mut parser = ProgressParser::new();
        let chunk = "Duration: 00:00:10.00\nframe=1 time=00:00:05.00 speed=1x";
        assert_eq!(parser.observe(chunk), Some(50));
    }

    #[test]
    fn test_most_recent_position_wins() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:00:10.00");
        let chunk = "time=00:00:02.00\ntime=00:00:08.00";
        assert_eq!(parser.observe(chunk), Some(80));
    }

    #[test]
    fn test_no_match_yields_no_update() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:00:10.00");
        assert_eq!(parser.observe("Press [q] to stop, [?] for help"), None);
        assert_eq!(parser.observe(""), None);
    }

    #[test]
    fn test_position_without_duration_is_silent() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.observe("time=00:00:05.00"), None);
    }

    #[test]
    fn test_capped_at_100() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:00:10.00");
        // Encoders can overshoot the container duration slightly.
        assert_eq!(parser.observe("time=00:00:12.50"), Some(100));
    }

    #[test]
    fn test_monotonic_over_increasing_positions() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:10:00.00");
        let mut last = 0u8;
        for tick in 1..=60 {
            let chunk = format!("time=00:{:02}:{:02}.00", tick / 6, (tick % 6) * 10);
            if let Some(percent) = parser.observe(&chunk) {
                assert!(percent >= last, "progress went backwards at tick {tick}");
                assert!(percent <= 100);
                last = percent;
            }
        }
        assert!(last > 0);
    }

    #[test]
    fn test_tail_truncation() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        // Multi-byte characters must not split.
        assert_eq!(tail("héllo", 4), "éllo");
    }

    #[test]
    fn test_long_durations_parse() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 01:30:00.00");
        assert_eq!(parser.duration_secs(), Some(5400.0));
        assert_eq!(parser.observe("time=00:45:00.00"), Some(50));
    }
}
