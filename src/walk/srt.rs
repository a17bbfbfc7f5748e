use crate::{
    composition::model::CaptionCue,
    foundation::error::{ClipforgeError, ClipforgeResult},
};

/// Parse SubRip (`.srt`) text into cues.
///
/// Accepts CRLF line endings, a leading BOM, optional cue numbers and `.` as the millisecond
/// separator. Cues whose end does not follow their start are dropped.
pub fn parse_srt(text: &str) -> ClipforgeResult<Vec<CaptionCue>> {
    let text = text.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in text.split("\n\n") {
        let mut lines = block.lines().map(str::trim_end).skip_while(|l| l.trim().is_empty());
        let Some(first) = lines.next() else {
            continue;
        };
        let timing = if first.contains("-->") {
            first
        } else {
            match lines.next() {
                Some(l) if l.contains("-->") => l,
                _ => {
                    return Err(ClipforgeError::resolution(format!(
                        "srt block without timing line: '{}'",
                        first.trim()
                    )));
                }
            }
        };
        let (start, end) = parse_timing(timing)?;
        let body: Vec<&str> = lines.collect();
        let body = body.join("\n").trim().to_string();
        if body.is_empty() || end <= start {
            continue;
        }
        cues.push(CaptionCue {
            text: body,
            start,
            end,
        });
    }
    Ok(cues)
}

fn parse_timing(line: &str) -> ClipforgeResult<(f64, f64)> {
    let (a, b) = line
        .split_once("-->")
        .ok_or_else(|| ClipforgeError::resolution(format!("bad srt timing '{line}'")))?;
    // Positioning hints may follow the end timestamp.
    let b = b.split_whitespace().next().unwrap_or("");
    Ok((parse_timestamp(a.trim())?, parse_timestamp(b)?))
}

fn parse_timestamp(s: &str) -> ClipforgeResult<f64> {
    let bad = || ClipforgeError::resolution(format!("bad srt timestamp '{s}'"));
    let (hms, ms) = s.split_once([',', '.']).unwrap_or((s, "0"));
    let parts: Vec<&str> = hms.split(':').collect();
    let [h, m, sec] = parts.as_slice() else {
        return Err(bad());
    };
    let h: u64 = h.trim().parse().map_err(|_| bad())?;
    let m: u64 = m.trim().parse().map_err(|_| bad())?;
    let sec: u64 = sec.trim().parse().map_err(|_| bad())?;
    let ms: u64 = ms.trim().parse().map_err(|_| bad())?;
    if m >= 60 || sec >= 60 || ms >= 1000 {
        return Err(bad());
    }
    Ok((h * 3600 + m * 60 + sec) as f64 + ms as f64 / 1000.0)
}

#[cfg(test)]
#[path = "../../tests/unit/walk/srt.rs"]
mod tests;
