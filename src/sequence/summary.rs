//! Sequence summarization: frame ranges, hole counts, cheap fingerprints.

use crate::hashing::CheapFingerprint;
use crate::sequence::detect::SequenceGroup;
use crate::sidecar::schema::SequenceSummary;

/// Summarize a detected sequence. Frames are already sorted by integer frame
/// value (detector invariant).
#[must_use]
pub fn summarize(group: &SequenceGroup) -> SequenceSummary {
    let frames = &group.frames;
    debug_assert!(!frames.is_empty(), "detector never emits empty groups");

    let frame_min = frames.first().map_or(0, |f| f.frame);
    let frame_max = frames.last().map_or(0, |f| f.frame);
    let frame_count = frames.len() as u64;

    let mut range_count: u64 = if frames.is_empty() { 0 } else { 1 };
    for pair in frames.windows(2) {
        if pair[1].frame != pair[0].frame + 1 {
            range_count += 1;
        }
    }

    let span = frame_max.saturating_sub(frame_min).saturating_add(1);
    let holes = span.saturating_sub(frame_count);

    let cheap_fp =
        CheapFingerprint::from_entries(frames.iter().map(|f| (f.entry.size, f.entry.mtime)));

    SequenceSummary {
        base: group.base.clone(),
        ext: group.ext.clone(),
        pad: group.pad,
        first: frames.first().map_or_else(String::new, |f| {
            f.entry.file_name.clone()
        }),
        last: frames.last().map_or_else(String::new, |f| {
            f.entry.file_name.clone()
        }),
        frame_min,
        frame_max,
        frame_count,
        range_count,
        holes,
        cheap_fp,
    }
}

/// Frame numbers absent from the `[frame_min, frame_max]` span.
#[must_use]
pub fn missing_frames(group: &SequenceGroup) -> Vec<u64> {
    let mut missing = Vec::new();
    for pair in group.frames.windows(2) {
        for n in pair[0].frame + 1..pair[1].frame {
            missing.push(n);
        }
    }
    missing
}

/// Compact span notation for a sorted list of frame numbers, zero-padded to
/// `pad`: `[1, 2, 3, 10]` with pad 4 renders as `0001-0003, 0010`.
#[must_use]
pub fn compact_spans(frames: &[u64], pad: usize) -> String {
    let mut spans: Vec<String> = Vec::new();
    let mut i = 0;
    while i < frames.len() {
        let start = frames[i];
        let mut end = start;
        let mut j = i + 1;
        while j < frames.len() && frames[j] == end + 1 {
            end = frames[j];
            j += 1;
        }
        if start == end {
            spans.push(format!("{start:0pad$}"));
        } else {
            spans.push(format!("{start:0pad$}-{end:0pad$}"));
        }
        i = j;
    }
    spans.join(", ")
}
