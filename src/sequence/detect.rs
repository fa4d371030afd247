//! Frame grouping: split a directory listing into image sequences and
//! singletons.
//!
//! A file joins a sequence candidate when its name matches
//! `<base><sep><digits>.<ext>` with `<sep>` one of `.`, `_`, `-` and `<ext>`
//! an accepted frame extension. The grouping key includes the detected digit
//! width, so `shot.087.exr` and `shot.0087.exr` land in different groups.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::crawler::walk::MediaEntry;

/// `<base><sep><digits>.<ext>`; the lazy base pins `<sep>` to the last
/// separator before the trailing digit run.
static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.*?)(?P<sep>[._-])(?P<digits>[0-9]+)\.(?P<ext>[^.]+)$")
        .expect("frame pattern compiles")
});

/// One frame file with its parsed numeric component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFile {
    pub entry: MediaEntry,
    pub frame: u64,
}

/// A detected sequence: >= `min_seq` frames sharing directory, base,
/// separator, extension, and padding. Frames are sorted by integer frame
/// value ascending, filename tiebreak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGroup {
    pub base: String,
    pub sep: char,
    pub ext: String,
    pub pad: usize,
    pub frames: Vec<FrameFile>,
}

impl SequenceGroup {
    /// Display pattern for logs, e.g. `shot.*.exr`.
    #[must_use]
    pub fn pattern(&self) -> String {
        format!("{}{}*.{}", self.base, self.sep, self.ext)
    }
}

/// A directory listing split into sequences and singletons.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub sequences: Vec<SequenceGroup>,
    pub singles: Vec<MediaEntry>,
}

/// Parsed pieces of a frame-shaped filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameName<'a> {
    pub base: &'a str,
    pub sep: char,
    pub digits: &'a str,
    pub ext: String,
}

/// Parse `<base><sep><digits>.<ext>` out of a filename, or `None` when the
/// name is not frame-shaped.
#[must_use]
pub fn parse_frame_name(name: &str) -> Option<FrameName<'_>> {
    let caps = FRAME_RE.captures(name)?;
    let sep = caps.name("sep")?.as_str().chars().next()?;
    Some(FrameName {
        base: caps.name("base")?.as_str(),
        sep,
        digits: caps.name("digits")?.as_str(),
        ext: caps.name("ext")?.as_str().to_ascii_lowercase(),
    })
}

/// Group a directory's media entries into sequences and singletons.
///
/// `seq_exts` holds the accepted frame extensions (lowercase, no dot);
/// `min_seq` is the minimum group size for sequence status.
#[must_use]
pub fn group_media(
    media: &[MediaEntry],
    seq_exts: &BTreeSet<String>,
    min_seq: usize,
) -> Grouping {
    // Key: (base, sep, ext, pad). BTreeMap keeps group order deterministic.
    let mut candidates: BTreeMap<(String, char, String, usize), Vec<FrameFile>> = BTreeMap::new();
    let mut singles: Vec<MediaEntry> = Vec::new();

    for entry in media {
        if !seq_exts.contains(&entry.ext) {
            singles.push(entry.clone());
            continue;
        }
        let Some(parsed) = parse_frame_name(&entry.file_name) else {
            singles.push(entry.clone());
            continue;
        };
        let Ok(frame) = parsed.digits.parse::<u64>() else {
            warn!(
                file = %entry.path.display(),
                "frame number does not fit a nonnegative integer, treating as singleton"
            );
            singles.push(entry.clone());
            continue;
        };
        let key = (
            parsed.base.to_string(),
            parsed.sep,
            parsed.ext.clone(),
            parsed.digits.len(),
        );
        candidates.entry(key).or_default().push(FrameFile {
            entry: entry.clone(),
            frame,
        });
    }

    let mut sequences = Vec::new();
    for ((base, sep, ext, pad), mut frames) in candidates {
        if frames.len() < min_seq {
            singles.extend(frames.into_iter().map(|f| f.entry));
            continue;
        }
        frames.sort_by(|a, b| {
            a.frame
                .cmp(&b.frame)
                .then_with(|| a.entry.file_name.cmp(&b.entry.file_name))
        });
        sequences.push(SequenceGroup {
            base,
            sep,
            ext,
            pad,
            frames,
        });
    }

    singles.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Grouping { sequences, singles }
}
