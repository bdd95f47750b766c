//! Fenced code region detection over the accumulated response text.
//!
//! The backend's reply interleaves explanatory prose with one fenced code
//! block carrying the artifact. Classification always runs over the full
//! cumulative buffer, never a single fragment, so a marker split across
//! fragment boundaries reassembles naturally.

/// Opening and closing delimiters bounding the embedded code artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceMarker {
    open: String,
    close: String,
}

impl FenceMarker {
    /// Marker for a fenced block tagged with `language` (e.g. "html").
    pub fn for_language(language: &str) -> Self {
        Self {
            open: format!("```{}", language.trim()),
            close: "```".to_string(),
        }
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    /// Classify the buffer: has the code region been entered, and if so,
    /// which part of the buffer is the running payload.
    ///
    /// One marker-adjacent newline is dropped on each side of the opening
    /// marker: the analysis keeps no trailing newline, the payload no leading
    /// one. The payload then runs to the first closing delimiter, or to the
    /// end of the buffer while the block is still open; the first close wins,
    /// so extraction is bounded to the first fenced block.
    pub fn scan<'a>(&self, buffer: &'a str) -> FenceScan<'a> {
        match buffer.find(&self.open) {
            None => FenceScan {
                entered: false,
                analysis: buffer,
                code: "",
            },
            Some(at) => {
                let analysis = &buffer[..at];
                let analysis = analysis.strip_suffix('\n').unwrap_or(analysis);
                let rest = &buffer[at + self.open.len()..];
                let rest = rest.strip_prefix('\n').unwrap_or(rest);
                let code = match rest.find(&self.close) {
                    Some(end) => &rest[..end],
                    None => rest,
                };
                FenceScan {
                    entered: true,
                    analysis,
                    code,
                }
            }
        }
    }
}

impl Default for FenceMarker {
    fn default() -> Self {
        Self::for_language("html")
    }
}

/// One classification pass over the buffer.
///
/// `analysis` is the prose before the marker (the whole buffer when the
/// marker is absent); `code` is the payload inside the fence, empty until the
/// region is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceScan<'a> {
    pub entered: bool,
    pub analysis: &'a str,
    pub code: &'a str,
}
