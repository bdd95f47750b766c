//! Turns accumulated backend text into deduplicated client events.

use super::events::ServerEvent;
use super::fence::FenceMarker;

/// Per-generation emitter state: the transcript, the latched region flag and
/// the last-sent payloads used for duplicate suppression.
///
/// Created at generation start and discarded at generation end; never reused
/// across generations.
#[derive(Debug)]
pub struct DeltaEmitter {
    marker: FenceMarker,
    transcript: String,
    code_entered: bool,
    last_code: String,
    last_analysis: String,
}

impl DeltaEmitter {
    pub fn new(marker: FenceMarker) -> Self {
        Self {
            marker,
            transcript: String::new(),
            code_entered: false,
            last_code: String::new(),
            last_analysis: String::new(),
        }
    }

    /// Append one incremental fragment and reclassify the whole transcript.
    /// An empty fragment is a no-op.
    pub fn apply_delta(&mut self, fragment: &str) -> Vec<ServerEvent> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.transcript.push_str(fragment);
        self.reclassify()
    }

    /// Replace the transcript with a complete-so-far snapshot and reclassify.
    /// Produces the same events as the equivalent delta sequence.
    pub fn apply_snapshot(&mut self, full_text: &str) -> Vec<ServerEvent> {
        self.transcript.clear();
        self.transcript.push_str(full_text);
        self.reclassify()
    }

    /// Last code payload sent; empty when the region was never entered.
    pub fn code(&self) -> &str {
        &self.last_code
    }

    pub fn code_entered(&self) -> bool {
        self.code_entered
    }

    fn reclassify(&mut self) -> Vec<ServerEvent> {
        let scan = self.marker.scan(&self.transcript);
        let mut events = Vec::new();

        // Monotonic: once entered, never revert, even if a snapshot no longer
        // contains the marker.
        if !scan.entered && self.code_entered {
            return events;
        }

        if !scan.entered {
            let analysis = scan.analysis.trim();
            if !analysis.is_empty() && analysis != self.last_analysis {
                self.last_analysis = analysis.to_string();
                events.push(ServerEvent::Analysis {
                    text: self.last_analysis.clone(),
                });
            }
            return events;
        }

        if !self.code_entered {
            // Entering fragment: flush the final pre-marker analysis before
            // the one-time start marker, so delta and snapshot delivery
            // converge on the same final events.
            let analysis = scan.analysis.trim();
            if !analysis.is_empty() && analysis != self.last_analysis {
                self.last_analysis = analysis.to_string();
                events.push(ServerEvent::Analysis {
                    text: self.last_analysis.clone(),
                });
            }
            self.code_entered = true;
            events.push(ServerEvent::CodeStart);
        }

        // Cumulative payload on every fragment; resending the same content is
        // idempotent at the client.
        self.last_code.clear();
        self.last_code.push_str(scan.code);
        events.push(ServerEvent::Code {
            content: self.last_code.clone(),
        });
        events
    }
}
