//! Pairs first and second segments into complete readings.
//!
//! The headband splits every reading across two notifications.  The first
//! segment is useful on its own (focus and relax go straight to the live
//! metrics), but a [`FullSample`] only exists once the matching second
//! segment arrives.
//!
//! Only the most recent unmatched first segment is kept.  A second segment
//! with nothing pending is the normal result of joining the stream halfway
//! through a pair (e.g. right after a reconnect) and is dropped quietly.

use log::{debug, warn};

use crate::types::{DecodedFrame, FirstSegment, FullSample, LinkDiagnostics};

/// What a frame contributed, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassembled {
    /// A first segment is now pending; its metrics can be shown right away.
    Partial(FirstSegment),
    /// A pending first segment was completed.
    Full(FullSample),
}

/// Holds the half-received reading for one connection.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    partial: Option<FirstSegment>,
    diagnostics: LinkDiagnostics,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one decoded frame.
    pub fn push(&mut self, frame: DecodedFrame) -> Option<Reassembled> {
        match frame {
            DecodedFrame::FirstSegment(first) => {
                self.diagnostics.first_segments += 1;
                if self.partial.replace(first).is_some() {
                    self.diagnostics.overwritten_first_segments += 1;
                    debug!("first segment replaced an unmatched one");
                }
                Some(Reassembled::Partial(first))
            }
            DecodedFrame::SecondSegment(second) => {
                self.diagnostics.second_segments += 1;
                match self.partial.take() {
                    Some(first) => {
                        self.diagnostics.full_samples += 1;
                        Some(Reassembled::Full(FullSample::merge(first, second)))
                    }
                    None => {
                        self.diagnostics.orphan_second_segments += 1;
                        debug!("second segment with no pending first segment, dropped");
                        None
                    }
                }
            }
            DecodedFrame::Invalid(reason) => {
                self.diagnostics.invalid_frames += 1;
                warn!("dropping malformed frame: {reason}");
                None
            }
        }
    }

    /// Forget any pending first segment.  Called on connect and disconnect.
    pub fn reset(&mut self) {
        self.partial = None;
    }

    pub fn partial(&self) -> Option<&FirstSegment> {
        self.partial.as_ref()
    }

    pub fn diagnostics(&self) -> &LinkDiagnostics {
        &self.diagnostics
    }

    pub(crate) fn note_notification(&mut self) {
        self.diagnostics.notifications += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::types::SecondSegment;

    fn first(focus: u8) -> FirstSegment {
        FirstSegment {
            signal_quality: 0,
            focus,
            relax: 40,
            delta: 1,
            theta: 2,
            low_alpha: 3,
            high_alpha: 4,
        }
    }

    fn second() -> SecondSegment {
        SecondSegment {
            low_beta: 5,
            high_beta: 6,
            low_gamma: 7,
            high_gamma: 8,
        }
    }

    #[test]
    fn first_then_second_yields_one_full_sample() {
        let mut r = FrameReassembler::new();
        assert_eq!(
            r.push(DecodedFrame::FirstSegment(first(70))),
            Some(Reassembled::Partial(first(70)))
        );
        let out = r.push(DecodedFrame::SecondSegment(second()));
        assert_eq!(
            out,
            Some(Reassembled::Full(FullSample {
                signal_quality: 0,
                focus: 70,
                relax: 40,
                delta: 1,
                theta: 2,
                low_alpha: 3,
                high_alpha: 4,
                low_beta: 5,
                high_beta: 6,
                low_gamma: 7,
                high_gamma: 8,
            }))
        );
        assert!(r.partial().is_none());
        assert_eq!(r.diagnostics().full_samples, 1);

        // The pair is consumed; a repeated second segment is an orphan.
        assert_eq!(r.push(DecodedFrame::SecondSegment(second())), None);
    }

    #[test]
    fn orphan_second_segment_is_dropped() {
        let mut r = FrameReassembler::new();
        assert_eq!(r.push(DecodedFrame::SecondSegment(second())), None);
        assert!(r.partial().is_none());
        assert_eq!(r.diagnostics().orphan_second_segments, 1);
        assert_eq!(r.diagnostics().full_samples, 0);
    }

    #[test]
    fn later_first_segment_overwrites_earlier() {
        let mut r = FrameReassembler::new();
        r.push(DecodedFrame::FirstSegment(first(10)));
        r.push(DecodedFrame::FirstSegment(first(90)));
        assert_eq!(r.partial().map(|f| f.focus), Some(90));
        assert_eq!(r.diagnostics().overwritten_first_segments, 1);

        let Some(Reassembled::Full(sample)) = r.push(DecodedFrame::SecondSegment(second())) else {
            panic!("expected a full sample");
        };
        assert_eq!(sample.focus, 90);
    }

    #[test]
    fn invalid_frame_leaves_partial_alone() {
        let mut r = FrameReassembler::new();
        r.push(DecodedFrame::FirstSegment(first(33)));
        assert_eq!(
            r.push(DecodedFrame::Invalid(FrameError::TooShort { len: 1 })),
            None
        );
        assert_eq!(r.partial().map(|f| f.focus), Some(33));
        assert_eq!(r.diagnostics().invalid_frames, 1);
    }

    #[test]
    fn reset_clears_partial() {
        let mut r = FrameReassembler::new();
        r.push(DecodedFrame::FirstSegment(first(33)));
        r.reset();
        assert!(r.partial().is_none());
        assert_eq!(r.push(DecodedFrame::SecondSegment(second())), None);
    }
}
