//! Practice session state machine.
//!
//! One learner practicing one lesson. Frames are appended in arrival order;
//! once `batch_size` frames are buffered the buffer is handed out as a
//! [`PendingEvaluation`] and the session waits for its verdict. A match is
//! sticky until the lesson changes. A lesson switch bumps the session epoch,
//! so a verdict computed against the previous reference is recognized as
//! stale and dropped.
//!
//! This type does no I/O; the async runner drives extraction and inference
//! and feeds the results back in.

use std::sync::Arc;

use hearme_models::{LandmarkFrame, LessonId, ReferenceRecord, SessionId, UserId, Verdict};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing buffered, not matched.
    Idle,
    /// Frames accumulating toward the next batch.
    Buffering,
    /// A batch is being evaluated.
    Evaluating,
    /// Terminal until the lesson changes.
    Matched,
}

/// Identifies which lesson epoch an evaluation belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationTicket {
    epoch: u64,
    lesson: LessonId,
}

impl EvaluationTicket {
    pub fn lesson(&self) -> &LessonId {
        &self.lesson
    }
}

/// A full batch waiting to be scored.
#[derive(Debug, Clone)]
pub struct PendingEvaluation {
    pub ticket: EvaluationTicket,
    pub reference: Arc<ReferenceRecord>,
    pub frames: Vec<LandmarkFrame>,
}

/// Why a frame was not buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Session already matched; frames are accepted and dropped.
    AlreadyMatched,
    /// No lesson selected yet.
    NoLesson,
    /// A full batch is already waiting behind the one being scored.
    BufferFull,
}

/// Result of [`PracticeSession::push_frame`].
#[derive(Debug)]
pub enum FrameOutcome {
    Buffered { buffered: usize },
    Evaluate(PendingEvaluation),
    Discarded(DiscardReason),
}

/// Result of [`PracticeSession::complete`].
#[derive(Debug)]
pub enum Completion {
    /// First match for this lesson. `progress` is set when both user and
    /// lesson are known.
    Matched { progress: Option<(UserId, LessonId)> },
    /// No match. `next` carries a batch that filled up while this one was
    /// being scored.
    NoMatch { next: Option<PendingEvaluation> },
    /// The lesson changed while the batch was in flight.
    Stale,
}

/// What was left when a session ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub lesson: Option<LessonId>,
    pub matched: bool,
    pub evaluations: u64,
    /// Frames buffered short of a full batch; never evaluated.
    pub discarded_frames: usize,
    pub last_verdict: Option<Verdict>,
}

/// State of one learner's live practice.
#[derive(Debug)]
pub struct PracticeSession {
    id: SessionId,
    user: Option<UserId>,
    reference: Option<Arc<ReferenceRecord>>,
    buffer: Vec<LandmarkFrame>,
    batch_size: usize,
    matched: bool,
    in_flight: bool,
    epoch: u64,
    evaluations: u64,
    last_verdict: Option<Verdict>,
}

impl PracticeSession {
    pub fn new(id: SessionId, user: Option<UserId>, batch_size: usize) -> Self {
        Self {
            id,
            user,
            reference: None,
            buffer: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            matched: false,
            in_flight: false,
            epoch: 0,
            evaluations: 0,
            last_verdict: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn lesson(&self) -> Option<&LessonId> {
        self.reference.as_ref().map(|r| &r.lesson_id)
    }

    pub fn reference(&self) -> Option<&Arc<ReferenceRecord>> {
        self.reference.as_ref()
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.last_verdict.as_ref()
    }

    pub fn state(&self) -> SessionState {
        if self.matched {
            SessionState::Matched
        } else if self.in_flight {
            SessionState::Evaluating
        } else if self.buffer.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Buffering
        }
    }

    /// Replace the active reference and reset the session.
    ///
    /// Clears the buffer and the match flag and invalidates any in-flight
    /// evaluation.
    pub fn switch_lesson(&mut self, reference: Arc<ReferenceRecord>) {
        self.reference = Some(reference);
        self.buffer.clear();
        self.matched = false;
        self.in_flight = false;
        self.last_verdict = None;
        self.epoch += 1;
    }

    /// Append one extracted frame.
    pub fn push_frame(&mut self, frame: LandmarkFrame) -> FrameOutcome {
        if self.matched {
            return FrameOutcome::Discarded(DiscardReason::AlreadyMatched);
        }
        if self.reference.is_none() {
            return FrameOutcome::Discarded(DiscardReason::NoLesson);
        }
        if self.buffer.len() >= self.batch_size {
            return FrameOutcome::Discarded(DiscardReason::BufferFull);
        }

        self.buffer.push(frame);
        match self.take_batch() {
            Some(pending) => FrameOutcome::Evaluate(pending),
            None => FrameOutcome::Buffered {
                buffered: self.buffer.len(),
            },
        }
    }

    /// Apply the verdict of an evaluation handed out earlier.
    pub fn complete(&mut self, ticket: &EvaluationTicket, verdict: Verdict) -> Completion {
        if !self.is_current(ticket) {
            return Completion::Stale;
        }

        self.in_flight = false;
        self.evaluations += 1;
        let is_match = verdict.is_match();
        self.last_verdict = Some(verdict);

        if is_match {
            self.matched = true;
            self.buffer.clear();
            let progress = self
                .user
                .clone()
                .map(|user| (user, ticket.lesson.clone()));
            return Completion::Matched { progress };
        }

        Completion::NoMatch {
            next: self.take_batch(),
        }
    }

    /// Release an evaluation that failed. Its frames are dropped.
    pub fn abort(&mut self, ticket: &EvaluationTicket) {
        if self.is_current(ticket) {
            self.in_flight = false;
        }
    }

    /// End the session. A partial batch is not evaluated.
    pub fn finish(self) -> SessionSummary {
        SessionSummary {
            lesson: self.lesson().cloned(),
            session_id: self.id,
            matched: self.matched,
            evaluations: self.evaluations,
            discarded_frames: self.buffer.len(),
            last_verdict: self.last_verdict,
        }
    }

    fn is_current(&self, ticket: &EvaluationTicket) -> bool {
        ticket.epoch == self.epoch && self.lesson() == Some(&ticket.lesson)
    }

    fn take_batch(&mut self) -> Option<PendingEvaluation> {
        if self.in_flight || self.matched || self.buffer.len() < self.batch_size {
            return None;
        }
        let reference = Arc::clone(self.reference.as_ref()?);

        self.in_flight = true;
        Some(PendingEvaluation {
            ticket: EvaluationTicket {
                epoch: self.epoch,
                lesson: reference.lesson_id.clone(),
            },
            frames: self.buffer.drain(..self.batch_size).collect(),
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearme_models::{CollectionId, Embedding, MatchStatus, Threshold};

    fn reference(lesson: &str) -> Arc<ReferenceRecord> {
        Arc::new(ReferenceRecord::new(
            LessonId::from(lesson),
            CollectionId::from("asl"),
            Embedding::new(vec![1.0, 0.0]),
            Threshold::new(0.5).unwrap(),
        ))
    }

    fn verdict(similarity: f32) -> Verdict {
        let status = if similarity >= 0.5 {
            MatchStatus::Match
        } else {
            MatchStatus::NotMatch
        };
        Verdict { similarity, status }
    }

    fn session(user: Option<&str>) -> PracticeSession {
        let mut session = PracticeSession::new(SessionId::new(), user.map(UserId::from), 60);
        session.switch_lesson(reference("hello"));
        session
    }

    fn fill(session: &mut PracticeSession, n: usize) -> Option<PendingEvaluation> {
        let mut pending = None;
        for _ in 0..n {
            if let FrameOutcome::Evaluate(p) = session.push_frame(LandmarkFrame::zeroed()) {
                assert!(pending.is_none(), "evaluated twice");
                pending = Some(p);
            }
        }
        pending
    }

    #[test]
    fn test_fifty_nine_frames_do_not_evaluate() {
        let mut session = session(None);
        assert_eq!(session.state(), SessionState::Idle);

        assert!(fill(&mut session, 59).is_none());
        assert_eq!(session.buffered(), 59);
        assert_eq!(session.state(), SessionState::Buffering);
        assert!(!session.matched());
    }

    #[test]
    fn test_sixtieth_frame_triggers_evaluation() {
        let mut session = session(None);
        fill(&mut session, 59);

        match session.push_frame(LandmarkFrame::zeroed()) {
            FrameOutcome::Evaluate(pending) => {
                assert_eq!(pending.frames.len(), 60);
                assert_eq!(pending.ticket.lesson().as_str(), "hello");
            }
            other => panic!("expected evaluation, got {other:?}"),
        }
        assert_eq!(session.buffered(), 0);
        assert_eq!(session.state(), SessionState::Evaluating);
    }

    #[test]
    fn test_no_match_returns_to_buffering() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();

        assert!(matches!(
            session.complete(&pending.ticket, verdict(0.3)),
            Completion::NoMatch { next: None }
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.matched());

        assert!(fill(&mut session, 60).is_some());
        assert_eq!(session.evaluations(), 1);
    }

    #[test]
    fn test_match_is_sticky() {
        let mut session = session(Some("u1"));
        let pending = fill(&mut session, 60).unwrap();

        match session.complete(&pending.ticket, verdict(0.62)) {
            Completion::Matched { progress } => {
                let (user, lesson) = progress.unwrap();
                assert_eq!(user.as_str(), "u1");
                assert_eq!(lesson.as_str(), "hello");
            }
            other => panic!("expected match, got {other:?}"),
        }

        for _ in 0..200 {
            assert!(matches!(
                session.push_frame(LandmarkFrame::zeroed()),
                FrameOutcome::Discarded(DiscardReason::AlreadyMatched)
            ));
        }
        assert!(session.matched());
        assert_eq!(session.state(), SessionState::Matched);
        assert_eq!(session.last_verdict().unwrap().similarity, 0.62);
    }

    #[test]
    fn test_anonymous_match_skips_progress() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();
        assert!(matches!(
            session.complete(&pending.ticket, verdict(0.9)),
            Completion::Matched { progress: None }
        ));
        assert!(session.matched());
    }

    #[test]
    fn test_switch_resets_and_discards_in_flight() {
        let mut session = session(Some("u1"));
        let pending = fill(&mut session, 60).unwrap();
        fill(&mut session, 10);

        session.switch_lesson(reference("goodbye"));
        assert_eq!(session.buffered(), 0);
        assert!(!session.matched());

        assert!(matches!(
            session.complete(&pending.ticket, verdict(0.99)),
            Completion::Stale
        ));
        assert!(!session.matched());

        let next = fill(&mut session, 60).unwrap();
        assert_eq!(next.reference.lesson_id.as_str(), "goodbye");
    }

    #[test]
    fn test_switch_after_match_resets_flag() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();
        session.complete(&pending.ticket, verdict(0.8));
        assert!(session.matched());

        session.switch_lesson(reference("goodbye"));
        assert!(!session.matched());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_switch_to_same_lesson_still_invalidates() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();
        session.switch_lesson(reference("hello"));
        assert!(matches!(
            session.complete(&pending.ticket, verdict(0.9)),
            Completion::Stale
        ));
    }

    #[test]
    fn test_frames_during_evaluation_form_next_batch() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();

        assert!(fill(&mut session, 60).is_none());
        assert_eq!(session.buffered(), 60);

        match session.complete(&pending.ticket, verdict(0.1)) {
            Completion::NoMatch { next: Some(next) } => assert_eq!(next.frames.len(), 60),
            other => panic!("expected follow-up batch, got {other:?}"),
        }
    }

    #[test]
    fn test_buffer_is_bounded_while_evaluating() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();

        let mut dropped = 0;
        for _ in 0..100 {
            match session.push_frame(LandmarkFrame::zeroed()) {
                FrameOutcome::Buffered { buffered } => assert!(buffered <= 60),
                FrameOutcome::Discarded(DiscardReason::BufferFull) => dropped += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(session.buffered(), 60);
        assert_eq!(dropped, 40);

        match session.complete(&pending.ticket, verdict(0.1)) {
            Completion::NoMatch { next: Some(next) } => assert_eq!(next.frames.len(), 60),
            other => panic!("expected follow-up batch, got {other:?}"),
        }
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_abort_releases_session() {
        let mut session = session(None);
        let pending = fill(&mut session, 60).unwrap();
        session.abort(&pending.ticket);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(fill(&mut session, 60).is_some());
    }

    #[test]
    fn test_frames_without_lesson_are_discarded() {
        let mut session = PracticeSession::new(SessionId::new(), None, 60);
        assert!(matches!(
            session.push_frame(LandmarkFrame::zeroed()),
            FrameOutcome::Discarded(DiscardReason::NoLesson)
        ));
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_finish_reports_partial_batch() {
        let mut session = session(None);
        fill(&mut session, 42);
        let summary = session.finish();
        assert_eq!(summary.discarded_frames, 42);
        assert_eq!(summary.evaluations, 0);
        assert!(!summary.matched);
    }
}
