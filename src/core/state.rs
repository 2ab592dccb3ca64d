//! 轮次状态机
//!
//! AWAIT_INPUT → MODEL_DECISION → {TOOL_DISPATCH | RETRIEVE → SYNTHESIZE | RESPOND} → DONE，
//! DONE 之后回到 AWAIT_INPUT 等待下一条消息。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    AwaitInput,
    ModelDecision,
    ToolDispatch,
    Retrieve,
    Synthesize,
    Respond,
    Done,
}

impl TurnPhase {
    pub fn can_transition_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (AwaitInput, ModelDecision)
                | (ModelDecision, ToolDispatch)
                | (ModelDecision, Retrieve)
                | (ModelDecision, Respond)
                | (Retrieve, Synthesize)
                | (ToolDispatch, Done)
                | (Synthesize, Done)
                | (Respond, Done)
                | (Done, AwaitInput)
        )
    }
}

/// 本轮走过的阶段
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    current: TurnPhase,
    visited: Vec<TurnPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: TurnPhase::AwaitInput,
            visited: vec![TurnPhase::AwaitInput],
        }
    }

    pub fn current(&self) -> TurnPhase {
        self.current
    }

    pub fn advance(&mut self, next: TurnPhase) {
        debug_assert!(
            self.current.can_transition_to(next),
            "illegal turn transition {:?} -> {:?}",
            self.current,
            next
        );
        tracing::debug!(from = ?self.current, to = ?next, "phase");
        self.current = next;
        self.visited.push(next);
    }

    pub fn visited(&self) -> &[TurnPhase] {
        &self.visited
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieve_path() {
        let mut t = PhaseTracker::new();
        for p in [TurnPhase::ModelDecision, TurnPhase::Retrieve, TurnPhase::Synthesize, TurnPhase::Done] {
            t.advance(p);
        }
        assert_eq!(t.current(), TurnPhase::Done);
        assert_eq!(t.visited().len(), 5);
        assert!(t.current().can_transition_to(TurnPhase::AwaitInput));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TurnPhase::AwaitInput.can_transition_to(TurnPhase::Respond));
        assert!(!TurnPhase::ToolDispatch.can_transition_to(TurnPhase::Synthesize));
        assert!(!TurnPhase::Retrieve.can_transition_to(TurnPhase::Done));
    }
}
