use super::{FsmError, FsmInterface, FsmResult};

/// Mirror that records every command it receives.
#[derive(Debug, Default)]
pub struct MockFsm {
    position: (f64, f64),
    commands: Vec<(f64, f64)>,
    failures_pending: usize,
}

impl MockFsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` moves fail; the position is left unchanged
    pub fn fail_next_moves(&mut self, count: usize) {
        self.failures_pending = count;
    }

    /// Every successfully applied command, in order
    pub fn commands(&self) -> &[(f64, f64)] {
        &self.commands
    }

    pub fn last_command(&self) -> Option<(f64, f64)> {
        self.commands.last().copied()
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }
}

impl FsmInterface for MockFsm {
    fn move_to(&mut self, x: f64, y: f64) -> FsmResult<()> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(FsmError::Move("injected failure".to_string()));
        }
        self.position = (x, y);
        self.commands.push((x, y));
        Ok(())
    }

    fn get_position(&mut self) -> FsmResult<(f64, f64)> {
        Ok(self.position)
    }
}
