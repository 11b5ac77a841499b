/// Execution mode threaded through every forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

impl Mode {
    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Train)
    }
}
