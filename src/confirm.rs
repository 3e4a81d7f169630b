/// A yes/no decision the core asks its caller for before destructive work.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Already approved (e.g. `force-delete`); never asks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preapproved;

impl Confirm for Preapproved {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}
