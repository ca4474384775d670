//! Join policies for flattening.
//!
//! A policy decides when a nested branch may start, whose values are still
//! wanted, and when the flattened reduction as a whole is drained.

/// Identifies one nested branch of a flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Branch(pub u64);

/// How concurrently flattened branches report values and completion.
pub trait Join {
    /// Whether branches run strictly one after another.
    fn sequential(&self) -> bool {
        false
    }

    /// A branch starts.
    fn begin(&mut self) -> Branch;

    /// Whether values from `branch` are still forwarded.
    fn admits(&self, branch: Branch) -> bool;

    /// `branch` has completed.
    fn end(&mut self, branch: Branch);

    /// The outer reduction has completed.
    fn end_outer(&mut self);

    /// Whether no branch holds completion back any more.
    fn drained(&self) -> bool;
}

/// One branch at a time, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    started: u64,
    active: usize,
}

impl Sequential {
    /// A policy with no branch started yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Join for Sequential {
    fn sequential(&self) -> bool {
        true
    }

    fn begin(&mut self) -> Branch {
        self.started += 1;
        self.active += 1;
        Branch(self.started)
    }

    fn admits(&self, _branch: Branch) -> bool {
        true
    }

    fn end(&mut self, _branch: Branch) {
        self.active = self.active.saturating_sub(1);
    }

    fn end_outer(&mut self) {}

    fn drained(&self) -> bool {
        self.active == 0
    }
}

/// All branches run concurrently; completion waits for every one of them.
#[derive(Debug, Clone)]
pub struct Wait {
    started: u64,
    // The outer stream counts as one open reduction.
    open: usize,
}

impl Wait {
    /// A policy with only the outer stream open.
    pub fn new() -> Self {
        Self { started: 0, open: 1 }
    }

    /// Reductions still open, the outer stream included.
    pub fn open(&self) -> usize {
        self.open
    }
}

impl Default for Wait {
    fn default() -> Self {
        Self::new()
    }
}

impl Join for Wait {
    fn begin(&mut self) -> Branch {
        self.started += 1;
        self.open += 1;
        Branch(self.started)
    }

    fn admits(&self, _branch: Branch) -> bool {
        true
    }

    fn end(&mut self, _branch: Branch) {
        self.open = self.open.saturating_sub(1);
    }

    fn end_outer(&mut self) {
        self.open = self.open.saturating_sub(1);
    }

    fn drained(&self) -> bool {
        self.open == 0
    }
}

/// Each new branch supersedes the previous ones.
#[derive(Debug, Clone, Default)]
pub struct Latest {
    generation: u64,
    live: bool,
}

impl Latest {
    /// A policy at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently started generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Join for Latest {
    fn begin(&mut self) -> Branch {
        self.generation += 1;
        self.live = true;
        Branch(self.generation)
    }

    fn admits(&self, branch: Branch) -> bool {
        branch.0 == self.generation
    }

    fn end(&mut self, branch: Branch) {
        if self.admits(branch) {
            self.live = false;
        }
    }

    fn end_outer(&mut self) {}

    fn drained(&self) -> bool {
        !self.live
    }
}

/// Process branches one at a time, in arrival order. The default policy.
pub fn sequential() -> Sequential {
    Sequential::new()
}

/// Run branches concurrently and complete once all of them have drained.
pub fn wait() -> Wait {
    Wait::new()
}

/// Run branches concurrently and keep only the newest one's values.
pub fn latest() -> Latest {
    Latest::new()
}
