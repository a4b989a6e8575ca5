//! Send-window policies: how many datagrams may be unacknowledged at once.

/// Pluggable window policy, chosen at configuration time.
///
/// `AdditiveResetOnTimeout` is a bare additive-increase / hard-reset
/// heuristic: it grows by one for every progress-making cumulative ack and
/// collapses to one on any timeout. It has no slow-start phase and no
/// multiplicative decrease; it is not a congestion-control algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Constant window supplied at start; ack and timeout events are no-ops.
    Fixed(usize),
    /// Window starts at 1, grows by 1 per progress ack, resets to 1 on timeout.
    AdditiveResetOnTimeout { swnd: usize },
}

impl WindowPolicy {
    /// A fixed window of `n` datagrams (`n` is clamped to at least 1).
    pub fn fixed(n: usize) -> Self {
        WindowPolicy::Fixed(n.max(1))
    }

    /// The adaptive policy, starting at a window of 1.
    pub fn adaptive() -> Self {
        WindowPolicy::AdditiveResetOnTimeout { swnd: 1 }
    }

    /// A progress-making cumulative ack was accepted.
    pub fn on_ack_progress(&mut self) {
        if let WindowPolicy::AdditiveResetOnTimeout { swnd } = self {
            *swnd += 1;
        }
    }

    /// An ack wait expired.
    pub fn on_timeout(&mut self) {
        if let WindowPolicy::AdditiveResetOnTimeout { swnd } = self {
            *swnd = 1;
        }
    }

    /// Current maximum number of unacknowledged datagrams in flight.
    pub fn current(&self) -> usize {
        match self {
            WindowPolicy::Fixed(n) => *n,
            WindowPolicy::AdditiveResetOnTimeout { swnd } => *swnd,
        }
    }
}
