use crate::entities::payment::PaymentStatus;

/// Something that wants to change a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTrigger {
    SetStatus(PaymentStatus),
    UpdateAmount,
    UpdateMethod,
    CreateLink,
}

/// What the transition table says about a trigger in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Apply the change; the payment ends up in this status.
    Apply(PaymentStatus),
    /// The payment is already in the requested status; nothing to write.
    AlreadyApplied,
    Reject,
}

/// The payment transition table.
pub fn evaluate(from: PaymentStatus, trigger: PaymentTrigger) -> Verdict {
    use PaymentStatus::*;
    use PaymentTrigger::*;

    match (from, trigger) {
        // PENDING accepts everything except a request to become PENDING.
        (Pending, SetStatus(Pending)) => Verdict::Reject,
        (Pending, SetStatus(to)) => Verdict::Apply(to),
        (Pending, UpdateAmount | UpdateMethod | CreateLink) => Verdict::Apply(Pending),

        // Redelivery of the current terminal status.
        (Completed, SetStatus(Completed)) => Verdict::AlreadyApplied,
        (Failed, SetStatus(Failed)) => Verdict::AlreadyApplied,
        (Cancelled, SetStatus(Cancelled)) => Verdict::AlreadyApplied,

        // A failed payment can be written off or retried with a fresh link.
        (Failed, SetStatus(Cancelled)) => Verdict::Apply(Cancelled),
        (Failed, CreateLink) => Verdict::Apply(Pending),

        _ => Verdict::Reject,
    }
}

/// True when no trigger other than a same-status redelivery is accepted.
pub fn is_terminal(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Completed | PaymentStatus::Cancelled)
}
